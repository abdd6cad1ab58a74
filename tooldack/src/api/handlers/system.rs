//! Service-level endpoints that do not process images.

use axum::{Json, response::Html};

use crate::{
    api::models::system::HealthResponse,
    errors::{Error, ErrorResponse, Result},
};

/// Page opened in a popup by clients that need a first-party visit before API calls succeed.
/// It tells its opener the visit happened and closes itself.
const AUTH_CHECK_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <body style="font-family: sans-serif; display: flex; flex-direction: column; align-items: center; justify-content: center; height: 100vh; margin: 0; text-align: center; padding: 20px;">
    <h1 style="font-size: 20px;">Connection Verified</h1>
    <p>You can now close this window and return to the app.</p>
    <button onclick="window.close()" style="padding: 10px 20px; cursor: pointer; background: #2563EB; color: white; border: none; border-radius: 5px; font-weight: bold;">Close Window</button>
    <script>
      setTimeout(() => {
        if (window.opener) {
          window.opener.postMessage({ type: 'AUTH_SUCCESS' }, '*');
          window.close();
        }
      }, 2000);
    </script>
  </body>
</html>
"#;

pub const IMAGE_TO_PROMPT_RETIRED: &str =
    "This endpoint has been moved to the frontend for security and performance. Please update your client.";

#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    summary = "Health check",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok_at(chrono::Utc::now()))
}

#[utoipa::path(
    get,
    path = "/auth-check",
    tag = "system",
    summary = "Connection check page",
    description = "HTML page that posts `{type: 'AUTH_SUCCESS'}` to its opener and closes itself.",
    responses(
        (status = 200, description = "HTML page", content_type = "text/html"),
    )
)]
pub async fn auth_check() -> Html<&'static str> {
    Html(AUTH_CHECK_PAGE)
}

#[utoipa::path(
    post,
    path = "/image-to-prompt",
    tag = "system",
    summary = "Image to prompt (retired)",
    responses(
        (status = 410, description = "Endpoint has been retired", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn image_to_prompt() -> Result<()> {
    Err(Error::Gone {
        message: IMAGE_TO_PROMPT_RETIRED.to_string(),
    })
}
