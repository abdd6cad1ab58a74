//! # tooldack: everyday image tools over HTTP
//!
//! `tooldack` is a small, self-hostable API server behind an image-utility web app. Each tool is a
//! single `multipart/form-data` POST under `/api`: the server reads the uploaded image, performs
//! one transformation and streams the result back. Nothing is persisted except by the
//! store-and-link tool (`/api/upload`), which hands the file to a blob store and answers with a
//! public link.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). A request flows through:
//!
//! 1. [`upload::ingest`], which reads the multipart body into memory and enforces the per-route
//!    field name, file count and size limits;
//! 2. [`tools::ToolRequest::from_fields`], which parses the text fields leniently into a typed
//!    request with defaults and clamping applied;
//! 3. a transform from [`imaging`] (run on the blocking pool), the remote remover in
//!    [`background`], or a [`storage::BlobStore`].
//!
//! Blob storage is chosen once at startup: Cloudinary when its three credentials are configured,
//! the local uploads directory otherwise. Local uploads are served back under `/uploads` and `/u`.
//!
//! The [`client`] module is the other side of the same protocol: it builds the multipart bodies
//! for each tool, interprets error responses and composes images locally.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use tooldack::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = tooldack::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     tooldack::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod background;
pub mod client;
pub mod config;
pub mod errors;
pub mod imaging;
mod openapi;
pub mod storage;
pub mod telemetry;
pub mod tools;
pub mod upload;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod test;

use std::any::Any;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    api::handlers::{system, tools as tool_handlers},
    background::BackgroundRemover,
    config::CorsOrigin,
    errors::Error,
    openapi::ApiDoc,
    storage::BlobStore,
};

/// Shared state handed to every handler.
///
/// - `config`: configuration loaded at startup
/// - `store`: blob store used by the store-and-link tool
/// - `background`: client for the remote background removal API
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .store(storage::create_store(&config)?)
///     .background(BackgroundRemover::new(&config.background_removal)?)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn BlobStore>,
    pub background: BackgroundRemover,
}

/// Create CORS layer from configuration.
///
/// A wildcard entry mirrors the request's `Origin` back, which keeps credentialed requests
/// working; a literal `*` cannot be combined with `allow_credentials`.
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let wildcard = config.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard));

    let allow_origin = if wildcard {
        AllowOrigin::mirror_request()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(config.cors.allow_credentials)
        .expose_headers(vec![http::header::CONTENT_DISPOSITION]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Turn a handler panic into the usual JSON 500 body, carrying the panic message.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("Internal server error");
    tracing::error!(panic = detail, "Request handler panicked");

    Error::Other(anyhow::anyhow!("{detail}")).into_response()
}

/// Build the application router.
///
/// - `/api/*` tool and system routes, each tool with its own body limit
/// - `/api/openapi.json` and the Scalar docs at `/api/docs`
/// - `/uploads/*` and `/u/*` serving the local uploads directory
/// - the SPA in `frontend_dir`, when configured, for everything else
/// - Prometheus metrics at `/internal/metrics` when enabled
/// - CORS, panic recovery and request tracing around all of it
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let single_limit = DefaultBodyLimit::max(state.config.single_upload_body_limit());
    let multi_limit = DefaultBodyLimit::max(state.config.multi_upload_body_limit());

    let api_routes = Router::new()
        .route("/health", get(system::health))
        .route("/auth-check", get(system::auth_check))
        .route("/image-to-prompt", post(system::image_to_prompt))
        .route("/upload", post(tool_handlers::upload).layer(single_limit))
        .route("/image-to-pdf", post(tool_handlers::image_to_pdf).layer(multi_limit))
        .route("/remove-bg", post(tool_handlers::remove_background).layer(single_limit))
        .route("/compress", post(tool_handlers::compress).layer(single_limit))
        .route("/convert-format", post(tool_handlers::convert_format).layer(single_limit))
        .route("/webp-convert", post(tool_handlers::webp_convert).layer(single_limit))
        .route("/resize", post(tool_handlers::resize).layer(single_limit))
        .route("/watermark", post(tool_handlers::watermark).layer(single_limit))
        .route("/rotate", post(tool_handlers::rotate).layer(single_limit))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state.clone());

    let uploads_dir = &state.config.storage.uploads_dir;

    let mut router = Router::new()
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/api/docs", ApiDoc::openapi()))
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .nest_service("/u", ServeDir::new(uploads_dir));

    if let Some(frontend_dir) = &state.config.frontend_dir {
        debug!("Serving frontend from {}", frontend_dir.display());
        let spa = ServeDir::new(frontend_dir).fallback(ServeFile::new(frontend_dir.join("index.html")));
        router = router.fallback_service(spa);
    }

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(CatchPanicLayer::custom(panic_response)),
    );

    Ok(router)
}

/// Main application: owns the router and the configuration it was built from.
///
/// 1. **Create**: [`Application::new`] prepares the uploads directory, picks the blob store and
///    builds the router
/// 2. **Serve**: [`Application::serve`] binds the TCP listener and handles requests until the
///    shutdown future resolves, then flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting tooldack with configuration: {:#?}", config);

        tokio::fs::create_dir_all(&config.storage.uploads_dir).await?;

        let store = storage::create_store(&config)?;
        info!("Store-and-link uploads go to {}", store.provider().as_str());

        let background = BackgroundRemover::new(&config.background_removal)?;
        if !background.is_configured() {
            info!("Background removal API key not set; /api/remove-bg will answer with an error");
        }

        let state = AppState::builder()
            .config(config.clone())
            .store(store)
            .background(background)
            .build();

        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "tooldack listening on http://{}, available at {}",
            bind_addr,
            self.config.public_base_url()
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_app_with, create_test_config};
    use axum::http::StatusCode;
    use serde_json::Value;

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let server = create_test_app_with(create_test_config(dir.path())).await;

        let response = server.get("/api/openapi.json").await;
        response.assert_status_ok();
        let doc: Value = response.json();
        assert!(doc["paths"]["/compress"].is_object());
        assert_eq!(doc["servers"][0]["url"], "/api");

        let docs = server.get("/api/docs").await;
        docs.assert_status_ok();
        assert!(docs.text().contains("/api/openapi.json") || docs.text().contains("openapi"));
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let server = create_test_app_with(create_test_config(dir.path())).await;

        let response = server.get("/internal/metrics").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config(dir.path());
        config.enable_metrics = true;
        let server = create_test_app_with(config).await;

        server.get("/api/health").await.assert_status_ok();

        let response = server.get("/internal/metrics").await;
        response.assert_status_ok();
        let body = response.text();
        assert!(body.contains("# TYPE") || body.contains("# HELP"));
    }

    #[tokio::test]
    async fn test_cors_mirrors_origin_with_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let server = create_test_app_with(create_test_config(dir.path())).await;

        let response = server
            .get("/api/health")
            .add_header("origin", "https://tools.example.com")
            .await;
        response.assert_status_ok();
        assert_eq!(response.header("access-control-allow-origin"), "https://tools.example.com");
        assert_eq!(response.header("access-control-allow-credentials"), "true");
    }

    #[tokio::test]
    async fn test_cors_rejects_unlisted_origin() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config(dir.path());
        config.cors.allowed_origins = vec![CorsOrigin::Url("https://app.example.com".parse().unwrap())];
        let server = create_test_app_with(config).await;

        let allowed = server.get("/api/health").add_header("origin", "https://app.example.com").await;
        assert_eq!(allowed.header("access-control-allow-origin"), "https://app.example.com");

        let denied = server.get("/api/health").add_header("origin", "https://evil.example.com").await;
        assert!(denied.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_spa_fallback_serves_index() {
        let dir = tempfile::tempdir().unwrap();
        let frontend = dir.path().join("dist");
        std::fs::create_dir_all(frontend.join("assets")).unwrap();
        std::fs::write(frontend.join("index.html"), "<html>tooldack app</html>").unwrap();
        std::fs::write(frontend.join("assets/app.js"), "console.log('hi')").unwrap();

        let mut config = create_test_config(dir.path());
        config.frontend_dir = Some(frontend);
        let server = create_test_app_with(config).await;

        let asset = server.get("/assets/app.js").await;
        asset.assert_status_ok();
        assert_eq!(asset.text(), "console.log('hi')");

        let route = server.get("/tools/compress").await;
        route.assert_status_ok();
        assert!(route.text().contains("tooldack app"));

        // API routes are not shadowed by the SPA
        server.get("/api/health").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_panics_become_json_errors() {
        let router = Router::new()
            .route("/boom", get(|| async { panic!("kaboom") as () }))
            .layer(CatchPanicLayer::custom(panic_response));
        let server = axum_test::TestServer::new(router).unwrap();

        let response = server.get("/boom").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.json::<Value>()["error"], "kaboom");
    }

    #[tokio::test]
    async fn test_application_creates_uploads_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(dir.path());
        let uploads = config.storage.uploads_dir.clone();
        assert!(!uploads.exists());

        let _app = Application::new(config).await.unwrap();
        assert!(uploads.is_dir());
    }
}
