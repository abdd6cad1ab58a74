//! HTTP client for the tool routes.
//!
//! [`ToolClient::invoke`] turns a [`ToolRequest`] and its input files into the multipart body the
//! server expects and interprets the answer. Error bodies are read the way the web frontend
//! reads them: a JSON `error` field when there is one, a connection-verification prompt when a
//! hosting proxy intercepted the request, and a generic status message otherwise.

use bytes::Bytes;
use reqwest::{Client, StatusCode, header, multipart};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::{
    api::models::{system::HealthResponse, uploads::UploadResponse},
    tools::{ToolKind, ToolRequest},
    upload::MIME_OCTET_STREAM,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Markers of an interstitial page served by a hosting proxy instead of the API response.
const VERIFICATION_MARKERS: [&str; 2] = ["Cookie check", "Authenticate in new window"];

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered with an error; `message` is its `error` field or a status summary
    #[error("{message}")]
    Server { status: StatusCode, message: String },

    /// A proxy in front of the server wants a first-party visit (see `/api/auth-check`)
    #[error("Connection verification required. Open the auth-check page and retry.")]
    VerificationRequired,

    /// A JSON body was expected but something else came back
    #[error("Server returned non-JSON response ({status})")]
    UnexpectedResponse { status: StatusCode },

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// A file to send as a multipart part.
#[derive(Debug, Clone)]
pub struct ClientFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl ClientFile {
    /// MIME type is guessed from the filename extension.
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let mime_type = mime_guess::from_path(&filename)
            .first_raw()
            .unwrap_or(MIME_OCTET_STREAM)
            .to_string();
        Self {
            filename,
            mime_type,
            bytes: bytes.into(),
        }
    }

    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(filename, bytes))
    }
}

/// What a tool produced.
#[derive(Debug, Clone)]
pub enum ToolResponse {
    Binary { content_type: String, bytes: Bytes },
    Stored(UploadResponse),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Clone)]
pub struct ToolClient {
    client: Client,
    base_url: Url,
}

impl ToolClient {
    pub fn new(base_url: Url) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: ensure_slash(&base_url),
        })
    }

    /// Address of the connection check page to open when [`ClientError::VerificationRequired`]
    /// comes back.
    pub fn auth_check_url(&self) -> Result<Url> {
        Ok(self.base_url.join("api/auth-check")?)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.client.get(self.base_url.join("api/health")?).send().await?;
        let status = response.status();
        if !status.is_success() {
            let content_type = response_content_type(&response);
            let body = response.bytes().await?;
            return Err(classify_error(status, content_type.as_deref(), &body));
        }
        response.json().await.map_err(|_| ClientError::UnexpectedResponse { status })
    }

    /// Send `files` to the tool described by `request`.
    #[instrument(skip_all, fields(tool = %request.kind(), files = files.len()))]
    pub async fn invoke(&self, request: &ToolRequest, files: Vec<ClientFile>) -> Result<ToolResponse> {
        let kind = request.kind();
        let form = build_form(request, files)?;
        let url = self.base_url.join(kind.endpoint().trim_start_matches('/'))?;

        debug!("Posting to {}", url);
        let response = self.client.post(url).multipart(form).send().await?;

        let status = response.status();
        let content_type = response_content_type(&response);
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(classify_error(status, content_type.as_deref(), &body));
        }

        match kind {
            ToolKind::Upload => {
                if !is_json(content_type.as_deref()) {
                    if looks_like_verification(&body) {
                        return Err(ClientError::VerificationRequired);
                    }
                    return Err(ClientError::UnexpectedResponse { status });
                }
                let stored: UploadResponse =
                    serde_json::from_slice(&body).map_err(|_| ClientError::UnexpectedResponse { status })?;
                Ok(ToolResponse::Stored(stored))
            }
            _ => Ok(ToolResponse::Binary {
                content_type: content_type.unwrap_or_else(|| MIME_OCTET_STREAM.to_string()),
                bytes: body,
            }),
        }
    }
}

fn build_form(request: &ToolRequest, files: Vec<ClientFile>) -> Result<multipart::Form> {
    let kind = request.kind();
    if files.is_empty() {
        return Err(ClientError::InvalidInput(if kind.accepts_many() {
            "Select at least one image".to_string()
        } else {
            "Select an image first".to_string()
        }));
    }
    if !kind.accepts_many() && files.len() > 1 {
        return Err(ClientError::InvalidInput(format!("{kind} takes a single image")));
    }

    let mut form = multipart::Form::new();
    for file in files {
        let part = multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.filename)
            .mime_str(&file.mime_type)?;
        form = form.part(kind.file_field(), part);
    }
    for (name, value) in request.form_fields() {
        form = form.text(name, value);
    }
    Ok(form)
}

fn response_content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.contains("application/json"))
}

fn looks_like_verification(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body);
    VERIFICATION_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Map an unsuccessful response to a [`ClientError`].
pub fn classify_error(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> ClientError {
    if is_json(content_type) {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|body| body.error)
            .filter(|error| !error.is_empty())
            .unwrap_or_else(|| "Processing failed".to_string());
        return ClientError::Server { status, message };
    }

    if looks_like_verification(body) || status == StatusCode::UNAUTHORIZED {
        return ClientError::VerificationRequired;
    }

    ClientError::Server {
        status,
        message: format!("Server error ({}). Please try again.", status.as_u16()),
    }
}

/// `Url::join` drops the last path segment unless it ends with a slash.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let path = format!("{}/", new_url.path());
        new_url.set_path(&path);
        new_url
    }
}
