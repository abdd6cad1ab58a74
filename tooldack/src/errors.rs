use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use utoipa::ToSchema;

use crate::imaging::ImagingError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data, e.g. a missing file field
    #[error("{message}")]
    BadRequest { message: String },

    /// The multipart payload itself was rejected (size limits, unexpected fields, malformed body)
    #[error("Upload error: {message}")]
    Upload { message: String },

    /// Endpoint has been retired
    #[error("{message}")]
    Gone { message: String },

    /// A server-held setting required by the operation is missing
    #[error("{message}")]
    Configuration { message: String },

    /// A third-party API answered with an error; the message is the decoded upstream body
    #[error("{message}")]
    Upstream { message: String },

    /// Image decoding, transformation or encoding failed
    #[error(transparent)]
    Processing(#[from] ImagingError),

    /// The blob store could not persist an upload
    #[error("{message}")]
    Storage { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// JSON body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable description of what went wrong
    pub error: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } | Error::Upload { .. } => StatusCode::BAD_REQUEST,
            Error::Gone { .. } => StatusCode::GONE,
            Error::Configuration { .. }
            | Error::Upstream { .. }
            | Error::Processing(_)
            | Error::Storage { .. }
            | Error::Internal { .. }
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message surfaced to the caller.
    ///
    /// Library and upstream failures are reported verbatim: the tools are pass-throughs and the
    /// underlying text is the only useful diagnostic a client gets.
    pub fn user_message(&self) -> String {
        match self {
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Other(err) => {
                let message = err.to_string();
                if message.is_empty() { "Internal server error".to_string() } else { message }
            }
            other => other.to_string(),
        }
    }

    pub fn missing_file() -> Self {
        Error::BadRequest {
            message: "No file uploaded".to_string(),
        }
    }

    pub fn missing_files() -> Self {
        Error::BadRequest {
            message: "No files uploaded".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Processing(_) | Error::Storage { .. } | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Configuration { .. } => {
                tracing::error!("Configuration error: {}", self);
            }
            Error::Upstream { .. } => {
                tracing::warn!("Upstream API error: {}", self);
            }
            Error::BadRequest { .. } | Error::Upload { .. } | Error::Gone { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = ErrorResponse { error: self.user_message() };
        (status, Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
