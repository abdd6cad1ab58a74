//! HTTP handlers for the image tools.
//!
//! Every tool route follows the same shape: ingest the multipart body, rebuild the
//! [`ToolRequest`] from its text fields, run exactly one transform and answer with the produced
//! bytes (or, for the upload tool, a JSON link). CPU-heavy transforms run on the blocking pool.

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use crate::{
    AppState,
    api::models::uploads::UploadResponse,
    errors::{Error, ErrorResponse, Result},
    imaging::{self, Encoded},
    tools::{ToolKind, ToolRequest},
    upload::{self, UploadPolicy, UploadedAsset},
};

type MultipartBody = std::result::Result<Multipart, MultipartRejection>;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const PDF_DISPOSITION: &str = "attachment; filename=converted.pdf";

/// What a tool hands back to the caller.
#[derive(Debug)]
pub enum ToolOutput {
    File {
        content_type: String,
        bytes: Vec<u8>,
        disposition: Option<&'static str>,
    },
    Stored(UploadResponse),
}

impl ToolOutput {
    fn file(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        ToolOutput::File {
            content_type: content_type.into(),
            bytes,
            disposition: None,
        }
    }

    fn encoded(encoded: Encoded) -> Self {
        Self::file(encoded.mime_type(), encoded.bytes)
    }
}

impl IntoResponse for ToolOutput {
    fn into_response(self) -> Response {
        match self {
            ToolOutput::File {
                content_type,
                bytes,
                disposition: Some(disposition),
            } => ([(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition.to_string())], bytes).into_response(),
            ToolOutput::File {
                content_type,
                bytes,
                disposition: None,
            } => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
            ToolOutput::Stored(stored) => Json(stored).into_response(),
        }
    }
}

fn policy(state: &AppState, kind: ToolKind) -> UploadPolicy {
    UploadPolicy {
        file_field: kind.file_field(),
        max_files: if kind.accepts_many() {
            state.config.limits.max_pdf_images
        } else {
            1
        },
        max_file_size: state.config.limits.max_file_size,
    }
}

/// Run a CPU-bound transform on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> imaging::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal {
            operation: format!("run image transform: {e}"),
        })?
        .map_err(Error::from)
}

/// Ingest, dispatch and record the outcome of one tool invocation.
#[instrument(skip_all, fields(tool = %kind))]
async fn invoke(state: &AppState, kind: ToolKind, multipart: MultipartBody) -> Result<ToolOutput> {
    let result = async {
        let form = upload::ingest(multipart, &policy(state, kind)).await?;
        let request = ToolRequest::from_fields(kind, &form.fields);
        debug!(?request, files = form.files.len(), "Dispatching tool request");

        if kind.accepts_many() {
            if form.files.is_empty() {
                return Err(Error::missing_files());
            }
            return images_to_pdf(form.files).await;
        }

        let (file, _) = form.into_single()?;
        dispatch(state, request, file).await
    }
    .await;

    let outcome = if result.is_ok() { "success" } else { "error" };
    metrics::counter!("tooldack_tool_invocations_total", "tool" => kind.as_str(), "outcome" => outcome).increment(1);
    result
}

async fn images_to_pdf(files: Vec<UploadedAsset>) -> Result<ToolOutput> {
    let images: Vec<_> = files.into_iter().map(|f| f.bytes).collect();
    let pdf = blocking(move || imaging::pdf::images_to_pdf(&images)).await?;
    Ok(ToolOutput::File {
        content_type: PDF_CONTENT_TYPE.to_string(),
        bytes: pdf,
        disposition: Some(PDF_DISPOSITION),
    })
}

/// Run a single-file tool.
async fn dispatch(state: &AppState, request: ToolRequest, file: UploadedAsset) -> Result<ToolOutput> {
    let bytes = file.bytes.clone();

    let output = match request {
        ToolRequest::ImageToPdf => images_to_pdf(vec![file]).await?,
        ToolRequest::Upload => ToolOutput::Stored(state.store.store(&file).await?.into()),
        ToolRequest::RemoveBackground => ToolOutput::file("image/png", state.background.remove(&file).await?),
        ToolRequest::Compress { quality } => ToolOutput::encoded(blocking(move || imaging::compress(&bytes, quality)).await?),
        ToolRequest::ConvertFormat { format } => {
            let converted = blocking(move || imaging::convert(&bytes, format)).await?;
            ToolOutput::file(format!("image/{}", format.as_str()), converted.bytes)
        }
        ToolRequest::WebpConvert { quality } => ToolOutput::encoded(blocking(move || imaging::to_webp(&bytes, quality)).await?),
        ToolRequest::Resize { width, height } => {
            let resized = blocking(move || imaging::resize(&bytes, width, height)).await?;
            ToolOutput::file(file.mime_type, resized.bytes)
        }
        ToolRequest::Watermark { text, opacity } => {
            ToolOutput::encoded(blocking(move || imaging::watermark(&bytes, &text, opacity)).await?)
        }
        ToolRequest::Rotate { angle, flip, flop } => {
            let rotated = blocking(move || imaging::rotate(&bytes, angle, flip, flop)).await?;
            ToolOutput::file(file.mime_type, rotated.bytes)
        }
    };

    Ok(output)
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "tools",
    summary = "Store an image and get a link",
    description = "Stores the image on Cloudinary when configured, otherwise in the local uploads directory.",
    request_body(content = crate::openapi::forms::ImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Stored", body = UploadResponse),
        (status = 400, description = "Missing or rejected upload", body = ErrorResponse),
        (status = 500, description = "Storage failed", body = ErrorResponse),
    )
)]
pub async fn upload(State(state): State<AppState>, multipart: MultipartBody) -> Result<ToolOutput> {
    invoke(&state, ToolKind::Upload, multipart).await
}

#[utoipa::path(
    post,
    path = "/image-to-pdf",
    tag = "tools",
    summary = "Combine images into a PDF",
    description = "One page per image, in upload order, each page sized to its image.",
    request_body(content = crate::openapi::forms::ImagesForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PDF document", content_type = "application/pdf"),
        (status = 400, description = "No files or rejected upload", body = ErrorResponse),
        (status = 500, description = "An image could not be decoded", body = ErrorResponse),
    )
)]
pub async fn image_to_pdf(State(state): State<AppState>, multipart: MultipartBody) -> Result<ToolOutput> {
    invoke(&state, ToolKind::ImageToPdf, multipart).await
}

#[utoipa::path(
    post,
    path = "/remove-bg",
    tag = "tools",
    summary = "Remove the background",
    request_body(content = crate::openapi::forms::ImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Cut-out image", content_type = "image/png"),
        (status = 400, description = "Missing or rejected upload", body = ErrorResponse),
        (status = 500, description = "Removal API not configured or failed", body = ErrorResponse),
    )
)]
pub async fn remove_background(State(state): State<AppState>, multipart: MultipartBody) -> Result<ToolOutput> {
    invoke(&state, ToolKind::RemoveBackground, multipart).await
}

#[utoipa::path(
    post,
    path = "/compress",
    tag = "tools",
    summary = "Compress an image",
    description = "PNG is palette-quantized, WebP stays WebP, anything else becomes JPEG.",
    request_body(content = crate::openapi::forms::CompressForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Compressed image"),
        (status = 400, description = "Missing or rejected upload", body = ErrorResponse),
        (status = 500, description = "Image could not be processed", body = ErrorResponse),
    )
)]
pub async fn compress(State(state): State<AppState>, multipart: MultipartBody) -> Result<ToolOutput> {
    invoke(&state, ToolKind::Compress, multipart).await
}

#[utoipa::path(
    post,
    path = "/convert-format",
    tag = "tools",
    summary = "Convert between PNG and JPEG",
    request_body(content = crate::openapi::forms::ConvertForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Converted image"),
        (status = 400, description = "Missing or rejected upload", body = ErrorResponse),
        (status = 500, description = "Image could not be processed", body = ErrorResponse),
    )
)]
pub async fn convert_format(State(state): State<AppState>, multipart: MultipartBody) -> Result<ToolOutput> {
    invoke(&state, ToolKind::ConvertFormat, multipart).await
}

#[utoipa::path(
    post,
    path = "/webp-convert",
    tag = "tools",
    summary = "Convert to WebP",
    request_body(content = crate::openapi::forms::CompressForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "WebP image", content_type = "image/webp"),
        (status = 400, description = "Missing or rejected upload", body = ErrorResponse),
        (status = 500, description = "Image could not be processed", body = ErrorResponse),
    )
)]
pub async fn webp_convert(State(state): State<AppState>, multipart: MultipartBody) -> Result<ToolOutput> {
    invoke(&state, ToolKind::WebpConvert, multipart).await
}

#[utoipa::path(
    post,
    path = "/resize",
    tag = "tools",
    summary = "Resize to fit a box",
    description = "Keeps the aspect ratio and never enlarges. A missing dimension leaves that axis unconstrained.",
    request_body(content = crate::openapi::forms::ResizeForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Resized image, same format as the upload"),
        (status = 400, description = "Missing or rejected upload", body = ErrorResponse),
        (status = 500, description = "Image could not be processed", body = ErrorResponse),
    )
)]
pub async fn resize(State(state): State<AppState>, multipart: MultipartBody) -> Result<ToolOutput> {
    invoke(&state, ToolKind::Resize, multipart).await
}

#[utoipa::path(
    post,
    path = "/watermark",
    tag = "tools",
    summary = "Add a text watermark",
    request_body(content = crate::openapi::forms::WatermarkForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Watermarked image"),
        (status = 400, description = "Missing or rejected upload", body = ErrorResponse),
        (status = 500, description = "Image could not be processed", body = ErrorResponse),
    )
)]
pub async fn watermark(State(state): State<AppState>, multipart: MultipartBody) -> Result<ToolOutput> {
    invoke(&state, ToolKind::Watermark, multipart).await
}

#[utoipa::path(
    post,
    path = "/rotate",
    tag = "tools",
    summary = "Rotate and mirror",
    request_body(content = crate::openapi::forms::RotateForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Rotated image, same format as the upload"),
        (status = 400, description = "Missing or rejected upload", body = ErrorResponse),
        (status = 500, description = "Image could not be processed", body = ErrorResponse),
    )
)]
pub async fn rotate(State(state): State<AppState>, multipart: MultipartBody) -> Result<ToolOutput> {
    invoke(&state, ToolKind::Rotate, multipart).await
}
