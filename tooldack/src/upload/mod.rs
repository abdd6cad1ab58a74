//! Multipart upload ingestion.
//!
//! Every tool route receives a `multipart/form-data` body with either a single `image` part or
//! a repeated `images` part, plus a few text fields carrying tool parameters. Parts are buffered
//! fully in memory; the size of each file part is checked as it streams in so an oversized
//! upload is rejected without reading the rest of it.

use std::collections::HashMap;

use axum::{
    extract::{
        Multipart,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::errors::{Error, Result};

pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// One uploaded file, owned by the request that carried it.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub bytes: Bytes,
    /// Declared content type of the part, or a guess from the filename
    pub mime_type: String,
    pub filename: String,
}

impl UploadedAsset {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// File parts and text fields of one multipart request.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<UploadedAsset>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    /// The single file of a one-file tool.
    pub fn into_single(self) -> Result<(UploadedAsset, HashMap<String, String>)> {
        let UploadForm { files, fields } = self;
        let file = files.into_iter().next().ok_or_else(Error::missing_file)?;
        Ok((file, fields))
    }
}

/// What a route accepts.
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    /// Name of the file part (`image` or `images`)
    pub file_field: &'static str,
    pub max_files: usize,
    pub max_file_size: u64,
}

/// Parse the request body according to `policy`.
///
/// A request that is not multipart at all yields an empty form so the handler reports the missing
/// file the same way it would for a multipart body without one.
pub async fn ingest(multipart: std::result::Result<Multipart, MultipartRejection>, policy: &UploadPolicy) -> Result<UploadForm> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!(reason = %rejection, "Request body is not multipart");
            return Ok(UploadForm::default());
        }
    };

    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or("").to_string();

        // Parts without a filename are text fields
        if field.file_name().is_none() {
            let value = field.text().await.map_err(upload_error)?;
            trace!(field = %name, "Collected form field");
            form.fields.insert(name, value);
            continue;
        }

        if name != policy.file_field {
            return Err(Error::Upload {
                message: "Unexpected field".to_string(),
            });
        }
        if form.files.len() >= policy.max_files {
            return Err(Error::Upload {
                message: "Too many files".to_string(),
            });
        }

        form.files.push(read_file(field, policy.max_file_size).await?);
    }

    debug!(
        files = form.files.len(),
        fields = form.fields.len(),
        total_bytes = form.files.iter().map(UploadedAsset::size).sum::<usize>(),
        "Ingested multipart upload"
    );

    Ok(form)
}

async fn read_file(mut field: Field<'_>, max_file_size: u64) -> Result<UploadedAsset> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let mime_type = declared_mime_type(field.content_type(), &filename);

    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(upload_error)? {
        if (buf.len() + chunk.len()) as u64 > max_file_size {
            debug!(filename = %filename, max_file_size, "File part exceeds size limit");
            return Err(file_too_large());
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(UploadedAsset {
        bytes: buf.freeze(),
        mime_type,
        filename,
    })
}

/// Part content type, else a guess from the filename, else `application/octet-stream`.
pub fn declared_mime_type(content_type: Option<&str>, filename: &str) -> String {
    match content_type.map(str::trim).filter(|ct| !ct.is_empty()) {
        Some(ct) => ct.to_string(),
        None => mime_guess::from_path(filename)
            .first_raw()
            .unwrap_or(MIME_OCTET_STREAM)
            .to_string(),
    }
}

fn file_too_large() -> Error {
    Error::Upload {
        message: "File too large".to_string(),
    }
}

fn upload_error(err: MultipartError) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return file_too_large();
    }
    Error::Upload { message: err.body_text() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, extract::DefaultBodyLimit, response::IntoResponse, routing::post};
    use axum_test::{
        TestServer,
        multipart::{MultipartForm, Part},
    };
    use serde_json::{Value, json};

    fn policy(file_field: &'static str, max_files: usize) -> UploadPolicy {
        UploadPolicy {
            file_field,
            max_files,
            max_file_size: 1024,
        }
    }

    /// Echoes what was ingested as JSON.
    fn server(policy: UploadPolicy, body_limit: usize) -> TestServer {
        let app = Router::new()
            .route(
                "/upload",
                post(move |multipart: std::result::Result<Multipart, MultipartRejection>| async move {
                    match ingest(multipart, &policy).await {
                        Ok(form) => axum::Json(json!({
                            "files": form.files.iter().map(|f| json!({
                                "filename": f.filename,
                                "mime_type": f.mime_type,
                                "size": f.size(),
                            })).collect::<Vec<_>>(),
                            "fields": form.fields,
                        }))
                        .into_response(),
                        Err(err) => err.into_response(),
                    }
                }),
            )
            .layer(DefaultBodyLimit::max(body_limit));
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn collects_file_and_fields() {
        let server = server(policy("image", 1), 1 << 20);
        let form = MultipartForm::new()
            .add_text("quality", "55")
            .add_part("image", Part::bytes(vec![1u8; 10]).file_name("a.png").mime_type("image/png"));

        let response = server.post("/upload").multipart(form).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["fields"]["quality"], "55");
        assert_eq!(body["files"][0]["filename"], "a.png");
        assert_eq!(body["files"][0]["mime_type"], "image/png");
        assert_eq!(body["files"][0]["size"], 10);
    }

    #[tokio::test]
    async fn keeps_arrival_order_for_repeated_parts() {
        let server = server(policy("images", 20), 1 << 20);
        let form = MultipartForm::new()
            .add_part("images", Part::bytes(vec![0u8; 3]).file_name("first.jpg"))
            .add_part("images", Part::bytes(vec![0u8; 4]).file_name("second.jpg"));

        let body: Value = server.post("/upload").multipart(form).await.json();
        assert_eq!(body["files"][0]["filename"], "first.jpg");
        assert_eq!(body["files"][1]["filename"], "second.jpg");
    }

    #[tokio::test]
    async fn oversized_part_is_rejected() {
        let server = server(policy("image", 1), 1 << 20);
        let form = MultipartForm::new().add_part("image", Part::bytes(vec![0u8; 2048]).file_name("big.png"));

        let response = server.post("/upload").multipart(form).await;
        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["error"], "Upload error: File too large");
    }

    #[tokio::test]
    async fn body_over_route_limit_is_reported_as_too_large() {
        let server = server(policy("image", 1), 512);
        let form = MultipartForm::new().add_part("image", Part::bytes(vec![0u8; 900]).file_name("big.png"));

        let response = server.post("/upload").multipart(form).await;
        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["error"], "Upload error: File too large");
    }

    #[tokio::test]
    async fn too_many_files() {
        let server = server(policy("images", 2), 1 << 20);
        let mut form = MultipartForm::new();
        for i in 0..3 {
            form = form.add_part("images", Part::bytes(vec![0u8; 4]).file_name(format!("{i}.png")));
        }

        let response = server.post("/upload").multipart(form).await;
        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["error"], "Upload error: Too many files");
    }

    #[tokio::test]
    async fn unexpected_file_field() {
        let server = server(policy("image", 1), 1 << 20);
        let form = MultipartForm::new().add_part("file", Part::bytes(vec![0u8; 4]).file_name("a.png"));

        let response = server.post("/upload").multipart(form).await;
        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["error"], "Upload error: Unexpected field");
    }

    #[tokio::test]
    async fn non_multipart_body_yields_empty_form() {
        let server = server(policy("image", 1), 1 << 20);
        let body: Value = server.post("/upload").json(&json!({"image": "nope"})).await.json();
        assert_eq!(body["files"], json!([]));
    }

    #[test]
    fn mime_type_fallbacks() {
        assert_eq!(declared_mime_type(Some("image/webp"), "x.png"), "image/webp");
        assert_eq!(declared_mime_type(None, "photo.JPG"), "image/jpeg");
        assert_eq!(declared_mime_type(Some(""), "photo.png"), "image/png");
        assert_eq!(declared_mime_type(None, "blob"), MIME_OCTET_STREAM);
    }

    #[test]
    fn missing_file_is_a_bad_request() {
        let err = UploadForm::default().into_single().unwrap_err();
        assert_eq!(err.to_string(), "No file uploaded");
    }
}
