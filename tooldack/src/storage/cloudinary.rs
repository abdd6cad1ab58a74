//! Cloudinary upload backend.
//!
//! Uses the signed upload API: the request carries the API key, a timestamp and a SHA-256
//! signature over the signed parameters (sorted, `&`-joined) with the API secret appended.

use async_trait::async_trait;
use reqwest::{Client, multipart};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use url::Url;

use super::{BlobStore, Result, StorageError, StorageProvider, StoredBlob};
use crate::{
    config::{CloudinaryConfig, CloudinaryCredentials},
    upload::UploadedAsset,
};

pub struct CloudinaryStore {
    client: Client,
    credentials: CloudinaryCredentials,
    folder: String,
    api_base: Url,
}

#[derive(Debug, Deserialize)]
struct UploadResult {
    secure_url: String,
    public_id: String,
    bytes: u64,
    #[serde(default)]
    format: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl CloudinaryStore {
    pub fn new(credentials: CloudinaryCredentials, config: &CloudinaryConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            credentials,
            folder: config.folder.clone(),
            api_base: config.api_base.clone(),
        })
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/auto/upload",
            self.api_base.as_str().trim_end_matches('/'),
            self.credentials.cloud_name
        )
    }
}

/// Signature over `params` (any order) and the API secret.
pub fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
    format!("{:x}", Sha256::digest(format!("{joined}{api_secret}").as_bytes()))
}

#[async_trait]
impl BlobStore for CloudinaryStore {
    fn provider(&self) -> StorageProvider {
        StorageProvider::Cloudinary
    }

    #[instrument(skip_all, fields(original = %asset.filename, size = asset.size()))]
    async fn store(&self, asset: &UploadedAsset) -> Result<StoredBlob> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(&[("folder", &self.folder), ("timestamp", &timestamp)], &self.credentials.api_secret);

        let file = multipart::Part::bytes(asset.bytes.to_vec())
            .file_name(asset.filename.clone())
            .mime_str(&asset.mime_type)
            .map_err(|e| StorageError::Cloudinary(e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("api_key", self.credentials.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.folder.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::Cloudinary(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| StorageError::Cloudinary(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(StorageError::Cloudinary(format!("{status}: {detail}")));
        }

        let result: UploadResult =
            serde_json::from_str(&body).map_err(|e| StorageError::Cloudinary(format!("error decoding response body: {e}")))?;
        debug!(public_id = %result.public_id, "Uploaded to Cloudinary");

        Ok(StoredBlob {
            url: result.secure_url,
            filename: result.public_id,
            size: result.bytes,
            mimetype: result.format,
            provider: StorageProvider::Cloudinary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header_exists, method, path},
    };

    fn store(server: &MockServer) -> CloudinaryStore {
        let config = CloudinaryConfig {
            api_base: server.uri().parse().unwrap(),
            ..Default::default()
        };
        let credentials = CloudinaryCredentials {
            cloud_name: "demo".to_string(),
            api_key: "1234".to_string(),
            api_secret: "s3cret".to_string(),
        };
        CloudinaryStore::new(credentials, &config).unwrap()
    }

    fn asset() -> UploadedAsset {
        UploadedAsset {
            bytes: Bytes::from_static(b"fake image"),
            mime_type: "image/png".to_string(),
            filename: "cat.png".to_string(),
        }
    }

    #[test]
    fn signature_sorts_params() {
        let a = sign(&[("timestamp", "1700000000"), ("folder", "tooldack_uploads")], "secret");
        let b = sign(&[("folder", "tooldack_uploads"), ("timestamp", "1700000000")], "secret");
        assert_eq!(a, b);
        assert_eq!(
            a,
            format!("{:x}", Sha256::digest(b"folder=tooldack_uploads&timestamp=1700000000secret"))
        );
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn successful_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1_1/demo/auto/upload"))
            .and(header_exists("content-type"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secure_url": "https://res.cloudinary.com/demo/image/upload/v1/tooldack_uploads/abc.png",
                "public_id": "tooldack_uploads/abc",
                "bytes": 10,
                "format": "png",
                "resource_type": "image"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let blob = store(&server).store(&asset()).await.unwrap();
        assert_eq!(blob.provider, StorageProvider::Cloudinary);
        assert_eq!(blob.filename, "tooldack_uploads/abc");
        assert_eq!(blob.size, 10);
        assert_eq!(blob.mimetype, "png");
        assert!(blob.url.starts_with("https://res.cloudinary.com/"));

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"signature\""));
        assert!(body.contains("tooldack_uploads"));
        assert!(body.contains("filename=\"cat.png\""));
    }

    #[tokio::test]
    async fn rejected_upload_hides_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Invalid Signature" }
            })))
            .mount(&server)
            .await;

        let err = store(&server).store(&asset()).await.unwrap_err();
        assert!(matches!(&err, StorageError::Cloudinary(detail) if detail.contains("Invalid Signature")));
        assert_eq!(err.to_string(), "Failed to upload to Cloudinary");
    }
}
