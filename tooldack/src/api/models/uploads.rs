//! API response models for the store-and-link tool.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::{StorageProvider, StoredBlob};

/// Where a stored upload can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "url": "http://localhost:3000/u/1718000000000-123456789.png",
    "filename": "1718000000000-123456789.png",
    "size": 48213,
    "mimetype": "image/png",
    "provider": "local"
}))]
pub struct UploadResponse {
    /// Public link to the stored file
    pub url: String,
    /// Stored filename (local) or public id (cloudinary)
    pub filename: String,
    /// Size in bytes
    pub size: u64,
    /// Declared MIME type (local) or detected format (cloudinary)
    pub mimetype: String,
    pub provider: StorageProvider,
}

impl From<StoredBlob> for UploadResponse {
    fn from(blob: StoredBlob) -> Self {
        Self {
            url: blob.url,
            filename: blob.filename,
            size: blob.size,
            mimetype: blob.mimetype,
            provider: blob.provider,
        }
    }
}
