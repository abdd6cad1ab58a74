//! Blob storage for the store-and-link tool.
//!
//! The [`BlobStore`] trait abstracts where uploaded files end up. Two backends exist:
//! Cloudinary, used when a full set of credentials is configured, and the local uploads
//! directory otherwise. The backend is chosen once at startup by [`create_store`]; a failing
//! cloud upload never falls back to local storage.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{config::Config, errors::Error, upload::UploadedAsset};

pub mod cloudinary;
pub mod local;

/// Create the blob store for this configuration.
///
/// This is the single point where configuration turns into a backend. Adding a backend means
/// adding a branch here.
pub fn create_store(config: &Config) -> anyhow::Result<Arc<dyn BlobStore>> {
    match config.storage.cloudinary.credentials() {
        Some(credentials) => {
            tracing::info!(cloud_name = %credentials.cloud_name, "Storing uploads on Cloudinary");
            Ok(Arc::new(cloudinary::CloudinaryStore::new(credentials, &config.storage.cloudinary)?))
        }
        None => {
            tracing::info!(dir = %config.storage.uploads_dir.display(), "Storing uploads on local disk");
            Ok(Arc::new(local::LocalStore::new(
                config.storage.uploads_dir.clone(),
                config.public_base_url(),
            )))
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The detail is logged, never returned to the caller
    #[error("Failed to upload to Cloudinary")]
    Cloudinary(String),

    #[error("Local storage failed: {0}")]
    Local(#[from] std::io::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        if let StorageError::Cloudinary(detail) = &err {
            tracing::error!(detail = %detail, "Cloudinary upload error");
        }
        Error::Storage { message: err.to_string() }
    }
}

/// Which backend holds a stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Cloudinary,
    Local,
}

impl StorageProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageProvider::Cloudinary => "cloudinary",
            StorageProvider::Local => "local",
        }
    }
}

/// A persisted upload and the link it can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub url: String,
    /// Local filename, or the provider's public id
    pub filename: String,
    pub size: u64,
    /// Declared MIME type for local files, the detected format name for Cloudinary
    pub mimetype: String,
    pub provider: StorageProvider,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    fn provider(&self) -> StorageProvider;

    /// Persist `asset` and return where it can be fetched from.
    async fn store(&self, asset: &UploadedAsset) -> Result<StoredBlob>;
}
