//! Uploads directory backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::prelude::RngExt;
use rand::rng;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::{debug, instrument, warn};

use super::{BlobStore, Result, StorageError, StorageProvider, StoredBlob};
use crate::upload::UploadedAsset;

/// How many fresh names to try before giving up on a colliding filename.
const MAX_NAME_ATTEMPTS: usize = 5;

/// Writes uploads into a directory served under `/u` and `/uploads`.
///
/// Files are kept forever; nothing in the service deletes them.
pub struct LocalStore {
    dir: PathBuf,
    base_url: String,
}

impl LocalStore {
    pub fn new(dir: PathBuf, base_url: String) -> Self {
        Self {
            dir,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// `<unix-millis>-<random 0..1e9><.ext>`, where the extension is taken from the original name.
pub fn generate_filename(original: &str) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!(
        "{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        rng().random_range(0..1_000_000_000u32),
        ext
    )
}

#[async_trait]
impl BlobStore for LocalStore {
    fn provider(&self) -> StorageProvider {
        StorageProvider::Local
    }

    #[instrument(skip_all, fields(original = %asset.filename, size = asset.size()))]
    async fn store(&self, asset: &UploadedAsset) -> Result<StoredBlob> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut attempt = 0;
        let (filename, mut file) = loop {
            attempt += 1;
            let filename = generate_filename(&asset.filename);
            match OpenOptions::new().write(true).create_new(true).open(self.dir.join(&filename)).await {
                Ok(file) => break (filename, file),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    warn!(filename = %filename, attempt, "Generated upload filename already exists, retrying");
                }
                Err(err) => return Err(StorageError::Local(err)),
            }
        };

        file.write_all(&asset.bytes).await?;
        file.flush().await?;

        debug!(filename = %filename, "Stored upload locally");

        Ok(StoredBlob {
            url: format!("{}/u/{}", self.base_url, filename),
            filename,
            size: asset.size() as u64,
            mimetype: asset.mime_type.clone(),
            provider: StorageProvider::Local,
        })
    }
}
