//! Background removal through a remove.bg compatible API.

use reqwest::{Client, multipart};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::{
    config::BackgroundRemovalConfig,
    errors::{Error, Result},
    upload::UploadedAsset,
};

/// Forwards uploads unmodified to the removal API and hands back its PNG.
#[derive(Clone)]
pub struct BackgroundRemover {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl BackgroundRemover {
    pub fn new(config: &BackgroundRemovalConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Returns the cut-out image as PNG bytes.
    #[instrument(skip_all, fields(filename = %asset.filename, size = asset.size()))]
    pub async fn remove(&self, asset: &UploadedAsset) -> Result<Vec<u8>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| Error::Configuration {
            message: "REMOVE_BG_API_KEY not configured".to_string(),
        })?;

        let form = multipart::Form::new()
            .part(
                "image_file",
                multipart::Part::bytes(asset.bytes.to_vec()).file_name(asset.filename.clone()),
            )
            .text("size", "auto");

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("X-Api-Key", api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Upstream { message: e.to_string() })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| Error::Upstream { message: e.to_string() })?;

        if !status.is_success() {
            let message = upstream_message(&body);
            debug!(%status, message = %message, "Background removal rejected");
            return Err(Error::Upstream { message });
        }

        Ok(body.to_vec())
    }
}

/// `errors[0].title`, else `error`, else the raw body text.
fn upstream_message(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body).into_owned();
    let Ok(json) = serde_json::from_slice::<Value>(body) else {
        return text;
    };

    let non_empty = |v: &Value| v.as_str().filter(|s| !s.is_empty()).map(str::to_string);
    json.pointer("/errors/0/title")
        .and_then(non_empty)
        .or_else(|| json.get("error").and_then(non_empty))
        .unwrap_or(text)
}
