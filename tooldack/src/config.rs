//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `TOOLDACK_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `TOOLDACK_` override YAML values
//! 3. **Deployment aliases** - `PORT`, `APP_URL`, `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY`,
//!    `CLOUDINARY_API_SECRET` and `REMOVE_BG_API_KEY` map onto their config fields
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `TOOLDACK_LIMITS__MAX_PDF_IMAGES=10` sets the `limits.max_pdf_images` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use tooldack::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage selection
//!
//! The store-and-link tool uses Cloudinary when `storage.cloudinary.cloud_name`, `api_key` and
//! `api_secret` are all present, and the local uploads directory otherwise. The choice is made
//! once at startup (see [`crate::storage::create_store`]).
//!
//! Locally stored uploads are kept forever: there is no expiry or cleanup task, so the uploads
//! directory grows without bound.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "TOOLDACK_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Public origin used to build links to locally stored uploads (`APP_URL`).
    /// Defaults to `http://localhost:{port}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<Url>,
    /// Directory holding a built single-page frontend. When set, files are served from it with an
    /// `index.html` fallback for client-side routes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontend_dir: Option<PathBuf>,
    /// Blob storage for the store-and-link tool
    pub storage: StorageConfig,
    /// Remote background removal API
    pub background_removal: BackgroundRemovalConfig,
    /// Upload limits
    pub limits: LimitsConfig,
    /// CORS settings for browser clients
    pub cors: CorsConfig,
    /// Expose Prometheus metrics at `/internal/metrics`
    pub enable_metrics: bool,
    /// Export traces over OTLP (configured via the standard `OTEL_*` variables)
    pub enable_otel_export: bool,
}

/// Storage configuration for uploaded assets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory for locally stored uploads, served under `/uploads` and `/u`
    pub uploads_dir: PathBuf,
    /// Cloudinary credentials; all three of `cloud_name`, `api_key` and `api_secret` must be set
    /// for Cloudinary to be used
    pub cloudinary: CloudinaryConfig,
}

/// Cloudinary upload settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudinaryConfig {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    #[serde(skip_serializing)]
    pub api_secret: Option<String>,
    /// Folder uploads are placed in
    pub folder: String,
    /// Cloudinary API origin
    pub api_base: Url,
    /// Request timeout for a single upload
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Credentials for Cloudinary, present only when the configuration is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl CloudinaryConfig {
    /// Returns the credentials if all three are configured and non-empty
    pub fn credentials(&self) -> Option<CloudinaryCredentials> {
        let present = |value: &Option<String>| value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        Some(CloudinaryCredentials {
            cloud_name: present(&self.cloud_name)?,
            api_key: present(&self.api_key)?,
            api_secret: present(&self.api_secret)?,
        })
    }
}

/// Remote background removal settings (remove.bg compatible API).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackgroundRemovalConfig {
    /// API key sent as `X-Api-Key` (`REMOVE_BG_API_KEY`)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Endpoint receiving the `image_file` upload
    pub endpoint: Url,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Upload size and count limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum size of a single uploaded file part in bytes (default: 100 MiB)
    pub max_file_size: u64,
    /// Maximum number of images accepted by the image-to-pdf tool (default: 20)
    pub max_pdf_images: usize,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests. `*` mirrors the request origin.
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_PDF_IMAGES: usize = 20;

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_base_url: None,
            frontend_dir: None,
            storage: StorageConfig::default(),
            background_removal: BackgroundRemovalConfig::default(),
            limits: LimitsConfig::default(),
            cors: CorsConfig::default(),
            enable_metrics: true,
            enable_otel_export: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("public").join("uploads"),
            cloudinary: CloudinaryConfig::default(),
        }
    }
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            cloud_name: None,
            api_key: None,
            api_secret: None,
            folder: "tooldack_uploads".to_string(),
            api_base: Url::parse("https://api.cloudinary.com").expect("static URL is valid"),
            timeout: Duration::from_secs(120),
        }
    }
}

impl Default for BackgroundRemovalConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: Url::parse("https://api.remove.bg/v1.0/removebg").expect("static URL is valid"),
            timeout: Duration::from_secs(60),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_pdf_images: DEFAULT_MAX_PDF_IMAGES,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: true,
            max_age: Some(3600),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // TOOLDACK_CONFIG names the file itself and is read by `Args`.
            .merge(Env::prefixed("TOOLDACK_").ignore(&["CONFIG"]).split("__"))
            .merge(Env::raw().only(&["PORT"]).map(|_| "port".into()))
            .merge(Env::raw().only(&["APP_URL"]).map(|_| "public_base_url".into()))
            .merge(
                Env::raw()
                    .only(&["CLOUDINARY_CLOUD_NAME"])
                    .map(|_| "storage.cloudinary.cloud_name".into()),
            )
            .merge(Env::raw().only(&["CLOUDINARY_API_KEY"]).map(|_| "storage.cloudinary.api_key".into()))
            .merge(
                Env::raw()
                    .only(&["CLOUDINARY_API_SECRET"])
                    .map(|_| "storage.cloudinary.api_secret".into()),
            )
            .merge(Env::raw().only(&["REMOVE_BG_API_KEY"]).map(|_| "background_removal.api_key".into()))
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.port == 0 {
            return Err(Error::Internal {
                operation: "Config validation: port must be non-zero".to_string(),
            });
        }

        if self.limits.max_file_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: limits.max_file_size must be greater than 0".to_string(),
            });
        }

        if self.limits.max_pdf_images == 0 {
            return Err(Error::Internal {
                operation: "Config validation: limits.max_pdf_images must be at least 1".to_string(),
            });
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        if let Some(url) = &self.public_base_url
            && url.cannot_be_a_base()
        {
            return Err(Error::Internal {
                operation: format!("Config validation: public_base_url '{url}' is not a valid base URL"),
            });
        }

        if self.storage.uploads_dir.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: storage.uploads_dir cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Origin used for links to locally stored uploads, without a trailing slash
    pub fn public_base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.as_str().trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.port),
        }
    }

    /// Body limit for single-file tool routes
    pub fn single_upload_body_limit(&self) -> usize {
        body_limit(self.limits.max_file_size, 1)
    }

    /// Body limit for the image-to-pdf route
    pub fn multi_upload_body_limit(&self) -> usize {
        body_limit(self.limits.max_file_size, self.limits.max_pdf_images)
    }
}

// Room for multipart framing and text fields on top of the file parts.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

fn body_limit(max_file_size: u64, parts: usize) -> usize {
    let total = max_file_size.saturating_mul(parts as u64).saturating_add(MULTIPART_OVERHEAD);
    usize::try_from(total).unwrap_or(usize::MAX)
}
