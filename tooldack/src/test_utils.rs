//! Test utilities: configuration, in-process servers and generated sample images.

use std::path::Path;

use axum_test::TestServer;
use image::{DynamicImage, Rgba, RgbaImage};
use tempfile::TempDir;

use crate::config::Config;
use crate::imaging::{encode_gif, encode_jpeg, encode_png, encode_webp};

/// Configuration for tests: local storage under `uploads_root`, no metrics recorder and no
/// remote credentials.
pub fn create_test_config(uploads_root: &Path) -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 3999,
        enable_metrics: false,
        ..Default::default()
    };
    config.storage.uploads_dir = uploads_root.join("uploads");
    config.storage.cloudinary.cloud_name = None;
    config.storage.cloudinary.api_key = None;
    config.storage.cloudinary.api_secret = None;
    config.background_removal.api_key = None;
    config
}

/// A test server with default test configuration. Keep the returned directory alive for the
/// duration of the test; dropping it removes stored uploads.
pub async fn create_test_app() -> (TestServer, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let server = create_test_app_with(create_test_config(dir.path())).await;
    (server, dir)
}

pub async fn create_test_app_with(config: Config) -> TestServer {
    crate::Application::new(config)
        .await
        .expect("Failed to create application")
        .into_test_server()
}

/// An opaque image with a horizontal and vertical gradient, so every encoder sees detail.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgba([r, g, 128, 255])
    });
    DynamicImage::ImageRgba8(image)
}

pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    encode_png(&gradient_image(width, height)).expect("Failed to encode PNG")
}

pub fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode_jpeg(&gradient_image(width, height), 90).expect("Failed to encode JPEG")
}

pub fn sample_webp(width: u32, height: u32) -> Vec<u8> {
    encode_webp(&gradient_image(width, height), 90).expect("Failed to encode WebP")
}

pub fn sample_gif(width: u32, height: u32) -> Vec<u8> {
    encode_gif(&gradient_image(width, height)).expect("Failed to encode GIF")
}
