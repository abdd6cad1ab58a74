//! OpenAPI documentation for the `/api` routes.
//!
//! The document is served at `/api/openapi.json` and rendered at `/api/docs`.

pub mod forms;

use utoipa::OpenApi;

use crate::{api, errors::ErrorResponse, storage::StorageProvider};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "tooldack",
        description = "Image tools: conversion, compression, resizing, watermarking, rotation, background removal, image to PDF and image hosting."
    ),
    servers(
        (url = "/api", description = "Tool API")
    ),
    paths(
        api::handlers::system::health,
        api::handlers::system::auth_check,
        api::handlers::system::image_to_prompt,
        api::handlers::tools::upload,
        api::handlers::tools::image_to_pdf,
        api::handlers::tools::remove_background,
        api::handlers::tools::compress,
        api::handlers::tools::convert_format,
        api::handlers::tools::webp_convert,
        api::handlers::tools::resize,
        api::handlers::tools::watermark,
        api::handlers::tools::rotate,
    ),
    components(
        schemas(
            ErrorResponse,
            StorageProvider,
            api::models::uploads::UploadResponse,
            api::models::system::HealthResponse,
            forms::ImageForm,
            forms::ImagesForm,
            forms::CompressForm,
            forms::ConvertForm,
            forms::ResizeForm,
            forms::WatermarkForm,
            forms::RotateForm,
        )
    ),
    tags(
        (name = "tools", description = "Image processing and hosting"),
        (name = "system", description = "Health and housekeeping"),
    )
)]
pub struct ApiDoc;
