//! Multipart request bodies of the tool routes.
//!
//! These types are never deserialized; the handlers read the multipart stream directly. They
//! exist so the OpenAPI document shows which parts each route accepts.

use utoipa::ToSchema;

/// A single image upload.
#[derive(ToSchema)]
pub struct ImageForm {
    #[schema(format = Binary, value_type = String)]
    pub image: Vec<u8>,
}

/// Several images, in page order.
#[derive(ToSchema)]
pub struct ImagesForm {
    /// Up to `limits.max_pdf_images` parts named `images`
    #[schema(value_type = Vec<String>, format = Binary)]
    pub images: Vec<Vec<u8>>,
}

#[derive(ToSchema)]
pub struct CompressForm {
    #[schema(format = Binary, value_type = String)]
    pub image: Vec<u8>,
    /// 1-100, defaults to 80
    #[schema(example = "80")]
    pub quality: Option<String>,
}

#[derive(ToSchema)]
pub struct ConvertForm {
    #[schema(format = Binary, value_type = String)]
    pub image: Vec<u8>,
    /// `png`; anything else produces JPEG
    #[schema(example = "png")]
    pub format: Option<String>,
}

#[derive(ToSchema)]
pub struct ResizeForm {
    #[schema(format = Binary, value_type = String)]
    pub image: Vec<u8>,
    /// Maximum width in pixels; omitted or non-positive means unconstrained
    pub width: Option<String>,
    /// Maximum height in pixels; omitted or non-positive means unconstrained
    pub height: Option<String>,
}

#[derive(ToSchema)]
pub struct WatermarkForm {
    #[schema(format = Binary, value_type = String)]
    pub image: Vec<u8>,
    /// Defaults to `Watermark`
    pub text: Option<String>,
    /// 0-1, defaults to 0.5
    #[schema(example = "0.5")]
    pub opacity: Option<String>,
}

#[derive(ToSchema)]
pub struct RotateForm {
    #[schema(format = Binary, value_type = String)]
    pub image: Vec<u8>,
    /// Clockwise degrees
    #[schema(example = "90")]
    pub angle: Option<String>,
    /// `true` mirrors vertically
    pub flip: Option<String>,
    /// `true` mirrors horizontally
    pub flop: Option<String>,
}
