//! Stateless image transforms backing the processing tools.
//!
//! Every transform takes the uploaded bytes plus a small parameter record and returns freshly
//! encoded bytes. Nothing here touches the network, the filesystem or shared state, so the
//! functions are safe to run on the blocking thread pool in parallel.
//!
//! Output format policy:
//!
//! - [`compress`] and [`watermark`] keep the input *family*: PNG stays PNG, WebP stays WebP and
//!   everything else becomes JPEG.
//! - [`resize`] and [`rotate`] re-encode in the exact input format.
//! - [`convert`] and [`to_webp`] produce the requested format.

pub mod compose;
mod compress;
mod convert;
pub mod pdf;
mod resize;
mod rotate;
mod watermark;

use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder};
use std::io::Cursor;

pub use compress::compress;
pub use convert::{TargetFormat, convert, to_webp};
pub use resize::{fit_inside, resize};
pub use rotate::rotate;
pub use watermark::{DEFAULT_WATERMARK_OPACITY, DEFAULT_WATERMARK_TEXT, watermark, watermark_svg};

/// Quality used when a format needs one but the tool does not expose it.
pub const DEFAULT_QUALITY: u8 = 80;

#[derive(Debug, thiserror::Error)]
pub enum ImagingError {
    #[error("Input buffer contains unsupported image format")]
    UnsupportedFormat,

    #[error("{0}")]
    Image(#[from] image::ImageError),

    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),

    #[error("WebP encoding failed: {0}")]
    Webp(String),

    #[error("Failed to render overlay: {0}")]
    Overlay(String),

    #[error("PDF assembly failed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("{0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, ImagingError>;

/// Output families the tools distinguish between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFamily {
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl ImageFamily {
    /// Family an input format is re-encoded as when the format itself is kept.
    pub fn of(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Png => ImageFamily::Png,
            ImageFormat::WebP => ImageFamily::Webp,
            ImageFormat::Gif => ImageFamily::Gif,
            _ => ImageFamily::Jpeg,
        }
    }

    /// Family used by the compress and watermark tools: PNG and WebP are kept, anything else
    /// is normalised to JPEG.
    pub fn lossy_policy(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Png => ImageFamily::Png,
            ImageFormat::WebP => ImageFamily::Webp,
            _ => ImageFamily::Jpeg,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFamily::Png => "image/png",
            ImageFamily::Jpeg => "image/jpeg",
            ImageFamily::Webp => "image/webp",
            ImageFamily::Gif => "image/gif",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFamily::Png => "png",
            ImageFamily::Jpeg => "jpg",
            ImageFamily::Webp => "webp",
            ImageFamily::Gif => "gif",
        }
    }
}

/// Result of a transform: the encoded bytes and the family they were encoded as.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub family: ImageFamily,
}

impl Encoded {
    pub fn mime_type(&self) -> &'static str {
        self.family.mime_type()
    }
}

/// Sniff and decode an uploaded buffer.
pub fn decode(bytes: &[u8]) -> Result<(DynamicImage, ImageFormat)> {
    let format = image::guess_format(bytes).map_err(|_| ImagingError::UnsupportedFormat)?;
    let image = image::load_from_memory_with_format(bytes, format).map_err(|err| match err {
        image::ImageError::Unsupported(_) => ImagingError::UnsupportedFormat,
        other => ImagingError::Image(other),
    })?;
    Ok((image, format))
}

/// Encode `image` in `family`, using `quality` for the lossy encoders.
pub fn encode(image: &DynamicImage, family: ImageFamily, quality: u8) -> Result<Encoded> {
    let bytes = match family {
        ImageFamily::Png => encode_png(image)?,
        ImageFamily::Jpeg => encode_jpeg(image, quality)?,
        ImageFamily::Webp => encode_webp(image, quality)?,
        ImageFamily::Gif => encode_gif(image)?,
    };
    Ok(Encoded { bytes, family })
}

pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Baseline JPEG. Alpha is dropped since JPEG has no alpha channel.
pub(crate) fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)))?;
    Ok(buf)
}

/// Lossy WebP through libwebp.
pub(crate) fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let encoder = webp::Encoder::from_image(&rgba).map_err(|e| ImagingError::Webp(e.to_string()))?;
    let memory = encoder.encode(f32::from(quality.clamp(1, 100)));
    Ok(memory.to_vec())
}

pub(crate) fn encode_gif(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)?;
    Ok(buf)
}
