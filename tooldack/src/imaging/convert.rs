//! Format conversion (PNG/JPEG) and WebP re-encoding.

use serde::{Deserialize, Serialize};

use super::{DEFAULT_QUALITY, Encoded, ImageFamily, Result, decode, encode};

/// Target of the convert-format tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Png,
    #[default]
    Jpeg,
}

impl TargetFormat {
    /// Anything other than `png` means JPEG.
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("png") {
            TargetFormat::Png
        } else {
            TargetFormat::Jpeg
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpeg => "jpeg",
        }
    }

    fn family(&self) -> ImageFamily {
        match self {
            TargetFormat::Png => ImageFamily::Png,
            TargetFormat::Jpeg => ImageFamily::Jpeg,
        }
    }
}

pub fn convert(bytes: &[u8], target: TargetFormat) -> Result<Encoded> {
    let (image, _) = decode(bytes)?;
    encode(&image, target.family(), DEFAULT_QUALITY)
}

pub fn to_webp(bytes: &[u8], quality: u8) -> Result<Encoded> {
    let (image, _) = decode(bytes)?;
    encode(&image, ImageFamily::Webp, quality)
}
