//! The closed set of tools and their parameters.
//!
//! A [`ToolRequest`] is rebuilt from the text fields of every request. Numbers are read from the
//! leading digits of a field (`"80%"` is 80) and anything unusable falls back to the tool's default.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::imaging::{DEFAULT_QUALITY, DEFAULT_WATERMARK_OPACITY, DEFAULT_WATERMARK_TEXT, TargetFormat};

/// Every user-selectable tool that talks to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    Upload,
    ImageToPdf,
    RemoveBackground,
    Compress,
    ConvertFormat,
    WebpConvert,
    Resize,
    Watermark,
    Rotate,
}

impl ToolKind {
    pub const ALL: [ToolKind; 9] = [
        ToolKind::Upload,
        ToolKind::ImageToPdf,
        ToolKind::RemoveBackground,
        ToolKind::Compress,
        ToolKind::ConvertFormat,
        ToolKind::WebpConvert,
        ToolKind::Resize,
        ToolKind::Watermark,
        ToolKind::Rotate,
    ];

    /// Route path, relative to the server origin.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ToolKind::Upload => "/api/upload",
            ToolKind::ImageToPdf => "/api/image-to-pdf",
            ToolKind::RemoveBackground => "/api/remove-bg",
            ToolKind::Compress => "/api/compress",
            ToolKind::ConvertFormat => "/api/convert-format",
            ToolKind::WebpConvert => "/api/webp-convert",
            ToolKind::Resize => "/api/resize",
            ToolKind::Watermark => "/api/watermark",
            ToolKind::Rotate => "/api/rotate",
        }
    }

    /// Name of the multipart file part.
    pub fn file_field(&self) -> &'static str {
        if self.accepts_many() { "images" } else { "image" }
    }

    pub fn accepts_many(&self) -> bool {
        matches!(self, ToolKind::ImageToPdf)
    }

    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Upload => "upload",
            ToolKind::ImageToPdf => "image-to-pdf",
            ToolKind::RemoveBackground => "remove-bg",
            ToolKind::Compress => "compress",
            ToolKind::ConvertFormat => "convert-format",
            ToolKind::WebpConvert => "webp-convert",
            ToolKind::Resize => "resize",
            ToolKind::Watermark => "watermark",
            ToolKind::Rotate => "rotate",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool together with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    Upload,
    ImageToPdf,
    RemoveBackground,
    Compress { quality: u8 },
    ConvertFormat { format: TargetFormat },
    WebpConvert { quality: u8 },
    Resize { width: Option<u32>, height: Option<u32> },
    Watermark { text: String, opacity: f32 },
    Rotate { angle: i32, flip: bool, flop: bool },
}

impl ToolRequest {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolRequest::Upload => ToolKind::Upload,
            ToolRequest::ImageToPdf => ToolKind::ImageToPdf,
            ToolRequest::RemoveBackground => ToolKind::RemoveBackground,
            ToolRequest::Compress { .. } => ToolKind::Compress,
            ToolRequest::ConvertFormat { .. } => ToolKind::ConvertFormat,
            ToolRequest::WebpConvert { .. } => ToolKind::WebpConvert,
            ToolRequest::Resize { .. } => ToolKind::Resize,
            ToolRequest::Watermark { .. } => ToolKind::Watermark,
            ToolRequest::Rotate { .. } => ToolKind::Rotate,
        }
    }

    /// Rebuild the request for `kind` from submitted form fields.
    pub fn from_fields(kind: ToolKind, fields: &HashMap<String, String>) -> Self {
        let field = |name: &str| fields.get(name).map(String::as_str).unwrap_or("");

        match kind {
            ToolKind::Upload => ToolRequest::Upload,
            ToolKind::ImageToPdf => ToolRequest::ImageToPdf,
            ToolKind::RemoveBackground => ToolRequest::RemoveBackground,
            ToolKind::Compress => ToolRequest::Compress {
                quality: parse_quality(field("quality")),
            },
            ToolKind::ConvertFormat => ToolRequest::ConvertFormat {
                format: TargetFormat::parse_lenient(field("format")),
            },
            ToolKind::WebpConvert => ToolRequest::WebpConvert {
                quality: parse_quality(field("quality")),
            },
            ToolKind::Resize => ToolRequest::Resize {
                width: parse_dimension(field("width")),
                height: parse_dimension(field("height")),
            },
            ToolKind::Watermark => ToolRequest::Watermark {
                text: match field("text") {
                    "" => DEFAULT_WATERMARK_TEXT.to_string(),
                    text => text.to_string(),
                },
                opacity: parse_opacity(field("opacity")),
            },
            ToolKind::Rotate => ToolRequest::Rotate {
                angle: parse_int_prefix(field("angle"))
                    .and_then(|a| i32::try_from(a).ok())
                    .unwrap_or(0),
                flip: field("flip") == "true",
                flop: field("flop") == "true",
            },
        }
    }

    /// Text fields sent alongside the file parts.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            ToolRequest::Upload | ToolRequest::ImageToPdf | ToolRequest::RemoveBackground => vec![],
            ToolRequest::Compress { quality } | ToolRequest::WebpConvert { quality } => {
                vec![("quality", quality.to_string())]
            }
            ToolRequest::ConvertFormat { format } => vec![("format", format.as_str().to_string())],
            ToolRequest::Resize { width, height } => {
                let mut fields = Vec::new();
                if let Some(width) = width {
                    fields.push(("width", width.to_string()));
                }
                if let Some(height) = height {
                    fields.push(("height", height.to_string()));
                }
                fields
            }
            ToolRequest::Watermark { text, opacity } => {
                vec![("text", text.clone()), ("opacity", opacity.to_string())]
            }
            ToolRequest::Rotate { angle, flip, flop } => vec![
                ("angle", angle.to_string()),
                ("flip", flip.to_string()),
                ("flop", flop.to_string()),
            ],
        }
    }
}

/// Missing, unparsable or zero means the default; otherwise clamped to 1-100.
fn parse_quality(value: &str) -> u8 {
    match parse_int_prefix(value) {
        None | Some(0) => DEFAULT_QUALITY,
        Some(q) => q.clamp(1, 100) as u8,
    }
}

/// Non-positive or unparsable means unconstrained.
fn parse_dimension(value: &str) -> Option<u32> {
    parse_int_prefix(value)
        .filter(|v| *v > 0)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
}

/// Missing, unparsable or zero means the default; otherwise clamped to 0-1.
fn parse_opacity(value: &str) -> f32 {
    match parse_float_prefix(value) {
        Some(o) if o != 0.0 && o.is_finite() => o.clamp(0.0, 1.0),
        _ => DEFAULT_WATERMARK_OPACITY,
    }
}

/// Leading integer of `value` after optional whitespace and sign, if there is one.
pub fn parse_int_prefix(value: &str) -> Option<i64> {
    let s = value.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

/// Longest leading decimal number of `value`, if there is one.
pub fn parse_float_prefix(value: &str) -> Option<f32> {
    let s = value.trim_start();
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
        .unwrap_or(s.len());
    (1..=end).rev().find_map(|len| s[..len].parse::<f32>().ok())
}
