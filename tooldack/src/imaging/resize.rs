//! Bounding-box resize.

use image::imageops::FilterType;

use super::{DEFAULT_QUALITY, Encoded, ImageFamily, Result, decode, encode};

/// Dimensions of a `width`×`height` image scaled to fit inside the box.
///
/// A `None` bound leaves that axis unconstrained. The image is never enlarged and never
/// stretched; each side is at least one pixel.
pub fn fit_inside(width: u32, height: u32, max_width: Option<u32>, max_height: Option<u32>) -> (u32, u32) {
    let scale_for = |bound: Option<u32>, size: u32| bound.map_or(1.0, |b| f64::from(b) / f64::from(size.max(1)));
    let scale = scale_for(max_width, width).min(scale_for(max_height, height)).min(1.0);

    if scale >= 1.0 {
        return (width, height);
    }

    let scaled = |size: u32, bound: Option<u32>| {
        let value = (f64::from(size) * scale).round() as u32;
        let value = bound.map_or(value, |b| value.min(b));
        value.max(1)
    };
    (scaled(width, max_width), scaled(height, max_height))
}

/// Resize to fit inside `width`×`height` and re-encode in the input format.
pub fn resize(bytes: &[u8], width: Option<u32>, height: Option<u32>) -> Result<Encoded> {
    let (image, format) = decode(bytes)?;
    let (target_w, target_h) = fit_inside(image.width(), image.height(), width, height);

    let resized = if (target_w, target_h) == (image.width(), image.height()) {
        image
    } else {
        image.resize_exact(target_w, target_h, FilterType::Lanczos3)
    };

    tracing::debug!(target_w, target_h, ?format, "Resized image");
    encode(&resized, ImageFamily::of(format), DEFAULT_QUALITY)
}
