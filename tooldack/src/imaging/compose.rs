//! Background merging for cut-out images.

use image::{DynamicImage, Rgba, RgbaImage};

use super::{ImagingError, Result, decode, encode_png};

/// What goes behind the foreground.
#[derive(Debug, Clone)]
pub enum Background {
    Color(Rgba<u8>),
    Image(DynamicImage),
}

impl Background {
    /// Parse a `#rrggbb` colour.
    pub fn parse_color(value: &str) -> Result<Self> {
        let hex = value.trim().strip_prefix('#').unwrap_or(value.trim());
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ImagingError::InvalidParameter(format!("Invalid colour '{value}', expected #rrggbb")));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
        Ok(Background::Color(Rgba([channel(0), channel(2), channel(4), 255])))
    }

    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Background::Image(decode(bytes)?.0))
    }
}

/// Draw `foreground` over `background` at `opacity` (clamped to 0-1) and return a PNG the size
/// of the foreground. Image backgrounds are scaled to cover the canvas and centred.
pub fn merge_background(foreground: &[u8], background: &Background, opacity: f32) -> Result<Vec<u8>> {
    let (fg, _) = decode(foreground)?;
    let fg = fg.to_rgba8();
    let (width, height) = fg.dimensions();

    let mut canvas = match background {
        Background::Color(color) => RgbaImage::from_pixel(width, height, *color),
        Background::Image(image) => cover(&image.to_rgba8(), width, height),
    };

    let opacity = opacity.clamp(0.0, 1.0);
    for (dst, src) in canvas.pixels_mut().zip(fg.pixels()) {
        *dst = source_over(*src, *dst, opacity);
    }

    encode_png(&DynamicImage::ImageRgba8(canvas))
}

/// Nearest-neighbour "cover" scaling: the smallest uniform scale that fills the canvas, centred.
fn cover(src: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (bw, bh) = (src.width().max(1) as f64, src.height().max(1) as f64);
    let scale = (width as f64 / bw).max(height as f64 / bh);
    let offset_x = (width as f64 - bw * scale) / 2.0;
    let offset_y = (height as f64 - bh * scale) / 2.0;

    RgbaImage::from_fn(width, height, |x, y| {
        let sx = ((x as f64 + 0.5 - offset_x) / scale).floor().clamp(0.0, bw - 1.0) as u32;
        let sy = ((y as f64 + 0.5 - offset_y) / scale).floor().clamp(0.0, bh - 1.0) as u32;
        *src.get_pixel(sx, sy)
    })
}

fn source_over(src: Rgba<u8>, dst: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let sa = f32::from(src[3]) / 255.0 * opacity;
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |s: u8, d: u8| {
        let c = (f32::from(s) * sa + f32::from(d) * da * (1.0 - sa)) / out_a;
        c.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        blend(src[0], dst[0]),
        blend(src[1], dst[1]),
        blend(src[2], dst[2]),
        (out_a * 255.0).round() as u8,
    ])
}
