//! Text watermark rendered from an SVG overlay.

use std::sync::Arc;

use image::{RgbaImage, imageops};
use once_cell::sync::Lazy;
use resvg::{tiny_skia, usvg};
use usvg::fontdb;

use super::{DEFAULT_QUALITY, Encoded, ImageFamily, ImagingError, Result, decode, encode};

pub const DEFAULT_WATERMARK_TEXT: &str = "Watermark";
pub const DEFAULT_WATERMARK_OPACITY: f32 = 0.5;

/// Bundled face that the generic `sans-serif` family resolves to.
const WATERMARK_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");
const WATERMARK_FONT_FAMILY: &str = "DejaVu Sans";

/// Bundled watermark face plus system fonts, loaded on first use.
static FONTS: Lazy<Arc<fontdb::Database>> = Lazy::new(|| {
    let mut db = fontdb::Database::new();
    db.load_font_data(WATERMARK_FONT.to_vec());
    db.load_system_fonts();
    db.set_sans_serif_family(WATERMARK_FONT_FAMILY);
    tracing::debug!(faces = db.len(), "Loaded fonts for watermarking");
    Arc::new(db)
});

/// Fail instead of letting the renderer silently drop text it has no face for.
fn ensure_watermark_face(db: &fontdb::Database) -> Result<()> {
    let query = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        weight: fontdb::Weight::BOLD,
        ..Default::default()
    };
    db.query(&query)
        .map(|_| ())
        .ok_or_else(|| ImagingError::Overlay("no sans-serif font available for watermark text".to_string()))
}

/// SVG overlay for a `width`×`height` image: white bold sans-serif text centred on the canvas
/// at `floor(width / 10)` px.
pub fn watermark_svg(width: u32, height: u32, text: &str, opacity: f32) -> String {
    let font_size = width / 10;
    let opacity = opacity.clamp(0.0, 1.0);
    format!(
        r#"<svg width="{width}" height="{height}" viewBox="0 0 {width} {height}" xmlns="http://www.w3.org/2000/svg"><text x="50%" y="50%" text-anchor="middle" dominant-baseline="middle" font-family="sans-serif" font-weight="bold" font-size="{font_size}" fill="white" fill-opacity="{opacity}">{}</text></svg>"#,
        escape_xml(text)
    )
}

/// Composite `text` over the image and re-encode in the input family.
pub fn watermark(bytes: &[u8], text: &str, opacity: f32) -> Result<Encoded> {
    let (image, format) = decode(bytes)?;
    let family = ImageFamily::lossy_policy(format);
    let mut base = image.to_rgba8();
    let (width, height) = base.dimensions();

    if width / 10 > 0 && opacity > 0.0 && !text.is_empty() {
        let overlay = render_overlay(&watermark_svg(width, height, text, opacity), width, height)?;
        imageops::overlay(&mut base, &overlay, 0, 0);
    }

    encode(&image::DynamicImage::ImageRgba8(base), family, DEFAULT_QUALITY)
}

fn render_overlay(svg: &str, width: u32, height: u32) -> Result<RgbaImage> {
    ensure_watermark_face(&FONTS)?;
    let options = usvg::Options {
        fontdb: FONTS.clone(),
        ..Default::default()
    };
    let tree = usvg::Tree::from_str(svg, &options).map_err(|e| ImagingError::Overlay(e.to_string()))?;

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| ImagingError::Overlay(format!("invalid canvas size {width}x{height}")))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha; image expects straight alpha.
    let mut raw = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        raw.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RgbaImage::from_raw(width, height, raw).ok_or_else(|| ImagingError::Overlay("overlay buffer size mismatch".to_string()))
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
