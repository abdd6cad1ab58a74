//! Quality-driven recompression.

use color_quant::NeuQuant;
use image::DynamicImage;
use tracing::debug;

use super::{Encoded, ImageFamily, Result, decode, encode_jpeg, encode_webp};

/// Largest palette used for quantized PNG output.
pub const PNG_PALETTE_COLORS: usize = 256;

/// NeuQuant sampling factor: every 10th pixel trains the network.
const NEUQUANT_SAMPLE_FACTOR: i32 = 10;

/// Below this many pixels every pixel is sampled, otherwise the network barely trains.
const FULL_SAMPLE_PIXELS: usize = 64 * 64;

/// Re-encode `bytes` at `quality` (1-100).
///
/// PNG input is palette-quantized to a colour budget that shrinks with `quality` (see
/// [`palette_budget`]), WebP stays lossy WebP and anything else becomes a JPEG.
pub fn compress(bytes: &[u8], quality: u8) -> Result<Encoded> {
    let quality = quality.clamp(1, 100);
    let (image, format) = decode(bytes)?;
    let family = ImageFamily::lossy_policy(format);

    let out = match family {
        ImageFamily::Png => quantize_png(&image, quality)?,
        ImageFamily::Webp => encode_webp(&image, quality)?,
        _ => encode_jpeg(&image, quality)?,
    };

    debug!(
        input_format = ?format,
        input_bytes = bytes.len(),
        output_bytes = out.len(),
        quality,
        "Compressed image"
    );

    Ok(Encoded { bytes: out, family })
}

/// Palette size for a quality: a power of two from 2 colours (quality 1-12) up to
/// [`PNG_PALETTE_COLORS`] (quality 88-100). Lower quality never gets a larger budget.
pub fn palette_budget(quality: u8) -> usize {
    let bits = (u32::from(quality.clamp(1, 100)) * 8).div_ceil(100).clamp(1, 8);
    (1usize << bits).min(PNG_PALETTE_COLORS)
}

fn quantize_png(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixels = rgba.as_raw();

    let sample_factor = if pixels.len() / 4 < FULL_SAMPLE_PIXELS {
        1
    } else {
        NEUQUANT_SAMPLE_FACTOR
    };
    let quantizer = NeuQuant::new(sample_factor, palette_budget(quality), pixels);
    let raw_indices: Vec<usize> = pixels.chunks_exact(4).map(|px| quantizer.index_of(px)).collect();

    // Keep only the entries that are actually referenced.
    let color_map = quantizer.color_map_rgba();
    let mut remap = vec![None; color_map.len() / 4];
    let mut palette = Vec::new();
    let mut alphas = Vec::new();
    let mut indices = Vec::with_capacity(raw_indices.len());
    for index in raw_indices {
        let slot = match remap[index] {
            Some(slot) => slot,
            None => {
                let slot = alphas.len() as u8;
                let entry = &color_map[index * 4..index * 4 + 4];
                palette.extend_from_slice(&entry[..3]);
                alphas.push(entry[3]);
                remap[index] = Some(slot);
                slot
            }
        };
        indices.push(slot);
    }

    let depth = index_depth(alphas.len());
    let data = pack_indices(&indices, width as usize, depth);

    let mut buf = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut buf, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(depth);
        encoder.set_palette(palette);
        if alphas.iter().any(|&a| a != u8::MAX) {
            encoder.set_trns(alphas);
        }
        encoder.set_compression(png::Compression::Best);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&data)?;
        writer.finish()?;
    }
    Ok(buf)
}

/// Smallest PNG bit depth that can address `colors` palette entries.
fn index_depth(colors: usize) -> png::BitDepth {
    match colors {
        0..=2 => png::BitDepth::One,
        3..=4 => png::BitDepth::Two,
        5..=16 => png::BitDepth::Four,
        _ => png::BitDepth::Eight,
    }
}

/// Pack one index per pixel into rows of `depth` bits per pixel, most significant bits first.
fn pack_indices(indices: &[u8], width: usize, depth: png::BitDepth) -> Vec<u8> {
    let bits = depth as usize;
    if bits == 8 || width == 0 {
        return indices.to_vec();
    }
    let per_byte = 8 / bits;
    let row_bytes = width.div_ceil(per_byte);
    let mut out = Vec::with_capacity(row_bytes * (indices.len() / width));
    for row in indices.chunks(width) {
        for group in row.chunks(per_byte) {
            let mut byte = 0u8;
            for (i, &index) in group.iter().enumerate() {
                byte |= index << (8 - bits * (i + 1));
            }
            out.push(byte);
        }
    }
    out
}
