//! Rotation and mirroring.

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};

use super::{DEFAULT_QUALITY, Encoded, ImageFamily, Result, decode, encode};

const FILL: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Rotate clockwise by `angle` degrees, then mirror vertically (`flip`) and horizontally
/// (`flop`). The output is re-encoded in the input format.
pub fn rotate(bytes: &[u8], angle: i32, flip: bool, flop: bool) -> Result<Encoded> {
    let (image, format) = decode(bytes)?;

    let mut out = rotate_image(image, angle);
    if flip {
        out = out.flipv();
    }
    if flop {
        out = out.fliph();
    }

    encode(&out, ImageFamily::of(format), DEFAULT_QUALITY)
}

fn rotate_image(image: DynamicImage, angle: i32) -> DynamicImage {
    match angle.rem_euclid(360) {
        0 => image,
        90 => image.rotate90(),
        180 => image.rotate180(),
        270 => image.rotate270(),
        degrees => DynamicImage::ImageRgba8(rotate_expanded(&image.to_rgba8(), degrees)),
    }
}

/// Arbitrary-angle rotation onto a canvas large enough to hold every source pixel.
fn rotate_expanded(src: &RgbaImage, degrees: i32) -> RgbaImage {
    let theta = (degrees as f32).to_radians();
    let (w, h) = (src.width() as f32, src.height() as f32);
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());

    let new_w = (w * cos + h * sin).ceil().max(1.0) as u32;
    let new_h = (w * sin + h * cos).ceil().max(1.0) as u32;

    let projection = Projection::translate(new_w as f32 / 2.0, new_h as f32 / 2.0)
        * Projection::rotate(theta)
        * Projection::translate(-w / 2.0, -h / 2.0);

    let mut out = RgbaImage::from_pixel(new_w, new_h, FILL);
    warp_into(src, &projection, Interpolation::Bilinear, FILL, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{gradient_image, sample_jpeg, sample_png};
    use image::ImageFormat;

    #[test]
    fn identity_keeps_pixels() {
        let input = sample_png(20, 10);
        let out = rotate(&input, 0, false, false).unwrap();
        let (original, _) = decode(&input).unwrap();
        let (rotated, format) = decode(&out.bytes).unwrap();
        assert_eq!(format, ImageFormat::Png);
        assert_eq!(original.to_rgba8(), rotated.to_rgba8());
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        let input = sample_png(20, 10);
        for angle in [90, 270, -90, 450] {
            let (img, _) = decode(&rotate(&input, angle, false, false).unwrap().bytes).unwrap();
            assert_eq!((img.width(), img.height()), (10, 20), "angle {angle}");
        }
    }

    #[test]
    fn clockwise_quarter_turn_moves_top_left_to_top_right() {
        let image = gradient_image(4, 2);
        let rotated = rotate_image(image.clone(), 90).to_rgba8();
        assert_eq!(rotated.get_pixel(1, 0), image.to_rgba8().get_pixel(0, 0));
    }

    #[test]
    fn arbitrary_angle_expands_canvas() {
        let (img, _) = decode(&rotate(&sample_png(100, 50), 45, false, false).unwrap().bytes).unwrap();
        // 100*cos45 + 50*sin45 ~ 106.07
        assert_eq!((img.width(), img.height()), (107, 107));
        assert_eq!(img.to_rgba8().get_pixel(0, 0), &FILL);
    }

    #[test]
    fn flip_and_flop_mirror() {
        let image = gradient_image(8, 6);
        let rgba = image.to_rgba8();
        let input = super::super::encode_png(&image).unwrap();

        let (flipped, _) = decode(&rotate(&input, 0, true, false).unwrap().bytes).unwrap();
        assert_eq!(flipped.to_rgba8().get_pixel(0, 0), rgba.get_pixel(0, 5));

        let (flopped, _) = decode(&rotate(&input, 0, false, true).unwrap().bytes).unwrap();
        assert_eq!(flopped.to_rgba8().get_pixel(0, 0), rgba.get_pixel(7, 0));
    }

    #[test]
    fn keeps_jpeg_input_as_jpeg() {
        let out = rotate(&sample_jpeg(30, 20), 180, false, false).unwrap();
        assert_eq!(out.family, ImageFamily::Jpeg);
        assert_eq!(decode(&out.bytes).unwrap().1, ImageFormat::Jpeg);
    }
}
