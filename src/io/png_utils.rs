// Copyright @yucwang 2026

use std::path::Path;

use image::{Rgb, RgbImage};

use crate::core::error::RenderError;
use crate::math::bitmap::Bitmap;
use crate::math::constants::{Float, Vector3f};

fn linear_to_srgb(v: Float) -> Float {
    if v <= 0.0031308 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

fn quantize(v: Float) -> u8 {
    let v = linear_to_srgb(v.max(0.0).min(1.0));
    (v * 255.0 + 0.5).max(0.0).min(255.0) as u8
}

/// 8-bit sRGB preview of a linear image, scaled by `exposure` and clipped.
pub fn tonemap(image: &Bitmap, exposure: Float) -> RgbImage {
    RgbImage::from_fn(image.width() as u32, image.height() as u32, |x, y| {
        let pixel = image[(x as usize, y as usize)] * exposure;
        let pixel = if pixel.iter().all(|v| v.is_finite()) { pixel } else { Vector3f::zeros() };
        Rgb([quantize(pixel.x), quantize(pixel.y), quantize(pixel.z)])
    })
}

pub fn write_png_preview<P: AsRef<Path>>(image: &Bitmap, exposure: Float, file_path: P) -> Result<(), RenderError> {
    let file_path = file_path.as_ref();
    tonemap(image, exposure).save(file_path)?;
    log::info!("PNG preview written to: {}.", file_path.display());
    Ok(())
}

pub fn write_rgb_png<P: AsRef<Path>>(image: &RgbImage, file_path: P) -> Result<(), RenderError> {
    let file_path = file_path.as_ref();
    image.save(file_path)?;
    log::info!("PNG written to: {}.", file_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tonemap_clips_and_encodes() {
        let mut bitmap = Bitmap::new(3, 1);
        bitmap[(0, 0)] = Vector3f::new(0.0, 1.0, 4.0);
        bitmap[(1, 0)] = Vector3f::new(0.5, Float::NAN, 0.5);
        bitmap[(2, 0)] = Vector3f::new(-1.0, 0.0, 0.0);
        let image = tonemap(&bitmap, 1.0);
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 255, 255]));
        assert_eq!(*image.get_pixel(1, 0), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(2, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_mid_grey_is_srgb_encoded() {
        let mut bitmap = Bitmap::new(1, 1);
        bitmap[(0, 0)] = Vector3f::repeat(0.214);
        let value = tonemap(&bitmap, 1.0).get_pixel(0, 0)[0];
        assert!((value as i32 - 128).abs() <= 1);
    }
}
