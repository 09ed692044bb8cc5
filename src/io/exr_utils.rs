/* Copyright 2020 @TwoCookingMice */

use std::path::Path;

use exr::prelude::*;

use crate::core::error::RenderError;
use crate::math::bitmap::Bitmap;
use crate::math::constants::Vector3f;

// Read the RGB channels of the first valid layer, alpha is dropped
pub fn read_exr_to_bitmap<P: AsRef<Path>>(file_path: P) -> std::result::Result<Bitmap, RenderError> {
    let file_path = file_path.as_ref();
    log::info!("Starting reading OpenEXR image from: {}.", file_path.display());

    let image = read()
        .no_deep_data()
        .largest_resolution_level()
        .rgba_channels(
            |resolution, _| Bitmap::new(resolution.width(), resolution.height()),
            |bitmap: &mut Bitmap, position, (r, g, b, _a): (f32, f32, f32, f32)| {
                bitmap[(position.x(), position.y())] = Vector3f::new(r, g, b);
            },
        )
        .first_valid_layer()
        .all_attributes()
        .from_file(file_path)?;

    let bitmap = image.layer_data.channel_data.pixels;
    log::info!("OpenEXR loaded, width = {}, height = {}.", bitmap.width(), bitmap.height());
    Ok(bitmap)
}

// Write EXR Image to file
pub fn write_exr_to_file<P: AsRef<Path>>(image: &Bitmap, file_path: P) -> std::result::Result<(), RenderError> {
    let file_path = file_path.as_ref();
    log::info!("Starting writing openexr images: {}.", file_path.display());

    write_rgb_file(file_path, image.width(), image.height(), |x, y| {
        let pixel = image[(x, y)];
        (pixel.x, pixel.y, pixel.z)
    })?;
    log::info!("EXR written to: {}.", file_path.display());
    Ok(())
}

/// Writes a single-channel float layer per feature component, named
/// `<prefix>.<index>`.
pub fn write_feature_exr<P: AsRef<Path>>(data: &[f32], channels: usize, width: usize, height: usize,
                                         prefix: &str, file_path: P) -> std::result::Result<(), RenderError> {
    let file_path = file_path.as_ref();
    let layers: Vec<AnyChannel<FlatSamples>> = (0..channels)
        .map(|c| {
            let samples: Vec<f32> = (0..width * height).map(|i| data[i * channels + c]).collect();
            let name = format!("{}.{}", prefix, c);
            AnyChannel::new(name.as_str(), FlatSamples::F32(samples))
        })
        .collect();
    let image = Image::from_channels((width, height), AnyChannels::sort(layers.into()));
    image.write().to_file(file_path)?;
    log::info!("Feature buffer {} written to: {}.", prefix, file_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exr_write_then_read() {
        let mut bitmap = Bitmap::new(5, 3);
        bitmap[(4, 2)] = Vector3f::new(1.5, 0.25, 8.0);
        bitmap[(0, 1)] = Vector3f::new(0.0, 2.0, 0.0);

        let path = std::env::temp_dir().join(format!("cumulus_exr_test_{}.exr", std::process::id()));
        write_exr_to_file(&bitmap, &path).unwrap();
        let loaded = read_exr_to_bitmap(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.width(), 5);
        assert_eq!(loaded.height(), 3);
        assert_eq!(loaded[(4, 2)], Vector3f::new(1.5, 0.25, 8.0));
        assert_eq!(loaded[(0, 1)], Vector3f::new(0.0, 2.0, 0.0));
    }
}
