// Copyright @yucwang 2026

use crate::core::error::ConfigError;
use crate::math::constants::Float;
use crate::volumes::density_field::DensityField;

/// Constant-density block. With `empty_boundary_layer` the outermost voxel
/// layer on every face is zero.
pub fn cloud_block(nx: usize, ny: usize, nz: usize, value: Float,
                   empty_boundary_layer: bool) -> Result<DensityField, ConfigError> {
    DensityField::from_fn([nx, ny, nz], |x, y, z| {
        let on_boundary = x == 0 || y == 0 || z == 0
            || x + 1 == nx || y + 1 == ny || z + 1 == nz;
        if empty_boundary_layer && on_boundary {
            0.0
        } else {
            value
        }
    })
}

/// Soft sphere with a smooth falloff towards the rim, normalized to [0, 1].
pub fn soft_sphere(resolution: usize) -> Result<DensityField, ConfigError> {
    let half = resolution as Float * 0.5;
    DensityField::from_fn([resolution; 3], |x, y, z| {
        let dx = (x as Float + 0.5 - half) / half;
        let dy = (y as Float + 0.5 - half) / half;
        let dz = (z as Float + 0.5 - half) / half;
        let r = (dx * dx + dy * dy + dz * dz).sqrt();
        let t = (1.0 - r / 0.9).max(0.0).min(1.0);
        t * t * (3.0 - 2.0 * t)
    })
}
