// Copyright @yucwang 2026

use std::path::Path;

use crate::core::error::RenderError;
use crate::io::exr_utils;
use crate::math::bitmap::Bitmap;
use crate::math::constants::{Float, Vector2f, Vector3f};
use crate::math::frame::Frame;
use crate::math::warp::{direction_to_equirect, sample_uniform_cone, sample_uniform_cone_pdf};

/// Direction towards an explicitly sampled light with its radiance and
/// solid angle density.
#[derive(Debug, Clone, Copy)]
pub struct LightSample {
    pub direction: Vector3f,
    pub radiance: Vector3f,
    pub pdf: Float,
}

/// Radiance arriving from infinity along a direction. Paths that leave the
/// density domain pick this up.
pub trait Environment: Send + Sync {
    fn radiance(&self, dir: &Vector3f) -> Vector3f;

    /// Samples the part of the environment that next-event estimation
    /// handles explicitly. `None` when there is no such light.
    fn sample_light(&self, _u: &Vector2f) -> Option<LightSample> {
        None
    }

    /// Radiance without the explicitly sampled light.
    fn background(&self, dir: &Vector3f) -> Vector3f {
        self.radiance(dir)
    }

    fn describe(&self) -> String {
        String::from("Environment")
    }
}

pub struct ConstantEnvironment {
    radiance: Vector3f,
}

impl ConstantEnvironment {
    pub fn new(radiance: Vector3f) -> Self {
        Self { radiance }
    }
}

impl Environment for ConstantEnvironment {
    fn radiance(&self, _dir: &Vector3f) -> Vector3f {
        self.radiance
    }

    fn describe(&self) -> String {
        format!("ConstantEnvironment: {:?}", self.radiance.as_slice())
    }
}

/// Sky gradient with a sun disc, y up.
pub struct SkyEnvironment {
    sun_direction: Vector3f,
    sun_radiance: Vector3f,
    sun_cos_radius: Float,
    zenith: Vector3f,
    horizon: Vector3f,
    ground: Vector3f,
}

impl Default for SkyEnvironment {
    fn default() -> Self {
        Self::new(Vector3f::new(0.5826, 0.7660, 0.2717),
                  Vector3f::new(1.0, 0.961538462, 0.884615385),
                  2.6)
    }
}

impl SkyEnvironment {
    pub fn new(sun_direction: Vector3f, sun_color: Vector3f, sun_intensity: Float) -> Self {
        Self {
            sun_direction: sun_direction.normalize(),
            sun_radiance: sun_color * sun_intensity,
            sun_cos_radius: (2.0 as Float).to_radians().cos(),
            zenith: Vector3f::new(0.25, 0.42, 0.85),
            horizon: Vector3f::new(0.8, 0.87, 1.0),
            ground: Vector3f::new(0.3, 0.28, 0.26),
        }
    }
}

impl Environment for SkyEnvironment {
    fn radiance(&self, dir: &Vector3f) -> Vector3f {
        let mut radiance = self.background(dir);
        if dir.dot(&self.sun_direction) >= self.sun_cos_radius {
            radiance += self.sun_radiance;
        }
        radiance
    }

    fn sample_light(&self, u: &Vector2f) -> Option<LightSample> {
        let local = sample_uniform_cone(u, self.sun_cos_radius);
        let direction = Frame::from_direction(&self.sun_direction).from_local(&local).normalize();
        Some(LightSample {
            direction,
            radiance: self.sun_radiance,
            pdf: sample_uniform_cone_pdf(self.sun_cos_radius),
        })
    }

    fn background(&self, dir: &Vector3f) -> Vector3f {
        if dir.y >= 0.0 {
            self.horizon * (1.0 - dir.y) + self.zenith * dir.y
        } else {
            self.ground
        }
    }

    fn describe(&self) -> String {
        format!("SkyEnvironment: sun {:?}", self.sun_direction.as_slice())
    }
}

/// Latitude-longitude environment map.
pub struct EnvironmentMap {
    bitmap: Bitmap,
    scale: Float,
}

impl EnvironmentMap {
    pub fn new(bitmap: Bitmap, scale: Float) -> Self {
        Self { bitmap, scale }
    }

    pub fn from_exr<P: AsRef<Path>>(path: P, scale: Float) -> Result<Self, RenderError> {
        let bitmap = exr_utils::read_exr_to_bitmap(path)?;
        Ok(Self::new(bitmap, scale))
    }
}

impl Environment for EnvironmentMap {
    fn radiance(&self, dir: &Vector3f) -> Vector3f {
        let (width, height) = (self.bitmap.width(), self.bitmap.height());
        if width == 0 || height == 0 {
            return Vector3f::zeros();
        }
        let uv = direction_to_equirect(dir);
        let x = ((uv.x * width as Float) as usize).min(width - 1);
        let y = ((uv.y * height as Float) as usize).min(height - 1);
        self.bitmap[(x, y)] * self.scale
    }

    fn describe(&self) -> String {
        format!("EnvironmentMap: {}x{}", self.bitmap.width(), self.bitmap.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sky_sun_and_ground() {
        let sky = SkyEnvironment::default();
        let sun = Vector3f::new(0.5826, 0.7660, 0.2717).normalize();
        let away = Vector3f::new(-0.5826, 0.7660, -0.2717).normalize();
        assert!(sky.radiance(&sun).x > sky.radiance(&away).x + 2.0);
        let down = Vector3f::new(0.0, -1.0, 0.0);
        assert_eq!(sky.radiance(&down), Vector3f::new(0.3, 0.28, 0.26));
    }

    #[test]
    fn test_sun_samples_cover_the_disc() {
        let sky = SkyEnvironment::default();
        let sun = Vector3f::new(0.5826, 0.7660, 0.2717).normalize();
        let mut rng = fastrand::Rng::with_seed(3);
        for _ in 0..500 {
            let light = sky.sample_light(&Vector2f::new(rng.f32(), rng.f32())).unwrap();
            assert!(light.direction.dot(&sun) >= (2.0 as Float).to_radians().cos() - 1e-5);
            // the sampled direction sees the sun on top of the sky
            let sky_only = sky.background(&light.direction);
            assert!((sky.radiance(&light.direction) - sky_only - light.radiance).norm() < 1e-5
                || light.direction.dot(&sun) < (2.0 as Float).to_radians().cos());
            assert!(light.pdf > 0.0);
        }
        assert!(ConstantEnvironment::new(Vector3f::repeat(1.0)).sample_light(&Vector2f::zeros()).is_none());
    }

    #[test]
    fn test_environment_map_lookup() {
        let mut bitmap = Bitmap::new(4, 2);
        for x in 0..4 {
            bitmap[(x, 0)] = Vector3f::new(1.0, 1.0, 1.0);
        }
        let map = EnvironmentMap::new(bitmap, 2.0);
        assert_eq!(map.radiance(&Vector3f::new(0.0, 1.0, 0.0)), Vector3f::new(2.0, 2.0, 2.0));
        assert_eq!(map.radiance(&Vector3f::new(0.0, -1.0, 0.0)), Vector3f::zeros());
    }
}
