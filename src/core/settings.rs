// Copyright @yucwang 2026

use crate::core::error::ConfigError;
use crate::core::phase::HenyeyGreenstein;
use crate::integrators::volpath::MediumParams;
use crate::integrators::{CollisionPolicy, TrackingMode};
use crate::math::constants::{Float, Vector3f};
use crate::renderers::accumulator::FeatureSet;
use crate::volumes::super_voxel_grid::{BlockSizePolicy, GridOptions};
use crate::volumes::{BorderMode, GridInterpolation};

/// Everything that shapes the estimator, the film and the frame schedule.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub tracking_mode: TrackingMode,
    pub collision_policy: CollisionPolicy,
    pub extinction_scale: Float,
    pub extinction_base: Vector3f,
    pub albedo: Vector3f,
    pub phase_g: Float,
    pub block_size: usize,
    pub block_policy: BlockSizePolicy,
    pub interpolation: GridInterpolation,
    pub border: BorderMode,
    pub seed_offset: u32,
    pub width: usize,
    pub height: usize,
    pub target_samples: u32,
    pub samples_per_frame: u32,
    /// Worker threads per frame, `None` uses every available core.
    pub threads: Option<usize>,
    pub features: FeatureSet,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            tracking_mode: TrackingMode::default(),
            collision_policy: CollisionPolicy::default(),
            extinction_scale: 1024.0,
            extinction_base: Vector3f::new(1.0, 1.0, 1.0),
            albedo: Vector3f::new(0.9, 1.0, 1.0),
            phase_g: 0.875,
            block_size: 8,
            block_policy: BlockSizePolicy::default(),
            interpolation: GridInterpolation::default(),
            border: BorderMode::default(),
            seed_offset: 0,
            width: 512,
            height: 512,
            target_samples: 1024,
            samples_per_frame: 1,
            threads: None,
            features: FeatureSet::default(),
        }
    }
}

impl RenderSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::InvalidBlockSize(self.block_size));
        }
        if !(self.phase_g.abs() < 1.0) {
            return Err(ConfigError::InvalidPhaseG(self.phase_g));
        }
        if !self.extinction_scale.is_finite() || self.extinction_scale < 0.0 {
            return Err(ConfigError::InvalidExtinction(self.extinction_scale));
        }
        for &value in self.extinction().iter() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidExtinction(value));
            }
        }
        for &value in self.albedo.iter() {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidAlbedo(value));
            }
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidResolution { width: self.width, height: self.height });
        }
        if self.target_samples == 0 {
            return Err(ConfigError::ZeroTargetSamples);
        }
        if self.samples_per_frame == 0 {
            return Err(ConfigError::ZeroSamplesPerFrame);
        }
        self.features.validate()
    }

    /// Per-channel extinction coefficient for a density of one.
    pub fn extinction(&self) -> Vector3f {
        self.extinction_base * self.extinction_scale
    }

    pub fn medium_params(&self) -> MediumParams {
        MediumParams {
            extinction: self.extinction(),
            albedo: self.albedo,
            phase: HenyeyGreenstein::new(self.phase_g),
            interpolation: self.interpolation,
            border: self.border,
        }
    }

    pub fn grid_options(&self) -> GridOptions {
        GridOptions {
            block_size: self.block_size,
            policy: self.block_policy,
            interpolation: self.interpolation,
            border: self.border,
        }
    }
}
