// Copyright @yucwang 2026

use thiserror::Error;

use crate::math::constants::Float;

/// Invalid render parameters, reported before any acceleration structure is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("density field is empty")]
    EmptyDensityField,

    #[error("density data has {actual} values, dimensions require {expected}")]
    DensityDataMismatch { expected: usize, actual: usize },

    #[error("super voxel size must be at least 1, got {0}")]
    InvalidBlockSize(usize),

    #[error("phase anisotropy must lie in (-1, 1), got {0}")]
    InvalidPhaseG(Float),

    #[error("extinction must be finite and non-negative, got {0}")]
    InvalidExtinction(Float),

    #[error("albedo must lie in [0, 1], got {0}")]
    InvalidAlbedo(Float),

    #[error("invalid film resolution {width}x{height}")]
    InvalidResolution { width: usize, height: usize },

    #[error("target sample count must be positive")]
    ZeroTargetSamples,

    #[error("samples per frame must be positive")]
    ZeroSamplesPerFrame,

    #[error("unsupported number of depth moments: {0} (expected 4, 6 or 8)")]
    InvalidMomentCount(usize),

    #[error("unknown {kind}: {name}")]
    UnknownName { kind: &'static str, name: String },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("could not allocate {bytes} bytes for {what}")]
    ResourceExhausted { what: &'static str, bytes: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("OpenEXR error: {0}")]
    Exr(#[from] exr::error::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Reserves `additional` elements or reports the failed allocation.
pub fn try_reserve<T>(buffer: &mut Vec<T>, additional: usize, what: &'static str) -> Result<(), RenderError> {
    buffer.try_reserve_exact(additional).map_err(|_| RenderError::ResourceExhausted {
        what,
        bytes: additional.saturating_mul(std::mem::size_of::<T>()),
    })
}
