// Copyright @yucwang 2026

pub mod density_field;
pub mod procedural;
pub mod super_voxel_grid;

use std::str::FromStr;

use crate::core::error::ConfigError;

/// How the density field is reconstructed between voxel centres.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GridInterpolation {
    Nearest,
    /// Jitters the lookup by up to half a voxel and fetches the nearest voxel,
    /// which matches trilinear filtering in expectation.
    Stochastic,
    Trilinear,
}

impl Default for GridInterpolation {
    fn default() -> Self {
        GridInterpolation::Stochastic
    }
}

impl FromStr for GridInterpolation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest" => Ok(GridInterpolation::Nearest),
            "stochastic" => Ok(GridInterpolation::Stochastic),
            "trilinear" | "linear" => Ok(GridInterpolation::Trilinear),
            _ => Err(ConfigError::UnknownName { kind: "interpolation", name: s.to_string() }),
        }
    }
}

/// Value returned for voxel indices outside the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BorderMode {
    ClampToZero,
    ClampToEdge,
}

impl Default for BorderMode {
    fn default() -> Self {
        BorderMode::ClampToZero
    }
}

impl BorderMode {
    pub fn is_clamp_to_zero(&self) -> bool {
        matches!(self, BorderMode::ClampToZero)
    }
}

impl FromStr for BorderMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clamp-to-zero" | "zero" => Ok(BorderMode::ClampToZero),
            "clamp-to-edge" | "clamp" => Ok(BorderMode::ClampToEdge),
            _ => Err(ConfigError::UnknownName { kind: "border mode", name: s.to_string() }),
        }
    }
}

/// Maps a possibly out-of-range index into the grid, or `None` when the
/// border mode makes it read as zero.
pub(crate) fn resolve_index(idx: isize, size: usize, border: BorderMode) -> Option<usize> {
    if idx >= 0 && (idx as usize) < size {
        return Some(idx as usize);
    }
    match border {
        BorderMode::ClampToZero => None,
        BorderMode::ClampToEdge => Some(idx.clamp(0, size as isize - 1) as usize),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(3, 4, BorderMode::ClampToZero), Some(3));
        assert_eq!(resolve_index(4, 4, BorderMode::ClampToZero), None);
        assert_eq!(resolve_index(-1, 4, BorderMode::ClampToZero), None);
        assert_eq!(resolve_index(4, 4, BorderMode::ClampToEdge), Some(3));
        assert_eq!(resolve_index(-1, 4, BorderMode::ClampToEdge), Some(0));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("trilinear".parse::<GridInterpolation>().unwrap(), GridInterpolation::Trilinear);
        assert_eq!("clamp-to-edge".parse::<BorderMode>().unwrap(), BorderMode::ClampToEdge);
        assert!("cubic".parse::<GridInterpolation>().is_err());
    }
}
