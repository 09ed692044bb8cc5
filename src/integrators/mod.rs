// Copyright @yucwang 2026

pub mod trajectory;
pub mod volpath;

use std::str::FromStr;

use crate::core::error::ConfigError;
use crate::volumes::super_voxel_grid::MajorantKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackingMode {
    Delta,
    SpectralDelta,
    Ratio,
    Decomposition,
    ResidualRatio,
    /// Delta tracking with a shadow ray towards the environment's light at
    /// every scattering vertex.
    NextEvent,
    NextEventSpectral,
}

impl TrackingMode {
    /// Modes that carry all colour channels through one walk.
    pub fn is_spectral(&self) -> bool {
        matches!(self, TrackingMode::SpectralDelta | TrackingMode::NextEventSpectral)
    }

    pub fn uses_next_event(&self) -> bool {
        matches!(self, TrackingMode::NextEvent | TrackingMode::NextEventSpectral)
    }

    /// Acceleration structure the mode reads, if any.
    pub fn majorant_kind(&self) -> Option<MajorantKind> {
        match self {
            TrackingMode::Decomposition => Some(MajorantKind::Decomposition),
            TrackingMode::ResidualRatio => Some(MajorantKind::ResidualRatio),
            _ => None,
        }
    }
}

impl Default for TrackingMode {
    fn default() -> Self {
        TrackingMode::Delta
    }
}

impl FromStr for TrackingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delta" => Ok(TrackingMode::Delta),
            "spectral" | "spectral-delta" => Ok(TrackingMode::SpectralDelta),
            "ratio" => Ok(TrackingMode::Ratio),
            "decomposition" => Ok(TrackingMode::Decomposition),
            "residual-ratio" => Ok(TrackingMode::ResidualRatio),
            "next-event" => Ok(TrackingMode::NextEvent),
            "next-event-spectral" => Ok(TrackingMode::NextEventSpectral),
            _ => Err(ConfigError::UnknownName { kind: "tracking mode", name: s.to_string() }),
        }
    }
}

/// Which channel statistics drive the collision probabilities of spectral
/// delta tracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollisionPolicy {
    MaxBased,
    AvgBased,
    PathHistoryAvgBased,
}

impl Default for CollisionPolicy {
    fn default() -> Self {
        CollisionPolicy::PathHistoryAvgBased
    }
}

impl FromStr for CollisionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" | "max-based" => Ok(CollisionPolicy::MaxBased),
            "avg" | "avg-based" => Ok(CollisionPolicy::AvgBased),
            "path-history" | "path-history-avg-based" => Ok(CollisionPolicy::PathHistoryAvgBased),
            _ => Err(ConfigError::UnknownName { kind: "collision policy", name: s.to_string() }),
        }
    }
}
