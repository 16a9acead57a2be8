//! Battery/accuracy trade-off tiers.
//!
//! An [`OptimizationTier`] is a named operating mode that parameterizes
//! how aggressively the device senses location: accuracy class, update
//! interval, how many regions may be active, and whether background
//! processing is allowed. Tier selection lives in
//! [`controller::OptimizationController`].

pub mod controller;

pub use controller::{OptimizationController, PowerSnapshot, UsageMetrics};

use serde::{Deserialize, Serialize};

/// Location accuracy class requested from the sensing substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensingAccuracy {
    Best,
    HundredMeters,
    Kilometer,
    ThreeKilometers,
}

/// Named operating mode trading location accuracy against battery use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationTier {
    HighAccuracy,
    Balanced,
    PowerSave,
    Minimal,
}

/// Immutable parameters carried by a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierParams {
    pub sensing_accuracy: SensingAccuracy,
    pub update_interval_secs: u32,
    pub max_active_regions: usize,
    pub background_processing_allowed: bool,
}

impl OptimizationTier {
    pub fn params(self) -> TierParams {
        match self {
            OptimizationTier::HighAccuracy => TierParams {
                sensing_accuracy: SensingAccuracy::Best,
                update_interval_secs: 15,
                max_active_regions: 20,
                background_processing_allowed: true,
            },
            OptimizationTier::Balanced => TierParams {
                sensing_accuracy: SensingAccuracy::HundredMeters,
                update_interval_secs: 60,
                max_active_regions: 15,
                background_processing_allowed: true,
            },
            OptimizationTier::PowerSave => TierParams {
                sensing_accuracy: SensingAccuracy::Kilometer,
                update_interval_secs: 300,
                max_active_regions: 10,
                background_processing_allowed: false,
            },
            OptimizationTier::Minimal => TierParams {
                sensing_accuracy: SensingAccuracy::ThreeKilometers,
                update_interval_secs: 900,
                max_active_regions: 5,
                background_processing_allowed: false,
            },
        }
    }

    /// One tier less aggressive than `self` (Minimal stays Minimal).
    pub fn downgraded(self) -> Self {
        match self {
            OptimizationTier::HighAccuracy => OptimizationTier::Balanced,
            OptimizationTier::Balanced => OptimizationTier::PowerSave,
            OptimizationTier::PowerSave | OptimizationTier::Minimal => OptimizationTier::Minimal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptimizationTier::HighAccuracy => "high-accuracy",
            OptimizationTier::Balanced => "balanced",
            OptimizationTier::PowerSave => "power-save",
            OptimizationTier::Minimal => "minimal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high-accuracy" => Some(OptimizationTier::HighAccuracy),
            "balanced" => Some(OptimizationTier::Balanced),
            "power-save" => Some(OptimizationTier::PowerSave),
            "minimal" => Some(OptimizationTier::Minimal),
            _ => None,
        }
    }
}

/// Handle into the platform sensing substrate. The real implementation
/// lives outside this core; tests and the CLI use [`NoopSensing`].
pub trait SensingControl {
    fn configure(&mut self, accuracy: SensingAccuracy, update_interval_secs: u32);
}

/// Sensing handle that ignores configuration pushes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSensing;

impl SensingControl for NoopSensing {
    fn configure(&mut self, _accuracy: SensingAccuracy, _update_interval_secs: u32) {}
}
