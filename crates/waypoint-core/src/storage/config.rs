//! TOML-based tunables.
//!
//! The processing windows, backoff parameters, and sweep cadences are
//! observed defaults rather than contracts, so they all live here and
//! can be overridden per install. Stored at
//! `~/.config/waypoint/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::delivery::RetryPolicy;
use crate::error::{ConfigError, CoreError};
use crate::geofence::ProcessorConfig;

fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_reevaluate_interval_secs() -> u64 {
    300
}

/// Cadences for the periodic sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Retry + expiry sweep interval (default 30s).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Optimization tier re-evaluation interval (default 5 minutes).
    #[serde(default = "default_reevaluate_interval_secs")]
    pub reevaluate_interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            reevaluate_interval_secs: default_reevaluate_interval_secs(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub geofence: ProcessorConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub sweeps: SweepConfig,
}

impl Config {
    pub fn path() -> Result<PathBuf, CoreError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load the configuration, falling back to defaults when the file
    /// doesn't exist yet.
    pub fn load() -> Result<Self, CoreError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), CoreError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Set a tunable by dotted key, e.g. `geofence.dedup_window_secs`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        let invalid = |message: String| {
            CoreError::Config(ConfigError::InvalidValue {
                key: key.to_string(),
                message,
            })
        };
        let parse_i64 = |v: &str| v.parse::<i64>().map_err(|e| invalid(e.to_string()));
        let parse_u64 = |v: &str| v.parse::<u64>().map_err(|e| invalid(e.to_string()));
        let parse_u32 = |v: &str| v.parse::<u32>().map_err(|e| invalid(e.to_string()));
        let parse_f64 = |v: &str| v.parse::<f64>().map_err(|e| invalid(e.to_string()));

        match key {
            "geofence.dedup_window_secs" => self.geofence.dedup_window_secs = parse_i64(value)?,
            "geofence.bundle_window_secs" => self.geofence.bundle_window_secs = parse_i64(value)?,
            "geofence.confidence_floor" => self.geofence.confidence_floor = parse_f64(value)?,
            "geofence.arrival_cooldown_min" => {
                self.geofence.arrival_cooldown_min = parse_i64(value)?
            }
            "geofence.post_arrival_cooldown_min" => {
                self.geofence.post_arrival_cooldown_min = parse_i64(value)?
            }
            "geofence.approach_cooldown_min" => {
                self.geofence.approach_cooldown_min = parse_i64(value)?
            }
            "retry.base_delay_secs" => self.retry.base_delay_secs = parse_u64(value)?,
            "retry.backoff_multiplier" => self.retry.backoff_multiplier = parse_f64(value)?,
            "retry.max_delay_secs" => self.retry.max_delay_secs = parse_u64(value)?,
            "retry.max_retries" => self.retry.max_retries = parse_u32(value)?,
            "sweeps.sweep_interval_secs" => self.sweeps.sweep_interval_secs = parse_u64(value)?,
            "sweeps.reevaluate_interval_secs" => {
                self.sweeps.reevaluate_interval_secs = parse_u64(value)?
            }
            _ => return Err(invalid("unknown key".to_string())),
        }
        Ok(())
    }
}
