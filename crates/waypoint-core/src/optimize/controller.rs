//! Tier selection from device power state and usage metrics.
//!
//! The controller is re-evaluated on a fixed cadence (caller-driven
//! `tick`, no internal thread) and immediately on every OS power-state
//! change. `apply` is idempotent: re-applying the current tier does
//! nothing and emits nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{OptimizationTier, SensingControl};
use crate::events::Event;
use crate::region::RegionAllocator;

/// Battery level below which the device always runs Minimal.
const CRITICAL_BATTERY: f64 = 0.10;
/// Battery level below which the device runs PowerSave when discharging.
const LOW_BATTERY: f64 = 0.20;
/// Charging above this level unlocks HighAccuracy.
const CHARGED_BATTERY: f64 = 0.80;
/// Rolling daily battery drain attributable to sensing, in percent,
/// beyond which the current tier is downgraded.
const SENSING_DRAIN_BUDGET_PCT: f64 = 3.0;
/// Location update rate beyond which PowerSave is forced.
const UPDATE_RATE_CEILING_PER_HOUR: f64 = 120.0;

/// Device power state as reported by the OS layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSnapshot {
    /// 0.0 - 1.0
    pub battery_level: f64,
    pub is_charging: bool,
    pub is_low_power_mode: bool,
}

/// Rolling sensing usage metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// Rolling daily battery drain attributable to sensing, percent.
    pub sensing_battery_pct_daily: f64,
    /// Location updates received per hour.
    pub updates_per_hour: f64,
}

/// Selects the operating tier and pushes its parameters to the region
/// allocator and the sensing substrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationController {
    current: OptimizationTier,
    last_evaluated: Option<DateTime<Utc>>,
    /// Re-evaluation cadence in seconds (default 5 minutes).
    reevaluate_interval_secs: u64,
}

impl Default for OptimizationController {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationController {
    pub fn new() -> Self {
        Self {
            current: OptimizationTier::Balanced,
            last_evaluated: None,
            reevaluate_interval_secs: 300,
        }
    }

    pub fn with_interval(reevaluate_interval_secs: u64) -> Self {
        Self {
            reevaluate_interval_secs,
            ..Self::new()
        }
    }

    pub fn current(&self) -> OptimizationTier {
        self.current
    }

    /// Pick the tier for the given device state. First matching rule wins:
    ///
    /// 1. low-power mode or battery below 10% -> Minimal
    /// 2. charging above 80% -> HighAccuracy
    /// 3. battery below 20% -> PowerSave
    /// 4. sensing drain over budget -> one tier down from current
    /// 5. update rate over ceiling -> PowerSave
    /// 6. otherwise -> Balanced
    pub fn evaluate(&self, power: &PowerSnapshot, usage: &UsageMetrics) -> OptimizationTier {
        if power.is_low_power_mode || power.battery_level < CRITICAL_BATTERY {
            return OptimizationTier::Minimal;
        }
        if power.is_charging && power.battery_level > CHARGED_BATTERY {
            return OptimizationTier::HighAccuracy;
        }
        if power.battery_level < LOW_BATTERY {
            return OptimizationTier::PowerSave;
        }
        if usage.sensing_battery_pct_daily > SENSING_DRAIN_BUDGET_PCT {
            return match self.current {
                OptimizationTier::Balanced => OptimizationTier::PowerSave,
                _ => OptimizationTier::Minimal,
            };
        }
        if usage.updates_per_hour > UPDATE_RATE_CEILING_PER_HOUR {
            return OptimizationTier::PowerSave;
        }
        OptimizationTier::Balanced
    }

    /// Apply a tier: push the region ceiling to the allocator and the
    /// sensing parameters to the substrate. Re-applying the current tier
    /// is a no-op and emits no events.
    pub fn apply(
        &mut self,
        tier: OptimizationTier,
        allocator: &mut RegionAllocator,
        sensing: &mut dyn SensingControl,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        if tier == self.current {
            debug!(tier = tier.as_str(), "tier unchanged, apply is a no-op");
            return Vec::new();
        }
        let previous = self.current;
        self.current = tier;
        let params = tier.params();
        info!(
            from = previous.as_str(),
            to = tier.as_str(),
            max_regions = params.max_active_regions,
            "optimization tier changed"
        );

        let change = allocator.set_capacity(params.max_active_regions);
        sensing.configure(params.sensing_accuracy, params.update_interval_secs);

        let mut events = vec![Event::TierChanged {
            previous,
            current: tier,
            max_active_regions: params.max_active_regions,
            update_interval_secs: params.update_interval_secs,
            at: now,
        }];
        for region in change.evicted {
            events.push(Event::RegionEvicted {
                region_id: region.id,
                task_id: region.task_id,
                region_type: region.region_type,
                at: now,
            });
        }
        for region in change.readmitted {
            events.push(Event::RegionReadmitted {
                region_id: region.id,
                task_id: region.task_id,
                region_type: region.region_type,
                at: now,
            });
        }
        events
    }

    /// Periodic re-evaluation. Only acts when the cadence has elapsed;
    /// call freely from the host loop.
    pub fn tick(
        &mut self,
        power: &PowerSnapshot,
        usage: &UsageMetrics,
        allocator: &mut RegionAllocator,
        sensing: &mut dyn SensingControl,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let due = match self.last_evaluated {
            None => true,
            Some(last) => {
                (now - last).num_seconds() >= self.reevaluate_interval_secs as i64
            }
        };
        if !due {
            return Vec::new();
        }
        self.last_evaluated = Some(now);
        let tier = self.evaluate(power, usage);
        self.apply(tier, allocator, sensing, now)
    }

    /// Immediate re-evaluation on an OS power-state change notification.
    pub fn on_power_state_change(
        &mut self,
        power: &PowerSnapshot,
        usage: &UsageMetrics,
        allocator: &mut RegionAllocator,
        sensing: &mut dyn SensingControl,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        self.last_evaluated = Some(now);
        let tier = self.evaluate(power, usage);
        self.apply(tier, allocator, sensing, now)
    }
}
