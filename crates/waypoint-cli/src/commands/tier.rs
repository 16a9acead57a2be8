use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;
use waypoint_core::optimize::NoopSensing;
use waypoint_core::{Database, OptimizationTier, PowerSnapshot, UsageMetrics};

use super::{load_allocator, load_controller, save_allocator, save_snapshot, CONTROLLER_KEY};

#[derive(Subcommand)]
pub enum TierAction {
    /// Print the current tier and its parameters
    Status,
    /// Re-evaluate the tier from a device power snapshot
    Evaluate {
        /// Battery level, 0.0 - 1.0
        #[arg(long)]
        battery: f64,
        /// Device is charging
        #[arg(long)]
        charging: bool,
        /// OS low-power mode is on
        #[arg(long)]
        low_power: bool,
        /// Rolling daily sensing battery drain, percent
        #[arg(long, default_value = "0")]
        drain: f64,
        /// Location updates per hour
        #[arg(long, default_value = "0")]
        updates_per_hour: f64,
    },
    /// Force a tier (high-accuracy, balanced, power-save, minimal)
    Set {
        tier: String,
    },
}

#[derive(Serialize)]
struct TierStatus {
    tier: OptimizationTier,
    params: waypoint_core::TierParams,
    active_regions: usize,
    backlogged_regions: usize,
}

pub fn run(action: TierAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open()?;
    let mut controller = load_controller(&db);
    let mut allocator = load_allocator(&db, &controller);
    let mut sensing = NoopSensing;

    match action {
        TierAction::Status => {
            let status = TierStatus {
                tier: controller.current(),
                params: controller.current().params(),
                active_regions: allocator.active_count(),
                backlogged_regions: allocator.backlog_count(),
            };
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        TierAction::Evaluate {
            battery,
            charging,
            low_power,
            drain,
            updates_per_hour,
        } => {
            let power = PowerSnapshot {
                battery_level: battery,
                is_charging: charging,
                is_low_power_mode: low_power,
            };
            let usage = UsageMetrics {
                sensing_battery_pct_daily: drain,
                updates_per_hour,
            };
            let events =
                controller.on_power_state_change(&power, &usage, &mut allocator, &mut sensing, Utc::now());
            save_snapshot(&db, CONTROLLER_KEY, &controller)?;
            save_allocator(&mut db, &allocator)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        TierAction::Set { tier } => {
            let tier =
                OptimizationTier::parse(&tier).ok_or_else(|| format!("unknown tier: {tier}"))?;
            let events = controller.apply(tier, &mut allocator, &mut sensing, Utc::now());
            save_snapshot(&db, CONTROLLER_KEY, &controller)?;
            save_allocator(&mut db, &allocator)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }
    Ok(())
}
