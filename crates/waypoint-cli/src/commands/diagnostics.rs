use clap::Subcommand;
use serde::Serialize;
use waypoint_core::{Config, Database, OptimizationTier, TierParams};

use super::{load_allocator, load_controller};

#[derive(Subcommand)]
pub enum DiagnosticsAction {
    /// Print a JSON snapshot of the whole system state
    Show,
}

#[derive(Serialize)]
struct Diagnostics {
    tier: OptimizationTier,
    tier_params: TierParams,
    region_capacity: usize,
    active_regions: usize,
    backlogged_regions: usize,
    event_counts: Vec<(String, u64)>,
    open_retries: usize,
    config: Config,
}

pub fn run(action: DiagnosticsAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        DiagnosticsAction::Show => {
            let db = Database::open()?;
            let controller = load_controller(&db);
            let allocator = load_allocator(&db, &controller);
            let open_retries = db
                .list_retries(1_000)?
                .iter()
                .filter(|r| !r.status.is_terminal())
                .count();

            let report = Diagnostics {
                tier: controller.current(),
                tier_params: controller.current().params(),
                region_capacity: allocator.capacity(),
                active_regions: allocator.active_count(),
                backlogged_regions: allocator.backlog_count(),
                event_counts: db.event_counts()?,
                open_retries,
                config: Config::load()?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
