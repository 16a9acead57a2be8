use clap::Subcommand;
use tracing::info;
use waypoint_core::{Clock, Config, Database, DeliveryScheduler, Event, SystemClock};

use super::ConsoleSender;

#[derive(Subcommand)]
pub enum SweepAction {
    /// Run one retry sweep and one expiry sweep
    Run,
    /// Run sweeps continuously on the configured cadence
    Watch,
}

fn sweep_once(
    db: &Database,
    scheduler: &DeliveryScheduler,
    clock: &dyn Clock,
) -> Result<Vec<Event>, Box<dyn std::error::Error>> {
    let now = clock.now();
    let mut events = scheduler.retry_sweep(db, &ConsoleSender, now)?;
    events.extend(scheduler.expiry_sweep(db, now)?);
    Ok(events)
}

pub fn run(action: SweepAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let config = Config::load()?;
    let scheduler = DeliveryScheduler::new(config.retry);
    let clock = SystemClock;

    match action {
        SweepAction::Run => {
            let events = sweep_once(&db, &scheduler, &clock)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        SweepAction::Watch => {
            let period = std::time::Duration::from_secs(config.sweeps.sweep_interval_secs);
            info!(interval_secs = config.sweeps.sweep_interval_secs, "sweep watch started");
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(async {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    match sweep_once(&db, &scheduler, &clock) {
                        Ok(events) if !events.is_empty() => {
                            match serde_json::to_string_pretty(&events) {
                                Ok(json) => println!("{json}"),
                                Err(e) => eprintln!("sweep output error: {e}"),
                            }
                        }
                        Ok(_) => {}
                        Err(e) => eprintln!("sweep error: {e}"),
                    }
                }
            })
        }
    }
    Ok(())
}
