use chrono::Utc;
use clap::Subcommand;
use waypoint_core::{Database, GeoPoint, MonitoredRegion, RegionType};

use super::{load_allocator, load_controller, save_allocator};

#[derive(Subcommand)]
pub enum RegionAction {
    /// Register a region for monitoring
    Add {
        /// Owning task id
        #[arg(long)]
        task_id: String,
        /// Center latitude in degrees
        #[arg(long)]
        lat: f64,
        /// Center longitude in degrees
        #[arg(long)]
        lon: f64,
        /// Proximity tier (approach-5mi, approach-3mi, approach-1mi, arrival, post-arrival)
        #[arg(long)]
        region_type: String,
        /// Radius in meters (defaults per tier)
        #[arg(long)]
        radius: Option<f64>,
    },
    /// Stop monitoring a region
    Remove {
        /// Region id
        region_id: String,
    },
    /// Drop every region owned by a task
    RemoveTask {
        /// Task id
        task_id: String,
    },
    /// Override the region capacity ceiling directly
    ///
    /// Normally the ceiling follows the optimization tier; this is a
    /// manual escape hatch for testing and diagnostics.
    Capacity {
        /// New ceiling
        n: usize,
    },
    /// List active regions as JSON, highest priority first
    List,
    /// List backlogged regions waiting for a slot
    Backlog,
}

pub fn run(action: RegionAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open()?;
    let controller = load_controller(&db);
    let mut allocator = load_allocator(&db, &controller);

    match action {
        RegionAction::Add {
            task_id,
            lat,
            lon,
            region_type,
            radius,
        } => {
            let rt = RegionType::parse(&region_type)
                .ok_or_else(|| format!("unknown region type: {region_type}"))?;
            let center = GeoPoint::new(lat, lon)?;
            let region = MonitoredRegion::new(
                task_id,
                center,
                radius.unwrap_or_else(|| rt.default_radius_meters()),
                rt,
                Utc::now(),
            )?;
            // Rejection still parks the region in the backlog; persist
            // the allocator either way before reporting.
            let result = allocator.register(region);
            save_allocator(&mut db, &allocator)?;
            let outcome = result?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        RegionAction::Remove { region_id } => {
            let outcome = allocator.unregister(&region_id)?;
            save_allocator(&mut db, &allocator)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        RegionAction::RemoveTask { task_id } => {
            let outcome = allocator.unregister_all(&task_id);
            save_allocator(&mut db, &allocator)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        RegionAction::Capacity { n } => {
            let change = allocator.set_capacity(n);
            save_allocator(&mut db, &allocator)?;
            println!("{}", serde_json::to_string_pretty(&change)?);
        }
        RegionAction::List => {
            println!("{}", serde_json::to_string_pretty(&allocator.list_active())?);
        }
        RegionAction::Backlog => {
            println!("{}", serde_json::to_string_pretty(&allocator.list_backlog())?);
        }
    }
    Ok(())
}
