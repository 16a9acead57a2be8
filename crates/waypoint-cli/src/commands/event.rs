use chrono::Utc;
use clap::Subcommand;
use waypoint_core::{Database, GeoPoint, GeofenceEventType, RawSignal};

use super::{load_allocator, load_controller, load_processor, save_snapshot, PROCESSOR_KEY};

#[derive(Subcommand)]
pub enum EventAction {
    /// Feed a raw region-crossing signal through the processor
    Ingest {
        /// Region the signal fired for
        #[arg(long)]
        region_id: String,
        /// Signal kind (enter, exit, dwell)
        #[arg(long)]
        event_type: String,
        /// Reported latitude
        #[arg(long)]
        lat: f64,
        /// Reported longitude
        #[arg(long)]
        lon: f64,
    },
    /// Print recent events from the audit log, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Event counts grouped by status
    Counts,
}

pub fn run(action: EventAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        EventAction::Ingest {
            region_id,
            event_type,
            lat,
            lon,
        } => {
            let controller = load_controller(&db);
            let allocator = load_allocator(&db, &controller);
            let mut processor = load_processor(&db);

            let kind = GeofenceEventType::parse(&event_type)
                .ok_or_else(|| format!("unknown event type: {event_type}"))?;
            let region = allocator
                .get(&region_id)
                .ok_or_else(|| format!("no active region with id {region_id}"))?
                .clone();
            let signal = RawSignal {
                region_id,
                event_type: kind,
                location: GeoPoint {
                    latitude: lat,
                    longitude: lon,
                },
            };

            let (record, bus_event) = processor.ingest(&signal, &region, Utc::now());
            db.insert_event(&record)?;
            save_snapshot(&db, PROCESSOR_KEY, &processor)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            println!("{}", serde_json::to_string_pretty(&bus_event)?);
        }
        EventAction::List { limit } => {
            let events = db.list_events(limit)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        EventAction::Counts => {
            let counts = db.event_counts()?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
    }
    Ok(())
}
