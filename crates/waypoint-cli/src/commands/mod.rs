//! CLI subcommands and the kv-snapshot plumbing shared between them.
//!
//! The core engines (allocator, controller, processor) are plain
//! serializable state machines; each invocation loads them from the kv
//! store, applies one mutation, and writes them back. The active region
//! set is additionally mirrored into its own table so diagnostics and
//! external tooling can read it without decoding a snapshot.

pub mod config;
pub mod diagnostics;
pub mod event;
pub mod notify;
pub mod region;
pub mod sweep;
pub mod tier;

use waypoint_core::{
    Database, EventProcessor, NotificationPayload, OptimizationController, PushSender,
    RegionAllocator, SendError,
};

pub(crate) const ALLOCATOR_KEY: &str = "region_allocator";
pub(crate) const CONTROLLER_KEY: &str = "optimization_controller";
pub(crate) const PROCESSOR_KEY: &str = "event_processor";

type CliResult = Result<(), Box<dyn std::error::Error>>;

pub(crate) fn load_controller(db: &Database) -> OptimizationController {
    if let Ok(Some(json)) = db.kv_get(CONTROLLER_KEY) {
        if let Ok(controller) = serde_json::from_str::<OptimizationController>(&json) {
            return controller;
        }
    }
    OptimizationController::new()
}

/// Load the allocator snapshot, defaulting to the current tier's region
/// ceiling on first run.
pub(crate) fn load_allocator(db: &Database, controller: &OptimizationController) -> RegionAllocator {
    if let Ok(Some(json)) = db.kv_get(ALLOCATOR_KEY) {
        if let Ok(allocator) = serde_json::from_str::<RegionAllocator>(&json) {
            return allocator;
        }
    }
    RegionAllocator::new(controller.current().params().max_active_regions)
}

pub(crate) fn load_processor(db: &Database) -> EventProcessor {
    if let Ok(Some(json)) = db.kv_get(PROCESSOR_KEY) {
        if let Ok(processor) = serde_json::from_str::<EventProcessor>(&json) {
            return processor;
        }
    }
    let config = waypoint_core::Config::load().unwrap_or_default();
    EventProcessor::new(config.geofence)
}

pub(crate) fn save_snapshot<T: serde::Serialize>(db: &Database, key: &str, value: &T) -> CliResult {
    let json = serde_json::to_string(value)?;
    db.kv_set(key, &json)?;
    Ok(())
}

/// Persist the allocator snapshot and mirror its active set.
pub(crate) fn save_allocator(db: &mut Database, allocator: &RegionAllocator) -> CliResult {
    save_snapshot(db, ALLOCATOR_KEY, allocator)?;
    db.replace_regions(&allocator.list_active())?;
    Ok(())
}

/// Push sender used by the CLI: prints the notification to stdout.
/// A real deployment wires a platform push service here instead.
pub(crate) struct ConsoleSender;

impl PushSender for ConsoleSender {
    fn send(&self, notification_id: &str, payload: &NotificationPayload) -> Result<(), SendError> {
        println!("[push {notification_id}] {}: {}", payload.title, payload.body);
        Ok(())
    }
}
