//! Geofence event types and the signal processing pipeline.
//!
//! Raw enter/exit/dwell signals from the sensing substrate become
//! [`GeofenceEvent`] records here. Every signal produces exactly one
//! record and one status transition; the event log is append-only and
//! retained for audit.

pub mod processor;

pub use processor::{EventProcessor, ProcessorConfig};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::region::GeoPoint;

/// Kind of region crossing reported by the sensing substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeofenceEventType {
    Enter,
    Exit,
    Dwell,
}

impl GeofenceEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            GeofenceEventType::Enter => "enter",
            GeofenceEventType::Exit => "exit",
            GeofenceEventType::Dwell => "dwell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enter" => Some(GeofenceEventType::Enter),
            "exit" => Some(GeofenceEventType::Exit),
            "dwell" => Some(GeofenceEventType::Dwell),
            _ => None,
        }
    }
}

/// Terminal processing status of a geofence event.
///
/// Each event transitions from `Pending` exactly once. `Duplicate` and
/// `Cooldown` are expected outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processed,
    Failed,
    Duplicate,
    Cooldown,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processed => "processed",
            EventStatus::Failed => "failed",
            EventStatus::Duplicate => "duplicate",
            EventStatus::Cooldown => "cooldown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EventStatus::Pending),
            "processed" => Some(EventStatus::Processed),
            "failed" => Some(EventStatus::Failed),
            "duplicate" => Some(EventStatus::Duplicate),
            "cooldown" => Some(EventStatus::Cooldown),
            _ => None,
        }
    }
}

/// Raw region-crossing signal as delivered by the sensing substrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignal {
    pub region_id: String,
    pub event_type: GeofenceEventType,
    pub location: GeoPoint,
}

/// A processed region-crossing event.
///
/// Created on every raw signal and mutated only by [`EventProcessor`];
/// retained for audit, never deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceEvent {
    pub id: String,
    pub task_id: String,
    pub region_id: String,
    pub event_type: GeofenceEventType,
    pub location: GeoPoint,
    /// 0.0 - 1.0, from signal distance relative to the region radius.
    pub confidence: f64,
    /// Confidence fell below the configured floor. Delivery is not
    /// hard-blocked; the composition layer decides policy.
    pub low_confidence: bool,
    pub status: EventStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub notification_sent: bool,
    /// Representative sibling event this one was bundled under.
    pub bundled_with: Option<String>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl GeofenceEvent {
    /// Qualifies for notification: processed and not folded into a bundle.
    pub fn qualifies_for_notification(&self) -> bool {
        self.status == EventStatus::Processed && self.bundled_with.is_none()
    }
}
