use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geofence::{EventStatus, GeofenceEventType};
use crate::optimize::OptimizationTier;
use crate::region::RegionType;

/// Why a send was suppressed without creating a retry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuppressionReason {
    Snoozed,
    Muted,
}

/// Every state change in the core produces an Event.
/// The composition layer consumes them; the CLI prints them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Operating tier changed (never emitted for an idempotent re-apply).
    TierChanged {
        previous: OptimizationTier,
        current: OptimizationTier,
        max_active_regions: usize,
        update_interval_secs: u32,
        at: DateTime<Utc>,
    },
    /// A region lost its monitoring slot.
    RegionEvicted {
        region_id: String,
        task_id: String,
        region_type: RegionType,
        at: DateTime<Utc>,
    },
    /// A backlogged region regained a monitoring slot.
    RegionReadmitted {
        region_id: String,
        task_id: String,
        region_type: RegionType,
        at: DateTime<Utc>,
    },
    /// A geofence event qualified for notification.
    EventQualified {
        event_id: String,
        task_id: String,
        region_id: String,
        event_type: GeofenceEventType,
        confidence: f64,
        low_confidence: bool,
        at: DateTime<Utc>,
    },
    /// A geofence event was folded under a sibling for the same task.
    EventBundled {
        event_id: String,
        bundled_with: String,
        task_id: String,
        at: DateTime<Utc>,
    },
    /// A geofence event terminated without qualifying (duplicate,
    /// cooldown, or failed).
    EventSuppressed {
        event_id: String,
        region_id: String,
        event_type: GeofenceEventType,
        status: EventStatus,
        at: DateTime<Utc>,
    },
    NotificationSent {
        notification_id: String,
        task_id: String,
        at: DateTime<Utc>,
    },
    /// Send suppressed by an active snooze or mute; no retry created.
    NotificationSuppressed {
        notification_id: String,
        task_id: String,
        reason: SuppressionReason,
        until: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    RetryScheduled {
        retry_id: String,
        notification_id: String,
        retry_count: u32,
        next_retry_time: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Retry chain hit its attempt ceiling; terminal failure surfaced to
    /// the composition layer.
    RetriesExhausted {
        retry_id: String,
        notification_id: String,
        retry_count: u32,
        at: DateTime<Utc>,
    },
    /// The collaborator classified the failure as permanent.
    DeliveryRejected {
        notification_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    SnoozeCreated {
        snooze_id: String,
        notification_id: String,
        task_id: String,
        snooze_until: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    SnoozeExtended {
        snooze_id: String,
        notification_id: String,
        snooze_until: DateTime<Utc>,
        snooze_count: u32,
        at: DateTime<Utc>,
    },
    SnoozeCancelled {
        snooze_id: String,
        notification_id: String,
        at: DateTime<Utc>,
    },
    SnoozeExpired {
        snooze_id: String,
        notification_id: String,
        at: DateTime<Utc>,
    },
    MuteCreated {
        mute_id: String,
        task_id: String,
        /// None means permanent.
        mute_until: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    MuteCancelled {
        mute_id: String,
        task_id: String,
        at: DateTime<Utc>,
    },
    MuteExpired {
        mute_id: String,
        task_id: String,
        at: DateTime<Utc>,
    },
}
