//! Notification delivery: retry with backoff, snooze, and mute.
//!
//! The actual push send is an external collaborator behind the
//! [`PushSender`] trait; this module owns the lifecycle around it --
//! suppression gating, the retry chain, and the suppression windows
//! themselves.

pub mod mute;
pub mod retry;
pub mod scheduler;
pub mod snooze;

pub use mute::{MuteDuration, MuteStatus, TaskMute};
pub use retry::{calculate_next_retry_time, NotificationRetry, RetryPolicy, RetryStatus};
pub use scheduler::{DeliveryScheduler, SendOutcome};
pub use snooze::{NotificationSnooze, SnoozeDuration, SnoozeStatus};

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Content handed to the push collaborator. The provider wire format is
/// opaque to this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    /// Qualified geofence event this notification was composed from.
    pub event_id: Option<String>,
}

/// Failure classification reported by the push collaborator.
///
/// Timeouts are owned by the collaborator and come back as `Timeout`;
/// they count as transient for retry purposes. `Permanent` failures
/// (e.g. invalid target) never start a backoff cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    Transient(String),
    Permanent(String),
    Timeout,
}

impl SendError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SendError::Permanent(_))
    }
}

/// External push-delivery collaborator.
pub trait PushSender {
    fn send(&self, notification_id: &str, payload: &NotificationPayload) -> Result<(), SendError>;
}

/// Tomorrow at `hour`:00 local time, as UTC.
///
/// Used for `today` snoozes (09:00) and `until-tomorrow` mutes (00:00).
pub(crate) fn tomorrow_local_at(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let local_now = now.with_timezone(&Local);
    let tomorrow = match local_now.date_naive().succ_opt() {
        Some(d) => d,
        // Only reachable at the end of the representable calendar.
        None => return now + Duration::hours(24),
    };
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default();
    match Local.from_local_datetime(&tomorrow.and_time(time)).earliest() {
        Some(t) => t.with_timezone(&Utc),
        // DST gap: fall back to a plain 24h push.
        None => now + Duration::hours(24),
    }
}
