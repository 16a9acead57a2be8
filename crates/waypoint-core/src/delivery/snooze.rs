//! User-initiated snooze of a specific notification.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::tomorrow_local_at;
use crate::error::ValidationError;

/// How long to snooze. `Today` means next day 09:00 local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SnoozeDuration {
    FifteenMinutes,
    OneHour,
    Today,
    Custom { minutes: i64 },
}

impl SnoozeDuration {
    /// Compact token used in the database and on the CLI.
    pub fn to_token(self) -> String {
        match self {
            SnoozeDuration::FifteenMinutes => "15m".to_string(),
            SnoozeDuration::OneHour => "1h".to_string(),
            SnoozeDuration::Today => "today".to_string(),
            SnoozeDuration::Custom { minutes } => format!("custom:{minutes}"),
        }
    }

    pub fn parse_token(s: &str) -> Option<Self> {
        match s {
            "15m" => Some(SnoozeDuration::FifteenMinutes),
            "1h" => Some(SnoozeDuration::OneHour),
            "today" => Some(SnoozeDuration::Today),
            _ => {
                let minutes = s.strip_prefix("custom:")?.parse().ok()?;
                Some(SnoozeDuration::Custom { minutes })
            }
        }
    }
}

/// When the snooze lifts, computed from the duration.
///
/// # Errors
/// `InvalidDuration` for non-positive custom durations.
pub fn snooze_until(
    duration: SnoozeDuration,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ValidationError> {
    match duration {
        SnoozeDuration::FifteenMinutes => Ok(now + Duration::minutes(15)),
        SnoozeDuration::OneHour => Ok(now + Duration::minutes(60)),
        SnoozeDuration::Today => Ok(tomorrow_local_at(now, 9)),
        SnoozeDuration::Custom { minutes } => {
            if minutes <= 0 {
                return Err(ValidationError::InvalidDuration {
                    field: "snooze".to_string(),
                    minutes,
                });
            }
            Ok(now + Duration::minutes(minutes))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnoozeStatus {
    Active,
    Expired,
    Cancelled,
}

impl SnoozeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SnoozeStatus::Active => "active",
            SnoozeStatus::Expired => "expired",
            SnoozeStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SnoozeStatus::Active),
            "expired" => Some(SnoozeStatus::Expired),
            "cancelled" => Some(SnoozeStatus::Cancelled),
            _ => None,
        }
    }
}

/// Suppression window for one notification. At most one active snooze
/// per notification; extension bumps `snooze_count` and never moves
/// `snooze_until` backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSnooze {
    pub id: String,
    pub task_id: String,
    pub notification_id: String,
    pub duration: SnoozeDuration,
    pub snooze_until: DateTime<Utc>,
    pub snooze_count: u32,
    pub status: SnoozeStatus,
    pub created_at: DateTime<Utc>,
}

impl NotificationSnooze {
    pub fn new(
        task_id: impl Into<String>,
        notification_id: impl Into<String>,
        duration: SnoozeDuration,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            notification_id: notification_id.into(),
            duration,
            snooze_until: snooze_until(duration, now)?,
            snooze_count: 1,
            status: SnoozeStatus::Active,
            created_at: now,
        })
    }

    /// Still suppressing sends at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SnoozeStatus::Active && now < self.snooze_until
    }

    /// Active by status but past its window; due for lazy expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SnoozeStatus::Active && now >= self.snooze_until
    }
}
