//! Task-level mute windows.
//!
//! A mute suppresses every notification for a task without deleting the
//! underlying events. At most one active mute per task; creating a
//! second fails with `AlreadyMuted` so the caller chooses cancel vs
//! extend explicitly.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::tomorrow_local_at;

/// How long to mute. `UntilTomorrow` means next day 00:00 local;
/// `Permanent` never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MuteDuration {
    OneHour,
    FourHours,
    EightHours,
    TwentyFourHours,
    UntilTomorrow,
    Permanent,
}

impl MuteDuration {
    pub fn to_token(self) -> &'static str {
        match self {
            MuteDuration::OneHour => "1h",
            MuteDuration::FourHours => "4h",
            MuteDuration::EightHours => "8h",
            MuteDuration::TwentyFourHours => "24h",
            MuteDuration::UntilTomorrow => "until-tomorrow",
            MuteDuration::Permanent => "permanent",
        }
    }

    pub fn parse_token(s: &str) -> Option<Self> {
        match s {
            "1h" => Some(MuteDuration::OneHour),
            "4h" => Some(MuteDuration::FourHours),
            "8h" => Some(MuteDuration::EightHours),
            "24h" => Some(MuteDuration::TwentyFourHours),
            "until-tomorrow" => Some(MuteDuration::UntilTomorrow),
            "permanent" => Some(MuteDuration::Permanent),
            _ => None,
        }
    }
}

/// When the mute lifts; `None` for permanent.
pub fn mute_until(duration: MuteDuration, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match duration {
        MuteDuration::OneHour => Some(now + Duration::hours(1)),
        MuteDuration::FourHours => Some(now + Duration::hours(4)),
        MuteDuration::EightHours => Some(now + Duration::hours(8)),
        MuteDuration::TwentyFourHours => Some(now + Duration::hours(24)),
        MuteDuration::UntilTomorrow => Some(tomorrow_local_at(now, 0)),
        MuteDuration::Permanent => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuteStatus {
    Active,
    Expired,
    Cancelled,
}

impl MuteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MuteStatus::Active => "active",
            MuteStatus::Expired => "expired",
            MuteStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(MuteStatus::Active),
            "expired" => Some(MuteStatus::Expired),
            "cancelled" => Some(MuteStatus::Cancelled),
            _ => None,
        }
    }
}

/// Suppression window covering every notification of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMute {
    pub id: String,
    pub task_id: String,
    pub duration: MuteDuration,
    /// None iff permanent.
    pub mute_until: Option<DateTime<Utc>>,
    pub status: MuteStatus,
    pub created_at: DateTime<Utc>,
}

impl TaskMute {
    pub fn new(task_id: impl Into<String>, duration: MuteDuration, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            duration,
            mute_until: mute_until(duration, now),
            status: MuteStatus::Active,
            created_at: now,
        }
    }

    /// Still suppressing sends at `now`. Permanent mutes never lapse.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == MuteStatus::Active && self.mute_until.map_or(true, |until| now < until)
    }

    /// Active by status but past its window; due for lazy expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == MuteStatus::Active && self.mute_until.is_some_and(|until| now >= until)
    }
}
