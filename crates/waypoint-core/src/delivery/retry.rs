//! Retry records and backoff calculation.
//!
//! One [`NotificationRetry`] per outbound notification attempt chain,
//! created at the first delivery failure and terminated on success or
//! exhaustion. The backoff calculation is a pure function of the retry
//! count so it can be tested without a clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::NotificationPayload;

fn default_base_delay_secs() -> u64 {
    300
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_delay_secs() -> u64 {
    3_600
}
fn default_max_retries() -> u32 {
    3
}

/// Tunable backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry (default 5 minutes).
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Ceiling on any single delay (default 60 minutes).
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_secs: default_max_delay_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry_count`:
    /// `min(max_delay, base_delay * multiplier^retry_count)`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let raw = self.base_delay_secs as f64 * self.backoff_multiplier.powi(retry_count as i32);
        let capped = raw.min(self.max_delay_secs as f64);
        Duration::seconds(capped as i64)
    }
}

/// `now + min(max_delay, base_delay * multiplier^retry_count)`.
pub fn calculate_next_retry_time(
    now: DateTime<Utc>,
    retry_count: u32,
    policy: &RetryPolicy,
) -> DateTime<Utc> {
    now + policy.delay_for(retry_count)
}

/// State of a retry chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStatus {
    /// Waiting for `next_retry_time`.
    Pending,
    /// A send attempt is in flight.
    Retrying,
    Succeeded,
    Failed,
}

impl RetryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RetryStatus::Pending => "pending",
            RetryStatus::Retrying => "retrying",
            RetryStatus::Succeeded => "succeeded",
            RetryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RetryStatus::Pending),
            "retrying" => Some(RetryStatus::Retrying),
            "succeeded" => Some(RetryStatus::Succeeded),
            "failed" => Some(RetryStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RetryStatus::Succeeded | RetryStatus::Failed)
    }
}

/// One outbound notification's retry chain.
///
/// `retry_count` is the number of failed attempts consumed so far. The
/// payload is carried so the sweep can re-send after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRetry {
    pub id: String,
    pub notification_id: String,
    pub task_id: String,
    pub payload: NotificationPayload,
    pub retry_count: u32,
    pub next_retry_time: DateTime<Utc>,
    pub backoff_multiplier: f64,
    pub max_retries: u32,
    pub status: RetryStatus,
    pub created_at: DateTime<Utc>,
}

impl NotificationRetry {
    /// Open a chain after the first delivery failure.
    pub fn new(
        notification_id: impl Into<String>,
        task_id: impl Into<String>,
        payload: NotificationPayload,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            notification_id: notification_id.into(),
            task_id: task_id.into(),
            payload,
            retry_count: 0,
            next_retry_time: calculate_next_retry_time(now, 0, policy),
            backoff_multiplier: policy.backoff_multiplier,
            max_retries: policy.max_retries,
            status: RetryStatus::Pending,
            created_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RetryStatus::Pending && self.next_retry_time <= now
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}
