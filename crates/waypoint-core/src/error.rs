//! Core error types for waypoint-core.
//!
//! This module defines a comprehensive error hierarchy using thiserror
//! for better error handling and reporting across the library.
//!
//! Duplicate signals and cooldown hits are *not* errors -- they are
//! terminal [`crate::geofence::EventStatus`] values on the event record.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for waypoint-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Region allocation errors
    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    /// Notification delivery errors
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Region allocation errors.
#[derive(Error, Debug)]
pub enum RegionError {
    /// The allocator is at capacity and the incoming region does not
    /// outrank the lowest-priority active region. The region is kept in
    /// the pending backlog; the caller may retry after a tier change.
    #[error(
        "Region capacity exceeded: {active}/{capacity} active, incoming priority {incoming_priority} does not beat minimum {min_priority}"
    )]
    CapacityExceeded {
        active: usize,
        capacity: usize,
        incoming_priority: u8,
        min_priority: u8,
    },

    /// No active region with the given id.
    #[error("Region not found: {0}")]
    NotFound(String),
}

/// Notification delivery errors.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Retry chain has used up all attempts.
    #[error("Retries exhausted for notification {notification_id}: {retry_count}/{max_retries}")]
    RetriesExhausted {
        notification_id: String,
        retry_count: u32,
        max_retries: u32,
    },

    /// A mute is already active for the task; cancel or extend it explicitly.
    #[error("Task {task_id} is already muted")]
    AlreadyMuted { task_id: String },

    /// A snooze is already active for the notification.
    #[error("Notification {notification_id} is already snoozed")]
    AlreadySnoozed { notification_id: String },

    /// No active snooze with the given id.
    #[error("Snooze not found: {0}")]
    SnoozeNotFound(String),

    /// No active mute for the given task.
    #[error("No active mute for task {0}")]
    MuteNotFound(String),

    /// No retry record with the given id.
    #[error("Retry record not found: {0}")]
    RetryNotFound(String),

    /// The collaborator classified the failure as permanent; no backoff
    /// cycle is started.
    #[error("Non-retryable delivery failure for notification {notification_id}: {reason}")]
    NonRetryable {
        notification_id: String,
        reason: String,
    },

    /// Compare-and-set on a record's status lost to a concurrent mutation.
    #[error("Status conflict on {record}: expected {expected}, another writer got there first")]
    StatusConflict { record: String, expected: String },
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Latitude outside [-90, 90]
    #[error("Invalid latitude: {0} (must be within [-90, 90])")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180]
    #[error("Invalid longitude: {0} (must be within [-180, 180])")]
    InvalidLongitude(f64),

    /// Region radius must be strictly positive
    #[error("Invalid radius: {0} m (must be > 0)")]
    InvalidRadius(f64),

    /// Duration must be strictly positive
    #[error("Invalid duration for '{field}': {minutes} min (must be > 0)")]
    InvalidDuration { field: String, minutes: i64 },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Row not found
    #[error("Row not found: {0}")]
    RowNotFound(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => {
                DatabaseError::RowNotFound("query returned no rows".to_string())
            }
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
