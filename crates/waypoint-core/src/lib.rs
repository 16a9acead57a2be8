//! # Waypoint Core Library
//!
//! Core business logic for Waypoint, a location-based task reminder
//! engine. It implements a CLI-first philosophy where all operations are
//! available via a standalone CLI binary; any GUI or mobile shell is a
//! thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Region allocation**: Bounded monitoring slots with priority
//!   eviction and a pending backlog
//! - **Optimization**: Battery/usage-driven tier selection that resizes
//!   the region set and retunes sensing
//! - **Geofence processing**: Dedup, confidence scoring, cooldowns, and
//!   bundling of raw boundary-crossing signals
//! - **Delivery**: Retry with exponential backoff plus snooze/mute
//!   suppression windows
//! - **Storage**: SQLite-based durable records and TOML-based
//!   configuration
//!
//! All state transitions take an explicit `now` timestamp; the core has
//! no internal timers and no background threads. The composition layer
//! drives sweeps and re-evaluation on its own cadence.
//!
//! ## Key Components
//!
//! - [`RegionAllocator`]: Capacity-bounded region slot manager
//! - [`OptimizationController`]: Tier state machine
//! - [`EventProcessor`]: Raw signal filter pipeline
//! - [`DeliveryScheduler`]: Notification lifecycle around a [`PushSender`]
//! - [`Database`] / [`Config`]: Persistence

pub mod clock;
pub mod delivery;
pub mod error;
pub mod events;
pub mod geofence;
pub mod optimize;
pub mod region;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use delivery::{
    DeliveryScheduler, MuteDuration, NotificationPayload, NotificationRetry, NotificationSnooze,
    PushSender, RetryPolicy, SendError, SendOutcome, SnoozeDuration, TaskMute,
};
pub use error::{
    ConfigError, CoreError, DatabaseError, DeliveryError, RegionError, ValidationError,
};
pub use events::{Event, SuppressionReason};
pub use geofence::{
    EventProcessor, EventStatus, GeofenceEvent, GeofenceEventType, ProcessorConfig, RawSignal,
};
pub use optimize::{
    OptimizationController, OptimizationTier, PowerSnapshot, SensingAccuracy, SensingControl,
    TierParams, UsageMetrics,
};
pub use region::{GeoPoint, MonitoredRegion, RegionAllocator, RegionType};
pub use storage::{Config, Database};
