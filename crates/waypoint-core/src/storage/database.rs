//! SQLite-backed durable state.
//!
//! Everything this core owns survives a process restart here:
//! - the monitored region set (mirrored for diagnostics and reload)
//! - the append-only geofence event log
//! - notification retry / snooze / mute records
//! - a key-value store for component snapshots
//!
//! Status mutations on delivery records go through conditional updates
//! (`... WHERE status = ?`), which is what makes sweeps idempotent
//! against concurrent cancel/extend calls.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::data_dir;
use crate::delivery::{
    MuteDuration, MuteStatus, NotificationRetry, NotificationSnooze, RetryStatus, SnoozeDuration,
    SnoozeStatus, TaskMute,
};
use crate::error::DatabaseError;
use crate::geofence::{EventStatus, GeofenceEvent, GeofenceEventType};
use crate::region::{GeoPoint, MonitoredRegion, RegionType};

/// SQLite database for the core's durable state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/waypoint/waypoint.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let path = data_dir()
            .map_err(|e| DatabaseError::QueryFailed(format!("cannot resolve data dir: {e}")))?
            .join("waypoint.db");
        Self::open_at(&path)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &std::path::Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS monitored_regions (
                    id            TEXT PRIMARY KEY,
                    task_id       TEXT NOT NULL,
                    latitude      REAL NOT NULL,
                    longitude     REAL NOT NULL,
                    radius_meters REAL NOT NULL,
                    region_type   TEXT NOT NULL,
                    created_at    TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS geofence_events (
                    id                TEXT PRIMARY KEY,
                    task_id           TEXT NOT NULL,
                    region_id         TEXT NOT NULL,
                    event_type        TEXT NOT NULL,
                    latitude          REAL NOT NULL,
                    longitude         REAL NOT NULL,
                    confidence        REAL NOT NULL,
                    low_confidence    INTEGER NOT NULL DEFAULT 0,
                    status            TEXT NOT NULL,
                    processed_at      TEXT,
                    notification_sent INTEGER NOT NULL DEFAULT 0,
                    bundled_with      TEXT,
                    cooldown_until    TEXT,
                    created_at        TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS notification_retries (
                    id                 TEXT PRIMARY KEY,
                    notification_id    TEXT NOT NULL,
                    task_id            TEXT NOT NULL,
                    payload            TEXT NOT NULL,
                    retry_count        INTEGER NOT NULL,
                    next_retry_time    TEXT NOT NULL,
                    backoff_multiplier REAL NOT NULL,
                    max_retries        INTEGER NOT NULL,
                    status             TEXT NOT NULL,
                    created_at         TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS notification_snoozes (
                    id              TEXT PRIMARY KEY,
                    task_id         TEXT NOT NULL,
                    notification_id TEXT NOT NULL,
                    duration        TEXT NOT NULL,
                    snooze_until    TEXT NOT NULL,
                    snooze_count    INTEGER NOT NULL,
                    status          TEXT NOT NULL,
                    created_at      TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS task_mutes (
                    id         TEXT PRIMARY KEY,
                    task_id    TEXT NOT NULL,
                    duration   TEXT NOT NULL,
                    mute_until TEXT,
                    status     TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                -- Indexes for the hot query paths
                CREATE INDEX IF NOT EXISTS idx_events_created_at ON geofence_events(created_at);
                CREATE INDEX IF NOT EXISTS idx_events_status ON geofence_events(status);
                CREATE INDEX IF NOT EXISTS idx_retries_due ON notification_retries(status, next_retry_time);
                CREATE INDEX IF NOT EXISTS idx_snoozes_notification ON notification_snoozes(notification_id, status);
                CREATE INDEX IF NOT EXISTS idx_mutes_task ON task_mutes(task_id, status);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    // ── Key-value snapshots ──────────────────────────────────────────

    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // ── Monitored regions ────────────────────────────────────────────

    /// Replace the persisted region mirror with the allocator's current
    /// active set.
    pub fn replace_regions(&mut self, regions: &[MonitoredRegion]) -> Result<(), DatabaseError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM monitored_regions", [])?;
        for region in regions {
            tx.execute(
                "INSERT INTO monitored_regions
                 (id, task_id, latitude, longitude, radius_meters, region_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    region.id,
                    region.task_id,
                    region.center.latitude,
                    region.center.longitude,
                    region.radius_meters,
                    region.region_type.as_str(),
                    region.created_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_regions(&self) -> Result<Vec<MonitoredRegion>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, task_id, latitude, longitude, radius_meters, region_type, created_at FROM monitored_regions")?;
        let rows = stmt.query_map([], region_from_row)?;
        let mut regions = Vec::new();
        for row in rows {
            regions.push(row?);
        }
        Ok(regions)
    }

    // ── Geofence event log ───────────────────────────────────────────

    pub fn insert_event(&self, event: &GeofenceEvent) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO geofence_events
             (id, task_id, region_id, event_type, latitude, longitude, confidence,
              low_confidence, status, processed_at, notification_sent, bundled_with,
              cooldown_until, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                event.id,
                event.task_id,
                event.region_id,
                event.event_type.as_str(),
                event.location.latitude,
                event.location.longitude,
                event.confidence,
                event.low_confidence,
                event.status.as_str(),
                event.processed_at,
                event.notification_sent,
                event.bundled_with,
                event.cooldown_until,
                event.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn mark_notification_sent(&self, event_id: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE geofence_events SET notification_sent = 1 WHERE id = ?1",
            params![event_id],
        )?;
        Ok(())
    }

    /// Most recent events first.
    pub fn list_events(&self, limit: usize) -> Result<Vec<GeofenceEvent>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, region_id, event_type, latitude, longitude, confidence,
                    low_confidence, status, processed_at, notification_sent, bundled_with,
                    cooldown_until, created_at
             FROM geofence_events ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], event_from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Event counts grouped by status (diagnostics).
    pub fn event_counts(&self) -> Result<Vec<(String, u64)>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM geofence_events GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    // ── Notification retries ─────────────────────────────────────────

    pub fn insert_retry(&self, retry: &NotificationRetry) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(&retry.payload)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO notification_retries
             (id, notification_id, task_id, payload, retry_count, next_retry_time,
              backoff_multiplier, max_retries, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                retry.id,
                retry.notification_id,
                retry.task_id,
                payload,
                retry.retry_count,
                retry.next_retry_time,
                retry.backoff_multiplier,
                retry.max_retries,
                retry.status.as_str(),
                retry.created_at,
            ],
        )?;
        Ok(())
    }

    /// The non-terminal retry chain for a notification, if one is open.
    pub fn open_retry_for_notification(
        &self,
        notification_id: &str,
    ) -> Result<Option<NotificationRetry>, DatabaseError> {
        let retry = self
            .conn
            .query_row(
                "SELECT id, notification_id, task_id, payload, retry_count, next_retry_time,
                        backoff_multiplier, max_retries, status, created_at
                 FROM notification_retries
                 WHERE notification_id = ?1 AND status IN ('pending', 'retrying')
                 ORDER BY created_at DESC LIMIT 1",
                params![notification_id],
                retry_from_row,
            )
            .optional()?;
        Ok(retry)
    }

    /// Pending retries whose `next_retry_time` has passed.
    pub fn due_retries(&self, now: DateTime<Utc>) -> Result<Vec<NotificationRetry>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, notification_id, task_id, payload, retry_count, next_retry_time,
                    backoff_multiplier, max_retries, status, created_at
             FROM notification_retries
             WHERE status = 'pending' AND next_retry_time <= ?1
             ORDER BY next_retry_time ASC",
        )?;
        let rows = stmt.query_map(params![now], retry_from_row)?;
        let mut retries = Vec::new();
        for row in rows {
            retries.push(row?);
        }
        Ok(retries)
    }

    pub fn list_retries(&self, limit: usize) -> Result<Vec<NotificationRetry>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, notification_id, task_id, payload, retry_count, next_retry_time,
                    backoff_multiplier, max_retries, status, created_at
             FROM notification_retries ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], retry_from_row)?;
        let mut retries = Vec::new();
        for row in rows {
            retries.push(row?);
        }
        Ok(retries)
    }

    /// Compare-and-set the retry status. Returns false if another writer
    /// moved the record first.
    pub fn cas_retry_status(
        &self,
        id: &str,
        from: RetryStatus,
        to: RetryStatus,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE notification_retries SET status = ?2 WHERE id = ?1 AND status = ?3",
            params![id, to.as_str(), from.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Put an in-flight retry back to pending with a new attempt count
    /// and fire time. Conditional on the record still being `retrying`.
    pub fn reschedule_retry(
        &self,
        id: &str,
        retry_count: u32,
        next_retry_time: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE notification_retries
             SET retry_count = ?2, next_retry_time = ?3, status = 'pending'
             WHERE id = ?1 AND status = 'retrying'",
            params![id, retry_count, next_retry_time],
        )?;
        Ok(changed == 1)
    }

    // ── Snoozes ──────────────────────────────────────────────────────

    pub fn insert_snooze(&self, snooze: &NotificationSnooze) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO notification_snoozes
             (id, task_id, notification_id, duration, snooze_until, snooze_count, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                snooze.id,
                snooze.task_id,
                snooze.notification_id,
                snooze.duration.to_token(),
                snooze.snooze_until,
                snooze.snooze_count,
                snooze.status.as_str(),
                snooze.created_at,
            ],
        )?;
        Ok(())
    }

    /// The snooze currently marked active for a notification, if any.
    /// Window expiry is the caller's concern (lazy check or sweep).
    pub fn active_snooze(
        &self,
        notification_id: &str,
    ) -> Result<Option<NotificationSnooze>, DatabaseError> {
        let snooze = self
            .conn
            .query_row(
                "SELECT id, task_id, notification_id, duration, snooze_until, snooze_count,
                        status, created_at
                 FROM notification_snoozes
                 WHERE notification_id = ?1 AND status = 'active'
                 ORDER BY created_at DESC LIMIT 1",
                params![notification_id],
                snooze_from_row,
            )
            .optional()?;
        Ok(snooze)
    }

    /// Extend an active snooze's window. Conditional on it still being
    /// active.
    pub fn update_snooze_window(
        &self,
        id: &str,
        snooze_until: DateTime<Utc>,
        snooze_count: u32,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE notification_snoozes
             SET snooze_until = ?2, snooze_count = ?3
             WHERE id = ?1 AND status = 'active'",
            params![id, snooze_until, snooze_count],
        )?;
        Ok(changed == 1)
    }

    pub fn cas_snooze_status(
        &self,
        id: &str,
        from: SnoozeStatus,
        to: SnoozeStatus,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE notification_snoozes SET status = ?2 WHERE id = ?1 AND status = ?3",
            params![id, to.as_str(), from.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Active snoozes whose window has passed (expiry sweep input).
    pub fn lapsed_snoozes(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationSnooze>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, notification_id, duration, snooze_until, snooze_count,
                    status, created_at
             FROM notification_snoozes
             WHERE status = 'active' AND snooze_until <= ?1",
        )?;
        let rows = stmt.query_map(params![now], snooze_from_row)?;
        let mut snoozes = Vec::new();
        for row in rows {
            snoozes.push(row?);
        }
        Ok(snoozes)
    }

    // ── Mutes ────────────────────────────────────────────────────────

    pub fn insert_mute(&self, mute: &TaskMute) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO task_mutes (id, task_id, duration, mute_until, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                mute.id,
                mute.task_id,
                mute.duration.to_token(),
                mute.mute_until,
                mute.status.as_str(),
                mute.created_at,
            ],
        )?;
        Ok(())
    }

    /// The mute currently marked active for a task, if any.
    pub fn active_mute(&self, task_id: &str) -> Result<Option<TaskMute>, DatabaseError> {
        let mute = self
            .conn
            .query_row(
                "SELECT id, task_id, duration, mute_until, status, created_at
                 FROM task_mutes
                 WHERE task_id = ?1 AND status = 'active'
                 ORDER BY created_at DESC LIMIT 1",
                params![task_id],
                mute_from_row,
            )
            .optional()?;
        Ok(mute)
    }

    pub fn cas_mute_status(
        &self,
        id: &str,
        from: MuteStatus,
        to: MuteStatus,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE task_mutes SET status = ?2 WHERE id = ?1 AND status = ?3",
            params![id, to.as_str(), from.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Active, non-permanent mutes whose window has passed.
    pub fn lapsed_mutes(&self, now: DateTime<Utc>) -> Result<Vec<TaskMute>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, duration, mute_until, status, created_at
             FROM task_mutes
             WHERE status = 'active' AND mute_until IS NOT NULL AND mute_until <= ?1",
        )?;
        let rows = stmt.query_map(params![now], mute_from_row)?;
        let mut mutes = Vec::new();
        for row in rows {
            mutes.push(row?);
        }
        Ok(mutes)
    }
}

// ── Row mapping ──────────────────────────────────────────────────────

fn bad_column(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn region_from_row(row: &Row<'_>) -> rusqlite::Result<MonitoredRegion> {
    let region_type_str: String = row.get(5)?;
    let region_type = RegionType::parse(&region_type_str)
        .ok_or_else(|| bad_column(5, format!("unknown region type: {region_type_str}")))?;
    Ok(MonitoredRegion {
        id: row.get(0)?,
        task_id: row.get(1)?,
        center: GeoPoint {
            latitude: row.get(2)?,
            longitude: row.get(3)?,
        },
        radius_meters: row.get(4)?,
        region_type,
        created_at: row.get(6)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<GeofenceEvent> {
    let event_type_str: String = row.get(3)?;
    let event_type = GeofenceEventType::parse(&event_type_str)
        .ok_or_else(|| bad_column(3, format!("unknown event type: {event_type_str}")))?;
    let status_str: String = row.get(8)?;
    let status = EventStatus::parse(&status_str)
        .ok_or_else(|| bad_column(8, format!("unknown event status: {status_str}")))?;
    Ok(GeofenceEvent {
        id: row.get(0)?,
        task_id: row.get(1)?,
        region_id: row.get(2)?,
        event_type,
        location: GeoPoint {
            latitude: row.get(4)?,
            longitude: row.get(5)?,
        },
        confidence: row.get(6)?,
        low_confidence: row.get(7)?,
        status,
        processed_at: row.get(9)?,
        notification_sent: row.get(10)?,
        bundled_with: row.get(11)?,
        cooldown_until: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn retry_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRetry> {
    let payload_json: String = row.get(3)?;
    let payload = serde_json::from_str(&payload_json)
        .map_err(|e| bad_column(3, format!("bad retry payload: {e}")))?;
    let status_str: String = row.get(8)?;
    let status = RetryStatus::parse(&status_str)
        .ok_or_else(|| bad_column(8, format!("unknown retry status: {status_str}")))?;
    Ok(NotificationRetry {
        id: row.get(0)?,
        notification_id: row.get(1)?,
        task_id: row.get(2)?,
        payload,
        retry_count: row.get(4)?,
        next_retry_time: row.get(5)?,
        backoff_multiplier: row.get(6)?,
        max_retries: row.get(7)?,
        status,
        created_at: row.get(9)?,
    })
}

fn snooze_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationSnooze> {
    let duration_str: String = row.get(3)?;
    let duration = SnoozeDuration::parse_token(&duration_str)
        .ok_or_else(|| bad_column(3, format!("unknown snooze duration: {duration_str}")))?;
    let status_str: String = row.get(6)?;
    let status = SnoozeStatus::parse(&status_str)
        .ok_or_else(|| bad_column(6, format!("unknown snooze status: {status_str}")))?;
    Ok(NotificationSnooze {
        id: row.get(0)?,
        task_id: row.get(1)?,
        notification_id: row.get(2)?,
        duration,
        snooze_until: row.get(4)?,
        snooze_count: row.get(5)?,
        status,
        created_at: row.get(7)?,
    })
}

fn mute_from_row(row: &Row<'_>) -> rusqlite::Result<TaskMute> {
    let duration_str: String = row.get(2)?;
    let duration = MuteDuration::parse_token(&duration_str)
        .ok_or_else(|| bad_column(2, format!("unknown mute duration: {duration_str}")))?;
    let status_str: String = row.get(4)?;
    let status = MuteStatus::parse(&status_str)
        .ok_or_else(|| bad_column(4, format!("unknown mute status: {status_str}")))?;
    Ok(TaskMute {
        id: row.get(0)?,
        task_id: row.get(1)?,
        duration,
        mute_until: row.get(3)?,
        status,
        created_at: row.get(5)?,
    })
}
