//! Raw signal ingestion: dedup, cooldown, confidence, bundling.
//!
//! `ingest` is the single entry point. Every raw signal produces exactly
//! one [`GeofenceEvent`] with exactly one status transition out of
//! `Pending`; the idempotent processing key is region id + event type +
//! dedup window. No internal threads -- the caller serializes ingestion
//! per region/type key, which is what keeps the dedup and cooldown
//! invariants honest under concurrent signal arrival.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{EventStatus, GeofenceEvent, RawSignal};
use crate::events::Event;
use crate::region::{MonitoredRegion, RegionType};

fn default_dedup_window_secs() -> i64 {
    30
}
fn default_bundle_window_secs() -> i64 {
    5
}
fn default_confidence_floor() -> f64 {
    0.7
}
fn default_arrival_cooldown_min() -> i64 {
    15
}
fn default_post_arrival_cooldown_min() -> i64 {
    30
}
fn default_approach_cooldown_min() -> i64 {
    60
}

/// Tunable processing windows and thresholds.
///
/// These are observed defaults, not contracts -- all of them can be
/// overridden through the config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Signals for the same region+type within this window collapse
    /// into one event.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: i64,
    /// Same-task events within this window bundle under one
    /// representative.
    #[serde(default = "default_bundle_window_secs")]
    pub bundle_window_secs: i64,
    /// Events scoring below this are flagged low-confidence (still
    /// processed, never hard-blocked).
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default = "default_arrival_cooldown_min")]
    pub arrival_cooldown_min: i64,
    #[serde(default = "default_post_arrival_cooldown_min")]
    pub post_arrival_cooldown_min: i64,
    #[serde(default = "default_approach_cooldown_min")]
    pub approach_cooldown_min: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            bundle_window_secs: default_bundle_window_secs(),
            confidence_floor: default_confidence_floor(),
            arrival_cooldown_min: default_arrival_cooldown_min(),
            post_arrival_cooldown_min: default_post_arrival_cooldown_min(),
            approach_cooldown_min: default_approach_cooldown_min(),
        }
    }
}

impl ProcessorConfig {
    /// Minimum time between two qualifying events for a region tier.
    pub fn cooldown_minutes(&self, region_type: RegionType) -> i64 {
        match region_type {
            RegionType::Arrival => self.arrival_cooldown_min,
            RegionType::PostArrival => self.post_arrival_cooldown_min,
            RegionType::Approach5Mi | RegionType::Approach3Mi | RegionType::Approach1Mi => {
                self.approach_cooldown_min
            }
        }
    }
}

/// Bundle window state for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BundleSlot {
    representative_id: String,
    window_until: DateTime<Utc>,
}

/// Turns raw region-crossing signals into deduplicated, confidence-scored,
/// cooldown-gated events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventProcessor {
    config: ProcessorConfig,
    /// region_id:event_type -> last qualifying signal time.
    recent: HashMap<String, DateTime<Utc>>,
    /// region_id -> cooldown expiry.
    cooldowns: HashMap<String, DateTime<Utc>>,
    /// task_id -> open bundle window.
    bundles: HashMap<String, BundleSlot>,
}

impl EventProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config,
            recent: HashMap::new(),
            cooldowns: HashMap::new(),
            bundles: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process one raw signal against the region it fired for.
    ///
    /// Returns the event record (to be persisted by the caller) and the
    /// bus event describing what happened to it. The record's status is
    /// terminal on return; no later transition will occur.
    pub fn ingest(
        &mut self,
        signal: &RawSignal,
        region: &MonitoredRegion,
        now: DateTime<Utc>,
    ) -> (GeofenceEvent, Event) {
        self.prune(now);

        let mut event = GeofenceEvent {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: region.task_id.clone(),
            region_id: signal.region_id.clone(),
            event_type: signal.event_type,
            location: signal.location,
            confidence: 0.0,
            low_confidence: false,
            status: EventStatus::Pending,
            processed_at: None,
            notification_sent: false,
            bundled_with: None,
            cooldown_until: None,
            created_at: now,
        };

        // Internal faults end at Failed -- reported, never retried here.
        if signal.region_id != region.id || signal.location.validate().is_err() {
            warn!(
                event_id = %event.id,
                region_id = %signal.region_id,
                "signal failed validation"
            );
            event.status = EventStatus::Failed;
            event.processed_at = Some(now);
            return (event.clone(), suppressed(&event, now));
        }

        // Dedup: same region+type within the window collapses.
        let dedup_key = format!("{}:{}", signal.region_id, signal.event_type.as_str());
        if let Some(last) = self.recent.get(&dedup_key) {
            if (now - *last).num_seconds() < self.config.dedup_window_secs {
                debug!(event_id = %event.id, "duplicate signal within dedup window");
                event.status = EventStatus::Duplicate;
                event.processed_at = Some(now);
                return (event.clone(), suppressed(&event, now));
            }
        }

        // Cooldown: the region fired too recently to fire again.
        if let Some(until) = self.cooldowns.get(&signal.region_id) {
            if now < *until {
                debug!(event_id = %event.id, until = %until, "region in cooldown");
                event.status = EventStatus::Cooldown;
                event.cooldown_until = Some(*until);
                event.processed_at = Some(now);
                return (event.clone(), suppressed(&event, now));
            }
        }

        // Qualifies. Score confidence and arm the windows.
        event.confidence = score_confidence(signal, region);
        event.low_confidence = event.confidence < self.config.confidence_floor;
        event.status = EventStatus::Processed;
        event.processed_at = Some(now);
        let cooldown_until =
            now + Duration::minutes(self.config.cooldown_minutes(region.region_type));
        event.cooldown_until = Some(cooldown_until);
        self.recent.insert(dedup_key, now);
        self.cooldowns.insert(signal.region_id.clone(), cooldown_until);

        // Bundle with a simultaneous sibling for the same task, if any.
        if let Some(slot) = self.bundles.get(&region.task_id) {
            if now <= slot.window_until {
                event.bundled_with = Some(slot.representative_id.clone());
                debug!(
                    event_id = %event.id,
                    representative = %slot.representative_id,
                    "bundled with sibling event"
                );
                let bus = Event::EventBundled {
                    event_id: event.id.clone(),
                    bundled_with: slot.representative_id.clone(),
                    task_id: event.task_id.clone(),
                    at: now,
                };
                return (event, bus);
            }
        }
        self.bundles.insert(
            region.task_id.clone(),
            BundleSlot {
                representative_id: event.id.clone(),
                window_until: now + Duration::seconds(self.config.bundle_window_secs),
            },
        );

        let bus = Event::EventQualified {
            event_id: event.id.clone(),
            task_id: event.task_id.clone(),
            region_id: event.region_id.clone(),
            event_type: event.event_type,
            confidence: event.confidence,
            low_confidence: event.low_confidence,
            at: now,
        };
        (event, bus)
    }

    /// Drop expired window state so the maps stay bounded.
    fn prune(&mut self, now: DateTime<Utc>) {
        let dedup_horizon = now - Duration::seconds(self.config.dedup_window_secs);
        self.recent.retain(|_, last| *last > dedup_horizon);
        self.cooldowns.retain(|_, until| *until > now);
        self.bundles.retain(|_, slot| slot.window_until >= now);
    }
}

/// Confidence from signal distance relative to the region radius:
/// within 50% of the radius -> 1.0, within 80% -> 0.8, otherwise 0.6.
fn score_confidence(signal: &RawSignal, region: &MonitoredRegion) -> f64 {
    let distance = signal.location.distance_meters(&region.center);
    let ratio = distance / region.radius_meters;
    if ratio <= 0.5 {
        1.0
    } else if ratio <= 0.8 {
        0.8
    } else {
        0.6
    }
}

fn suppressed(event: &GeofenceEvent, now: DateTime<Utc>) -> Event {
    Event::EventSuppressed {
        event_id: event.id.clone(),
        region_id: event.region_id.clone(),
        event_type: event.event_type,
        status: event.status,
        at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::GeofenceEventType;
    use crate::region::{GeoPoint, RegionType};

    fn arrival_region(task: &str) -> MonitoredRegion {
        MonitoredRegion::new(
            task,
            GeoPoint::new(35.0, 139.0).unwrap(),
            100.0,
            RegionType::Arrival,
            Utc::now(),
        )
        .unwrap()
    }

    fn signal_at(region: &MonitoredRegion, lat_offset_deg: f64) -> RawSignal {
        RawSignal {
            region_id: region.id.clone(),
            event_type: GeofenceEventType::Enter,
            location: GeoPoint {
                latitude: region.center.latitude + lat_offset_deg,
                longitude: region.center.longitude,
            },
        }
    }

    #[test]
    fn first_signal_is_processed() {
        let mut proc = EventProcessor::new(ProcessorConfig::default());
        let region = arrival_region("t1");
        let now = Utc::now();

        let (event, bus) = proc.ingest(&signal_at(&region, 0.0), &region, now);
        assert_eq!(event.status, EventStatus::Processed);
        assert_eq!(event.confidence, 1.0);
        assert!(event.cooldown_until.is_some());
        assert!(event.qualifies_for_notification());
        assert!(matches!(bus, Event::EventQualified { .. }));
    }

    #[test]
    fn second_signal_within_dedup_window_is_duplicate() {
        let mut proc = EventProcessor::new(ProcessorConfig::default());
        let region = arrival_region("t1");
        let now = Utc::now();

        let (first, _) = proc.ingest(&signal_at(&region, 0.0), &region, now);
        let (second, bus) = proc.ingest(
            &signal_at(&region, 0.0),
            &region,
            now + Duration::seconds(10),
        );
        assert_eq!(first.status, EventStatus::Processed);
        assert_eq!(second.status, EventStatus::Duplicate);
        assert!(!second.qualifies_for_notification());
        assert!(matches!(
            bus,
            Event::EventSuppressed {
                status: EventStatus::Duplicate,
                ..
            }
        ));
    }

    #[test]
    fn refire_within_cooldown_is_cooldown_not_processed() {
        let mut proc = EventProcessor::new(ProcessorConfig::default());
        let region = arrival_region("t1");
        let now = Utc::now();

        let (first, _) = proc.ingest(&signal_at(&region, 0.0), &region, now);
        // Past the dedup window but inside the 15 min arrival cooldown.
        let (second, _) = proc.ingest(
            &signal_at(&region, 0.0),
            &region,
            now + Duration::minutes(5),
        );
        assert_eq!(second.status, EventStatus::Cooldown);
        assert_eq!(second.cooldown_until, first.cooldown_until);

        // After the cooldown expires the region may fire again.
        let (third, _) = proc.ingest(
            &signal_at(&region, 0.0),
            &region,
            now + Duration::minutes(16),
        );
        assert_eq!(third.status, EventStatus::Processed);
    }

    #[test]
    fn different_event_types_do_not_dedup_each_other() {
        let mut proc = EventProcessor::new(ProcessorConfig::default());
        let region = arrival_region("t1");
        let now = Utc::now();

        let (enter, _) = proc.ingest(&signal_at(&region, 0.0), &region, now);
        let mut exit_signal = signal_at(&region, 0.0);
        exit_signal.event_type = GeofenceEventType::Exit;
        let (exit, _) = proc.ingest(&exit_signal, &region, now + Duration::seconds(2));

        assert_eq!(enter.status, EventStatus::Processed);
        // Not a duplicate -- but the region is now in cooldown.
        assert_eq!(exit.status, EventStatus::Cooldown);
    }

    #[test]
    fn confidence_rings() {
        let mut proc = EventProcessor::new(ProcessorConfig::default());
        let now = Utc::now();

        // radius 100m; ~1 deg latitude is ~111.3 km.
        let region = arrival_region("t1");
        let (center_hit, _) = proc.ingest(&signal_at(&region, 0.0), &region, now);
        assert_eq!(center_hit.confidence, 1.0);
        assert!(!center_hit.low_confidence);

        // ~70 m out: within 80% of the radius.
        let region2 = arrival_region("t2");
        let (mid, _) = proc.ingest(&signal_at(&region2, 0.00063), &region2, now);
        assert_eq!(mid.confidence, 0.8);
        assert!(!mid.low_confidence);

        // ~90 m out: beyond 80%, low confidence with the 0.7 floor.
        let region3 = arrival_region("t3");
        let (edge, _) = proc.ingest(&signal_at(&region3, 0.00081), &region3, now);
        assert_eq!(edge.confidence, 0.6);
        assert!(edge.low_confidence);
        // Low confidence does not block processing.
        assert_eq!(edge.status, EventStatus::Processed);
    }

    #[test]
    fn same_task_events_bundle_under_one_representative() {
        let mut proc = EventProcessor::new(ProcessorConfig::default());
        let region_a = arrival_region("t1");
        let region_b = MonitoredRegion::new(
            "t1",
            GeoPoint::new(35.001, 139.0).unwrap(),
            1_609.3,
            RegionType::Approach1Mi,
            Utc::now(),
        )
        .unwrap();
        let now = Utc::now();

        let (rep, _) = proc.ingest(&signal_at(&region_a, 0.0), &region_a, now);
        let (sibling, bus) = proc.ingest(
            &signal_at(&region_b, 0.0),
            &region_b,
            now + Duration::seconds(2),
        );

        assert!(rep.qualifies_for_notification());
        assert_eq!(sibling.bundled_with.as_deref(), Some(rep.id.as_str()));
        assert!(!sibling.qualifies_for_notification());
        assert!(!sibling.notification_sent);
        assert!(matches!(bus, Event::EventBundled { .. }));
    }

    #[test]
    fn bundle_window_closes() {
        let mut proc = EventProcessor::new(ProcessorConfig::default());
        let region_a = arrival_region("t1");
        let region_b = MonitoredRegion::new(
            "t1",
            GeoPoint::new(36.0, 139.0).unwrap(),
            100.0,
            RegionType::PostArrival,
            Utc::now(),
        )
        .unwrap();
        let now = Utc::now();

        proc.ingest(&signal_at(&region_a, 0.0), &region_a, now);
        let (later, _) = proc.ingest(
            &signal_at(&region_b, 0.0),
            &region_b,
            now + Duration::seconds(10),
        );
        assert!(later.bundled_with.is_none());
        assert!(later.qualifies_for_notification());
    }

    #[test]
    fn mismatched_region_id_fails() {
        let mut proc = EventProcessor::new(ProcessorConfig::default());
        let region = arrival_region("t1");
        let mut signal = signal_at(&region, 0.0);
        signal.region_id = "other".to_string();

        let (event, bus) = proc.ingest(&signal, &region, Utc::now());
        assert_eq!(event.status, EventStatus::Failed);
        assert!(matches!(
            bus,
            Event::EventSuppressed {
                status: EventStatus::Failed,
                ..
            }
        ));
    }
}
