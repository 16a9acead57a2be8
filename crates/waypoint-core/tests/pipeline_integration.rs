//! End-to-end tests across the core subsystems.
//!
//! These drive the region allocator, optimization controller, event
//! processor, and delivery scheduler together, the way a host process
//! composes them.

use chrono::{Duration, Utc};
use waypoint_core::optimize::NoopSensing;
use waypoint_core::{
    Database, DeliveryScheduler, Event, EventProcessor, EventStatus, GeoPoint, GeofenceEventType,
    MonitoredRegion, NotificationPayload, OptimizationController, OptimizationTier, PowerSnapshot,
    ProcessorConfig, PushSender, RawSignal, RegionAllocator, RegionType, RetryPolicy, SendError,
    SendOutcome, UsageMetrics,
};

struct OkSender;

impl PushSender for OkSender {
    fn send(&self, _notification_id: &str, _payload: &NotificationPayload) -> Result<(), SendError> {
        Ok(())
    }
}

fn region(task: &str, rt: RegionType, center: GeoPoint) -> MonitoredRegion {
    MonitoredRegion::new(task, center, rt.default_radius_meters(), rt, Utc::now()).unwrap()
}

fn power(level: f64, charging: bool) -> PowerSnapshot {
    PowerSnapshot {
        battery_level: level,
        is_charging: charging,
        is_low_power_mode: false,
    }
}

#[test]
fn test_low_battery_shrinks_monitoring_set() {
    let center = GeoPoint::new(35.68, 139.76).unwrap();
    let mut controller = OptimizationController::new();
    let mut allocator =
        RegionAllocator::new(OptimizationTier::Balanced.params().max_active_regions);
    let mut sensing = NoopSensing;
    let now = Utc::now();

    // 15 active regions under Balanced: 10 arrival, 5 outer approach.
    for i in 0..10 {
        allocator
            .register(region(&format!("task-{i}"), RegionType::Arrival, center))
            .unwrap();
    }
    for i in 10..15 {
        allocator
            .register(region(&format!("task-{i}"), RegionType::Approach5Mi, center))
            .unwrap();
    }
    assert_eq!(allocator.active_count(), 15);

    // Battery drops to 15%, discharging: PowerSave caps the set at 10.
    let events = controller.on_power_state_change(
        &power(0.15, false),
        &UsageMetrics::default(),
        &mut allocator,
        &mut sensing,
        now,
    );
    assert_eq!(controller.current(), OptimizationTier::PowerSave);
    assert_eq!(allocator.capacity(), 10);
    assert_eq!(allocator.active_count(), 10);

    let evicted: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::RegionEvicted { region_type, .. } => Some(*region_type),
            _ => None,
        })
        .collect();
    assert_eq!(evicted.len(), 5);
    // The outer approach regions go first; every arrival region survives.
    assert!(evicted.iter().all(|rt| *rt == RegionType::Approach5Mi));
    assert!(allocator
        .list_active()
        .iter()
        .all(|r| r.region_type == RegionType::Arrival));

    // Back on the charger above 80%: HighAccuracy re-admits the backlog.
    let events = controller.on_power_state_change(
        &power(0.85, true),
        &UsageMetrics::default(),
        &mut allocator,
        &mut sensing,
        now + Duration::minutes(30),
    );
    assert_eq!(controller.current(), OptimizationTier::HighAccuracy);
    assert_eq!(allocator.active_count(), 15);
    let readmitted = events
        .iter()
        .filter(|e| matches!(e, Event::RegionReadmitted { .. }))
        .count();
    assert_eq!(readmitted, 5);
}

#[test]
fn test_signal_to_notification_flow() {
    let db = Database::open_memory().unwrap();
    let mut allocator = RegionAllocator::new(15);
    let mut processor = EventProcessor::new(ProcessorConfig::default());
    let scheduler = DeliveryScheduler::new(RetryPolicy::default());
    let now = Utc::now();

    let center = GeoPoint::new(35.68, 139.76).unwrap();
    let store = region("errand", RegionType::Arrival, center);
    let region_id = store.id.clone();
    allocator.register(store).unwrap();

    // A clean enter signal at the region center qualifies.
    let signal = RawSignal {
        region_id: region_id.clone(),
        event_type: GeofenceEventType::Enter,
        location: center,
    };
    let monitored = allocator.get(&region_id).unwrap().clone();
    let (event, bus_event) = processor.ingest(&signal, &monitored, now);
    assert_eq!(event.status, EventStatus::Processed);
    assert!(event.qualifies_for_notification());
    assert!(matches!(bus_event, Event::EventQualified { .. }));
    db.insert_event(&event).unwrap();

    // Compose and deliver a notification for the qualified event.
    let payload = NotificationPayload {
        title: "You're near your errand".into(),
        body: "Arriving at the store".into(),
        event_id: Some(event.id.clone()),
    };
    let (outcome, events) = scheduler
        .deliver(&db, &OkSender, "n-errand-1", "errand", &payload, now)
        .unwrap();
    assert_eq!(outcome, SendOutcome::Sent);
    assert!(matches!(events[0], Event::NotificationSent { .. }));

    // The event record reflects the send.
    let logged = db.list_events(10).unwrap();
    assert_eq!(logged.len(), 1);
    assert!(logged[0].notification_sent);
}

#[test]
fn test_duplicate_signal_is_logged_but_suppressed() {
    let db = Database::open_memory().unwrap();
    let mut processor = EventProcessor::new(ProcessorConfig::default());
    let now = Utc::now();

    let center = GeoPoint::new(35.68, 139.76).unwrap();
    let monitored = region("errand", RegionType::Arrival, center);
    let signal = RawSignal {
        region_id: monitored.id.clone(),
        event_type: GeofenceEventType::Enter,
        location: center,
    };

    let (first, _) = processor.ingest(&signal, &monitored, now);
    let (second, bus_event) = processor.ingest(&signal, &monitored, now + Duration::seconds(10));
    assert_eq!(first.status, EventStatus::Processed);
    assert_eq!(second.status, EventStatus::Duplicate);
    assert!(matches!(bus_event, Event::EventSuppressed { .. }));

    // Both land in the audit log.
    db.insert_event(&first).unwrap();
    db.insert_event(&second).unwrap();
    let mut counts = db.event_counts().unwrap();
    counts.sort();
    assert_eq!(
        counts,
        vec![("duplicate".to_string(), 1), ("processed".to_string(), 1)]
    );
}

#[test]
fn test_component_snapshots_survive_restart() {
    let db = Database::open_memory().unwrap();
    let mut allocator = RegionAllocator::new(10);
    let mut controller = OptimizationController::new();
    let mut sensing = NoopSensing;
    let now = Utc::now();

    let center = GeoPoint::new(35.68, 139.76).unwrap();
    allocator
        .register(region("t1", RegionType::Arrival, center))
        .unwrap();
    allocator
        .register(region("t2", RegionType::Approach1Mi, center))
        .unwrap();
    controller.apply(
        OptimizationTier::PowerSave,
        &mut allocator,
        &mut sensing,
        now,
    );

    // Snapshot the engines to the kv store, the way the host does on
    // every mutation.
    db.kv_set("allocator", &serde_json::to_string(&allocator).unwrap())
        .unwrap();
    db.kv_set("controller", &serde_json::to_string(&controller).unwrap())
        .unwrap();

    // "Restart": rebuild both from the snapshots.
    let restored: RegionAllocator =
        serde_json::from_str(&db.kv_get("allocator").unwrap().unwrap()).unwrap();
    let restored_ctl: OptimizationController =
        serde_json::from_str(&db.kv_get("controller").unwrap().unwrap()).unwrap();

    assert_eq!(restored.active_count(), 2);
    assert_eq!(restored.capacity(), 10);
    assert_eq!(restored_ctl.current(), OptimizationTier::PowerSave);
    let tasks: Vec<_> = restored
        .list_active()
        .iter()
        .map(|r| r.task_id.clone())
        .collect();
    assert!(tasks.contains(&"t1".to_string()));
    assert!(tasks.contains(&"t2".to_string()));
}

#[test]
fn test_transient_failure_retries_until_delivered() {
    let db = Database::open_memory().unwrap();
    let scheduler = DeliveryScheduler::new(RetryPolicy::default());
    let now = Utc::now();

    struct FailOnce {
        failed: std::cell::Cell<bool>,
    }
    impl PushSender for FailOnce {
        fn send(&self, _id: &str, _payload: &NotificationPayload) -> Result<(), SendError> {
            if self.failed.get() {
                Ok(())
            } else {
                self.failed.set(true);
                Err(SendError::Transient("gateway unavailable".into()))
            }
        }
    }

    let sender = FailOnce {
        failed: std::cell::Cell::new(false),
    };
    let payload = NotificationPayload {
        title: "Reminder".into(),
        body: "Pick up the package".into(),
        event_id: None,
    };
    let (outcome, _) = scheduler
        .deliver(&db, &sender, "n1", "t1", &payload, now)
        .unwrap();
    assert!(matches!(outcome, SendOutcome::RetryScheduled { .. }));

    // First sweep after the base delay delivers.
    let events = scheduler
        .retry_sweep(&db, &sender, now + Duration::minutes(5))
        .unwrap();
    assert!(matches!(events[0], Event::NotificationSent { .. }));
    assert!(db.open_retry_for_notification("n1").unwrap().is_none());
}
