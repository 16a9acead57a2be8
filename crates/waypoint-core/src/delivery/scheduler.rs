//! Outbound notification lifecycle.
//!
//! Coordinates the three sub-machines (retry, snooze, mute) around the
//! external [`PushSender`]. Before any send attempt the scheduler checks
//! for an active suppression window; a suppressed send creates no retry
//! record. Sweeps re-check record status immediately before acting, so a
//! cancel or extend always wins over a scheduled fire, and every status
//! mutation is a conditional update -- a lost compare-and-set means
//! another writer got there first and the record is left alone.
//!
//! Network sends happen with no lock held; the send result feeds back
//! into the record afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::mute::{MuteDuration, MuteStatus, TaskMute};
use super::retry::{calculate_next_retry_time, NotificationRetry, RetryPolicy, RetryStatus};
use super::snooze::{snooze_until, NotificationSnooze, SnoozeDuration, SnoozeStatus};
use super::{NotificationPayload, PushSender, SendError};
use crate::error::{CoreError, DeliveryError};
use crate::events::{Event, SuppressionReason};
use crate::storage::Database;

/// What happened to a delivery request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum SendOutcome {
    Sent,
    /// Suppressed by snooze/mute; no retry record was created.
    Suppressed {
        reason: SuppressionReason,
        until: Option<DateTime<Utc>>,
    },
    /// Transient failure; a retry chain is open.
    RetryScheduled {
        retry_id: String,
        next_retry_time: DateTime<Utc>,
    },
    /// The collaborator classified the failure as permanent.
    Rejected { reason: String },
}

/// Owns initial send, retry with backoff, and snooze/mute windows.
#[derive(Debug, Clone)]
pub struct DeliveryScheduler {
    policy: RetryPolicy,
}

impl DeliveryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    // ── Initial delivery ─────────────────────────────────────────────

    /// Attempt to deliver a notification.
    ///
    /// Gating comes first: an active mute on the task or snooze on the
    /// notification suppresses the send entirely. A transient send
    /// failure opens a retry chain; a permanent one terminates
    /// immediately.
    pub fn deliver(
        &self,
        db: &Database,
        sender: &dyn PushSender,
        notification_id: &str,
        task_id: &str,
        payload: &NotificationPayload,
        now: DateTime<Utc>,
    ) -> Result<(SendOutcome, Vec<Event>), CoreError> {
        if let Some((reason, until)) = self.suppression(db, notification_id, task_id, now)? {
            debug!(notification_id, ?reason, "send suppressed");
            let event = Event::NotificationSuppressed {
                notification_id: notification_id.to_string(),
                task_id: task_id.to_string(),
                reason,
                until,
                at: now,
            };
            return Ok((SendOutcome::Suppressed { reason, until }, vec![event]));
        }

        // An open chain means an earlier attempt already failed; the
        // sweep owns it from here.
        if let Some(open) = db.open_retry_for_notification(notification_id)? {
            return Ok((
                SendOutcome::RetryScheduled {
                    retry_id: open.id,
                    next_retry_time: open.next_retry_time,
                },
                Vec::new(),
            ));
        }

        match sender.send(notification_id, payload) {
            Ok(()) => {
                info!(notification_id, task_id, "notification sent");
                if let Some(event_id) = &payload.event_id {
                    db.mark_notification_sent(event_id)?;
                }
                Ok((
                    SendOutcome::Sent,
                    vec![Event::NotificationSent {
                        notification_id: notification_id.to_string(),
                        task_id: task_id.to_string(),
                        at: now,
                    }],
                ))
            }
            Err(SendError::Permanent(reason)) => {
                warn!(notification_id, %reason, "permanent delivery rejection");
                Ok((
                    SendOutcome::Rejected {
                        reason: reason.clone(),
                    },
                    vec![Event::DeliveryRejected {
                        notification_id: notification_id.to_string(),
                        reason,
                        at: now,
                    }],
                ))
            }
            Err(err) => {
                // Transient failure or collaborator timeout: open a chain.
                debug!(notification_id, ?err, "transient send failure, opening retry chain");
                let retry = NotificationRetry::new(
                    notification_id,
                    task_id,
                    payload.clone(),
                    &self.policy,
                    now,
                );
                db.insert_retry(&retry)?;
                let event = Event::RetryScheduled {
                    retry_id: retry.id.clone(),
                    notification_id: notification_id.to_string(),
                    retry_count: retry.retry_count,
                    next_retry_time: retry.next_retry_time,
                    at: now,
                };
                Ok((
                    SendOutcome::RetryScheduled {
                        retry_id: retry.id,
                        next_retry_time: retry.next_retry_time,
                    },
                    vec![event],
                ))
            }
        }
    }

    // ── Retry sweep ──────────────────────────────────────────────────

    /// Fire every due retry. Idempotent against concurrent mutations:
    /// each record is claimed with a compare-and-set before anything
    /// else happens, and suppression is re-checked at fire time so a
    /// snooze or mute created after scheduling still wins.
    pub fn retry_sweep(
        &self,
        db: &Database,
        sender: &dyn PushSender,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError> {
        let mut events = Vec::new();
        for retry in db.due_retries(now)? {
            // Claim the record; a concurrent cancel/claim wins.
            if !db.cas_retry_status(&retry.id, RetryStatus::Pending, RetryStatus::Retrying)? {
                continue;
            }

            if let Some((reason, until)) = self.suppression(db, &retry.notification_id, &retry.task_id, now)? {
                events.push(Event::NotificationSuppressed {
                    notification_id: retry.notification_id.clone(),
                    task_id: retry.task_id.clone(),
                    reason,
                    until,
                    at: now,
                });
                match until {
                    // Defer the attempt until the window lifts.
                    Some(until) => {
                        db.reschedule_retry(&retry.id, retry.retry_count, until)?;
                    }
                    // Permanent mute: the chain will never fire.
                    None => {
                        db.cas_retry_status(&retry.id, RetryStatus::Retrying, RetryStatus::Failed)?;
                    }
                }
                continue;
            }

            match sender.send(&retry.notification_id, &retry.payload) {
                Ok(()) => {
                    info!(
                        notification_id = %retry.notification_id,
                        attempt = retry.retry_count + 1,
                        "retry succeeded"
                    );
                    db.cas_retry_status(&retry.id, RetryStatus::Retrying, RetryStatus::Succeeded)?;
                    if let Some(event_id) = &retry.payload.event_id {
                        db.mark_notification_sent(event_id)?;
                    }
                    events.push(Event::NotificationSent {
                        notification_id: retry.notification_id.clone(),
                        task_id: retry.task_id.clone(),
                        at: now,
                    });
                }
                Err(SendError::Permanent(reason)) => {
                    warn!(notification_id = %retry.notification_id, %reason, "retry rejected permanently");
                    db.cas_retry_status(&retry.id, RetryStatus::Retrying, RetryStatus::Failed)?;
                    events.push(Event::DeliveryRejected {
                        notification_id: retry.notification_id.clone(),
                        reason,
                        at: now,
                    });
                }
                Err(_) => match self.reschedule(db, &retry, now) {
                    Ok(event) => events.push(event),
                    Err(CoreError::Delivery(DeliveryError::RetriesExhausted {
                        retry_count, ..
                    })) => {
                        db.cas_retry_status(&retry.id, RetryStatus::Retrying, RetryStatus::Failed)?;
                        warn!(
                            notification_id = %retry.notification_id,
                            retry_count,
                            "retries exhausted"
                        );
                        events.push(Event::RetriesExhausted {
                            retry_id: retry.id.clone(),
                            notification_id: retry.notification_id.clone(),
                            retry_count,
                            at: now,
                        });
                    }
                    Err(e) => return Err(e),
                },
            }
        }
        Ok(events)
    }

    /// Schedule the next attempt for a claimed (`retrying`) record.
    ///
    /// # Errors
    /// `RetriesExhausted` when the incremented attempt count reaches the
    /// record's ceiling; the caller decides how to terminate the chain.
    fn reschedule(
        &self,
        db: &Database,
        retry: &NotificationRetry,
        now: DateTime<Utc>,
    ) -> Result<Event, CoreError> {
        let next_count = retry.retry_count + 1;
        if next_count >= retry.max_retries {
            return Err(DeliveryError::RetriesExhausted {
                notification_id: retry.notification_id.clone(),
                retry_count: next_count,
                max_retries: retry.max_retries,
            }
            .into());
        }
        // The record's own multiplier/ceiling override the live policy,
        // so mid-flight config changes don't reshape existing chains.
        let effective = RetryPolicy {
            backoff_multiplier: retry.backoff_multiplier,
            max_retries: retry.max_retries,
            ..self.policy
        };
        let next_time = calculate_next_retry_time(now, next_count, &effective);
        if !db.reschedule_retry(&retry.id, next_count, next_time)? {
            return Err(DeliveryError::StatusConflict {
                record: format!("retry {}", retry.id),
                expected: RetryStatus::Retrying.as_str().to_string(),
            }
            .into());
        }
        Ok(Event::RetryScheduled {
            retry_id: retry.id.clone(),
            notification_id: retry.notification_id.clone(),
            retry_count: next_count,
            next_retry_time: next_time,
            at: now,
        })
    }

    // ── Snooze ───────────────────────────────────────────────────────

    /// Snooze a notification. At most one active snooze per notification.
    ///
    /// # Errors
    /// `AlreadySnoozed` when an unexpired snooze exists (extend instead),
    /// validation errors for non-positive custom durations.
    pub fn snooze(
        &self,
        db: &Database,
        task_id: &str,
        notification_id: &str,
        duration: SnoozeDuration,
        now: DateTime<Utc>,
    ) -> Result<(NotificationSnooze, Event), CoreError> {
        if let Some(existing) = db.active_snooze(notification_id)? {
            if existing.is_active(now) {
                return Err(DeliveryError::AlreadySnoozed {
                    notification_id: notification_id.to_string(),
                }
                .into());
            }
            // Lapsed but not yet swept: expire it and move on.
            db.cas_snooze_status(&existing.id, SnoozeStatus::Active, SnoozeStatus::Expired)?;
        }

        let snooze = NotificationSnooze::new(task_id, notification_id, duration, now)?;
        db.insert_snooze(&snooze)?;
        info!(notification_id, until = %snooze.snooze_until, "notification snoozed");
        let event = Event::SnoozeCreated {
            snooze_id: snooze.id.clone(),
            notification_id: notification_id.to_string(),
            task_id: task_id.to_string(),
            snooze_until: snooze.snooze_until,
            at: now,
        };
        Ok((snooze, event))
    }

    /// Extend an active snooze. Bumps the count and recomputes the
    /// window; `snooze_until` never moves backwards.
    pub fn extend_snooze(
        &self,
        db: &Database,
        notification_id: &str,
        duration: SnoozeDuration,
        now: DateTime<Utc>,
    ) -> Result<(NotificationSnooze, Event), CoreError> {
        let Some(mut existing) = db.active_snooze(notification_id)? else {
            return Err(DeliveryError::SnoozeNotFound(notification_id.to_string()).into());
        };
        let proposed = snooze_until(duration, now)?;
        existing.snooze_until = existing.snooze_until.max(proposed);
        existing.snooze_count += 1;
        existing.duration = duration;
        if !db.update_snooze_window(&existing.id, existing.snooze_until, existing.snooze_count)? {
            return Err(DeliveryError::StatusConflict {
                record: format!("snooze {}", existing.id),
                expected: SnoozeStatus::Active.as_str().to_string(),
            }
            .into());
        }
        let event = Event::SnoozeExtended {
            snooze_id: existing.id.clone(),
            notification_id: notification_id.to_string(),
            snooze_until: existing.snooze_until,
            snooze_count: existing.snooze_count,
            at: now,
        };
        Ok((existing, event))
    }

    /// Cancel an active snooze.
    pub fn cancel_snooze(
        &self,
        db: &Database,
        notification_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Event, CoreError> {
        let Some(existing) = db.active_snooze(notification_id)? else {
            return Err(DeliveryError::SnoozeNotFound(notification_id.to_string()).into());
        };
        if !db.cas_snooze_status(&existing.id, SnoozeStatus::Active, SnoozeStatus::Cancelled)? {
            return Err(DeliveryError::StatusConflict {
                record: format!("snooze {}", existing.id),
                expected: SnoozeStatus::Active.as_str().to_string(),
            }
            .into());
        }
        Ok(Event::SnoozeCancelled {
            snooze_id: existing.id,
            notification_id: notification_id.to_string(),
            at: now,
        })
    }

    // ── Mute ─────────────────────────────────────────────────────────

    /// Mute a task. At most one active mute per task; the caller must
    /// cancel the existing one explicitly to change it.
    ///
    /// # Errors
    /// `AlreadyMuted` when an unexpired mute exists.
    pub fn mute(
        &self,
        db: &Database,
        task_id: &str,
        duration: MuteDuration,
        now: DateTime<Utc>,
    ) -> Result<(TaskMute, Event), CoreError> {
        if let Some(existing) = db.active_mute(task_id)? {
            if existing.is_active(now) {
                return Err(DeliveryError::AlreadyMuted {
                    task_id: task_id.to_string(),
                }
                .into());
            }
            db.cas_mute_status(&existing.id, MuteStatus::Active, MuteStatus::Expired)?;
        }

        let mute = TaskMute::new(task_id, duration, now);
        db.insert_mute(&mute)?;
        info!(task_id, until = ?mute.mute_until, "task muted");
        let event = Event::MuteCreated {
            mute_id: mute.id.clone(),
            task_id: task_id.to_string(),
            mute_until: mute.mute_until,
            at: now,
        };
        Ok((mute, event))
    }

    /// Cancel the active mute on a task.
    pub fn cancel_mute(
        &self,
        db: &Database,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Event, CoreError> {
        let Some(existing) = db.active_mute(task_id)? else {
            return Err(DeliveryError::MuteNotFound(task_id.to_string()).into());
        };
        if !db.cas_mute_status(&existing.id, MuteStatus::Active, MuteStatus::Cancelled)? {
            return Err(DeliveryError::StatusConflict {
                record: format!("mute {}", existing.id),
                expected: MuteStatus::Active.as_str().to_string(),
            }
            .into());
        }
        Ok(Event::MuteCancelled {
            mute_id: existing.id,
            task_id: task_id.to_string(),
            at: now,
        })
    }

    // ── Expiry sweep ─────────────────────────────────────────────────

    /// Expire lapsed snooze/mute windows. Safe to run concurrently with
    /// manual cancels: the compare-and-set loser simply skips the record.
    pub fn expiry_sweep(&self, db: &Database, now: DateTime<Utc>) -> Result<Vec<Event>, CoreError> {
        let mut events = Vec::new();
        for snooze in db.lapsed_snoozes(now)? {
            if db.cas_snooze_status(&snooze.id, SnoozeStatus::Active, SnoozeStatus::Expired)? {
                debug!(snooze_id = %snooze.id, "snooze expired");
                events.push(Event::SnoozeExpired {
                    snooze_id: snooze.id,
                    notification_id: snooze.notification_id,
                    at: now,
                });
            }
        }
        for mute in db.lapsed_mutes(now)? {
            if db.cas_mute_status(&mute.id, MuteStatus::Active, MuteStatus::Expired)? {
                debug!(mute_id = %mute.id, "mute expired");
                events.push(Event::MuteExpired {
                    mute_id: mute.id,
                    task_id: mute.task_id,
                    at: now,
                });
            }
        }
        Ok(events)
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Active suppression window for a notification/task, if any.
    /// Lapsed windows found here are expired lazily.
    fn suppression(
        &self,
        db: &Database,
        notification_id: &str,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(SuppressionReason, Option<DateTime<Utc>>)>, CoreError> {
        if let Some(mute) = db.active_mute(task_id)? {
            if mute.is_active(now) {
                return Ok(Some((SuppressionReason::Muted, mute.mute_until)));
            }
            if mute.is_expired(now) {
                db.cas_mute_status(&mute.id, MuteStatus::Active, MuteStatus::Expired)?;
            }
        }
        if let Some(snooze) = db.active_snooze(notification_id)? {
            if snooze.is_active(now) {
                return Ok(Some((SuppressionReason::Snoozed, Some(snooze.snooze_until))));
            }
            if snooze.is_expired(now) {
                db.cas_snooze_status(&snooze.id, SnoozeStatus::Active, SnoozeStatus::Expired)?;
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use chrono::Duration;

    /// Sender that plays back a scripted sequence of results.
    struct ScriptedSender {
        script: RefCell<VecDeque<Result<(), SendError>>>,
        sent: RefCell<Vec<String>>,
    }

    impl ScriptedSender {
        fn new(script: Vec<Result<(), SendError>>) -> Self {
            Self {
                script: RefCell::new(script.into()),
                sent: RefCell::new(Vec::new()),
            }
        }

        fn always_ok() -> Self {
            Self::new(Vec::new())
        }

        fn attempts(&self) -> usize {
            self.sent.borrow().len()
        }
    }

    impl PushSender for ScriptedSender {
        fn send(&self, notification_id: &str, _payload: &NotificationPayload) -> Result<(), SendError> {
            self.sent.borrow_mut().push(notification_id.to_string());
            self.script.borrow_mut().pop_front().unwrap_or(Ok(()))
        }
    }

    fn payload() -> NotificationPayload {
        NotificationPayload {
            title: "Nearby task".into(),
            body: "You're close to the hardware store".into(),
            event_id: None,
        }
    }

    fn scheduler() -> DeliveryScheduler {
        DeliveryScheduler::new(RetryPolicy::default())
    }

    #[test]
    fn successful_send_emits_sent_event() {
        let db = Database::open_memory().unwrap();
        let sender = ScriptedSender::always_ok();
        let now = Utc::now();

        let (outcome, events) = scheduler()
            .deliver(&db, &sender, "n1", "t1", &payload(), now)
            .unwrap();
        assert_eq!(outcome, SendOutcome::Sent);
        assert!(matches!(events[0], Event::NotificationSent { .. }));
        assert_eq!(sender.attempts(), 1);
    }

    #[test]
    fn transient_failure_opens_retry_chain() {
        let db = Database::open_memory().unwrap();
        let sender = ScriptedSender::new(vec![Err(SendError::Transient("503".into()))]);
        let now = Utc::now();

        let (outcome, _) = scheduler()
            .deliver(&db, &sender, "n1", "t1", &payload(), now)
            .unwrap();
        match outcome {
            SendOutcome::RetryScheduled {
                next_retry_time, ..
            } => assert_eq!(next_retry_time, now + Duration::minutes(5)),
            other => panic!("expected RetryScheduled, got {other:?}"),
        }
        let open = db.open_retry_for_notification("n1").unwrap().unwrap();
        assert_eq!(open.retry_count, 0);
        assert_eq!(open.status, RetryStatus::Pending);
    }

    #[test]
    fn timeout_counts_as_transient() {
        let db = Database::open_memory().unwrap();
        let sender = ScriptedSender::new(vec![Err(SendError::Timeout)]);
        let (outcome, _) = scheduler()
            .deliver(&db, &sender, "n1", "t1", &payload(), Utc::now())
            .unwrap();
        assert!(matches!(outcome, SendOutcome::RetryScheduled { .. }));
    }

    #[test]
    fn permanent_failure_does_not_open_a_chain() {
        let db = Database::open_memory().unwrap();
        let sender = ScriptedSender::new(vec![Err(SendError::Permanent("bad token".into()))]);
        let (outcome, events) = scheduler()
            .deliver(&db, &sender, "n1", "t1", &payload(), Utc::now())
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Rejected { .. }));
        assert!(matches!(events[0], Event::DeliveryRejected { .. }));
        assert!(db.open_retry_for_notification("n1").unwrap().is_none());
    }

    #[test]
    fn muted_task_suppresses_send_without_retry_record() {
        let db = Database::open_memory().unwrap();
        let sender = ScriptedSender::always_ok();
        let sched = scheduler();
        let now = Utc::now();

        sched.mute(&db, "t1", MuteDuration::OneHour, now).unwrap();
        let (outcome, events) = sched
            .deliver(&db, &sender, "n1", "t1", &payload(), now)
            .unwrap();
        assert!(matches!(
            outcome,
            SendOutcome::Suppressed {
                reason: SuppressionReason::Muted,
                ..
            }
        ));
        assert!(matches!(events[0], Event::NotificationSuppressed { .. }));
        // The collaborator was never called and no chain exists.
        assert_eq!(sender.attempts(), 0);
        assert!(db.open_retry_for_notification("n1").unwrap().is_none());
    }

    #[test]
    fn snoozed_notification_suppresses_send() {
        let db = Database::open_memory().unwrap();
        let sender = ScriptedSender::always_ok();
        let sched = scheduler();
        let now = Utc::now();

        sched
            .snooze(&db, "t1", "n1", SnoozeDuration::OneHour, now)
            .unwrap();
        let (outcome, _) = sched
            .deliver(&db, &sender, "n1", "t1", &payload(), now)
            .unwrap();
        assert!(matches!(
            outcome,
            SendOutcome::Suppressed {
                reason: SuppressionReason::Snoozed,
                ..
            }
        ));

        // A different notification on the same task is not affected.
        let (outcome, _) = sched
            .deliver(&db, &sender, "n2", "t1", &payload(), now)
            .unwrap();
        assert_eq!(outcome, SendOutcome::Sent);
    }

    #[test]
    fn expired_suppression_no_longer_gates() {
        let db = Database::open_memory().unwrap();
        let sender = ScriptedSender::always_ok();
        let sched = scheduler();
        let now = Utc::now();

        sched
            .snooze(&db, "t1", "n1", SnoozeDuration::FifteenMinutes, now)
            .unwrap();
        let later = now + Duration::minutes(16);
        let (outcome, _) = sched
            .deliver(&db, &sender, "n1", "t1", &payload(), later)
            .unwrap();
        assert_eq!(outcome, SendOutcome::Sent);
    }

    #[test]
    fn retry_sweep_succeeds_and_terminates_chain() {
        let db = Database::open_memory().unwrap();
        let sched = scheduler();
        let now = Utc::now();

        let failing = ScriptedSender::new(vec![Err(SendError::Transient("oops".into()))]);
        sched
            .deliver(&db, &failing, "n1", "t1", &payload(), now)
            .unwrap();

        let ok = ScriptedSender::always_ok();
        // Not due yet.
        assert!(sched.retry_sweep(&db, &ok, now).unwrap().is_empty());

        let events = sched
            .retry_sweep(&db, &ok, now + Duration::minutes(5))
            .unwrap();
        assert!(matches!(events[0], Event::NotificationSent { .. }));
        assert!(db.open_retry_for_notification("n1").unwrap().is_none());
    }

    #[test]
    fn backoff_grows_across_failed_sweeps_until_exhaustion() {
        let db = Database::open_memory().unwrap();
        let sched = scheduler();
        let mut now = Utc::now();

        let failing = ScriptedSender::new(vec![
            Err(SendError::Transient("1".into())),
            Err(SendError::Transient("2".into())),
            Err(SendError::Transient("3".into())),
            Err(SendError::Transient("4".into())),
        ]);
        sched
            .deliver(&db, &failing, "n1", "t1", &payload(), now)
            .unwrap();

        // Attempt 1 fails: rescheduled with count 1, delay 10 min.
        now += Duration::minutes(5);
        let events = sched.retry_sweep(&db, &failing, now).unwrap();
        match &events[0] {
            Event::RetryScheduled {
                retry_count,
                next_retry_time,
                ..
            } => {
                assert_eq!(*retry_count, 1);
                assert_eq!(*next_retry_time, now + Duration::minutes(10));
            }
            other => panic!("expected RetryScheduled, got {other:?}"),
        }

        // Attempt 2 fails: count 2, delay 20 min.
        now += Duration::minutes(10);
        let events = sched.retry_sweep(&db, &failing, now).unwrap();
        match &events[0] {
            Event::RetryScheduled {
                retry_count,
                next_retry_time,
                ..
            } => {
                assert_eq!(*retry_count, 2);
                assert_eq!(*next_retry_time, now + Duration::minutes(20));
            }
            other => panic!("expected RetryScheduled, got {other:?}"),
        }

        // Attempt 3 fails: count reaches max_retries, chain is dead.
        now += Duration::minutes(20);
        let events = sched.retry_sweep(&db, &failing, now).unwrap();
        assert!(matches!(
            events[0],
            Event::RetriesExhausted { retry_count: 3, .. }
        ));
        assert!(db.open_retry_for_notification("n1").unwrap().is_none());

        // Nothing left to fire.
        now += Duration::hours(2);
        assert!(sched.retry_sweep(&db, &failing, now).unwrap().is_empty());
    }

    #[test]
    fn snooze_created_after_failure_defers_the_retry() {
        let db = Database::open_memory().unwrap();
        let sched = scheduler();
        let now = Utc::now();

        let failing = ScriptedSender::new(vec![Err(SendError::Transient("oops".into()))]);
        sched
            .deliver(&db, &failing, "n1", "t1", &payload(), now)
            .unwrap();
        sched
            .snooze(&db, "t1", "n1", SnoozeDuration::OneHour, now + Duration::minutes(1))
            .unwrap();

        let ok = ScriptedSender::always_ok();
        let events = sched
            .retry_sweep(&db, &ok, now + Duration::minutes(5))
            .unwrap();
        assert!(matches!(events[0], Event::NotificationSuppressed { .. }));
        // No send attempt was made; the chain waits for the window.
        assert_eq!(ok.attempts(), 0);
        let open = db.open_retry_for_notification("n1").unwrap().unwrap();
        assert_eq!(open.status, RetryStatus::Pending);
        assert!(open.next_retry_time >= now + Duration::minutes(59));
    }

    #[test]
    fn duplicate_snooze_fails_with_already_snoozed() {
        let db = Database::open_memory().unwrap();
        let sched = scheduler();
        let now = Utc::now();

        sched
            .snooze(&db, "t1", "n1", SnoozeDuration::OneHour, now)
            .unwrap();
        let err = sched
            .snooze(&db, "t1", "n1", SnoozeDuration::OneHour, now)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Delivery(DeliveryError::AlreadySnoozed { .. })
        ));
    }

    #[test]
    fn duplicate_mute_fails_with_already_muted() {
        let db = Database::open_memory().unwrap();
        let sched = scheduler();
        let now = Utc::now();

        sched.mute(&db, "t1", MuteDuration::FourHours, now).unwrap();
        let err = sched
            .mute(&db, "t1", MuteDuration::OneHour, now)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Delivery(DeliveryError::AlreadyMuted { .. })
        ));

        // Cancel, then a new mute is fine.
        sched.cancel_mute(&db, "t1", now).unwrap();
        assert!(sched.mute(&db, "t1", MuteDuration::OneHour, now).is_ok());
    }

    #[test]
    fn extend_snooze_never_decreases_window() {
        let db = Database::open_memory().unwrap();
        let sched = scheduler();
        let now = Utc::now();

        let (snooze, _) = sched
            .snooze(&db, "t1", "n1", SnoozeDuration::OneHour, now)
            .unwrap();
        // A shorter extension keeps the longer window.
        let (extended, _) = sched
            .extend_snooze(&db, "n1", SnoozeDuration::FifteenMinutes, now)
            .unwrap();
        assert_eq!(extended.snooze_until, snooze.snooze_until);
        assert_eq!(extended.snooze_count, 2);

        // A longer one pushes it out.
        let (extended, _) = sched
            .extend_snooze(&db, "n1", SnoozeDuration::Custom { minutes: 180 }, now)
            .unwrap();
        assert_eq!(extended.snooze_until, now + Duration::minutes(180));
        assert_eq!(extended.snooze_count, 3);
    }

    #[test]
    fn expiry_sweep_expires_lapsed_windows() {
        let db = Database::open_memory().unwrap();
        let sched = scheduler();
        let now = Utc::now();

        sched
            .snooze(&db, "t1", "n1", SnoozeDuration::FifteenMinutes, now)
            .unwrap();
        sched.mute(&db, "t2", MuteDuration::OneHour, now).unwrap();

        assert!(sched.expiry_sweep(&db, now).unwrap().is_empty());

        let events = sched
            .expiry_sweep(&db, now + Duration::minutes(61))
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::SnoozeExpired { .. })));
        assert!(events.iter().any(|e| matches!(e, Event::MuteExpired { .. })));

        // Idempotent: a second sweep finds nothing.
        assert!(sched
            .expiry_sweep(&db, now + Duration::minutes(62))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn cancel_takes_effect_before_next_fire() {
        let db = Database::open_memory().unwrap();
        let sched = scheduler();
        let now = Utc::now();

        sched.mute(&db, "t1", MuteDuration::EightHours, now).unwrap();
        sched.cancel_mute(&db, "t1", now + Duration::minutes(1)).unwrap();

        // The cancelled mute no longer suppresses anything.
        let sender = ScriptedSender::always_ok();
        let (outcome, _) = sched
            .deliver(&db, &sender, "n1", "t1", &payload(), now + Duration::minutes(2))
            .unwrap();
        assert_eq!(outcome, SendOutcome::Sent);

        // And the expiry sweep has nothing to do for it.
        assert!(sched
            .expiry_sweep(&db, now + Duration::hours(9))
            .unwrap()
            .is_empty());
    }
}
