//! Bounded allocator for actively monitored regions.
//!
//! The sensing platform can track only `capacity` regions at a time.
//! Registration beyond capacity is resolved by priority: an incoming
//! region that strictly outranks the lowest-priority active region evicts
//! it; anything else is parked in a pending backlog and retried whenever
//! a slot frees up (capacity increase or unregister).
//!
//! No internal threads and no global state -- callers own serialization
//! of mutations, reads can work on cloned snapshots.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::MonitoredRegion;
use crate::error::{CoreError, RegionError};

/// Result of a successful `register` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterOutcome {
    pub region_id: String,
    /// Region that was evicted to make room, if any.
    pub evicted: Option<MonitoredRegion>,
}

/// Result of a capacity change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapacityChange {
    pub capacity: usize,
    /// Regions evicted by a shrink, lowest priority first.
    pub evicted: Vec<MonitoredRegion>,
    /// Backlogged regions re-admitted by a grow.
    pub readmitted: Vec<MonitoredRegion>,
}

/// Result of unregistering a task's regions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnregisterAllOutcome {
    pub removed: Vec<MonitoredRegion>,
    pub readmitted: Vec<MonitoredRegion>,
}

/// Owns the bounded set of actively monitored regions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionAllocator {
    capacity: usize,
    active: Vec<MonitoredRegion>,
    /// Rejected/evicted regions waiting for a slot.
    backlog: Vec<MonitoredRegion>,
}

impl RegionAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            active: Vec::new(),
            backlog: Vec::new(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn backlog_count(&self) -> usize {
        self.backlog.len()
    }

    pub fn get(&self, region_id: &str) -> Option<&MonitoredRegion> {
        self.active.iter().find(|r| r.id == region_id)
    }

    /// Active regions, highest priority first (oldest first within a tier).
    pub fn list_active(&self) -> Vec<MonitoredRegion> {
        let mut regions = self.active.clone();
        regions.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then(a.created_at.cmp(&b.created_at))
        });
        regions
    }

    /// Backlogged regions, highest priority first (oldest first within a
    /// tier).
    pub fn list_backlog(&self) -> Vec<MonitoredRegion> {
        let mut regions = self.backlog.clone();
        regions.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then(a.created_at.cmp(&b.created_at))
        });
        regions
    }

    /// Active regions owned by the given task.
    pub fn regions_for_task(&self, task_id: &str) -> Vec<MonitoredRegion> {
        self.active
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Register a region for monitoring.
    ///
    /// Below capacity the region is accepted unconditionally. At capacity
    /// the lowest-priority active region (oldest on ties) is evicted iff
    /// the incoming priority is strictly greater; otherwise the region is
    /// parked in the backlog and `CapacityExceeded` is returned. The
    /// caller may retry implicitly: backlogged regions are re-admitted on
    /// the next capacity increase or unregister.
    ///
    /// # Errors
    /// Validation errors for bad coordinates/radius (checked before any
    /// eviction logic), `CapacityExceeded` when the region is parked.
    pub fn register(&mut self, region: MonitoredRegion) -> Result<RegisterOutcome, CoreError> {
        region.center.validate()?;
        if !region.radius_meters.is_finite() || region.radius_meters <= 0.0 {
            return Err(crate::error::ValidationError::InvalidRadius(region.radius_meters).into());
        }

        if self.active.len() < self.capacity {
            debug!(region_id = %region.id, task_id = %region.task_id, "region registered");
            let region_id = region.id.clone();
            self.active.push(region);
            return Ok(RegisterOutcome {
                region_id,
                evicted: None,
            });
        }

        // At capacity: compare against the minimum-priority active region.
        let Some(min_idx) = self.min_priority_index() else {
            // Capacity is zero -- nothing can ever be active.
            let priority = region.priority();
            self.backlog.push(region);
            return Err(RegionError::CapacityExceeded {
                active: 0,
                capacity: 0,
                incoming_priority: priority,
                min_priority: 0,
            }
            .into());
        };

        let min_priority = self.active[min_idx].priority();
        if region.priority() > min_priority {
            let evicted = self.active.swap_remove(min_idx);
            info!(
                evicted = %evicted.id,
                accepted = %region.id,
                "evicted lowest-priority region to make room"
            );
            let region_id = region.id.clone();
            self.active.push(region);
            self.backlog.push(evicted.clone());
            Ok(RegisterOutcome {
                region_id,
                evicted: Some(evicted),
            })
        } else {
            let err = RegionError::CapacityExceeded {
                active: self.active.len(),
                capacity: self.capacity,
                incoming_priority: region.priority(),
                min_priority,
            };
            debug!(region_id = %region.id, "region parked in backlog: {err}");
            self.backlog.push(region);
            Err(err.into())
        }
    }

    /// Stop monitoring a region. Frees a slot and re-admits backlogged
    /// regions into it.
    ///
    /// # Errors
    /// `NotFound` if the id is neither active nor backlogged.
    pub fn unregister(&mut self, region_id: &str) -> Result<UnregisterAllOutcome, CoreError> {
        if let Some(idx) = self.active.iter().position(|r| r.id == region_id) {
            let removed = self.active.swap_remove(idx);
            debug!(region_id, "region unregistered");
            let readmitted = self.drain_backlog();
            return Ok(UnregisterAllOutcome {
                removed: vec![removed],
                readmitted,
            });
        }
        if let Some(idx) = self.backlog.iter().position(|r| r.id == region_id) {
            let removed = self.backlog.swap_remove(idx);
            return Ok(UnregisterAllOutcome {
                removed: vec![removed],
                readmitted: Vec::new(),
            });
        }
        Err(RegionError::NotFound(region_id.to_string()).into())
    }

    /// Drop every region (active and backlogged) owned by a task.
    ///
    /// Called when the task is deleted, completed, or muted. Freed slots
    /// are immediately refilled from the backlog.
    pub fn unregister_all(&mut self, task_id: &str) -> UnregisterAllOutcome {
        let mut removed = Vec::new();
        self.active.retain(|r| {
            if r.task_id == task_id {
                removed.push(r.clone());
                false
            } else {
                true
            }
        });
        self.backlog.retain(|r| {
            if r.task_id == task_id {
                removed.push(r.clone());
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            info!(task_id, count = removed.len(), "unregistered all regions for task");
        }
        let readmitted = self.drain_backlog();
        UnregisterAllOutcome {
            removed,
            readmitted,
        }
    }

    /// Change the capacity ceiling.
    ///
    /// Shrinking evicts lowest-priority regions (oldest on ties) down to
    /// the new ceiling; evicted regions are backlogged so they return
    /// when the ceiling rises again. Growing re-admits backlogged
    /// regions, highest priority first.
    pub fn set_capacity(&mut self, capacity: usize) -> CapacityChange {
        self.capacity = capacity;
        let mut change = CapacityChange {
            capacity,
            ..CapacityChange::default()
        };

        while self.active.len() > self.capacity {
            let Some(min_idx) = self.min_priority_index() else {
                break;
            };
            let evicted = self.active.swap_remove(min_idx);
            debug!(region_id = %evicted.id, "evicted by capacity shrink");
            self.backlog.push(evicted.clone());
            change.evicted.push(evicted);
        }

        change.readmitted = self.drain_backlog();
        if !change.evicted.is_empty() || !change.readmitted.is_empty() {
            info!(
                capacity,
                evicted = change.evicted.len(),
                readmitted = change.readmitted.len(),
                "capacity changed"
            );
        }
        change
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Index of the lowest-priority active region, oldest first on ties.
    fn min_priority_index(&self) -> Option<usize> {
        self.active
            .iter()
            .enumerate()
            .min_by_key(|(_, r)| (r.priority(), r.created_at))
            .map(|(idx, _)| idx)
    }

    /// Move backlogged regions into free slots, highest priority first
    /// (oldest first within a tier).
    fn drain_backlog(&mut self) -> Vec<MonitoredRegion> {
        if self.backlog.is_empty() || self.active.len() >= self.capacity {
            return Vec::new();
        }
        self.backlog.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then(a.created_at.cmp(&b.created_at))
        });
        let free = self.capacity - self.active.len();
        let take = free.min(self.backlog.len());
        let readmitted: Vec<MonitoredRegion> = self.backlog.drain(..take).collect();
        for region in &readmitted {
            debug!(region_id = %region.id, "re-admitted from backlog");
            self.active.push(region.clone());
        }
        readmitted
    }
}
