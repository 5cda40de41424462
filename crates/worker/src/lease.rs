//! In-flight registry of leases held by this worker.
//!
//! The authority is the owner of every lease; the registry only mirrors what
//! this process holds so that a task is never dispatched twice while its
//! lease is live, and so that results are not reported after the lease could
//! plausibly have expired.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use onboardflow_core::{ExternalTask, TaskId, WorkerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub task_id: TaskId,
    pub topic: String,
    pub worker_id: WorkerId,
    /// Local instant taken before the fetch that granted the lease.
    pub acquired: Instant,
    /// `acquired + lock_duration`; never later than the authority's expiry.
    pub deadline: Instant,
    /// Expiry as reported by the authority (informational).
    pub authority_expiry: DateTime<Utc>,
    pub generation: u64,
}

impl Lease {
    /// Whether there is still time to act on the task at `now`.
    pub fn is_live(&self, now: Instant, safety_margin: Duration) -> bool {
        now + safety_margin < self.deadline
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    leases: HashMap<TaskId, Lease>,
    next_generation: u64,
}

/// Shared, cloneable registry.
#[derive(Debug, Clone, Default)]
pub struct LeaseRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a freshly fetched task.
    ///
    /// Returns `None` when the task is already held under a lease that has
    /// not reached its deadline.
    pub fn try_acquire(
        &self,
        task: &ExternalTask,
        acquired: Instant,
        lock_duration: Duration,
        now: Instant,
    ) -> Option<Lease> {
        let mut inner = self.lock();
        if let Some(existing) = inner.leases.get(&task.id) {
            if now < existing.deadline {
                return None;
            }
        }

        inner.next_generation += 1;
        let lease = Lease {
            task_id: task.id,
            topic: task.topic.clone(),
            worker_id: task.worker_id.clone(),
            acquired,
            deadline: acquired + lock_duration,
            authority_expiry: task.lock_expiration_time,
            generation: inner.next_generation,
        };
        inner.leases.insert(task.id, lease.clone());
        Some(lease)
    }

    /// Whether `lease` is still the registry's entry for its task.
    pub fn is_current(&self, lease: &Lease) -> bool {
        self.lock()
            .leases
            .get(&lease.task_id)
            .is_some_and(|held| held.generation == lease.generation)
    }

    /// Drop the entry for `lease`, unless it was superseded by a newer one.
    pub fn release(&self, lease: &Lease) {
        let mut inner = self.lock();
        if inner
            .leases
            .get(&lease.task_id)
            .is_some_and(|held| held.generation == lease.generation)
        {
            inner.leases.remove(&lease.task_id);
        }
    }

    pub fn held(&self) -> usize {
        self.lock().leases.len()
    }
}
