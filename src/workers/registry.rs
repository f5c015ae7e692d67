// src/workers/registry.rs

//! Worker registry: role -> worker handles, with exclusive acquisition.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::errors::{Result, RolegateError};
use crate::types::{Role, TaskId, WorkerId};
use crate::workers::backend::Worker;

/// Whether a worker can take a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Idle,
    Busy(TaskId),
}

/// How an assignment ended, as reported on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Finished,
    Errored,
    Cancelled,
}

/// A registered worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub id: WorkerId,
    pub role: Role,
    pub worker: Arc<dyn Worker>,
}

/// Result of [`WorkerRegistry::release`], forwarded to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleasedWorker {
    pub worker: WorkerId,
    pub task: TaskId,
    pub outcome: WorkerOutcome,
}

#[derive(Debug)]
struct WorkerSlot {
    handle: WorkerHandle,
    availability: Availability,
}

#[derive(Debug, Default)]
struct RegistryInner {
    workers: BTreeMap<WorkerId, WorkerSlot>,
    next_id: u64,
}

/// Maps roles to workers.
///
/// All methods take `&self`; a single mutex guards the table, so every
/// mutation is one critical section. In particular `acquire` checks and
/// flips a worker to `Busy` under the same lock, which means two concurrent
/// callers can never obtain the same worker.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    inner: Mutex<RegistryInner>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, role: Role, worker: Arc<dyn Worker>) -> WorkerId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = WorkerId::new(inner.next_id);

        inner.workers.insert(
            id,
            WorkerSlot {
                handle: WorkerHandle { id, role, worker },
                availability: Availability::Idle,
            },
        );

        info!(worker = %id, role = %role, "worker registered");
        id
    }

    /// Remove a worker.
    ///
    /// Returns the task it was busy with, if any; the caller decides what
    /// happens to that task.
    pub fn unregister(&self, id: WorkerId) -> Result<Option<TaskId>> {
        let slot = self
            .lock()
            .workers
            .remove(&id)
            .ok_or(RolegateError::WorkerNotFound(id))?;

        let in_flight = match slot.availability {
            Availability::Idle => None,
            Availability::Busy(task) => Some(task),
        };

        match in_flight {
            Some(task) => warn!(worker = %id, task = %task, "worker unregistered while busy"),
            None => info!(worker = %id, role = %slot.handle.role, "worker unregistered"),
        }

        Ok(in_flight)
    }

    /// Claim an idle worker of `role` for `task`.
    ///
    /// Workers are tried in registration order. `NoWorkerAvailable` is
    /// transient; callers retry on a later scheduling pass.
    pub fn acquire(&self, role: Role, task: TaskId) -> Result<WorkerHandle> {
        let mut inner = self.lock();

        let slot = inner
            .workers
            .values_mut()
            .find(|slot| slot.handle.role == role && slot.availability == Availability::Idle)
            .ok_or(RolegateError::NoWorkerAvailable(role))?;

        slot.availability = Availability::Busy(task);
        debug!(worker = %slot.handle.id, role = %role, task = %task, "worker acquired");
        Ok(slot.handle.clone())
    }

    /// Mark a busy worker idle again.
    pub fn release(&self, id: WorkerId, outcome: WorkerOutcome) -> Result<ReleasedWorker> {
        let mut inner = self.lock();
        let slot = inner
            .workers
            .get_mut(&id)
            .ok_or(RolegateError::WorkerNotFound(id))?;

        let Availability::Busy(task) = slot.availability else {
            return Err(RolegateError::WorkerNotBusy(id));
        };

        slot.availability = Availability::Idle;
        debug!(worker = %id, task = %task, ?outcome, "worker released");

        Ok(ReleasedWorker {
            worker: id,
            task,
            outcome,
        })
    }

    pub fn availability(&self, id: WorkerId) -> Option<Availability> {
        self.lock().workers.get(&id).map(|slot| slot.availability)
    }

    pub fn contains(&self, id: WorkerId) -> bool {
        self.lock().workers.contains_key(&id)
    }

    /// Ids of the workers registered for `role`, in registration order.
    pub fn workers_for(&self, role: Role) -> Vec<WorkerId> {
        self.lock()
            .workers
            .values()
            .filter(|slot| slot.handle.role == role)
            .map(|slot| slot.handle.id)
            .collect()
    }

    pub fn idle_count(&self, role: Role) -> usize {
        self.lock()
            .workers
            .values()
            .filter(|slot| slot.handle.role == role && slot.availability == Availability::Idle)
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
