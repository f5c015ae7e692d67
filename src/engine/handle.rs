// src/engine/handle.rs

//! Client side of the engine.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use tokio::sync::{mpsc, oneshot};

use crate::dag::{PlannedTask, TaskGraph, TaskRecord, TaskSpec};
use crate::engine::core::CancelOutcome;
use crate::engine::EngineEvent;
use crate::errors::{Result, RolegateError};
use crate::types::{Role, TaskId, TaskStatus, WorkerId};
use crate::workers::{Worker, WorkerRegistry};

/// Cheap, cloneable handle to a running engine.
///
/// Mutations go through the event loop and wait for its answer. Status
/// queries read the shared graph directly and never block on the loop.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineEvent>,
    graph: Arc<RwLock<TaskGraph>>,
    registry: Arc<WorkerRegistry>,
}

impl EngineHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<EngineEvent>,
        graph: Arc<RwLock<TaskGraph>>,
        registry: Arc<WorkerRegistry>,
    ) -> Self {
        Self {
            tx,
            graph,
            registry,
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> EngineEvent) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| RolegateError::EngineStopped)?;
        rx.await.map_err(|_| RolegateError::EngineStopped)
    }

    /// Add a task depending on already submitted tasks.
    pub async fn submit(
        &self,
        spec: TaskSpec,
        depends_on: impl IntoIterator<Item = TaskId>,
    ) -> Result<TaskId> {
        let depends_on = depends_on.into_iter().collect();
        self.request(|reply| EngineEvent::Submit {
            spec,
            depends_on,
            reply,
        })
        .await?
    }

    /// Add a batch of tasks atomically; returns key -> id.
    pub async fn submit_plan(&self, plan: Vec<PlannedTask>) -> Result<BTreeMap<String, TaskId>> {
        self.request(|reply| EngineEvent::SubmitPlan { plan, reply })
            .await?
    }

    pub async fn cancel(&self, task: TaskId) -> Result<CancelOutcome> {
        self.request(|reply| EngineEvent::Cancel { task, reply })
            .await?
    }

    pub async fn register_worker(&self, role: Role, worker: Arc<dyn Worker>) -> Result<WorkerId> {
        self.request(|reply| EngineEvent::RegisterWorker {
            role,
            worker,
            reply,
        })
        .await
    }

    pub async fn unregister_worker(&self, worker: WorkerId) -> Result<()> {
        self.request(|reply| EngineEvent::UnregisterWorker { worker, reply })
            .await?
    }

    /// Ask the loop to stop. Contexts still in flight are aborted.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(EngineEvent::ShutdownRequested)
            .await
            .map_err(|_| RolegateError::EngineStopped)
    }

    fn read(&self) -> RwLockReadGuard<'_, TaskGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of one task.
    pub fn status(&self, task: TaskId) -> Result<TaskRecord> {
        self.read()
            .snapshot(task)
            .ok_or(RolegateError::TaskNotFound(task))
    }

    /// Snapshot of every task, in creation order.
    pub fn snapshot_all(&self) -> Vec<TaskRecord> {
        self.read().iter().cloned().collect()
    }

    /// Tasks that can never run because a dependency failed or is blocked.
    pub fn stalled_tasks(&self) -> Vec<TaskId> {
        self.read().stalled_tasks()
    }

    pub fn counts(&self) -> BTreeMap<TaskStatus, usize> {
        self.read().counts()
    }

    pub fn registry(&self) -> Arc<WorkerRegistry> {
        Arc::clone(&self.registry)
    }
}
