// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the task graph (what may run)
//! - the worker registry (who may run it)
//! - the gate evaluator (whether dependents may proceed)
//! - the main event loop that reacts to:
//!   - task submissions and cancellations
//!   - worker registration changes
//!   - worker start / completion / failure signals
//!   - acquire timeouts and shutdown
//!
//! The synchronous state machine lives in [`core`]; the async/IO shell that
//! owns the event channel and spawns one execution context per assignment
//! is implemented in [`runtime`]. External callers talk to the loop through
//! an [`EngineHandle`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::dag::{PlannedTask, TaskFailure, TaskSpec};
use crate::errors::Result;
use crate::types::{Role, TaskId, WorkerId};
use crate::workers::{WorkOutput, Worker};

pub mod core;
pub mod event_handlers;
pub mod handle;
pub mod runtime;

pub use self::core::{CancelOutcome, Orchestrator};
pub use event_handlers::{CoreCommand, CoreStep, Dispatch};
pub use handle::EngineHandle;
pub use runtime::Runtime;

/// Default bound on how long an assigned task may take to start.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// An assigned task that has not started within this bound is requeued
    /// and its worker removed.
    pub acquire_timeout: Duration,
    /// Running tasks exceeding this bound fail. `None` means unbounded.
    pub execution_timeout: Option<Duration>,
    /// Stop the loop once no task is in flight (used by the CLI).
    pub exit_when_idle: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            execution_timeout: None,
            exit_when_idle: false,
        }
    }
}

/// One task handed to one worker.
///
/// `attempt` distinguishes successive assignments of the same task, so that
/// signals from an assignment that was requeued or cancelled can be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Assignment {
    pub task: TaskId,
    pub worker: WorkerId,
    pub attempt: u32,
}

/// Events flowing into the runtime from callers and execution contexts.
#[derive(Debug)]
pub enum EngineEvent {
    Submit {
        spec: TaskSpec,
        depends_on: Vec<TaskId>,
        reply: oneshot::Sender<Result<TaskId>>,
    },
    SubmitPlan {
        plan: Vec<PlannedTask>,
        reply: oneshot::Sender<Result<BTreeMap<String, TaskId>>>,
    },
    Cancel {
        task: TaskId,
        reply: oneshot::Sender<Result<CancelOutcome>>,
    },
    RegisterWorker {
        role: Role,
        worker: Arc<dyn Worker>,
        reply: oneshot::Sender<WorkerId>,
    },
    UnregisterWorker {
        worker: WorkerId,
        reply: oneshot::Sender<Result<()>>,
    },
    /// The worker accepted the assignment and began executing.
    WorkerStarted(Assignment),
    WorkerFinished {
        assignment: Assignment,
        output: WorkOutput,
    },
    WorkerFailed {
        assignment: Assignment,
        failure: TaskFailure,
    },
    /// The acquire timer of an assignment fired.
    AcquireTimedOut(Assignment),
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}
