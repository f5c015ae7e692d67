// src/engine/event_handlers.rs

//! Event handling logic for the orchestration core.
//!
//! Handlers apply one request to the [`Orchestrator`], answer the caller
//! and return the IO commands the request implies. Worker signals are
//! handled directly in [`Orchestrator::step`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::debug;

use crate::dag::{PlannedTask, ScheduledTask, TaskSpec};
use crate::engine::core::{CancelOutcome, Orchestrator};
use crate::engine::Assignment;
use crate::errors::Result;
use crate::types::{Role, TaskId, WorkerId};
use crate::workers::Worker;

/// A task handed to a worker, ready for the IO shell to execute.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub assignment: Assignment,
    pub task: ScheduledTask,
    pub worker: Arc<dyn Worker>,
}

/// Command produced by the core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Start an execution context for each assignment.
    Dispatch(Vec<Dispatch>),
    /// Stop the execution context of an assignment that no longer owns
    /// its task.
    Abort(Assignment),
    /// Request that the loop exits (used when running a plan to completion).
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer loop should keep running.
    pub keep_running: bool,
}

/// Answer a caller. A dropped receiver only means nobody is waiting.
fn reply<T>(tx: oneshot::Sender<T>, value: T) {
    if tx.send(value).is_err() {
        debug!("request reply dropped; caller went away");
    }
}

pub fn handle_submit(
    core: &mut Orchestrator,
    spec: TaskSpec,
    depends_on: Vec<TaskId>,
    tx: oneshot::Sender<Result<TaskId>>,
) -> Vec<CoreCommand> {
    reply(tx, core.submit(spec, depends_on));
    Vec::new()
}

pub fn handle_submit_plan(
    core: &mut Orchestrator,
    plan: Vec<PlannedTask>,
    tx: oneshot::Sender<Result<BTreeMap<String, TaskId>>>,
) -> Vec<CoreCommand> {
    reply(tx, core.submit_plan(plan));
    Vec::new()
}

/// Cancel a task; an in-flight assignment is aborted.
pub fn handle_cancel(
    core: &mut Orchestrator,
    task: TaskId,
    tx: oneshot::Sender<Result<CancelOutcome>>,
) -> Vec<CoreCommand> {
    let outcome = core.cancel(task);

    let commands = match &outcome {
        Ok(CancelOutcome::Cancelled {
            aborted: Some(assignment),
            ..
        }) => vec![CoreCommand::Abort(*assignment)],
        _ => Vec::new(),
    };

    reply(tx, outcome);
    commands
}

pub fn handle_register(
    core: &mut Orchestrator,
    role: Role,
    worker: Arc<dyn Worker>,
    tx: oneshot::Sender<WorkerId>,
) -> Vec<CoreCommand> {
    reply(tx, core.register_worker(role, worker));
    Vec::new()
}

/// Remove a worker; if it held a task, its execution context is aborted.
pub fn handle_unregister(
    core: &mut Orchestrator,
    worker: WorkerId,
    tx: oneshot::Sender<Result<()>>,
) -> Vec<CoreCommand> {
    match core.unregister_worker(worker) {
        Ok(aborted) => {
            reply(tx, Ok(()));
            aborted.map(CoreCommand::Abort).into_iter().collect()
        }
        Err(err) => {
            reply(tx, Err(err));
            Vec::new()
        }
    }
}

/// Requeue a task whose worker never started it, and stop that context.
pub fn handle_acquire_timeout(core: &mut Orchestrator, assignment: Assignment) -> Vec<CoreCommand> {
    if core.on_acquire_timeout(assignment) {
        vec![CoreCommand::Abort(assignment)]
    } else {
        Vec::new()
    }
}
