// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::TaskFailure;
use crate::errors::Result;

use super::core::Orchestrator;
use super::event_handlers::{CoreCommand, CoreStep, Dispatch};
use super::handle::EngineHandle;
use super::{Assignment, EngineEvent, EngineOptions};

/// Drives the [`Orchestrator`] in response to [`EngineEvent`]s and runs one
/// execution context per assignment.
///
/// This is a pure IO shell around the core, which holds all the scheduling
/// semantics. It owns the event channel, spawns contexts for dispatched
/// tasks, and aborts contexts whose assignment the core revoked.
pub struct Runtime {
    core: Orchestrator,
    event_rx: mpsc::Receiver<EngineEvent>,
    /// Cloned into every execution context so it can report back.
    event_tx: mpsc::Sender<EngineEvent>,
    active: HashMap<Assignment, JoinHandle<()>>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("active", &self.active.len())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Build a runtime around `core` and a handle for talking to it.
    ///
    /// `capacity` bounds the event channel; callers back off when it is full.
    pub fn new(core: Orchestrator, capacity: usize) -> (Self, EngineHandle) {
        let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
        let handle = EngineHandle::new(event_tx.clone(), core.shared_graph(), core.registry());

        let runtime = Self {
            core,
            event_rx,
            event_tx,
            active: HashMap::new(),
        };
        (runtime, handle)
    }

    /// Main event loop.
    ///
    /// - Runs an initial scheduling pass for tasks submitted before start.
    /// - Consumes `EngineEvent`s and feeds them into the core.
    /// - Executes the commands returned by the core.
    ///
    /// Returns on shutdown, or when the core requests exit. Execution
    /// contexts still alive at that point are aborted.
    pub async fn run(mut self) -> Result<()> {
        info!("rolegate engine started");

        let step = self.core.kick();
        let mut keep_running = self.apply(step);

        while keep_running {
            let Some(event) = self.event_rx.recv().await else {
                info!("engine event channel closed; exiting");
                break;
            };

            debug!(?event, "engine received event");
            self.forget_reported(&event);

            let step = self.core.step(event);
            keep_running = self.apply(step);
        }

        if !self.active.is_empty() {
            warn!(active = self.active.len(), "aborting execution contexts still in flight");
        }
        for (_, handle) in self.active.drain() {
            handle.abort();
        }

        info!("engine exiting");
        Ok(())
    }

    fn apply(&mut self, step: CoreStep) -> bool {
        for command in step.commands {
            self.execute_command(command);
        }
        if !step.keep_running {
            info!("core requested exit; stopping engine");
        }
        step.keep_running
    }

    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Dispatch(dispatches) => {
                for dispatch in dispatches {
                    self.spawn_assignment(dispatch);
                }
            }
            CoreCommand::Abort(assignment) => self.abort(assignment),
            CoreCommand::RequestExit => {
                info!("all submitted work has settled");
            }
        }
    }

    fn spawn_assignment(&mut self, dispatch: Dispatch) {
        self.active.retain(|_, handle| !handle.is_finished());

        let assignment = dispatch.assignment;
        let options = *self.core.options();
        let tx = self.event_tx.clone();

        debug!(
            task = %assignment.task,
            worker = %assignment.worker,
            attempt = assignment.attempt,
            "spawning execution context"
        );

        let handle = tokio::spawn(run_assignment(dispatch, options, tx));
        self.active.insert(assignment, handle);
    }

    /// Drop the execution context of a revoked assignment. Dropping the
    /// worker future also kills any child process it owns.
    fn abort(&mut self, assignment: Assignment) {
        match self.active.remove(&assignment) {
            Some(handle) => {
                info!(
                    task = %assignment.task,
                    worker = %assignment.worker,
                    "aborting execution context"
                );
                handle.abort();
            }
            None => debug!(task = %assignment.task, "no live execution context to abort"),
        }
    }

    /// A context that reported its final signal is done.
    fn forget_reported(&mut self, event: &EngineEvent) {
        let assignment = match event {
            EngineEvent::WorkerFinished { assignment, .. }
            | EngineEvent::WorkerFailed { assignment, .. }
            | EngineEvent::AcquireTimedOut(assignment) => assignment,
            _ => return,
        };
        self.active.remove(assignment);
    }
}

/// Execution context of one assignment.
///
/// 1. Wait for the worker to accept, bounded by the acquire timeout.
/// 2. Report the start.
/// 3. Execute, bounded by the execution timeout if one is configured.
/// 4. Report the result or the failure.
async fn run_assignment(
    dispatch: Dispatch,
    options: EngineOptions,
    tx: mpsc::Sender<EngineEvent>,
) {
    let Dispatch {
        assignment,
        task,
        worker,
    } = dispatch;

    let accepted = tokio::time::timeout(options.acquire_timeout, worker.accept(&task)).await;
    match accepted {
        Err(_) => {
            report(&tx, EngineEvent::AcquireTimedOut(assignment)).await;
            return;
        }
        Ok(Err(err)) => {
            let failure = TaskFailure::WorkerError(format!("{err:#}"));
            report(&tx, EngineEvent::WorkerFailed { assignment, failure }).await;
            return;
        }
        Ok(Ok(())) => {}
    }

    report(&tx, EngineEvent::WorkerStarted(assignment)).await;

    let executed = match options.execution_timeout {
        Some(limit) => match tokio::time::timeout(limit, worker.execute(&task)).await {
            Ok(res) => res,
            Err(_) => {
                let failure = TaskFailure::ExecutionTimeout(limit);
                report(&tx, EngineEvent::WorkerFailed { assignment, failure }).await;
                return;
            }
        },
        None => worker.execute(&task).await,
    };

    let event = match executed {
        Ok(output) => EngineEvent::WorkerFinished { assignment, output },
        Err(err) => EngineEvent::WorkerFailed {
            assignment,
            failure: TaskFailure::WorkerError(format!("{err:#}")),
        },
    };
    report(&tx, event).await;
}

async fn report(tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    if tx.send(event).await.is_err() {
        debug!("engine stopped before execution context reported");
    }
}
