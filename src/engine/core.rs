// src/engine/core.rs

//! Synchronous orchestration core.
//!
//! [`Orchestrator`] consumes [`EngineEvent`]s and produces [`CoreCommand`]s
//! for the IO shell (`engine::runtime::Runtime`). It never awaits, never
//! spawns and never touches a clock, so the whole task lifecycle can be
//! driven step by step in tests.
//!
//! Its only persistent state lives in the task graph and the worker
//! registry. Both sit behind shared pointers so status queries can read
//! them while the loop runs, and so a fresh core can be rebuilt from them
//! with [`Orchestrator::from_parts`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::dag::{GateState, PlannedTask, ScheduledTask, TaskFailure, TaskGraph, TaskRecord, TaskSpec};
use crate::engine::event_handlers::{self, CoreCommand, CoreStep, Dispatch};
use crate::engine::{Assignment, EngineEvent, EngineOptions};
use crate::errors::{Result, RolegateError};
use crate::gate::{GateDecision, GateEvaluator, GatePolicy};
use crate::types::{Role, TaskId, TaskStatus, WorkerId};
use crate::workers::{WorkOutput, Worker, WorkerOutcome, WorkerRegistry};

/// What a cancellation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task had not started and nothing depended on it; it is gone.
    Removed,
    /// The task is now `Failed`.
    Cancelled {
        /// Assignment that was interrupted, if the task was in flight.
        aborted: Option<Assignment>,
        /// Dependents moved to `Blocked`.
        blocked_dependents: Vec<TaskId>,
    },
}

#[derive(Debug)]
pub struct Orchestrator {
    graph: Arc<RwLock<TaskGraph>>,
    registry: Arc<WorkerRegistry>,
    gate: GateEvaluator,
    options: EngineOptions,
}

impl Orchestrator {
    pub fn new(policy: GatePolicy, options: EngineOptions) -> Self {
        Self::from_parts(
            Arc::new(RwLock::new(TaskGraph::new())),
            Arc::new(WorkerRegistry::new()),
            policy,
            options,
        )
    }

    /// Rebuild a core around existing graph and registry state.
    pub fn from_parts(
        graph: Arc<RwLock<TaskGraph>>,
        registry: Arc<WorkerRegistry>,
        policy: GatePolicy,
        options: EngineOptions,
    ) -> Self {
        Self {
            graph,
            registry,
            gate: GateEvaluator::new(policy),
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn gate_policy(&self) -> &GatePolicy {
        self.gate.policy()
    }

    pub fn shared_graph(&self) -> Arc<RwLock<TaskGraph>> {
        Arc::clone(&self.graph)
    }

    pub fn registry(&self) -> Arc<WorkerRegistry> {
        Arc::clone(&self.registry)
    }

    fn read(&self) -> RwLockReadGuard<'_, TaskGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TaskGraph> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self, id: TaskId) -> Option<TaskRecord> {
        self.read().snapshot(id)
    }

    /// No task is assigned, running or waiting on the gate.
    pub fn is_quiescent(&self) -> bool {
        self.read().in_flight_count() == 0
    }

    pub fn submit(&mut self, spec: TaskSpec, deps: impl IntoIterator<Item = TaskId>) -> Result<TaskId> {
        let role = spec.role;
        let id = self.write().add_task(spec, deps)?;
        info!(task = %id, role = %role, "task submitted");
        Ok(id)
    }

    pub fn submit_plan(&mut self, plan: Vec<PlannedTask>) -> Result<BTreeMap<String, TaskId>> {
        let ids = self.write().add_batch(plan)?;
        info!(tasks = ids.len(), "plan submitted");
        Ok(ids)
    }

    pub fn register_worker(&mut self, role: Role, worker: Arc<dyn Worker>) -> WorkerId {
        self.registry.register(role, worker)
    }

    /// Remove a worker. A task it was holding fails with `WorkerLost`; the
    /// interrupted assignment is returned so the shell can abort it.
    pub fn unregister_worker(&mut self, worker: WorkerId) -> Result<Option<Assignment>> {
        let Some(task) = self.registry.unregister(worker)? else {
            return Ok(None);
        };

        let mut graph = self.write();
        let Some(rec) = graph.get(task) else {
            return Ok(None);
        };
        if rec.assigned_to != Some(worker)
            || !matches!(rec.status, TaskStatus::Assigned | TaskStatus::Running)
        {
            return Ok(None);
        }

        let assignment = Assignment {
            task,
            worker,
            attempt: rec.attempt,
        };
        graph.mark_status(task, TaskStatus::Failed)?;
        if let Some(rec) = graph.get_mut(task) {
            rec.assigned_to = None;
            rec.failure = Some(TaskFailure::WorkerLost(worker));
        }

        warn!(task = %task, worker = %worker, "worker removed while holding task; task failed");
        Ok(Some(assignment))
    }

    /// One scheduling pass.
    ///
    /// Walks the ready tasks in creation order and hands each one to an idle
    /// worker of its role. A role with no idle worker is skipped for the
    /// rest of the pass; its tasks stay `Ready` for the next one. Roles never
    /// borrow each other's workers.
    ///
    /// Corrective tasks whose target no longer needs them are retired first.
    pub fn schedule(&mut self) -> Vec<Dispatch> {
        let mut graph = self.write();
        for retired in graph.retire_unneeded_remediations() {
            block_dependents(&mut graph, retired);
        }

        let ready: Vec<TaskId> = graph.ready_tasks().collect();

        let mut exhausted: BTreeSet<Role> = BTreeSet::new();
        let mut dispatches = Vec::new();

        for id in ready {
            let Some((role, status)) = graph.get(id).map(|rec| (rec.role, rec.status)) else {
                continue;
            };

            if status == TaskStatus::Pending && graph.mark_status(id, TaskStatus::Ready).is_err() {
                continue;
            }

            if exhausted.contains(&role) {
                continue;
            }

            let handle = match self.registry.acquire(role, id) {
                Ok(handle) => handle,
                Err(RolegateError::NoWorkerAvailable(_)) => {
                    debug!(task = %id, role = %role, "no idle worker; task stays ready");
                    exhausted.insert(role);
                    continue;
                }
                Err(err) => {
                    warn!(task = %id, role = %role, error = %err, "worker acquisition failed");
                    continue;
                }
            };

            if graph.mark_status(id, TaskStatus::Assigned).is_err() {
                self.release_worker(handle.id, WorkerOutcome::Cancelled);
                continue;
            }

            let Some(rec) = graph.get_mut(id) else {
                continue;
            };
            rec.assigned_to = Some(handle.id);
            rec.attempt += 1;

            let assignment = Assignment {
                task: id,
                worker: handle.id,
                attempt: rec.attempt,
            };

            info!(
                task = %id,
                role = %role,
                worker = %handle.id,
                attempt = rec.attempt,
                "task assigned"
            );

            dispatches.push(Dispatch {
                assignment,
                task: ScheduledTask::from_record(rec),
                worker: handle.worker,
            });
        }

        dispatches
    }

    /// The worker began executing. Returns `false` for stale signals.
    pub fn on_worker_started(&mut self, assignment: Assignment) -> bool {
        let mut graph = self.write();

        if !is_current(&graph, assignment, &[TaskStatus::Assigned]) {
            debug!(task = %assignment.task, attempt = assignment.attempt, "ignoring stale start signal");
            return false;
        }

        if graph.mark_status(assignment.task, TaskStatus::Running).is_err() {
            return false;
        }

        info!(task = %assignment.task, worker = %assignment.worker, "task running");
        true
    }

    /// The worker reported a result.
    ///
    /// Attaches result and verification, runs the gate, moves the task to
    /// `Completed` or `Blocked`, releases the worker and promotes dependents
    /// that became ready. Returns the gate decision, or `None` for stale
    /// signals.
    pub fn on_worker_finished(
        &mut self,
        assignment: Assignment,
        output: WorkOutput,
    ) -> Option<GateDecision> {
        let (decision, candidates) = {
            let mut graph = self.write();

            if !is_current(&graph, assignment, &[TaskStatus::Running]) {
                debug!(task = %assignment.task, attempt = assignment.attempt, "ignoring stale completion");
                return None;
            }

            let gated = self.apply_gate(&mut graph, assignment.task, output);
            (gated?, graph_candidates(&graph, assignment.task))
        };

        self.release_worker(assignment.worker, WorkerOutcome::Finished);

        let promoted = self.write().promote_ready(candidates);
        if !promoted.is_empty() {
            debug!(task = %assignment.task, ?promoted, "dependents became ready");
        }

        Some(decision)
    }

    fn apply_gate(
        &self,
        graph: &mut TaskGraph,
        task: TaskId,
        output: WorkOutput,
    ) -> Option<GateDecision> {
        graph.mark_status(task, TaskStatus::AwaitingGate).ok()?;

        let rec = graph.get_mut(task)?;
        rec.result = output.result;
        rec.verification = output.verification;
        rec.assigned_to = None;

        let decision = self.gate.evaluate(rec);
        let (next, gate) = match decision {
            GateDecision::Pass => (TaskStatus::Completed, GateState::Passed),
            GateDecision::Fail(_) => (TaskStatus::Blocked, GateState::Failed),
        };
        graph.mark_status(task, next).ok()?;

        let rec = graph.get_mut(task)?;
        rec.gate = gate;
        let remediates = rec.remediates;

        match &decision {
            GateDecision::Pass => {
                info!(task = %task, role = %rec.role, "task completed; gate passed");
                if let Some(target) = remediates {
                    graph.remediate(target, task);
                }
            }
            GateDecision::Fail(reason) => {
                rec.failure = Some(TaskFailure::GateFail(reason.clone()));
                warn!(task = %task, role = %rec.role, reason = %reason, "gate failed; task blocked");
            }
        }

        Some(decision)
    }

    /// The worker errored, was lost mid-run, or exceeded the execution
    /// timeout. Returns `false` for stale signals.
    pub fn on_worker_failed(&mut self, assignment: Assignment, failure: TaskFailure) -> bool {
        {
            let mut graph = self.write();

            if !is_current(
                &graph,
                assignment,
                &[TaskStatus::Assigned, TaskStatus::Running],
            ) {
                debug!(task = %assignment.task, attempt = assignment.attempt, "ignoring stale failure");
                return false;
            }

            if graph.mark_status(assignment.task, TaskStatus::Failed).is_err() {
                return false;
            }
            if let Some(rec) = graph.get_mut(assignment.task) {
                rec.assigned_to = None;
                rec.failure = Some(failure.clone());
            }
        }

        warn!(
            task = %assignment.task,
            worker = %assignment.worker,
            failure = %failure,
            "task failed; dependents will not run"
        );

        self.release_worker(assignment.worker, WorkerOutcome::Errored);
        true
    }

    /// The acquire timer fired. If the task still has not started it goes
    /// back to `Ready` and the worker is presumed lost and removed.
    pub fn on_acquire_timeout(&mut self, assignment: Assignment) -> bool {
        {
            let mut graph = self.write();

            if !is_current(&graph, assignment, &[TaskStatus::Assigned]) {
                return false;
            }

            if graph.mark_status(assignment.task, TaskStatus::Ready).is_err() {
                return false;
            }
            if let Some(rec) = graph.get_mut(assignment.task) {
                rec.assigned_to = None;
            }
        }

        warn!(
            task = %assignment.task,
            worker = %assignment.worker,
            timeout_ms = self.options.acquire_timeout.as_millis() as u64,
            "worker did not start in time; requeueing task and removing worker"
        );

        if let Err(err) = self.registry.unregister(assignment.worker) {
            debug!(worker = %assignment.worker, error = %err, "worker already gone");
        }
        true
    }

    /// Cancel a task.
    ///
    /// - not started, no dependents: removed from the graph
    /// - otherwise: `Failed`, its worker (if any) released, and every
    ///   not-yet-started transitive dependent moved to `Blocked`
    pub fn cancel(&mut self, id: TaskId) -> Result<CancelOutcome> {
        let mut graph = self.write();

        let rec = graph.get(id).ok_or(RolegateError::TaskNotFound(id))?;
        let status = rec.status;
        let aborted = rec.assigned_to.map(|worker| Assignment {
            task: id,
            worker,
            attempt: rec.attempt,
        });

        match status {
            TaskStatus::Pending | TaskStatus::Ready if graph.neighbors(id).next().is_none() => {
                graph.remove(id);
                info!(task = %id, "cancelled task removed");
                Ok(CancelOutcome::Removed)
            }
            TaskStatus::Pending | TaskStatus::Ready | TaskStatus::Assigned | TaskStatus::Running => {
                graph.mark_status(id, TaskStatus::Failed)?;
                if let Some(rec) = graph.get_mut(id) {
                    rec.assigned_to = None;
                    rec.failure = Some(TaskFailure::Cancelled);
                }
                let blocked_dependents = block_dependents(&mut graph, id);
                drop(graph);

                if let Some(assignment) = aborted {
                    self.release_worker(assignment.worker, WorkerOutcome::Cancelled);
                }

                info!(task = %id, blocked = blocked_dependents.len(), "task cancelled");
                Ok(CancelOutcome::Cancelled {
                    aborted,
                    blocked_dependents,
                })
            }
            _ => {
                warn!(task = %id, status = %status, "cannot cancel task in this state");
                Err(RolegateError::InvalidTransition {
                    task: id,
                    from: status,
                    to: TaskStatus::Failed,
                })
            }
        }
    }

    fn release_worker(&self, worker: WorkerId, outcome: WorkerOutcome) {
        if let Err(err) = self.registry.release(worker, outcome) {
            debug!(worker = %worker, error = %err, "worker release skipped");
        }
    }

    /// Handle a single event and run a scheduling pass.
    pub fn step(&mut self, event: EngineEvent) -> CoreStep {
        let commands = match event {
            EngineEvent::Submit {
                spec,
                depends_on,
                reply,
            } => event_handlers::handle_submit(self, spec, depends_on, reply),
            EngineEvent::SubmitPlan { plan, reply } => {
                event_handlers::handle_submit_plan(self, plan, reply)
            }
            EngineEvent::Cancel { task, reply } => event_handlers::handle_cancel(self, task, reply),
            EngineEvent::RegisterWorker {
                role,
                worker,
                reply,
            } => event_handlers::handle_register(self, role, worker, reply),
            EngineEvent::UnregisterWorker { worker, reply } => {
                event_handlers::handle_unregister(self, worker, reply)
            }
            EngineEvent::WorkerStarted(assignment) => {
                self.on_worker_started(assignment);
                Vec::new()
            }
            EngineEvent::WorkerFinished { assignment, output } => {
                self.on_worker_finished(assignment, output);
                Vec::new()
            }
            EngineEvent::WorkerFailed {
                assignment,
                failure,
            } => {
                self.on_worker_failed(assignment, failure);
                Vec::new()
            }
            EngineEvent::AcquireTimedOut(assignment) => {
                event_handlers::handle_acquire_timeout(self, assignment)
            }
            EngineEvent::ShutdownRequested => {
                return CoreStep {
                    commands: Vec::new(),
                    keep_running: false,
                };
            }
        };

        self.finish_step(commands)
    }

    /// Scheduling pass without an event, used when the loop starts.
    pub fn kick(&mut self) -> CoreStep {
        self.finish_step(Vec::new())
    }

    fn finish_step(&mut self, mut commands: Vec<CoreCommand>) -> CoreStep {
        let dispatches = self.schedule();
        if !dispatches.is_empty() {
            commands.push(CoreCommand::Dispatch(dispatches));
        }

        let mut keep_running = true;
        if self.options.exit_when_idle && self.is_quiescent() {
            keep_running = false;
            commands.push(CoreCommand::RequestExit);
        }

        CoreStep {
            commands,
            keep_running,
        }
    }
}

/// The task is still held by this exact assignment and in one of `expected`.
fn is_current(graph: &TaskGraph, assignment: Assignment, expected: &[TaskStatus]) -> bool {
    graph.get(assignment.task).is_some_and(|rec| {
        rec.assigned_to == Some(assignment.worker)
            && rec.attempt == assignment.attempt
            && expected.contains(&rec.status)
    })
}

/// Tasks whose readiness may have changed after `task` finished: its direct
/// dependents, plus those of the task it remediated.
fn graph_candidates(graph: &TaskGraph, task: TaskId) -> Vec<TaskId> {
    let mut candidates: Vec<TaskId> = graph.neighbors(task).collect();
    if let Some(rec) = graph.get(task) {
        if let Some(target) = rec.remediates {
            if graph
                .get(target)
                .is_some_and(|t| t.gate == GateState::Remediated(task))
            {
                candidates.extend(graph.neighbors(target));
            }
        }
    }
    candidates
}

/// Move every not-yet-started transitive dependent of a cancelled or
/// retired task to `Blocked`.
fn block_dependents(graph: &mut TaskGraph, cancelled: TaskId) -> Vec<TaskId> {
    let mut blocked = Vec::new();

    for dep in graph.transitive_dependents(cancelled) {
        let waiting = graph
            .get(dep)
            .is_some_and(|rec| matches!(rec.status, TaskStatus::Pending | TaskStatus::Ready));
        if waiting && graph.mark_status(dep, TaskStatus::Blocked).is_ok() {
            if let Some(rec) = graph.get_mut(dep) {
                rec.failure = Some(TaskFailure::DependencyCancelled(cancelled));
            }
            debug!(task = %dep, cancelled = %cancelled, "dependent blocked by cancellation");
            blocked.push(dep);
        }
    }

    blocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Verification;
    use crate::workers::WorkFuture;

    #[derive(Debug)]
    struct Idle;

    impl Worker for Idle {
        fn execute<'a>(&'a self, _task: &'a ScheduledTask) -> WorkFuture<'a, WorkOutput> {
            Box::pin(async { Ok(WorkOutput::default()) })
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(GatePolicy::default(), EngineOptions::default())
    }

    fn start(core: &mut Orchestrator, task: TaskId) -> Assignment {
        let dispatch = core
            .schedule()
            .into_iter()
            .find(|d| d.assignment.task == task)
            .expect("task dispatched");
        assert!(core.on_worker_started(dispatch.assignment));
        dispatch.assignment
    }

    #[test]
    fn completion_runs_gate_and_promotes_dependents() {
        let mut core = orchestrator();
        core.register_worker(Role::Design, Arc::new(Idle));
        core.register_worker(Role::Implement, Arc::new(Idle));

        let a = core.submit(TaskSpec::new(Role::Design, "design"), []).unwrap();
        let b = core.submit(TaskSpec::new(Role::Implement, "build"), [a]).unwrap();

        let run_a = start(&mut core, a);
        assert_eq!(core.status(b).unwrap().status, TaskStatus::Pending);

        let decision = core.on_worker_finished(run_a, WorkOutput::new("doc"));
        assert_eq!(decision, Some(GateDecision::Pass));
        assert_eq!(core.status(a).unwrap().status, TaskStatus::Completed);
        assert_eq!(core.status(b).unwrap().status, TaskStatus::Ready);

        let run_b = start(&mut core, b);
        let decision = core.on_worker_finished(
            run_b,
            WorkOutput::new("code").with_verification(Verification::failed("3 failures")),
        );
        assert!(matches!(decision, Some(GateDecision::Fail(_))));

        let rec = core.status(b).unwrap();
        assert_eq!(rec.status, TaskStatus::Blocked);
        assert_eq!(rec.result.as_deref(), Some("code"));
        assert!(matches!(rec.failure, Some(TaskFailure::GateFail(_))));
        assert!(core.is_quiescent());
    }

    fn build_fix_check(core: &mut Orchestrator) -> (TaskId, TaskId, TaskId) {
        core.register_worker(Role::Implement, Arc::new(Idle));
        core.register_worker(Role::Implement, Arc::new(Idle));
        core.register_worker(Role::Test, Arc::new(Idle));

        let ids = core
            .submit_plan(vec![
                PlannedTask::new("build", TaskSpec::new(Role::Implement, "build")),
                PlannedTask {
                    remediates: Some(crate::dag::DepRef::Key("build".to_string())),
                    ..PlannedTask::new("fix", TaskSpec::new(Role::Implement, "fix"))
                },
                PlannedTask::new("check", TaskSpec::new(Role::Test, "check")).after_key("build"),
            ])
            .unwrap();
        (ids["build"], ids["fix"], ids["check"])
    }

    #[test]
    fn corrective_task_submitted_with_its_target_waits_for_the_gate() {
        let mut core = orchestrator();
        let (build, fix, check) = build_fix_check(&mut core);

        // A second implement worker is idle, yet only the target runs.
        let first = core.schedule();
        assert_eq!(first.len(), 1);
        let run_build = first[0].assignment;
        assert_eq!(run_build.task, build);
        assert!(core.on_worker_started(run_build));
        assert_eq!(core.status(fix).unwrap().status, TaskStatus::Pending);

        core.on_worker_finished(
            run_build,
            WorkOutput::new("code").with_verification(Verification::failed("2 failures")),
        );
        assert_eq!(core.status(build).unwrap().gate, GateState::Failed);

        let run_fix = start(&mut core, fix);
        let decision = core.on_worker_finished(
            run_fix,
            WorkOutput::new("patched").with_verification(Verification::passed("ok")),
        );
        assert_eq!(decision, Some(GateDecision::Pass));
        assert_eq!(core.status(build).unwrap().gate, GateState::Remediated(fix));
        assert_eq!(core.status(check).unwrap().status, TaskStatus::Ready);
        start(&mut core, check);
    }

    #[test]
    fn corrective_task_is_retired_when_target_passes() {
        let mut core = orchestrator();
        let (build, fix, check) = build_fix_check(&mut core);

        let run_build = start(&mut core, build);
        core.on_worker_finished(
            run_build,
            WorkOutput::new("code").with_verification(Verification::passed("green")),
        );

        let next: Vec<TaskId> = core.schedule().iter().map(|d| d.assignment.task).collect();
        assert_eq!(next, vec![check]);
        let rec = core.status(fix).unwrap();
        assert_eq!(rec.status, TaskStatus::Failed);
        assert_eq!(rec.failure, Some(TaskFailure::RemediationNotNeeded(build)));
    }

    #[test]
    fn stale_signals_are_ignored() {
        let mut core = orchestrator();
        core.register_worker(Role::Design, Arc::new(Idle));
        let a = core.submit(TaskSpec::new(Role::Design, "design"), []).unwrap();

        let first = core.schedule().remove(0).assignment;
        assert!(core.on_acquire_timeout(first));
        assert_eq!(core.status(a).unwrap().status, TaskStatus::Ready);
        assert!(core.registry().is_empty());

        core.register_worker(Role::Design, Arc::new(Idle));
        let second = core.schedule().remove(0).assignment;
        assert_eq!(second.attempt, 2);

        assert!(!core.on_worker_started(first));
        assert!(core.on_worker_finished(first, WorkOutput::default()).is_none());
        assert!(core.on_worker_started(second));
        assert!(!core.on_acquire_timeout(second));
        assert_eq!(core.status(a).unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn unregistering_busy_worker_fails_task_with_worker_lost() {
        let mut core = orchestrator();
        let worker = core.register_worker(Role::Test, Arc::new(Idle));
        let t = core.submit(TaskSpec::new(Role::Test, "suite"), []).unwrap();
        let assignment = start(&mut core, t);

        let aborted = core.unregister_worker(worker).unwrap();
        assert_eq!(aborted, Some(assignment));

        let rec = core.status(t).unwrap();
        assert_eq!(rec.status, TaskStatus::Failed);
        assert_eq!(rec.failure, Some(TaskFailure::WorkerLost(worker)));
        assert!(core.on_worker_finished(assignment, WorkOutput::default()).is_none());
    }

    #[test]
    fn fifo_within_role_and_roles_independent() {
        let mut core = orchestrator();
        core.register_worker(Role::Implement, Arc::new(Idle));
        core.register_worker(Role::Design, Arc::new(Idle));

        let i1 = core.submit(TaskSpec::new(Role::Implement, "1"), []).unwrap();
        let i2 = core.submit(TaskSpec::new(Role::Implement, "2"), []).unwrap();
        let d1 = core.submit(TaskSpec::new(Role::Design, "3"), []).unwrap();

        let dispatched: Vec<TaskId> = core.schedule().iter().map(|d| d.assignment.task).collect();
        assert_eq!(dispatched, vec![i1, d1]);
        assert_eq!(core.status(i2).unwrap().status, TaskStatus::Ready);
    }

    #[test]
    fn cancel_pending_leaf_removes_it() {
        let mut core = orchestrator();
        let a = core.submit(TaskSpec::new(Role::Design, "a"), []).unwrap();

        assert_eq!(core.cancel(a).unwrap(), CancelOutcome::Removed);
        assert!(core.status(a).is_none());
        assert!(matches!(core.cancel(a), Err(RolegateError::TaskNotFound(_))));
    }

    #[test]
    fn cancel_running_task_blocks_dependents_and_frees_worker() {
        let mut core = orchestrator();
        let worker = core.register_worker(Role::Design, Arc::new(Idle));
        let a = core.submit(TaskSpec::new(Role::Design, "a"), []).unwrap();
        let b = core.submit(TaskSpec::new(Role::Design, "b"), [a]).unwrap();
        let c = core.submit(TaskSpec::new(Role::Design, "c"), [b]).unwrap();
        let assignment = start(&mut core, a);

        let outcome = core.cancel(a).unwrap();
        match outcome {
            CancelOutcome::Cancelled {
                aborted,
                mut blocked_dependents,
            } => {
                assert_eq!(aborted, Some(assignment));
                blocked_dependents.sort();
                assert_eq!(blocked_dependents, vec![b, c]);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        assert_eq!(core.status(a).unwrap().failure, Some(TaskFailure::Cancelled));
        assert_eq!(
            core.status(c).unwrap().failure,
            Some(TaskFailure::DependencyCancelled(a))
        );
        assert_eq!(
            core.registry().availability(worker),
            Some(crate::workers::Availability::Idle)
        );

        // Terminal tasks cannot be cancelled again.
        assert!(matches!(
            core.cancel(a),
            Err(RolegateError::InvalidTransition { .. })
        ));
    }
}
