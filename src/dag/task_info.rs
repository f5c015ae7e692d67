// src/dag/task_info.rs

//! Task records owned by the graph, and the view handed to workers.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use crate::gate::GateFailure;
use crate::types::{Role, TaskId, TaskStatus, Verification, WorkerId};

/// What a submitter provides when creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub role: Role,
    /// Free-form description; opaque to the engine.
    pub goal: String,
    /// Ordered references (documents, prior outputs); opaque to the engine.
    pub inputs: Vec<String>,
    /// Blocked task this one is a corrective for, if any.
    pub remediates: Option<TaskId>,
}

impl TaskSpec {
    pub fn new(role: Role, goal: impl Into<String>) -> Self {
        Self {
            role,
            goal: goal.into(),
            inputs: Vec::new(),
            remediates: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn remediating(mut self, blocked: TaskId) -> Self {
        self.remediates = Some(blocked);
        self
    }
}

/// Gate bookkeeping for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Not evaluated yet.
    Pending,
    Passed,
    Failed,
    /// The gate failed, but the given corrective task has since completed.
    Remediated(TaskId),
}

/// Why a task ended up `Failed` or `Blocked`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    WorkerLost(WorkerId),
    WorkerError(String),
    ExecutionTimeout(Duration),
    GateFail(GateFailure),
    Cancelled,
    DependencyCancelled(TaskId),
    /// A corrective task whose target settled without needing it.
    RemediationNotNeeded(TaskId),
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::WorkerLost(worker) => write!(f, "worker {worker} was lost"),
            TaskFailure::WorkerError(msg) => write!(f, "worker error: {msg}"),
            TaskFailure::ExecutionTimeout(limit) => {
                write!(f, "execution exceeded {}ms", limit.as_millis())
            }
            TaskFailure::GateFail(reason) => write!(f, "gate failed: {reason}"),
            TaskFailure::Cancelled => f.write_str("cancelled"),
            TaskFailure::DependencyCancelled(dep) => write!(f, "dependency {dep} was cancelled"),
            TaskFailure::RemediationNotNeeded(target) => {
                write!(f, "{target} settled without a gate failure to correct")
            }
        }
    }
}

/// A task as stored in the [`TaskGraph`](crate::dag::TaskGraph).
///
/// Status changes go through `TaskGraph::mark_status`; the other mutable
/// fields are written by the orchestrator while it holds the graph lock.
/// Cloning a record is how status queries take a snapshot.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub role: Role,
    pub goal: String,
    pub inputs: Vec<String>,
    pub depends_on: BTreeSet<TaskId>,
    pub remediates: Option<TaskId>,

    pub status: TaskStatus,
    pub result: Option<String>,
    pub verification: Option<Verification>,
    pub gate: GateState,
    pub failure: Option<TaskFailure>,

    /// Worker currently holding the task.
    pub assigned_to: Option<WorkerId>,
    /// Number of times the task has been assigned. Signals from an older
    /// assignment are stale and get dropped.
    pub attempt: u32,
}

impl TaskRecord {
    pub(crate) fn new(id: TaskId, spec: TaskSpec, depends_on: BTreeSet<TaskId>) -> Self {
        // Corrective tasks wait for their target's gate.
        let status = if depends_on.is_empty() && spec.remediates.is_none() {
            TaskStatus::Ready
        } else {
            TaskStatus::Pending
        };

        Self {
            id,
            role: spec.role,
            goal: spec.goal,
            inputs: spec.inputs,
            depends_on,
            remediates: spec.remediates,
            status,
            result: None,
            verification: None,
            gate: GateState::Pending,
            failure: None,
            assigned_to: None,
            attempt: 0,
        }
    }

    /// Whether dependents of this task may proceed.
    pub fn satisfies_dependents(&self) -> bool {
        match self.status {
            TaskStatus::Completed => self.gate == GateState::Passed,
            TaskStatus::Blocked => matches!(self.gate, GateState::Remediated(_)),
            _ => false,
        }
    }

    /// Blocked by its own gate, so a corrective task can still unblock it.
    pub fn accepts_remediation(&self) -> bool {
        self.status == TaskStatus::Blocked && self.gate != GateState::Pending
    }

    /// Settled in a way no corrective task can change.
    pub fn rejects_remediation(&self) -> bool {
        self.status.is_terminal() && !self.accepts_remediation()
    }

    /// Terminal and never going to satisfy its dependents without a
    /// corrective task.
    pub fn is_dead_end(&self) -> bool {
        self.status.is_terminal() && !self.satisfies_dependents()
    }
}

/// The view of a task a worker receives when it is dispatched.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub role: Role,
    pub goal: String,
    pub inputs: Vec<String>,
    pub attempt: u32,
}

impl ScheduledTask {
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            id: record.id,
            role: record.role,
            goal: record.goal.clone(),
            inputs: record.inputs.clone(),
            attempt: record.attempt,
        }
    }
}
