use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Capability a task requires from the worker that runs it.
///
/// Per-role behaviour (e.g. whether a verification report is mandatory) lives
/// in configuration, never in role-specific code paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Design,
    Implement,
    Test,
    Orchestrate,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Design, Role::Implement, Role::Test, Role::Orchestrate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Design => "design",
            Role::Implement => "implement",
            Role::Test => "test",
            Role::Orchestrate => "orchestrate",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "design" => Ok(Role::Design),
            "implement" => Ok(Role::Implement),
            "test" => Ok(Role::Test),
            "orchestrate" => Ok(Role::Orchestrate),
            other => Err(format!(
                "invalid role: {other} (expected \"design\", \"implement\", \"test\" or \"orchestrate\")"
            )),
        }
    }
}

/// Task identifier. Allocated in creation order, so ordering by id is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(raw: u64) -> Self {
        TaskId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifier of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn new(raw: u64) -> Self {
        WorkerId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Lifecycle state of a task.
///
/// ```text
/// Pending -> Ready -> Assigned -> Running -> AwaitingGate -> Completed
///                                                         -> Blocked
/// Running  -> Failed            (worker error / lost / execution timeout)
/// Assigned -> Ready             (acquire timeout, requeued)
/// Assigned -> Failed            (worker lost before starting)
/// Pending | Ready | Assigned | Running -> Failed   (cancelled)
/// Pending | Ready -> Blocked    (a dependency was cancelled)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskStatus {
    Pending,
    Ready,
    Assigned,
    Running,
    AwaitingGate,
    Completed,
    Blocked,
    Failed,
}

impl TaskStatus {
    /// Whether `self -> next` is an edge of the task state machine.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, next),
            (Pending, Ready)
                | (Ready, Assigned)
                | (Assigned, Running)
                | (Running, AwaitingGate)
                | (AwaitingGate, Completed)
                | (AwaitingGate, Blocked)
                | (Running, Failed)
                | (Assigned, Ready)
                | (Assigned, Failed)
                | (Pending, Failed)
                | (Ready, Failed)
                | (Pending, Blocked)
                | (Ready, Blocked)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Blocked | TaskStatus::Failed
        )
    }

    /// A worker currently owns the task (or its result is being gated).
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            TaskStatus::Assigned | TaskStatus::Running | TaskStatus::AwaitingGate
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Assigned => "assigned",
            TaskStatus::Running => "running",
            TaskStatus::AwaitingGate => "awaiting-gate",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Structured verification report a worker attaches to its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub passed: bool,
    pub summary: String,
}

impl Verification {
    pub fn passed(summary: impl Into<String>) -> Self {
        Self {
            passed: true,
            summary: summary.into(),
        }
    }

    pub fn failed(summary: impl Into<String>) -> Self {
        Self {
            passed: false,
            summary: summary.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_edges_are_allowed() {
        use TaskStatus::*;
        let path = [Pending, Ready, Assigned, Running, AwaitingGate, Completed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(AwaitingGate.can_transition_to(Blocked));
        assert!(Assigned.can_transition_to(Ready));
    }

    #[test]
    fn nothing_reenters_pending_or_leaves_terminal_states() {
        use TaskStatus::*;
        let all = [
            Pending, Ready, Assigned, Running, AwaitingGate, Completed, Blocked, Failed,
        ];
        for from in all {
            assert!(!from.can_transition_to(Pending));
            if from.is_terminal() {
                for to in all {
                    assert!(!from.can_transition_to(to), "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn gate_cannot_be_skipped() {
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::AwaitingGate.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Implement".parse::<Role>(), Ok(Role::Implement));
        assert_eq!(" test ".parse::<Role>(), Ok(Role::Test));
        assert!("review".parse::<Role>().is_err());
    }
}
