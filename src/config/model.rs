// src/config/model.rs

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::dag::{DepRef, PlannedTask, TaskSpec};
use crate::engine::{DEFAULT_ACQUIRE_TIMEOUT, EngineOptions};
use crate::gate::GatePolicy;
use crate::types::Role;

/// Plan file exactly as read from TOML.
///
/// ```toml
/// [engine]
/// acquire_timeout = "30s"
/// mandatory_verification = ["implement", "test"]
///
/// [worker.implement]
/// pool_size = 2
/// cmd = "./agents/implement.sh"
/// verify_on_stdout = "^BUILD OK"
///
/// [task.api]
/// role = "implement"
/// goal = "build the api module"
/// inputs = ["docs/api.md"]
/// after = ["design"]
/// ```
///
/// All sections are optional at this level; [`PlanFile`] is the validated
/// form the rest of the crate works with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlanFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// `[worker.<role>]` sections, keyed by role name.
    #[serde(default)]
    pub worker: BTreeMap<String, WorkerConfig>,

    /// `[task.<key>]` sections, keyed by plan-local task key.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Duration string such as `"500ms"`, `"30s"`, `"2m"`.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: String,

    /// Optional bound on a single execution.
    #[serde(default)]
    pub execution_timeout: Option<String>,

    /// Roles whose results need a passing verification report. When
    /// omitted, implementation and test work must be verified.
    #[serde(default)]
    pub mandatory_verification: Option<Vec<String>>,
}

fn default_acquire_timeout() -> String {
    "30s".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            acquire_timeout: default_acquire_timeout(),
            execution_timeout: None,
            mandatory_verification: None,
        }
    }
}

/// `[worker.<role>]` section: a pool of identical command workers.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Shell command run for every task of this role.
    pub cmd: String,

    /// Regex a stdout line must match for the verification to pass.
    #[serde(default)]
    pub verify_on_stdout: Option<String>,
}

fn default_pool_size() -> usize {
    1
}

/// `[task.<key>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub role: String,

    pub goal: String,

    #[serde(default)]
    pub inputs: Vec<String>,

    /// Keys of tasks that must complete (and pass the gate) first.
    #[serde(default)]
    pub after: Vec<String>,

    /// Key of a task this one corrects once it completes.
    #[serde(default)]
    pub remediates: Option<String>,
}

/// Validated engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub acquire_timeout: Duration,
    pub execution_timeout: Option<Duration>,
    pub mandatory_verification: BTreeSet<Role>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            execution_timeout: None,
            mandatory_verification: GatePolicy::default().mandatory_roles().collect(),
        }
    }
}

impl EngineConfig {
    pub fn gate_policy(&self) -> GatePolicy {
        GatePolicy::new(self.mandatory_verification.iter().copied())
    }

    pub fn options(&self, exit_when_idle: bool) -> EngineOptions {
        EngineOptions {
            acquire_timeout: self.acquire_timeout,
            execution_timeout: self.execution_timeout,
            exit_when_idle,
        }
    }
}

/// Validated worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    pub pool_size: usize,
    pub cmd: String,
    pub verify_on_stdout: Option<Regex>,
}

/// Validated task entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanTask {
    pub role: Role,
    pub goal: String,
    pub inputs: Vec<String>,
    pub after: Vec<String>,
    pub remediates: Option<String>,
}

/// A plan that passed validation: every reference resolves, every task
/// role has a worker pool, and the dependency graph is acyclic.
///
/// Only constructed through `TryFrom<RawPlanFile>`.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub engine: EngineConfig,
    pub workers: BTreeMap<Role, WorkerPool>,
    pub tasks: BTreeMap<String, PlanTask>,
    /// Task keys, dependencies first.
    order: Vec<String>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(
        engine: EngineConfig,
        workers: BTreeMap<Role, WorkerPool>,
        tasks: BTreeMap<String, PlanTask>,
        order: Vec<String>,
    ) -> Self {
        Self {
            engine,
            workers,
            tasks,
            order,
        }
    }

    /// Task keys in an order where every task follows its dependencies.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// The plan as a batch submission for the task graph.
    pub fn planned_tasks(&self) -> Vec<PlannedTask> {
        self.order
            .iter()
            .filter_map(|key| self.tasks.get(key).map(|task| (key, task)))
            .map(|(key, task)| {
                let mut spec = TaskSpec::new(task.role, task.goal.clone());
                spec.inputs = task.inputs.clone();

                let mut planned = PlannedTask::new(key.clone(), spec);
                planned.after = task.after.iter().cloned().map(DepRef::Key).collect();
                planned.remediates = task.remediates.clone().map(DepRef::Key);
                planned
            })
            .collect()
    }
}
