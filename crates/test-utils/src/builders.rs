#![allow(dead_code)]

use std::collections::BTreeMap;

use rolegate::config::{EngineSection, PlanFile, RawPlanFile, TaskConfig, WorkerConfig};

/// Builder for `PlanFile` to simplify test setup.
pub struct PlanFileBuilder {
    plan: RawPlanFile,
}

impl PlanFileBuilder {
    pub fn new() -> Self {
        Self {
            plan: RawPlanFile {
                engine: EngineSection::default(),
                worker: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_worker(mut self, role: &str, cmd: &str) -> Self {
        self.plan.worker.insert(
            role.to_string(),
            WorkerConfig {
                pool_size: 1,
                cmd: cmd.to_string(),
                verify_on_stdout: None,
            },
        );
        self
    }

    pub fn with_task(mut self, key: &str, task: TaskConfig) -> Self {
        self.plan.task.insert(key.to_string(), task);
        self
    }

    pub fn acquire_timeout(mut self, value: &str) -> Self {
        self.plan.engine.acquire_timeout = value.to_string();
        self
    }

    pub fn mandatory_verification(mut self, roles: &[&str]) -> Self {
        self.plan.engine.mandatory_verification =
            Some(roles.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn build_raw(self) -> RawPlanFile {
        self.plan
    }

    pub fn build(self) -> PlanFile {
        PlanFile::try_from(self.plan).expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(role: &str, goal: &str) -> Self {
        Self {
            task: TaskConfig {
                role: role.to_string(),
                goal: goal.to_string(),
                inputs: vec![],
                after: vec![],
                remediates: None,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn input(mut self, input: &str) -> Self {
        self.task.inputs.push(input.to_string());
        self
    }

    pub fn remediates(mut self, key: &str) -> Self {
        self.task.remediates = Some(key.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
