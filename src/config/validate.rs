// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{
    EngineConfig, EngineSection, PlanFile, PlanTask, RawPlanFile, WorkerConfig, WorkerPool,
};
use crate::errors::{Result, RolegateError};
use crate::types::Role;

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = RolegateError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        let engine = validate_engine(&raw.engine)?;
        let workers = validate_workers(&raw.worker)?;
        let tasks = validate_tasks(&raw, &workers)?;
        validate_task_references(&tasks)?;
        let order = validate_dag(&tasks)?;

        Ok(PlanFile::new_unchecked(engine, workers, tasks, order))
    }
}

fn config_error(msg: String) -> RolegateError {
    RolegateError::ConfigError(msg)
}

fn ensure_has_tasks(cfg: &RawPlanFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(config_error(
            "plan must contain at least one [task.<key>] section".to_string(),
        ));
    }
    Ok(())
}

fn parse_role(value: &str, context: &str) -> Result<Role> {
    value
        .parse::<Role>()
        .map_err(|e| config_error(format!("{context}: {e}")))
}

fn validate_engine(section: &EngineSection) -> Result<EngineConfig> {
    let acquire_timeout = parse_duration(&section.acquire_timeout)
        .map_err(|e| config_error(format!("[engine].acquire_timeout: {e}")))?;
    if acquire_timeout == Duration::ZERO {
        return Err(config_error(
            "[engine].acquire_timeout must be greater than zero".to_string(),
        ));
    }

    let execution_timeout = section
        .execution_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()
        .map_err(|e| config_error(format!("[engine].execution_timeout: {e}")))?;

    let mandatory_verification = match &section.mandatory_verification {
        Some(roles) => roles
            .iter()
            .map(|r| parse_role(r, "[engine].mandatory_verification"))
            .collect::<Result<BTreeSet<Role>>>()?,
        None => EngineConfig::default().mandatory_verification,
    };

    Ok(EngineConfig {
        acquire_timeout,
        execution_timeout,
        mandatory_verification,
    })
}

fn validate_workers(raw: &BTreeMap<String, WorkerConfig>) -> Result<BTreeMap<Role, WorkerPool>> {
    let mut pools = BTreeMap::new();

    for (name, worker) in raw {
        let role = parse_role(name, &format!("[worker.{name}]"))?;

        if worker.pool_size == 0 {
            return Err(config_error(format!(
                "[worker.{name}].pool_size must be >= 1 (got 0)"
            )));
        }
        if worker.cmd.trim().is_empty() {
            return Err(config_error(format!("[worker.{name}].cmd must not be empty")));
        }

        let verify_on_stdout = worker
            .verify_on_stdout
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| config_error(format!("[worker.{name}].verify_on_stdout: {e}")))?;

        if pools
            .insert(
                role,
                WorkerPool {
                    pool_size: worker.pool_size,
                    cmd: worker.cmd.clone(),
                    verify_on_stdout,
                },
            )
            .is_some()
        {
            return Err(config_error(format!(
                "worker role '{role}' is configured more than once"
            )));
        }
    }

    Ok(pools)
}

fn validate_tasks(
    raw: &RawPlanFile,
    workers: &BTreeMap<Role, WorkerPool>,
) -> Result<BTreeMap<String, PlanTask>> {
    let mut tasks = BTreeMap::new();

    for (key, task) in &raw.task {
        let role = parse_role(&task.role, &format!("[task.{key}].role"))?;
        if !workers.contains_key(&role) {
            return Err(config_error(format!(
                "task '{key}' needs role '{role}' but there is no [worker.{role}] section"
            )));
        }

        tasks.insert(
            key.clone(),
            PlanTask {
                role,
                goal: task.goal.clone(),
                inputs: task.inputs.clone(),
                after: task.after.clone(),
                remediates: task.remediates.clone(),
            },
        );
    }

    Ok(tasks)
}

fn validate_task_references(tasks: &BTreeMap<String, PlanTask>) -> Result<()> {
    for (key, task) in tasks {
        for dep in &task.after {
            if !tasks.contains_key(dep) {
                return Err(RolegateError::UnknownDependency(format!(
                    "task '{key}' has unknown dependency '{dep}' in `after`"
                )));
            }
            if dep == key {
                return Err(config_error(format!(
                    "task '{key}' cannot depend on itself in `after`"
                )));
            }
        }

        if let Some(target) = &task.remediates {
            if target == key {
                return Err(config_error(format!("task '{key}' cannot remediate itself")));
            }
            if !tasks.contains_key(target) {
                return Err(RolegateError::UnknownDependency(format!(
                    "task '{key}' remediates unknown task '{target}'"
                )));
            }
        }
    }
    Ok(())
}

/// Check the `after` graph for cycles and return a dependency-first order.
///
/// A corrective task waits for the task it remediates, so `remediates`
/// contributes an edge too.
///
/// Edge direction: dep -> task. For
/// ```toml
/// [task.B]
/// after = ["A"]
/// ```
/// we add edge A -> B.
fn validate_dag(tasks: &BTreeMap<String, PlanTask>) -> Result<Vec<String>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for key in tasks.keys() {
        graph.add_node(key.as_str());
    }

    for (key, task) in tasks {
        for dep in task.after.iter().chain(&task.remediates) {
            graph.add_edge(dep.as_str(), key.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(RolegateError::CycleError(format!(
            "plan dependencies form a cycle involving task '{}'",
            cycle.node_id()
        ))),
    }
}
