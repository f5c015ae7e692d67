// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::{Role, TaskId, TaskStatus, WorkerId};

#[derive(Error, Debug)]
pub enum RolegateError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Unknown dependency: {0}")]
    UnknownDependency(String),

    #[error("Duplicate task key in submission: {0}")]
    DuplicateKey(String),

    #[error("Cycle detected in task graph: {0}")]
    CycleError(String),

    #[error("Task {task} cannot be remediated: it is {status} and not blocked by its gate")]
    NotRemediable { task: TaskId, status: TaskStatus },

    #[error("Invalid transition for {task}: {from} -> {to}")]
    InvalidTransition {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("No idle worker available for role {0}")]
    NoWorkerAvailable(Role),

    #[error("Worker not found: {0}")]
    WorkerNotFound(WorkerId),

    #[error("Worker {0} is not busy")]
    WorkerNotBusy(WorkerId),

    #[error("Worker lost: {0}")]
    WorkerLost(WorkerId),

    #[error("Engine stopped; no runtime is accepting events")]
    EngineStopped,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RolegateError>;
