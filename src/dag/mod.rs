// src/dag/mod.rs

//! Task graph.
//!
//! - [`graph`] owns the tasks and their dependency edges, answers readiness
//!   queries and rejects cycles.
//! - [`task_info`] holds the task record, the submission spec and the view
//!   handed to workers.

pub mod graph;
pub mod task_info;

pub use graph::{DepRef, PlannedTask, TaskGraph};
pub use task_info::{GateState, ScheduledTask, TaskFailure, TaskRecord, TaskSpec};
