// src/config/mod.rs

//! Plan file loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a plan file from disk (`loader.rs`).
//! - Validate references, worker pools and acyclicity (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{DEFAULT_PLAN_FILE, load_and_validate, load_from_path};
pub use model::{
    EngineConfig, EngineSection, PlanFile, PlanTask, RawPlanFile, TaskConfig, WorkerConfig,
    WorkerPool,
};
