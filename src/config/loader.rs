// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{PlanFile, RawPlanFile};
use crate::errors::Result;

/// Load a plan file and return the raw `RawPlanFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPlanFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let plan: RawPlanFile = toml::from_str(&contents)?;
    debug!(
        path = %path.display(),
        workers = plan.worker.len(),
        tasks = plan.task.len(),
        "plan file parsed"
    );

    Ok(plan)
}

/// Load a plan file and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - unknown roles, `after` and `remediates` references,
///   - tasks whose role has no worker pool,
///   - dependency cycles,
///   - malformed durations and patterns.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PlanFile> {
    let raw = load_from_path(&path)?;
    PlanFile::try_from(raw)
}

/// Plan file read when `--plan` is not given, relative to the working
/// directory.
pub const DEFAULT_PLAN_FILE: &str = "Rolegate.toml";
