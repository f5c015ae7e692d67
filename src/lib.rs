// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod gate;
pub mod logging;
pub mod types;
pub mod workers;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::PlanFile;
use crate::dag::{TaskFailure, TaskRecord};
use crate::engine::{Orchestrator, Runtime};
use crate::types::{TaskId, TaskStatus};
use crate::workers::CommandWorker;

/// Capacity of the engine event channel used by the CLI.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading
/// - one command worker per pool slot
/// - the orchestration core and its runtime
/// - Ctrl-C handling
///
/// The run ends once no task is in flight. It fails if any task did not
/// complete. A blocked task that was remediated counts as done, and a
/// corrective task whose target never needed it is not counted.
pub async fn run(args: CliArgs) -> Result<()> {
    let plan_path = PathBuf::from(&args.plan);
    let plan = load_and_validate(&plan_path)
        .with_context(|| format!("loading plan {}", plan_path.display()))?;

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(());
    }

    let mut core = Orchestrator::new(plan.engine.gate_policy(), plan.engine.options(true));

    for (role, pool) in &plan.workers {
        for _ in 0..pool.pool_size {
            let mut worker = CommandWorker::new(*role, pool.cmd.clone());
            if let Some(pattern) = &pool.verify_on_stdout {
                worker = worker.with_verify_pattern(pattern.clone());
            }
            core.register_worker(*role, Arc::new(worker));
        }
    }

    let keys = core.submit_plan(plan.planned_tasks())?;
    info!(
        tasks = keys.len(),
        workers = core.registry().len(),
        "plan submitted"
    );

    let (runtime, handle) = Runtime::new(core, EVENT_CHANNEL_CAPACITY);

    // Ctrl-C → graceful shutdown.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = handle.shutdown().await;
        });
    }

    runtime.run().await?;

    let records = handle.snapshot_all();
    let stalled = handle.stalled_tasks();
    print_report(&keys, &records, &stalled);

    let unfinished = records
        .iter()
        .filter(|rec| {
            !rec.satisfies_dependents()
                && !matches!(rec.failure, Some(TaskFailure::RemediationNotNeeded(_)))
        })
        .count();
    if unfinished > 0 {
        bail!("{unfinished} of {} tasks did not complete", records.len());
    }

    Ok(())
}

/// Final status table on stdout.
fn print_report(keys: &BTreeMap<String, TaskId>, records: &[TaskRecord], stalled: &[TaskId]) {
    let by_id: HashMap<TaskId, &str> = keys.iter().map(|(k, id)| (*id, k.as_str())).collect();

    println!("rolegate report");
    for rec in records {
        let key = by_id.get(&rec.id).copied().unwrap_or("-");
        print!(
            "  {:<20} {:<10} {:<11} {}",
            key,
            rec.id.to_string(),
            rec.role.as_str(),
            rec.status
        );
        if stalled.contains(&rec.id) {
            print!(" (stalled)");
        }
        if let Some(failure) = &rec.failure {
            print!(": {failure}");
        }
        println!();
    }

    let completed = records
        .iter()
        .filter(|rec| rec.status == TaskStatus::Completed)
        .count();
    println!("{completed}/{} tasks completed", records.len());
}

/// Simple dry-run output: print engine settings, pools and tasks.
fn print_dry_run(plan: &PlanFile) {
    println!("rolegate dry-run");
    println!("  engine.acquire_timeout = {:?}", plan.engine.acquire_timeout);
    if let Some(limit) = plan.engine.execution_timeout {
        println!("  engine.execution_timeout = {limit:?}");
    }
    let mandatory: Vec<&str> = plan
        .engine
        .mandatory_verification
        .iter()
        .map(|r| r.as_str())
        .collect();
    println!("  engine.mandatory_verification = {mandatory:?}");
    println!();

    println!("workers ({}):", plan.workers.len());
    for (role, pool) in &plan.workers {
        println!("  - {role} x{}", pool.pool_size);
        println!("      cmd: {}", pool.cmd);
        if let Some(ref re) = pool.verify_on_stdout {
            println!("      verify_on_stdout: {re}");
        }
    }
    println!();

    println!("tasks ({}, in dependency order):", plan.tasks.len());
    for key in plan.order() {
        let Some(task) = plan.tasks.get(key) else {
            continue;
        };
        println!("  - {key} [{}]", task.role);
        println!("      goal: {}", task.goal);
        if !task.inputs.is_empty() {
            println!("      inputs: {:?}", task.inputs);
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Some(ref target) = task.remediates {
            println!("      remediates: {target}");
        }
    }

    debug!("dry-run complete (no execution)");
}
