// tests/timeouts.rs

use std::sync::Arc;
use std::time::Duration;

use rolegate::dag::{TaskFailure, TaskSpec};
use rolegate::engine::{EngineOptions, Orchestrator, Runtime};
use rolegate::gate::GatePolicy;
use rolegate::types::{Role, TaskStatus};
use rolegate_test_utils::fake_worker::{HangAt, HangingWorker, ScriptedWorker};
use rolegate_test_utils::{init_tracing, wait_for_status, wait_until_settled, with_timeout};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn options(acquire: Duration, execution: Option<Duration>) -> EngineOptions {
    EngineOptions {
        acquire_timeout: acquire,
        execution_timeout: execution,
        exit_when_idle: false,
    }
}

/// A worker that never acknowledges its assignment: after the acquire
/// timeout the task is Ready again and the worker is gone.
#[tokio::test(start_paused = true)]
async fn unacknowledged_assignment_is_requeued() -> TestResult {
    init_tracing();

    let core = Orchestrator::new(
        GatePolicy::default(),
        options(Duration::from_secs(2), None),
    );
    let (runtime, handle) = Runtime::new(core, 32);
    let engine = tokio::spawn(runtime.run());

    let stuck = handle
        .register_worker(Role::Implement, Arc::new(HangingWorker::at(HangAt::Accept)))
        .await?;
    let t = handle.submit(TaskSpec::new(Role::Implement, "build"), []).await?;

    let assigned = wait_for_status(&handle, t, TaskStatus::Assigned).await;
    assert_eq!(assigned.assigned_to, Some(stuck));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.status(t)?.status, TaskStatus::Assigned);

    let requeued = wait_for_status(&handle, t, TaskStatus::Ready).await;
    assert_eq!(requeued.assigned_to, None);
    assert!(!handle.registry().contains(stuck));
    assert!(handle.registry().is_empty());

    // A healthy worker picks the task up on the next pass.
    handle
        .register_worker(Role::Implement, Arc::new(ScriptedWorker::passing()))
        .await?;
    let done = wait_for_status(&handle, t, TaskStatus::Completed).await;
    assert_eq!(done.attempt, 2);

    handle.shutdown().await?;
    with_timeout(engine).await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn execution_timeout_fails_the_task() -> TestResult {
    init_tracing();

    let limit = Duration::from_secs(3);
    let core = Orchestrator::new(
        GatePolicy::default(),
        options(Duration::from_secs(2), Some(limit)),
    );
    let (runtime, handle) = Runtime::new(core, 32);
    let engine = tokio::spawn(runtime.run());

    let worker = handle
        .register_worker(Role::Test, Arc::new(HangingWorker::at(HangAt::Execute)))
        .await?;
    let t = handle.submit(TaskSpec::new(Role::Test, "suite"), []).await?;

    wait_for_status(&handle, t, TaskStatus::Running).await;
    let failed = wait_for_status(&handle, t, TaskStatus::Failed).await;
    assert_eq!(failed.failure, Some(TaskFailure::ExecutionTimeout(limit)));

    // The worker itself is still registered and idle.
    assert!(handle.registry().contains(worker));
    assert_eq!(handle.registry().idle_count(Role::Test), 1);

    handle.shutdown().await?;
    with_timeout(engine).await??;
    Ok(())
}

#[tokio::test]
async fn worker_error_fails_task_and_stalls_dependents() -> TestResult {
    init_tracing();

    let core = Orchestrator::new(GatePolicy::default(), EngineOptions::default());
    let (runtime, handle) = Runtime::new(core, 32);
    let engine = tokio::spawn(runtime.run());

    handle
        .register_worker(
            Role::Implement,
            Arc::new(ScriptedWorker::passing().erroring("build", "disk full")),
        )
        .await?;

    let build = handle.submit(TaskSpec::new(Role::Implement, "build"), []).await?;
    let package = handle
        .submit(TaskSpec::new(Role::Implement, "package"), [build])
        .await?;

    let failed = wait_for_status(&handle, build, TaskStatus::Failed).await;
    match failed.failure {
        Some(TaskFailure::WorkerError(msg)) => assert!(msg.contains("disk full"), "{msg}"),
        other => panic!("unexpected failure {other:?}"),
    }
    wait_until_settled(&handle).await;
    assert_eq!(handle.status(package)?.status, TaskStatus::Pending);
    assert_eq!(handle.stalled_tasks(), vec![package]);

    handle.shutdown().await?;
    with_timeout(engine).await??;
    Ok(())
}
