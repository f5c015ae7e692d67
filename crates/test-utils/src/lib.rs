pub mod builders;
pub mod fake_worker;

use std::sync::Once;
use std::time::Duration;

use rolegate::dag::TaskRecord;
use rolegate::engine::EngineHandle;
use rolegate::types::{TaskId, TaskStatus};
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Poll the engine until `task` reaches `status`.
///
/// Panics after 5 seconds (of tokio time) with the last observed record.
pub async fn wait_for_status(handle: &EngineHandle, task: TaskId, status: TaskStatus) -> TaskRecord {
    let poll = async {
        loop {
            let rec = handle.status(task).expect("task exists");
            if rec.status == status {
                return rec;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    match tokio::time::timeout(Duration::from_secs(5), poll).await {
        Ok(rec) => rec,
        Err(_) => panic!(
            "{task} never reached {status}; last seen {:?}",
            handle.status(task).map(|r| r.status)
        ),
    }
}

/// Poll until no task is assigned, running or awaiting the gate.
pub async fn wait_until_settled(handle: &EngineHandle) {
    with_timeout(async {
        loop {
            let busy = handle
                .snapshot_all()
                .iter()
                .any(|rec| rec.status.is_in_flight() || rec.status == TaskStatus::Ready);
            if !busy {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}
