// src/workers/backend.rs

//! Pluggable worker capability.
//!
//! The engine never knows what a worker does; it only calls [`Worker`].
//! Production code uses [`CommandWorker`](crate::workers::CommandWorker);
//! tests provide scripted fakes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::dag::ScheduledTask;
use crate::types::Verification;

/// Boxed future returned by [`Worker`] methods.
pub type WorkFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// What a worker hands back when it finishes a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkOutput {
    /// Opaque result payload.
    pub result: Option<String>,
    pub verification: Option<Verification>,
}

impl WorkOutput {
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: Some(result.into()),
            verification: None,
        }
    }

    pub fn with_verification(mut self, verification: Verification) -> Self {
        self.verification = Some(verification);
        self
    }
}

/// An executor for tasks of one role.
///
/// Implementations must tolerate being asked to run the same task again:
/// an assignment that times out before it starts is requeued and may land
/// on another worker.
pub trait Worker: Send + Sync + fmt::Debug {
    /// Handshake before execution starts.
    ///
    /// The task counts as `Running` once this resolves. A worker that never
    /// resolves it is presumed lost after the acquire timeout.
    fn accept<'a>(&'a self, _task: &'a ScheduledTask) -> WorkFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    /// Perform the task.
    ///
    /// An `Err` fails the task; a verification report with `passed = false`
    /// is not an error, the gate decides what it means.
    fn execute<'a>(&'a self, task: &'a ScheduledTask) -> WorkFuture<'a, WorkOutput>;
}
