// src/workers/mod.rs

//! Worker layer.
//!
//! - [`backend`] defines the [`Worker`] capability the engine invokes.
//! - [`registry`] tracks registered workers and hands out idle ones.
//! - [`command`] is the production worker that runs shell commands.

pub mod backend;
pub mod command;
pub mod registry;

pub use backend::{WorkFuture, WorkOutput, Worker};
pub use command::CommandWorker;
pub use registry::{
    Availability, ReleasedWorker, WorkerHandle, WorkerOutcome, WorkerRegistry,
};
