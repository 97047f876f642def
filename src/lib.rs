//! Cooperative cancellation for Tokio-hosted work.
//!
//! Each task submitted to an [`Executor`] runs in its own execution unit with
//! a private interruption signal. Callers control the task through an
//! [`ExecutionHandle`]: query its state, wait for the result with an optional
//! deadline, and cancel it. Tasks observe interruption only at cancellation
//! points and cancellable waits exposed by their [`WorkerContext`], as the
//! unit's [`CancellationPolicy`] dictates. Blocking I/O that ignores the
//! signal can be wrapped in a [`CancellableResource`] so cancellation forces
//! it closed.

mod context;
mod error;
mod executor;
mod handle;
mod policy;
mod resource;
mod signal;
mod task;
mod timed;

pub use context::{Postponed, WorkerContext};
pub use error::{ExecutionError, InterruptedWait, TaskError};
pub use executor::{Executor, ShutdownMode};
pub use handle::ExecutionHandle;
pub use policy::{CancellationPolicy, DeliverAt};
pub use resource::{CancellableResource, ReleaseHandle};
pub use task::{Task, TaskState, TaskToExecute};
pub use timed::{run_with_timeout, TimedExecution};
