use crate::context::WorkerContext;
use crate::error::TaskError;

use std::future::Future;

use futures::future::BoxFuture;

/// A boxed task, for callers that build tasks dynamically or store them in
/// collections. Implements [`Task`] through the closure impl.
pub type TaskToExecute<R> = Box<dyn FnOnce(WorkerContext) -> BoxFuture<'static, Result<R, TaskError>> + Send + 'static>;

/// A user-supplied unit of work.
///
/// The body receives the `WorkerContext` of the unit it runs in and may be
/// long-running and suspending. It should not assume any particular
/// `CancellationPolicy` unless it was written against one.
pub trait Task: Send + 'static {
  type Output: Send + 'static;
  type Future: Future<Output = Result<Self::Output, TaskError>> + Send + 'static;

  fn run(self, cx: WorkerContext) -> Self::Future;
}

impl<F, Fut, R> Task for F
where
  F: FnOnce(WorkerContext) -> Fut + Send + 'static,
  Fut: Future<Output = Result<R, TaskError>> + Send + 'static,
  R: Send + 'static,
{
  type Output = R;
  type Future = Fut;

  fn run(self, cx: WorkerContext) -> Fut {
    self(cx)
  }
}

/// Lifecycle of an execution handle. Transitions only move forward and
/// exactly one terminal state is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
  Pending,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl TaskState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
  }
}

/// Recorded terminal outcome of a task.
#[derive(Debug, Clone)]
pub(crate) enum Lifecycle<R> {
  Pending,
  Running,
  Completed(R),
  Failed(crate::error::ExecutionError),
  Cancelled,
}

impl<R> Lifecycle<R> {
  pub(crate) fn state(&self) -> TaskState {
    match self {
      Lifecycle::Pending => TaskState::Pending,
      Lifecycle::Running => TaskState::Running,
      Lifecycle::Completed(_) => TaskState::Completed,
      Lifecycle::Failed(_) => TaskState::Failed,
      Lifecycle::Cancelled => TaskState::Cancelled,
    }
  }
}
