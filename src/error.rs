use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Outcome of a cancellable operation that was cut short by an interruption request.
///
/// Task code either propagates it (usually with `?`, which turns it into
/// [`TaskError::Interrupted`]) or absorbs it through a [`crate::Postponed`] guard.
/// It never reaches the caller of [`crate::ExecutionHandle::result`] directly.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("Wait was interrupted by a cancellation request")]
pub struct InterruptedWait;

impl InterruptedWait {
  /// Builds the I/O error a released resource reports to a blocked caller.
  pub(crate) fn into_io_error(self) -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, self)
  }

  /// Returns true if `err` was produced by a released resource.
  pub fn is_interrupted_io(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<InterruptedWait>())
  }
}

/// Error type returned by a task body.
#[derive(Error, Debug)]
pub enum TaskError {
  #[error(transparent)]
  Interrupted(#[from] InterruptedWait),

  #[error(transparent)]
  Failed(Box<dyn StdError + Send + Sync + 'static>),
}

impl TaskError {
  /// Wraps any error raised by the task itself.
  pub fn failed<E>(err: E) -> Self
  where
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
  {
    TaskError::Failed(err.into())
  }

  pub fn is_interrupted(&self) -> bool {
    matches!(self, TaskError::Interrupted(_))
  }
}

impl From<io::Error> for TaskError {
  fn from(err: io::Error) -> Self {
    if InterruptedWait::is_interrupted_io(&err) {
      TaskError::Interrupted(InterruptedWait)
    } else {
      TaskError::Failed(Box::new(err))
    }
  }
}

/// Errors surfaced to the owner of an [`crate::ExecutionHandle`] or [`crate::Executor`].
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
  #[error("Task was cancelled before producing a value")]
  Cancelled,

  #[error("Timed out after {0:?} waiting for the task result")]
  Timeout(Duration),

  #[error("Task failed")]
  Failed {
    #[source]
    source: Arc<dyn StdError + Send + Sync + 'static>,
  },

  #[error("Task panicked: {0}")]
  Panicked(String),

  #[error("Executor is shutting down or already shut down, cannot accept new tasks")]
  ShuttingDown,
}

impl ExecutionError {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, ExecutionError::Cancelled)
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, ExecutionError::Timeout(_))
  }

  /// Returns the task's own error, if this is an execution failure.
  pub fn failure_source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
    match self {
      ExecutionError::Failed { source } => Some(source.as_ref()),
      _ => None,
    }
  }
}
