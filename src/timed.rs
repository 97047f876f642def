use crate::error::ExecutionError;
use crate::executor::Executor;
use crate::handle::ExecutionHandle;
use crate::policy::CancellationPolicy;
use crate::task::Task;

use std::time::Duration;

use tracing::{debug, warn};

/// Runs `task` in a dedicated unit for at most `timeout`.
///
/// Returns the task's value or error if it finishes first. Otherwise the unit
/// is force-interrupted and `ExecutionError::Timeout` is returned without
/// waiting for the unit to wind down.
pub async fn run_with_timeout<T>(executor: &Executor, task: T, timeout: Duration) -> Result<T::Output, ExecutionError>
where
  T: Task,
  T::Output: Clone,
{
  TimedExecution::new(timeout).run(executor, task).await
}

/// Configurable form of [`run_with_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedExecution {
  timeout: Duration,
  grace: Option<Duration>,
  policy: Option<CancellationPolicy>,
}

impl TimedExecution {
  pub fn new(timeout: Duration) -> Self {
    Self {
      timeout,
      grace: None,
      policy: None,
    }
  }

  /// After a timeout, also wait up to `grace` for the interrupted unit to
  /// reach a terminal state before returning.
  pub fn with_grace(mut self, grace: Duration) -> Self {
    self.grace = Some(grace);
    self
  }

  /// Overrides the executor's default policy for the unit running the task.
  pub fn with_policy(mut self, policy: CancellationPolicy) -> Self {
    self.policy = Some(policy);
    self
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  pub async fn run<T>(&self, executor: &Executor, task: T) -> Result<T::Output, ExecutionError>
  where
    T: Task,
    T::Output: Clone,
  {
    let policy = self.policy.unwrap_or_else(|| executor.default_policy());
    let handle = executor.submit_with_policy(policy, task)?;

    // The deadline timer lives inside `result` and is dropped with it.
    match handle.result(Some(self.timeout)).await {
      Err(ExecutionError::Timeout(elapsed)) => self.expire(&handle, elapsed).await,
      outcome => outcome,
    }
  }

  async fn expire<R>(&self, handle: &ExecutionHandle<R>, elapsed: Duration) -> Result<R, ExecutionError>
  where
    R: Clone + Send + 'static,
  {
    let delivered = handle.cancel(true);
    if !delivered {
      // The unit reached a terminal state between the deadline and the cancel.
      if let Some(outcome) = handle.outcome() {
        debug!(unit_id = handle.id(), ?elapsed, "Unit finished at the deadline; returning its outcome.");
        return outcome;
      }
    }
    debug!(unit_id = handle.id(), ?elapsed, delivered, "Timed execution expired; unit interrupted.");

    if let Some(grace) = self.grace {
      if handle.result(Some(grace)).await.is_err() && !handle.is_terminal() {
        warn!(unit_id = handle.id(), ?grace, "Interrupted unit still running after grace period.");
      }
    }
    Err(ExecutionError::Timeout(elapsed))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::Unit;
  use crate::handle::HandleShared;
  use crate::task::{Lifecycle, TaskState};
  use std::sync::Arc;

  fn handle_for_test(unit_id: u64) -> (ExecutionHandle<u8>, Arc<HandleShared<u8>>) {
    let unit = Unit::new(unit_id, Arc::new("timed_unit_tests".to_string()), CancellationPolicy::default());
    let shared = HandleShared::new();
    (ExecutionHandle::new(unit, shared.clone()), shared)
  }

  #[tokio::test]
  async fn test_expire_returns_outcome_of_unit_finished_at_deadline() {
    let (handle, shared) = handle_for_test(u64::MAX - 1);
    assert!(shared.start());
    assert!(shared.finish(Lifecycle::Completed(7)));

    let outcome = TimedExecution::new(Duration::from_millis(10))
      .expire(&handle, Duration::from_millis(10))
      .await;
    assert_eq!(outcome.unwrap(), 7);
    assert!(!handle.is_cancel_requested());
  }

  #[tokio::test]
  async fn test_expire_interrupts_running_unit() {
    let (handle, shared) = handle_for_test(u64::MAX - 2);
    assert!(shared.start());

    let outcome = TimedExecution::new(Duration::from_millis(10))
      .expire(&handle, Duration::from_millis(10))
      .await;
    assert!(matches!(outcome, Err(ExecutionError::Timeout(d)) if d == Duration::from_millis(10)));
    assert!(handle.is_cancel_requested());
    assert_eq!(handle.state(), TaskState::Running);
  }
}
