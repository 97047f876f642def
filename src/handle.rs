use crate::context::Unit;
use crate::error::ExecutionError;
use crate::task::{Lifecycle, TaskState};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Lifecycle record shared between a handle and the unit running its task.
pub(crate) struct HandleShared<R> {
  lifecycle: Mutex<Lifecycle<R>>,
  terminal: Notify,
  cancel_requested: AtomicBool,
}

impl<R> HandleShared<R> {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self {
      lifecycle: Mutex::new(Lifecycle::Pending),
      terminal: Notify::new(),
      cancel_requested: AtomicBool::new(false),
    })
  }

  /// Moves Pending to Running. Returns false if the task must not start.
  pub(crate) fn start(&self) -> bool {
    let mut lifecycle = self.lifecycle.lock();
    match *lifecycle {
      Lifecycle::Pending => {
        *lifecycle = Lifecycle::Running;
        true
      }
      _ => false,
    }
  }

  /// Records the terminal outcome. Only the first terminal write wins.
  pub(crate) fn finish(&self, outcome: Lifecycle<R>) -> bool {
    debug_assert!(outcome.state().is_terminal());
    let recorded = {
      let mut lifecycle = self.lifecycle.lock();
      if lifecycle.state().is_terminal() {
        false
      } else {
        *lifecycle = outcome;
        true
      }
    };
    if recorded {
      self.terminal.notify_waiters();
    }
    recorded
  }

  pub(crate) fn state(&self) -> TaskState {
    self.lifecycle.lock().state()
  }
}

/// Caller-facing handle for a submitted task.
///
/// Cloning is cheap; all clones observe the same lifecycle. Dropping every
/// handle does not stop the task.
pub struct ExecutionHandle<R: Send + 'static> {
  pub(crate) unit: Arc<Unit>,
  pub(crate) shared: Arc<HandleShared<R>>,
}

impl<R: Send + 'static> Clone for ExecutionHandle<R> {
  fn clone(&self) -> Self {
    Self {
      unit: self.unit.clone(),
      shared: self.shared.clone(),
    }
  }
}

impl<R: Send + 'static> fmt::Debug for ExecutionHandle<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExecutionHandle")
      .field("id", &self.unit.id)
      .field("executor", &self.unit.executor_name)
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}

impl<R: Send + 'static> ExecutionHandle<R> {
  pub(crate) fn new(unit: Arc<Unit>, shared: Arc<HandleShared<R>>) -> Self {
    Self { unit, shared }
  }

  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.unit.id
  }

  pub fn state(&self) -> TaskState {
    self.shared.state()
  }

  pub fn is_terminal(&self) -> bool {
    self.state().is_terminal()
  }

  /// True once a cancellation request was delivered through this handle,
  /// whether or not the task acted on it.
  pub fn is_cancel_requested(&self) -> bool {
    self.shared.cancel_requested.load(Ordering::SeqCst)
  }

  /// Requests cancellation.
  ///
  /// * Pending, `force_interrupt == false`: the task never starts and the
  ///   handle becomes `Cancelled`.
  /// * Pending or Running, `force_interrupt == true`: the unit's interruption
  ///   signal is set, waking any cancellable wait in progress.
  /// * Running, `force_interrupt == false`: nothing is delivered; the task
  ///   runs to its own completion.
  /// * Terminal: no-op.
  ///
  /// Returns true only if a request was delivered. Delivery does not mean the
  /// task stops; that depends on the unit's policy and the task's cooperation.
  pub fn cancel(&self, force_interrupt: bool) -> bool {
    let (delivered, cancelled_before_start) = {
      let mut lifecycle = self.shared.lifecycle.lock();
      match *lifecycle {
        Lifecycle::Pending if !force_interrupt => {
          *lifecycle = Lifecycle::Cancelled;
          (true, true)
        }
        Lifecycle::Pending | Lifecycle::Running if force_interrupt => {
          // Under the lock so the unit cannot reach a terminal state in between.
          self.unit.signal.request();
          (true, false)
        }
        _ => (false, false),
      }
    };

    if delivered {
      self.shared.cancel_requested.store(true, Ordering::SeqCst);
    }
    if cancelled_before_start {
      self.shared.terminal.notify_waiters();
      debug!(unit_id = self.unit.id, "ExecutionHandle: Cancelled before start.");
    } else if delivered {
      debug!(unit_id = self.unit.id, "ExecutionHandle: Interruption delivered to unit.");
    } else {
      trace!(unit_id = self.unit.id, force_interrupt, state = ?self.state(), "ExecutionHandle: Cancellation not delivered.");
    }
    delivered
  }

  /// Returns the terminal outcome without waiting, or `None` if the task has
  /// not finished.
  pub fn outcome(&self) -> Option<Result<R, ExecutionError>>
  where
    R: Clone,
  {
    match &*self.shared.lifecycle.lock() {
      Lifecycle::Pending | Lifecycle::Running => None,
      Lifecycle::Completed(value) => Some(Ok(value.clone())),
      Lifecycle::Failed(err) => Some(Err(err.clone())),
      Lifecycle::Cancelled => Some(Err(ExecutionError::Cancelled)),
    }
  }

  /// Waits for the task to reach a terminal state and returns its outcome.
  ///
  /// With a deadline, returns `ExecutionError::Timeout` once it elapses and
  /// leaves the task running: callers that no longer need the value should
  /// follow up with `cancel(true)`, which is a no-op if the task already ended.
  /// Repeated calls after termination return the same outcome.
  pub async fn result(&self, deadline: Option<Duration>) -> Result<R, ExecutionError>
  where
    R: Clone,
  {
    match deadline {
      None => self.wait_terminal().await,
      Some(deadline) => match tokio::time::timeout(deadline, self.wait_terminal()).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => {
          trace!(unit_id = self.unit.id, ?deadline, "ExecutionHandle: Result wait timed out.");
          Err(ExecutionError::Timeout(deadline))
        }
      },
    }
  }

  async fn wait_terminal(&self) -> Result<R, ExecutionError>
  where
    R: Clone,
  {
    loop {
      let notified = self.shared.terminal.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();
      if let Some(outcome) = self.outcome() {
        return outcome;
      }
      notified.await;
    }
  }
}
