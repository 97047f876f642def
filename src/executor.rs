use crate::context::{Unit, WorkerContext};
use crate::error::{ExecutionError, TaskError};
use crate::handle::{ExecutionHandle, HandleShared};
use crate::policy::CancellationPolicy;
use crate::task::{Lifecycle, Task};

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use tokio::runtime::Handle as TokioHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_UNIT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Defines how the executor should behave upon shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
  /// Stops accepting tasks and waits for live units to finish on their own.
  Graceful,
  /// Stops accepting tasks, force-interrupts every live unit, then waits.
  ForcefulCancel,
}

/// Cancellation hook kept for every live unit.
trait LiveUnit: Send + Sync {
  fn force_cancel(&self) -> bool;
}

impl<R: Send + 'static> LiveUnit for ExecutionHandle<R> {
  fn force_cancel(&self) -> bool {
    self.cancel(true)
  }
}

/// Hosts tasks, each in a dedicated execution unit on a Tokio runtime.
///
/// Every submission gets its own unit and interruption signal, so cancelling
/// one handle never touches another task or the caller's context.
pub struct Executor {
  name: Arc<String>,
  tokio_handle: TokioHandle,
  default_policy: CancellationPolicy,
  live_units: Arc<DashMap<u64, Arc<dyn LiveUnit>>>,
  tracker: TaskTracker,
  shutting_down: AtomicBool,
}

impl fmt::Debug for Executor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Executor")
      .field("name", &self.name)
      .field("default_policy", &self.default_policy)
      .field("live_units", &self.live_units.len())
      .field("shutting_down", &self.shutting_down.load(AtomicOrdering::SeqCst))
      .finish_non_exhaustive()
  }
}

impl Executor {
  pub fn new(tokio_handle: TokioHandle, name: &str) -> Arc<Self> {
    Self::with_policy(tokio_handle, name, CancellationPolicy::default())
  }

  pub fn with_policy(tokio_handle: TokioHandle, name: &str, default_policy: CancellationPolicy) -> Arc<Self> {
    debug!(executor = %name, ?default_policy, "Creating executor.");
    Arc::new(Self {
      name: Arc::new(name.to_string()),
      tokio_handle,
      default_policy,
      live_units: Arc::new(DashMap::new()),
      tracker: TaskTracker::new(),
      shutting_down: AtomicBool::new(false),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn default_policy(&self) -> CancellationPolicy {
    self.default_policy
  }

  /// Number of units that have been submitted and not yet reached a terminal state.
  pub fn active_unit_count(&self) -> usize {
    self.live_units.len()
  }

  pub fn is_shutting_down(&self) -> bool {
    self.shutting_down.load(AtomicOrdering::SeqCst)
  }

  /// Submits a task under the executor's default policy. Never blocks.
  pub fn submit<T: Task>(&self, task: T) -> Result<ExecutionHandle<T::Output>, ExecutionError> {
    self.submit_with_policy(self.default_policy, task)
  }

  /// Submits a task into a unit with its own policy. Never blocks.
  pub fn submit_with_policy<T: Task>(
    &self,
    policy: CancellationPolicy,
    task: T,
  ) -> Result<ExecutionHandle<T::Output>, ExecutionError> {
    if self.is_shutting_down() || self.tracker.is_closed() {
      warn!(executor = %self.name, "Submit: Attempted to submit task to an executor that is shutting down.");
      return Err(ExecutionError::ShuttingDown);
    }

    // Keeps `shutdown` from finishing its wait until this unit is spawned.
    let _admission = self.tracker.token();

    let unit_id = NEXT_UNIT_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let unit = Unit::new(unit_id, self.name.clone(), policy);
    let shared = HandleShared::<T::Output>::new();
    let handle = ExecutionHandle::new(unit.clone(), shared.clone());

    self.live_units.insert(unit_id, Arc::new(handle.clone()));
    debug!(executor = %self.name, %unit_id, ?policy, "Submitting task to a dedicated unit.");

    if self.is_shutting_down() {
      // Shutdown began after the first check and may already have taken its
      // live-unit snapshot.
      self.live_units.remove(&unit_id);
      warn!(executor = %self.name, %unit_id, "Submit: Shutdown started during submission; task rejected.");
      return Err(ExecutionError::ShuttingDown);
    }

    // Owned by the unit future from creation, so it also fires if the runtime
    // drops the future before its first poll.
    let guard = UnitGuard {
      unit_id,
      shared,
      live_units: self.live_units.clone(),
      executor_name: self.name.clone(),
    };
    self.tracker.spawn_on(
      async move {
        Self::run_unit(unit, &guard.shared, task).await;
        drop(guard);
      }
      .instrument(info_span!("execution_unit", executor = %self.name, %unit_id)),
      &self.tokio_handle,
    );

    Ok(handle)
  }

  /// Stops accepting tasks and waits for every live unit to terminate.
  pub async fn shutdown(self: Arc<Self>, mode: ShutdownMode) -> Result<(), ExecutionError> {
    let already_initiating_shutdown = self.shutting_down.swap(true, AtomicOrdering::SeqCst);
    self.tracker.close();

    if already_initiating_shutdown {
      info!(executor = %self.name, "Shutdown already in progress or initiated by another call.");
    } else {
      info!(executor = %self.name, "Initiating explicit executor shutdown (mode: {:?}).", mode);
    }

    if mode == ShutdownMode::ForcefulCancel {
      let live: Vec<(u64, Arc<dyn LiveUnit>)> = self
        .live_units
        .iter()
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect();
      if live.is_empty() {
        info!(executor = %self.name, "No live units to interrupt.");
      }
      for (unit_id, unit) in live {
        let delivered = unit.force_cancel();
        debug!(executor = %self.name, %unit_id, delivered, "Forcefully interrupting live unit during shutdown.");
      }
    }

    info!(executor = %self.name, live_units = self.live_units.len(), "Waiting for live units to terminate.");
    self.tracker.wait().await;
    info!(executor = %self.name, "Executor shutdown completed.");
    Ok(())
  }

  /// Runs one task inside its unit and records the outcome. This is the
  /// unit's terminal handler: the only code that consumes an interruption
  /// without re-raising it.
  async fn run_unit<T: Task>(unit: Arc<Unit>, shared: &HandleShared<T::Output>, task: T) {
    if !shared.start() {
      debug!("Task cancelled before start; body never runs.");
      return;
    }
    trace!(policy = ?unit.policy, "Task started.");

    let cx = WorkerContext::new(unit.clone());
    let outcome = AssertUnwindSafe(async move { task.run(cx).await })
      .catch_unwind()
      .await;

    let lifecycle = match outcome {
      Ok(Ok(value)) => {
        if unit.signal.is_requested() {
          debug!("Task completed normally despite a pending interruption request.");
        } else {
          trace!("Task completed successfully.");
        }
        Lifecycle::Completed(value)
      }
      Ok(Err(TaskError::Interrupted(_))) => {
        unit.signal.consume_and_clear();
        debug!("Task unwound after interruption.");
        Lifecycle::Cancelled
      }
      Ok(Err(TaskError::Failed(err))) => {
        debug!(error = %err, "Task failed.");
        Lifecycle::Failed(ExecutionError::Failed { source: Arc::from(err) })
      }
      Err(panic_payload) => {
        let message = panic_message(panic_payload.as_ref());
        error!(%message, "Task panicked during execution.");
        Lifecycle::Failed(ExecutionError::Panicked(message))
      }
    };

    if !shared.finish(lifecycle) {
      warn!("Terminal state already recorded; outcome discarded.");
    }
  }
}

/// Records `Cancelled` for a unit whose future is dropped before reaching a
/// terminal state (runtime shutdown, task dropped unpolled), and removes the
/// unit from the live set.
struct UnitGuard<R> {
  unit_id: u64,
  shared: Arc<HandleShared<R>>,
  live_units: Arc<DashMap<u64, Arc<dyn LiveUnit>>>,
  executor_name: Arc<String>,
}

impl<R> Drop for UnitGuard<R> {
  fn drop(&mut self) {
    if self.shared.finish(Lifecycle::Cancelled) {
      warn!(
        executor = %*self.executor_name,
        unit_id = self.unit_id,
        "Unit dropped before reaching a terminal state; recorded as cancelled."
      );
    }
    self.live_units.remove(&self.unit_id);
    trace!(executor = %*self.executor_name, unit_id = self.unit_id, "Unit finished processing, removed live info.");
  }
}

impl Drop for Executor {
  fn drop(&mut self) {
    if !self.shutting_down.swap(true, AtomicOrdering::SeqCst) {
      info!(
        executor = %*self.name,
        live_units = self.live_units.len(),
        "Executor dropped. Refusing new tasks; live units keep running."
      );
      self.tracker.close();
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&'static str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
