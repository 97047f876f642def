use crate::error::InterruptedWait;
use crate::policy::CancellationPolicy;
use crate::resource::CancellableResource;
use crate::signal::InterruptSignal;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::trace;

/// Runtime state of one execution unit. Shared between the unit's task, its
/// handle and any resource adapters created inside it.
#[derive(Debug)]
pub(crate) struct Unit {
  pub(crate) id: u64,
  pub(crate) executor_name: Arc<String>,
  pub(crate) policy: CancellationPolicy,
  pub(crate) signal: InterruptSignal,
  ticks: AtomicU32,
}

impl Unit {
  pub(crate) fn new(id: u64, executor_name: Arc<String>, policy: CancellationPolicy) -> Arc<Self> {
    Arc::new(Self {
      id,
      executor_name,
      policy,
      signal: InterruptSignal::new(),
      ticks: AtomicU32::new(0),
    })
  }

  fn check(&self) -> Result<(), InterruptedWait> {
    if self.signal.is_requested() {
      trace!(unit_id = self.id, "Interruption observed at cancellation point.");
      Err(InterruptedWait)
    } else {
      Ok(())
    }
  }

  /// Runs `fut` as a cancellable blocking operation under the unit's policy.
  pub(crate) async fn interruptible<F: Future>(&self, fut: F) -> Result<F::Output, InterruptedWait> {
    if !self.policy.interrupts_waits() {
      return Ok(fut.await);
    }
    self.check()?;
    tokio::select! {
      biased;
      _ = self.signal.requested() => {
        trace!(unit_id = self.id, "Cancellable wait cut short by interruption.");
        Err(InterruptedWait)
      }
      output = fut => Ok(output),
    }
  }
}

/// The task-visible view of the execution unit a task runs in.
///
/// Handed to every task at start. It exposes the unit's interruption state
/// and the cancellable operations that honour the unit's policy, but never the
/// signal itself.
#[derive(Clone)]
pub struct WorkerContext {
  pub(crate) unit: Arc<Unit>,
}

impl fmt::Debug for WorkerContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WorkerContext")
      .field("unit_id", &self.unit.id)
      .field("executor", &self.unit.executor_name)
      .field("policy", &self.unit.policy)
      .finish_non_exhaustive()
  }
}

impl WorkerContext {
  pub(crate) fn new(unit: Arc<Unit>) -> Self {
    Self { unit }
  }

  /// The unit's id, equal to the id of its `ExecutionHandle`.
  pub fn id(&self) -> u64 {
    self.unit.id
  }

  pub fn executor_name(&self) -> &str {
    &self.unit.executor_name
  }

  pub fn policy(&self) -> CancellationPolicy {
    self.unit.policy
  }

  /// Reads the interruption flag without clearing it.
  pub fn interruption_requested(&self) -> bool {
    self.unit.signal.is_requested()
  }

  /// Fails with `InterruptedWait` if interruption was requested and the policy
  /// delivers at every cancellation point. Does nothing under other policies.
  pub fn cancellation_point(&self) -> Result<(), InterruptedWait> {
    if self.unit.policy.interrupts_waits() {
      self.unit.check()
    } else {
      Ok(())
    }
  }

  /// Boundary between atomic steps. Delivers buffered requests unless the
  /// policy only records them.
  pub fn safe_point(&self) -> Result<(), InterruptedWait> {
    if self.unit.policy.interrupts_safe_points() {
      self.unit.check()
    } else {
      Ok(())
    }
  }

  /// A cancellation point that only checks once every `check_every` calls.
  pub fn tick(&self) -> Result<(), InterruptedWait> {
    let every = self.unit.policy.check_every();
    let n = self.unit.ticks.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    if n % every == 0 {
      self.cancellation_point()
    } else {
      Ok(())
    }
  }

  /// Runs any future as a cancellable blocking operation.
  ///
  /// Under `DeliverAt::EveryCancellationPoint` the signal is checked on entry
  /// and the wait returns `InterruptedWait` as soon as interruption is
  /// requested, dropping `fut`. Other policies simply await `fut`.
  pub async fn interruptible<F: Future>(&self, fut: F) -> Result<F::Output, InterruptedWait> {
    self.unit.interruptible(fut).await
  }

  pub async fn sleep(&self, duration: Duration) -> Result<(), InterruptedWait> {
    self.interruptible(tokio::time::sleep(duration)).await
  }

  /// Queue wait. `Ok(None)` means the channel closed.
  pub async fn recv<T>(&self, rx: &mut mpsc::Receiver<T>) -> Result<Option<T>, InterruptedWait> {
    self.interruptible(rx.recv()).await
  }

  /// Lock wait.
  pub async fn lock<'a, T>(&self, mutex: &'a AsyncMutex<T>) -> Result<AsyncMutexGuard<'a, T>, InterruptedWait> {
    self.interruptible(mutex.lock()).await
  }

  /// Starts a two-phase consume for an atomic step.
  pub fn postpone(&self) -> Postponed<'_> {
    Postponed {
      cx: self,
      absorbed: false,
    }
  }

  /// Re-sets the signal after general-purpose code caught an `InterruptedWait`
  /// and chose not to propagate it.
  pub fn restore_interruption(&self) {
    self.unit.signal.request();
  }

  /// Wraps a resource whose blocking calls do not observe the signal so that
  /// it can be force-released on cancellation.
  pub fn wrap<T>(&self, resource: T) -> CancellableResource<T> {
    CancellableResource::new(resource, self.unit.clone())
  }
}

/// Guard for an atomic step that must not be cut short midway.
///
/// `absorb` consumes interrupted outcomes so the step can keep working;
/// `finish` re-raises a consumed interruption. Dropping the guard without
/// `finish` re-sets the signal so the request is not lost.
#[derive(Debug)]
pub struct Postponed<'a> {
  cx: &'a WorkerContext,
  absorbed: bool,
}

impl Postponed<'_> {
  /// Returns the value of a successful wait, or records an interrupted one
  /// (clearing the signal so further waits in the step can proceed).
  pub fn absorb<T>(&mut self, result: Result<T, InterruptedWait>) -> Option<T> {
    match result {
      Ok(value) => Some(value),
      Err(InterruptedWait) => {
        self.cx.unit.signal.consume_and_clear();
        self.absorbed = true;
        trace!(unit_id = self.cx.unit.id, "Interruption postponed until end of atomic step.");
        None
      }
    }
  }

  /// Absorbs a request that arrived without a failing wait, e.g. between two
  /// operations of the step.
  pub fn absorb_pending(&mut self) {
    if self.cx.unit.signal.consume_and_clear() {
      self.absorbed = true;
    }
  }

  pub fn has_absorbed(&self) -> bool {
    self.absorbed
  }

  /// Ends the atomic step, re-raising any absorbed interruption.
  pub fn finish(mut self) -> Result<(), InterruptedWait> {
    if std::mem::take(&mut self.absorbed) {
      self.cx.unit.signal.request();
      Err(InterruptedWait)
    } else {
      Ok(())
    }
  }
}

impl Drop for Postponed<'_> {
  fn drop(&mut self) {
    if self.absorbed {
      self.cx.unit.signal.request();
    }
  }
}
