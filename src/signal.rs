use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Per-unit interruption flag plus a wake capability.
///
/// Owned by exactly one execution unit. Only the unit's handle (through
/// `cancel(true)`) and the unit's own resource adapters set it; only the
/// unit's terminal handler and its `Postponed` guards clear it.
#[derive(Debug, Default)]
pub(crate) struct InterruptSignal {
  requested: AtomicBool,
  wake: Notify,
}

impl InterruptSignal {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Sets the flag and wakes every operation currently suspended on it.
  /// Returns true if this call flipped the flag.
  pub(crate) fn request(&self) -> bool {
    let flipped = !self.requested.swap(true, Ordering::SeqCst);
    if flipped {
      self.wake.notify_waiters();
    }
    flipped
  }

  pub(crate) fn is_requested(&self) -> bool {
    self.requested.load(Ordering::SeqCst)
  }

  /// Atomically reads and clears the flag, returning the prior value.
  pub(crate) fn consume_and_clear(&self) -> bool {
    self.requested.swap(false, Ordering::SeqCst)
  }

  /// Resolves once the flag is set. Resolves immediately if it already is.
  pub(crate) async fn requested(&self) {
    loop {
      let notified = self.wake.notified();
      tokio::pin!(notified);
      // Register before re-checking so a concurrent `request` cannot slip between.
      notified.as_mut().enable();
      if self.is_requested() {
        return;
      }
      notified.await;
    }
  }
}
