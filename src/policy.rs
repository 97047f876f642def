/// When an execution unit acts on an interruption request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliverAt {
  /// Every cancellation point and cancellable wait checks the signal and
  /// returns an interrupted outcome as soon as it is set.
  #[default]
  EveryCancellationPoint,
  /// Requests are buffered until the task reaches `WorkerContext::safe_point`.
  /// Cancellable waits run to their natural end.
  NextSafePoint,
  /// Requests are never acted on; they are only recorded for the handle owner.
  RecordOnly,
}

/// Immutable interruption policy attached to an execution unit.
///
/// Who may request cancellation is structural: only the unit's
/// `ExecutionHandle` (or a resource adapter bound to the unit) can set its signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationPolicy {
  deliver_at: DeliverAt,
  check_every: u32,
}

impl Default for CancellationPolicy {
  fn default() -> Self {
    Self::immediate()
  }
}

impl CancellationPolicy {
  pub const fn immediate() -> Self {
    Self {
      deliver_at: DeliverAt::EveryCancellationPoint,
      check_every: 1,
    }
  }

  pub const fn at_safe_points() -> Self {
    Self {
      deliver_at: DeliverAt::NextSafePoint,
      check_every: 1,
    }
  }

  pub const fn record_only() -> Self {
    Self {
      deliver_at: DeliverAt::RecordOnly,
      check_every: 1,
    }
  }

  /// Makes `WorkerContext::tick` perform a real check only every `n` calls.
  /// Zero is treated as one.
  pub const fn with_check_every(mut self, n: u32) -> Self {
    self.check_every = if n == 0 { 1 } else { n };
    self
  }

  pub const fn deliver_at(&self) -> DeliverAt {
    self.deliver_at
  }

  pub const fn check_every(&self) -> u32 {
    self.check_every
  }

  /// Whether cancellation points and cancellable waits react to the signal.
  pub(crate) fn interrupts_waits(&self) -> bool {
    self.deliver_at == DeliverAt::EveryCancellationPoint
  }

  /// Whether safe points react to the signal.
  pub(crate) fn interrupts_safe_points(&self) -> bool {
    self.deliver_at != DeliverAt::RecordOnly
  }
}
