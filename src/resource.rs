use crate::context::Unit;
use crate::error::InterruptedWait;

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Canceller side of a [`CancellableResource`]. Cheap to clone and safe to
/// use from any task, concurrently with a blocked call on the resource.
#[derive(Clone)]
pub struct ReleaseHandle {
  token: CancellationToken,
  unit: Arc<Unit>,
}

impl fmt::Debug for ReleaseHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ReleaseHandle")
      .field("unit_id", &self.unit.id)
      .field("released", &self.is_released())
      .finish()
  }
}

impl ReleaseHandle {
  /// Releases the resource and sets the owning unit's interruption signal.
  ///
  /// A call blocked on the resource returns an `io::ErrorKind::ConnectionAborted`
  /// error carrying [`InterruptedWait`]; later calls fail fast with the same
  /// error. Idempotent.
  pub fn force_release(&self) {
    if !self.token.is_cancelled() {
      trace!(unit_id = self.unit.id, "Force-releasing wrapped resource.");
    }
    self.token.cancel();
    self.unit.signal.request();
  }

  pub fn is_released(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Races `fut` against release. `None` means the resource was released
  /// (explicitly, or through the unit's signal when its policy delivers at
  /// every cancellation point).
  async fn race<F: Future>(&self, fut: F) -> Option<F::Output> {
    let watch_signal = self.unit.policy.interrupts_waits();
    tokio::select! {
      biased;
      _ = self.token.cancelled() => None,
      _ = self.unit.signal.requested(), if watch_signal => {
        self.token.cancel();
        None
      }
      output = fut => Some(output),
    }
  }
}

/// A resource whose blocking calls do not observe the interruption signal,
/// wrapped so cancellation can force it closed.
///
/// Created with `WorkerContext::wrap`. Releasing drops the underlying object
/// on the owning side as soon as the in-flight call returns, which closes it.
pub struct CancellableResource<T> {
  inner: Option<T>,
  release: ReleaseHandle,
}

impl<T> fmt::Debug for CancellableResource<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CancellableResource")
      .field("open", &self.inner.is_some())
      .field("release", &self.release)
      .finish()
  }
}

impl<T> CancellableResource<T> {
  pub(crate) fn new(resource: T, unit: Arc<Unit>) -> Self {
    Self {
      inner: Some(resource),
      release: ReleaseHandle {
        token: CancellationToken::new(),
        unit,
      },
    }
  }

  pub fn release_handle(&self) -> ReleaseHandle {
    self.release.clone()
  }

  pub fn force_release(&mut self) {
    self.release.force_release();
    self.inner = None;
  }

  pub fn is_released(&self) -> bool {
    self.inner.is_none() || self.release.is_released()
  }

  pub fn get_ref(&self) -> Option<&T> {
    self.inner.as_ref()
  }

  /// Returns the underlying resource unless it was released.
  pub fn into_inner(self) -> Option<T> {
    if self.release.is_released() {
      None
    } else {
      self.inner
    }
  }

  fn live<'a>(inner: &'a mut Option<T>, release: &ReleaseHandle) -> io::Result<&'a mut T> {
    if release.is_released() {
      *inner = None;
    }
    inner.as_mut().ok_or_else(|| InterruptedWait.into_io_error())
  }

  fn settle<O>(&mut self, outcome: Option<io::Result<O>>) -> io::Result<O> {
    match outcome {
      Some(result) => result,
      None => {
        self.inner = None;
        trace!(unit_id = self.release.unit.id, "Blocked call returned after resource release.");
        Err(InterruptedWait.into_io_error())
      }
    }
  }
}

impl<T: AsyncRead + Unpin> CancellableResource<T> {
  pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let outcome = {
      let Self { inner, release } = self;
      let resource = Self::live(inner, release)?;
      release.race(resource.read(buf)).await
    };
    self.settle(outcome)
  }

  pub async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let outcome = {
      let Self { inner, release } = self;
      let resource = Self::live(inner, release)?;
      release.race(resource.read_exact(buf)).await
    };
    self.settle(outcome)
  }
}

impl<T: AsyncWrite + Unpin> CancellableResource<T> {
  pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
    let outcome = {
      let Self { inner, release } = self;
      let resource = Self::live(inner, release)?;
      release.race(resource.write_all(buf)).await
    };
    self.settle(outcome)
  }

  pub async fn flush(&mut self) -> io::Result<()> {
    let outcome = {
      let Self { inner, release } = self;
      let resource = Self::live(inner, release)?;
      release.race(resource.flush()).await
    };
    self.settle(outcome)
  }

  pub async fn shutdown(&mut self) -> io::Result<()> {
    let outcome = {
      let Self { inner, release } = self;
      let resource = Self::live(inner, release)?;
      release.race(resource.shutdown()).await
    };
    self.settle(outcome)
  }
}
