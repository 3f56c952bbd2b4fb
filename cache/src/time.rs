//! Time sources used for expiration.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// The single, static reference point for all time calculations in the cache.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Converts an `Instant` into a `Duration` since the cache's epoch.
#[inline]
pub(crate) fn instant_to_duration(instant: Instant) -> Duration {
  instant.saturating_duration_since(*CACHE_EPOCH)
}

/// A helper to get the current time as a `Duration` since the epoch.
#[inline]
pub(crate) fn now_duration() -> Duration {
  instant_to_duration(Instant::now())
}

/// A monotonic time source.
///
/// Only differences between readings matter, so an implementation may start
/// counting from any fixed origin.
pub trait Ticker: Send + Sync {
  /// Returns the time elapsed since the ticker's origin.
  fn now(&self) -> Duration;
}

/// The default ticker, backed by `Instant::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTicker;

impl Ticker for SystemTicker {
  #[inline]
  fn now(&self) -> Duration {
    now_duration()
  }
}

/// A ticker that only moves when told to.
///
/// Clones share the same clock, so a test can keep one handle and give
/// another to the cache.
#[derive(Clone, Default)]
pub struct ManualTicker {
  nanos: Arc<AtomicU64>,
}

impl ManualTicker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Moves the clock forward by `duration`.
  pub fn advance(&self, duration: Duration) {
    self
      .nanos
      .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
  }
}

impl Ticker for ManualTicker {
  fn now(&self) -> Duration {
    Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
  }
}

impl fmt::Debug for ManualTicker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManualTicker")
      .field("now", &self.now())
      .finish()
  }
}
