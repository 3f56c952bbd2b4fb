use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use generational_arena::Index;

/// A container for a value in the cache, holding all necessary metadata.
///
/// Timestamps are nanoseconds read from the cache's `Ticker`. A new entry is
/// created for every write, so only the access time ever changes.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  /// The user's value, wrapped in an Arc for shared ownership.
  value: Arc<V>,
  /// The weight charged against the cache's capacity.
  weight: u64,
  /// Creation and last-write time coincide, as every write makes a new entry.
  last_written: u64,
  last_accessed: AtomicU64,
  /// This entry's node in the eviction policy's arena.
  node: Index,
}

impl<V> CacheEntry<V> {
  pub(crate) fn new(value: V, weight: u64, now: u64, node: Index) -> Self {
    Self {
      value: Arc::new(value),
      weight,
      last_written: now,
      last_accessed: AtomicU64::new(now),
      node,
    }
  }

  /// Returns a clone of the `Arc` containing the value.
  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  #[inline]
  pub(crate) fn weight(&self) -> u64 {
    self.weight
  }

  #[inline]
  pub(crate) fn node(&self) -> Index {
    self.node
  }

  #[inline]
  pub(crate) fn last_written(&self) -> u64 {
    self.last_written
  }

  #[inline]
  pub(crate) fn last_accessed(&self) -> u64 {
    self.last_accessed.load(Ordering::Relaxed)
  }

  /// Records a read. Only ever moves the access time forward.
  #[inline]
  pub(crate) fn touch(&self, now: u64) {
    self.last_accessed.fetch_max(now, Ordering::Relaxed);
  }

  /// Checks whether either expiration policy has lapsed at `now`.
  #[inline]
  pub(crate) fn is_expired(&self, now: u64, ttl: Option<Duration>, tti: Option<Duration>) -> bool {
    if let Some(ttl) = ttl {
      if lapsed(now, self.last_written, ttl) {
        return true;
      }
    }
    if let Some(tti) = tti {
      if lapsed(now, self.last_accessed(), tti) {
        return true;
      }
    }
    false
  }
}

/// `now - since >= limit`, saturating on clock skew.
#[inline]
pub(crate) fn lapsed(now: u64, since: u64, limit: Duration) -> bool {
  now.saturating_sub(since) >= limit.as_nanos() as u64
}
