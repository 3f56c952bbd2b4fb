use std::fmt;
use std::sync::Arc;

/// Describes the reason an entry was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RemovalCause {
  /// The entry was removed by the caller, through `invalidate` or
  /// `invalidate_all`.
  Explicit,
  /// The entry's value was overwritten by a `put`, a bulk load or a refresh.
  Replaced,
  /// The entry was evicted to bring the cache back within its capacity.
  Size,
  /// The entry's time-to-live or time-to-idle lapsed.
  Expired,
}

impl RemovalCause {
  /// Returns `true` if the cache removed the entry on its own, rather than
  /// because of a caller's write or invalidation.
  #[inline]
  pub fn was_evicted(&self) -> bool {
    matches!(self, RemovalCause::Size | RemovalCause::Expired)
  }
}

impl fmt::Display for RemovalCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RemovalCause::Explicit => write!(f, "explicitly invalidated"),
      RemovalCause::Replaced => write!(f, "replaced by a new value"),
      RemovalCause::Size => write!(f, "evicted due to capacity"),
      RemovalCause::Expired => write!(f, "evicted due to expiration (TTL/TTI)"),
    }
  }
}

/// A listener that is told about every removal from the cache, whatever the
/// cause.
///
/// `on_removal` runs synchronously on the thread whose operation caused the
/// removal, after the entry is gone and with no cache lock held, so it may
/// call back into the cache. A panic is caught and logged; it never reaches
/// the caller of the cache operation.
pub trait RemovalListener<K, V>: Send + Sync {
  fn on_removal(&self, key: &K, value: Arc<V>, cause: RemovalCause);
}

/// A listener that is only told about evictions: removals with cause
/// [`RemovalCause::Size`] or [`RemovalCause::Expired`].
///
/// Delivery follows the same rules as [`RemovalListener`].
pub trait EvictionListener<K, V>: Send + Sync {
  fn on_evict(&self, key: &K, value: Arc<V>, cause: RemovalCause);
}

impl<K, V, F> RemovalListener<K, V> for F
where
  F: Fn(&K, Arc<V>, RemovalCause) + Send + Sync,
{
  fn on_removal(&self, key: &K, value: Arc<V>, cause: RemovalCause) {
    self(key, value, cause)
  }
}

impl<K, V, F> EvictionListener<K, V> for F
where
  F: Fn(&K, Arc<V>, RemovalCause) + Send + Sync,
{
  fn on_evict(&self, key: &K, value: Arc<V>, cause: RemovalCause) {
    self(key, value, cause)
  }
}
