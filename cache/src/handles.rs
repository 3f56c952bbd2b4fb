use crate::error::{GetAllError, LoadError};
use crate::iter::Iter;
use crate::notifier::Removals;
use crate::shared::CacheShared;
use crate::task::janitor::Janitor;
use crate::{BoxError, MetricsSnapshot};

use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// A thread-safe, synchronous loading cache.
///
/// Cloning is cheap: clones share the same entries, loader and listeners.
/// Listeners run on the thread whose operation caused the removal, after the
/// operation has released every internal lock, so a listener may safely call
/// back into the cache.
pub struct Cache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
  pub(crate) janitor: Option<Arc<Janitor>>,
}

impl<K, V, H> Clone for Cache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
      janitor: self.janitor.clone(),
    }
  }
}

impl<K, V, H> fmt::Debug for Cache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache")
      .field("shared", &self.shared)
      .field("janitor", &self.janitor.is_some())
      .finish()
  }
}

impl<K, V, H> Cache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  // Runs one core operation and then announces whatever it removed, once the
  // operation has released its locks.
  #[inline]
  fn with_removals<R>(&self, op: impl FnOnce(&CacheShared<K, V, H>, &mut Removals<K, V>) -> R) -> R {
    let mut removals = Vec::new();
    let result = op(&self.shared, &mut removals);
    self.shared.notifier.dispatch(removals);
    result
  }

  // --- Reads ---

  /// Returns the value for `key`, loading it if it is absent or expired.
  ///
  /// Concurrent calls for the same absent key share one loader invocation
  /// and all receive its result. A failed load caches nothing.
  ///
  /// # Errors
  ///
  /// `LoadError::NoLoader` if the key is absent and no loader is configured,
  /// otherwise whatever the loader failed with.
  pub fn get(&self, key: &K) -> Result<Arc<V>, LoadError> {
    self.with_removals(|shared, removals| shared.get(key, removals))
  }

  /// Returns the value for `key` if it is present and live. Never loads.
  pub fn get_if_present(&self, key: &K) -> Option<Arc<V>> {
    self.with_removals(|shared, removals| shared.get_if_present(key, removals))
  }

  /// "Peeks" at a value without updating its recency, its idle timer or the
  /// statistics.
  pub fn peek(&self, key: &K) -> Option<Arc<V>> {
    self.shared.peek(key)
  }

  /// Returns the value for `key`, computing it with `f` if it is absent.
  ///
  /// `f` takes part in the same single-flight registry as the configured
  /// loader: if a load of `key` is already running, this call waits for it
  /// and `f` is never invoked.
  pub fn get_with<F, E>(&self, key: &K, f: F) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce(&K) -> Result<V, E>,
    E: Into<BoxError>,
  {
    self.with_removals(|shared, removals| {
      shared.get_or_load(key, |k| f(k).map_err(Into::into), removals)
    })
  }

  /// Returns the values for `keys`, loading all absent keys together.
  ///
  /// Absent keys are handed to `CacheLoader::load_all` in one call, or to
  /// one `load` per key if the loader has no bulk support. Keys the bulk
  /// loader returns without being asked for are cached but not returned.
  /// A key already being loaded by another caller is waited for instead.
  ///
  /// # Errors
  ///
  /// `GetAllError::Incomplete` if the bulk loader left some requested keys
  /// out. Everything it did return is cached regardless.
  pub fn get_all<I>(&self, keys: I) -> Result<HashMap<K, Arc<V>>, GetAllError>
  where
    I: IntoIterator<Item = K>,
  {
    self.with_removals(|shared, removals| shared.get_all(keys, removals))
  }

  /// Returns `true` if `key` maps to a live value. Does not count as a read.
  pub fn contains_key(&self, key: &K) -> bool {
    self.shared.contains_key(key)
  }

  // --- Writes ---

  /// Inserts a value, replacing any previous one.
  ///
  /// The previous value, if any, is reported as `Replaced`. The write may
  /// evict other entries to stay within capacity.
  pub fn put(&self, key: K, value: V) {
    self.with_removals(|shared, removals| shared.put(key, value, removals));
  }

  /// Inserts every pair. Notifications are delivered once all are written.
  pub fn put_all<I>(&self, entries: I)
  where
    I: IntoIterator<Item = (K, V)>,
  {
    self.with_removals(|shared, removals| {
      for (key, value) in entries {
        shared.put(key, value, removals);
      }
    });
  }

  /// Reloads `key` through the loader, replacing the current value even if
  /// it is still live. On failure the current value is left in place.
  pub fn refresh(&self, key: &K) -> Result<Arc<V>, LoadError> {
    self.with_removals(|shared, removals| shared.refresh(key, removals))
  }

  /// Removes an entry from the cache, returning `true` if a live value was
  /// removed.
  ///
  /// A load of `key` still in flight is discarded: its callers receive the
  /// value, but it is not cached.
  pub fn invalidate(&self, key: &K) -> bool {
    self.with_removals(|shared, removals| shared.invalidate(key, removals))
  }

  /// Removes every listed key.
  pub fn invalidate_many<'a, I>(&self, keys: I)
  where
    I: IntoIterator<Item = &'a K>,
    K: 'a,
  {
    self.with_removals(|shared, removals| {
      for key in keys {
        shared.invalidate(key, removals);
      }
    });
  }

  /// Removes all entries from the cache. Loads still in flight are
  /// discarded as with `invalidate`.
  pub fn invalidate_all(&self) {
    self.with_removals(|shared, removals| shared.invalidate_all(removals));
  }

  // --- Maintenance and introspection ---

  /// Applies deferred reads, removes expired entries and enforces capacity
  /// right now instead of waiting for the next write or janitor tick.
  pub fn run_pending_tasks(&self) {
    self.with_removals(|shared, removals| shared.run_pending_tasks(removals));
  }

  /// The number of entries held, including expired ones not yet removed.
  pub fn entry_count(&self) -> u64 {
    self.shared.entry_count()
  }

  /// The total weight of the entries held.
  pub fn weighted_size(&self) -> u64 {
    self.shared.weighted_size()
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics()
  }

  /// Returns an iterator over the live entries.
  ///
  /// The iterator is weakly consistent: it never blocks writers for long and
  /// may or may not observe writes made while it runs.
  pub fn iter(&self) -> Iter<'_, K, V, H> {
    Iter::new(&self.shared)
  }

  /// Copies the live entries into a map. Does not count as a read.
  pub fn as_map(&self) -> HashMap<K, Arc<V>> {
    self.iter().collect()
  }
}

impl<'a, K, V, H> IntoIterator for &'a Cache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  type Item = (K, Arc<V>);
  type IntoIter = Iter<'a, K, V, H>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}
