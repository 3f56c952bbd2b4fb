//! Contains types for iterating over a cache's contents.

use crate::shared::CacheShared;

use std::collections::VecDeque;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::iter::FusedIterator;
use std::sync::Arc;

/// An iterator over the live key-value pairs of a `Cache`.
///
/// This iterator is designed for low-impact, concurrent-friendly iteration.
/// It copies one shard at a time into a buffer, holding that shard's read
/// lock only while copying.
///
/// **Important**: This iterator does **not** provide a transactional
/// snapshot of the cache. Each shard is seen as it was when it was copied, so
/// writes made while iteration is in progress may or may not be observed.
/// Entries that had expired when the iterator was created are skipped.
/// Iterating never refreshes recency or idle timers.
pub struct Iter<'a, K, V, H> {
  shared: &'a CacheShared<K, V, H>,
  buffer: VecDeque<(K, Arc<V>)>,
  next_shard: usize,
  now: u64,
}

impl<K, V, H> fmt::Debug for Iter<'_, K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Iter")
      .field("buffered", &self.buffer.len())
      .field("next_shard", &self.next_shard)
      .finish()
  }
}

impl<'a, K, V, H> Iter<'a, K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  pub(crate) fn new(shared: &'a CacheShared<K, V, H>) -> Self {
    Self {
      shared,
      buffer: VecDeque::new(),
      next_shard: 0,
      now: shared.now(),
    }
  }

  /// Copies shards into the buffer until it holds something or every shard
  /// has been visited.
  fn refill_buffer(&mut self) {
    let shards = &self.shared.store.shards;

    while self.buffer.is_empty() && self.next_shard < shards.len() {
      let guard = shards[self.next_shard].read();
      self.buffer.extend(
        guard
          .iter()
          .filter(|(_, entry)| !self.shared.is_expired(entry, self.now))
          .map(|(key, entry)| (key.clone(), entry.value())),
      );
      drop(guard);
      self.next_shard += 1;
    }
  }
}

impl<K, V, H> Iterator for Iter<'_, K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  type Item = (K, Arc<V>);

  fn next(&mut self) -> Option<Self::Item> {
    // Fast path: serve from the buffer if possible
    if let Some(item) = self.buffer.pop_front() {
      return Some(item);
    }

    // Slow path: refill the buffer and try again
    self.refill_buffer();
    self.buffer.pop_front()
  }
}

impl<K, V, H> FusedIterator for Iter<'_, K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
}
