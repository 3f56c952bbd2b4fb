use crate::entry::CacheEntry;

use core::fmt;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use generational_arena::Index;
use parking_lot::RwLock;

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

pub(crate) type ShardMap<K, V, H> = HashMap<K, Arc<CacheEntry<V>>, H>;

/// A cache store that is partitioned into multiple, independently locked shards.
///
/// Reads of unrelated keys only ever contend on a shard's read lock. Every
/// structural change goes through the cache core while it holds the policy
/// lock, which keeps the store and the policy's arena in lockstep.
pub(crate) struct ShardedStore<K, V, H> {
  pub(crate) shards: Box<[CachePadded<RwLock<ShardMap<K, V, H>>>]>,
  pub(crate) hasher: H,
}

impl<K, V, H> fmt::Debug for ShardedStore<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .finish()
  }
}

impl<K, V, H> ShardedStore<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  /// Creates a new `ShardedStore`. `num_shards` must be a power of two.
  pub(crate) fn new(num_shards: usize, hasher: H) -> Self {
    debug_assert!(num_shards.is_power_of_two());
    let shards = (0..num_shards)
      .map(|_| CachePadded::new(RwLock::new(HashMap::with_hasher(hasher.clone()))))
      .collect();

    Self { shards, hasher }
  }

  #[inline]
  pub(crate) fn hash(&self, key: &K) -> u64 {
    hash_key(&self.hasher, key)
  }

  #[inline]
  pub(crate) fn shard_index(&self, key: &K) -> usize {
    self.hash(key) as usize & (self.shards.len() - 1)
  }

  #[inline]
  fn shard(&self, key: &K) -> &RwLock<ShardMap<K, V, H>> {
    &self.shards[self.shard_index(key)]
  }

  /// Returns the entry for `key`, expired or not.
  pub(crate) fn get(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
    self.shard(key).read().get(key).cloned()
  }

  /// Installs `entry`, returning the entry it displaced.
  pub(crate) fn insert(&self, key: K, entry: Arc<CacheEntry<V>>) -> Option<Arc<CacheEntry<V>>> {
    self.shard(&key).write().insert(key, entry)
  }

  pub(crate) fn remove(&self, key: &K) -> Option<(K, Arc<CacheEntry<V>>)> {
    self.shard(key).write().remove_entry(key)
  }

  /// Removes the entry for `key` only if it is still the one linked to
  /// `node`. A stale handle leaves a newer entry untouched.
  pub(crate) fn remove_if_node(&self, key: &K, node: Index) -> Option<(K, Arc<CacheEntry<V>>)> {
    let mut guard = self.shard(key).write();
    match guard.get(key) {
      Some(entry) if entry.node() == node => guard.remove_entry(key),
      _ => None,
    }
  }

  /// Returns an iterator over all the shard locks.
  /// This is useful for "stop-the-world" operations like `invalidate_all()`.
  pub(crate) fn iter_shards(&self) -> impl Iterator<Item = &RwLock<ShardMap<K, V, H>>> {
    self.shards.iter().map(|padded_lock| &**padded_lock)
  }
}
