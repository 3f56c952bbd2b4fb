use crate::entry::{lapsed, CacheEntry};
use crate::error::{BoxError, GetAllError, IncompleteLoadError, LoadError};
use crate::listener::RemovalCause;
use crate::loader::{CacheLoader, LoadFuture, LoadResult};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::notifier::{panic_message, Notifier, Removal, Removals};
use crate::policy::EvictionPolicy;
use crate::store::ShardedStore;
use crate::task::read_buffer::ReadBuffer;
use crate::time::Ticker;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use generational_arena::Index;
use parking_lot::Mutex;

#[cfg(feature = "bulk")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};

/// Computes the weight of an entry.
pub(crate) type Weigher<K, V> = Arc<dyn Fn(&K, &V) -> u64 + Send + Sync>;

type PendingLoads<K, V> = ahash::HashMap<K, Arc<LoadFuture<V>>>;

/// How a caller reached the single-flight registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadKind {
  /// A lookup that missed. Counts towards hits and misses.
  Get,
  /// An unconditional reload of a key that may be present.
  Refresh,
}

/// The outcome of asking the single-flight registry for a key.
enum Claim<V> {
  /// Another caller is computing the key.
  Joined(Arc<LoadFuture<V>>),
  /// A load finished after the caller's miss and its value is live.
  Present(Arc<V>),
  /// The caller registered the key and must compute it.
  Led(Arc<LoadFuture<V>>),
}

/// The keys a bulk lookup leads in the single-flight registry.
///
/// Claims still held on drop, because the lookup unwound, are released with
/// an error so that no waiter is left parked.
struct BulkClaims<'a, K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  shared: &'a CacheShared<K, V, H>,
  futures: HashMap<K, Arc<LoadFuture<V>>>,
}

impl<'a, K, V, H> BulkClaims<'a, K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  fn new(shared: &'a CacheShared<K, V, H>) -> Self {
    Self {
      shared,
      futures: HashMap::new(),
    }
  }

  fn finish(&mut self, key: &K, result: LoadResult<V>) {
    if let Some(future) = self.futures.remove(key) {
      self.shared.release(key, &future, result);
    }
  }

  fn finish_all(&mut self, error: &LoadError) {
    let shared = self.shared;
    for (key, future) in self.futures.drain() {
      shared.release(&key, &future, Err(error.clone()));
    }
  }
}

impl<K, V, H> Drop for BulkClaims<'_, K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  fn drop(&mut self) {
    if !self.futures.is_empty() {
      self.finish_all(&LoadError::Panicked("bulk load abandoned".to_string()));
    }
  }
}

/// The internal, thread-safe core of the cache.
///
/// Locks are always taken in the order policy, pending-load shard, store
/// shard. Only a store shard read lock is ever taken under a pending-load
/// shard lock.
/// No lock is held while a loader or a listener runs: operations collect
/// their removals and the handle dispatches them once every lock is released.
pub(crate) struct CacheShared<K, V, H> {
  pub(crate) store: ShardedStore<K, V, H>,
  pub(crate) policy: Mutex<EvictionPolicy<K>>,
  pub(crate) read_buffer: ReadBuffer,
  pub(crate) pending_loads: Box<[Mutex<PendingLoads<K, V>>]>,
  pub(crate) loader: Option<Arc<dyn CacheLoader<K, V>>>,
  pub(crate) weigher: Option<Weigher<K, V>>,
  pub(crate) notifier: Notifier<K, V>,
  pub(crate) metrics: Metrics,
  pub(crate) ticker: Arc<dyn Ticker>,
  pub(crate) time_to_live: Option<Duration>,
  pub(crate) time_to_idle: Option<Duration>,
}

impl<K, V, H> fmt::Debug for CacheShared<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let policy = self.policy.lock();
    f.debug_struct("CacheShared")
      .field("store", &self.store)
      .field("max_weight", &policy.max_weight())
      .field("entry_count", &policy.len())
      .field("weighted_size", &policy.weighted_size())
      .field("time_to_live", &self.time_to_live)
      .field("time_to_idle", &self.time_to_idle)
      .field("has_loader", &self.loader.is_some())
      .finish_non_exhaustive()
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// The current time in nanoseconds, as seen by the configured ticker.
  #[inline]
  pub(crate) fn now(&self) -> u64 {
    self.ticker.now().as_nanos() as u64
  }

  #[inline]
  pub(crate) fn is_expired(&self, entry: &CacheEntry<V>, now: u64) -> bool {
    entry.is_expired(now, self.time_to_live, self.time_to_idle)
  }

  #[inline]
  pub(crate) fn weigh(&self, key: &K, value: &V) -> u64 {
    self.weigher.as_ref().map_or(1, |weigher| weigher(key, value))
  }

  // --- Reads ---

  /// Returns the live entry for `key`.
  ///
  /// An expired entry is never returned: it is removed on the spot and
  /// reported with `RemovalCause::Expired`. When `record_access` is set the
  /// read refreshes the entry's idle timer and its recency.
  pub(crate) fn get_live(
    &self,
    key: &K,
    record_access: bool,
    removals: &mut Removals<K, V>,
  ) -> Option<Arc<CacheEntry<V>>> {
    let entry = self.store.get(key)?;
    let now = self.now();

    if self.is_expired(&entry, now) {
      let mut policy = self.policy.lock();
      self.remove_node(&mut policy, key, entry.node(), RemovalCause::Expired, removals);
      return None;
    }

    if record_access {
      entry.touch(now);
      self.record_read(key, entry.node());
    }
    Some(entry)
  }

  // Applies a read to the policy right away if the lock is free, otherwise
  // leaves it for the next maintenance pass.
  fn record_read(&self, key: &K, node: Index) {
    match self.policy.try_lock() {
      Some(mut policy) => policy.on_access(node),
      None => {
        self.read_buffer.record(self.store.hash(key), node);
      }
    }
  }

  /// A lookup that counts towards the hit ratio but never loads.
  pub(crate) fn get_if_present(&self, key: &K, removals: &mut Removals<K, V>) -> Option<Arc<V>> {
    match self.get_live(key, true, removals) {
      Some(entry) => {
        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value())
      }
      None => {
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        None
      }
    }
  }

  /// Reads a live value without touching recency, idle timers or metrics.
  pub(crate) fn peek(&self, key: &K) -> Option<Arc<V>> {
    let entry = self.store.get(key)?;
    if self.is_expired(&entry, self.now()) {
      return None;
    }
    Some(entry.value())
  }

  pub(crate) fn contains_key(&self, key: &K) -> bool {
    self.peek(key).is_some()
  }

  // --- Loads ---

  /// Returns the value for `key`, computing it with the configured loader if
  /// it is absent.
  pub(crate) fn get(&self, key: &K, removals: &mut Removals<K, V>) -> LoadResult<V> {
    match &self.loader {
      Some(loader) => self.get_or_load(key, |k| loader.load(k), removals),
      None => self
        .get_if_present(key, removals)
        .ok_or(LoadError::NoLoader),
    }
  }

  /// Returns the value for `key`, computing it with `load` if it is absent.
  pub(crate) fn get_or_load<F>(&self, key: &K, load: F, removals: &mut Removals<K, V>) -> LoadResult<V>
  where
    F: FnOnce(&K) -> Result<V, BoxError>,
  {
    if let Some(entry) = self.get_live(key, true, removals) {
      self.metrics.hits.fetch_add(1, Ordering::Relaxed);
      return Ok(entry.value());
    }
    self.load_single_flight(key, load, LoadKind::Get, removals)
  }

  /// Recomputes the value for `key` with the loader and installs it, even if
  /// a live value is present. Joins a load of the same key already in flight.
  pub(crate) fn refresh(&self, key: &K, removals: &mut Removals<K, V>) -> LoadResult<V> {
    let loader = self.loader.clone().ok_or(LoadError::NoLoader)?;
    self.load_single_flight(key, |k| loader.load(k), LoadKind::Refresh, removals)
  }

  /// Runs at most one computation per key at a time.
  ///
  /// The first caller registers a `LoadFuture` and runs `load` on its own
  /// thread. Every concurrent caller for the same key parks on that future
  /// and receives the same value or the same error. A failed computation
  /// caches nothing, so the next lookup starts a fresh load.
  pub(crate) fn load_single_flight<F>(
    &self,
    key: &K,
    load: F,
    kind: LoadKind,
    removals: &mut Removals<K, V>,
  ) -> LoadResult<V>
  where
    F: FnOnce(&K) -> Result<V, BoxError>,
  {
    // A refresh must compute even if a value is present.
    let future = match self.claim(key, kind == LoadKind::Get) {
      Claim::Joined(existing) => {
        if kind == LoadKind::Get {
          self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        }
        return existing.wait();
      }
      Claim::Present(value) => {
        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        return Ok(value);
      }
      Claim::Led(future) => future,
    };

    if kind == LoadKind::Get {
      self.metrics.misses.fetch_add(1, Ordering::Relaxed);
    }

    let result = self.compute(key, load, &future, removals);
    self.release(key, &future, result.clone());
    result
  }

  // Joins the load of `key` already in flight, or registers a new one for the
  // caller to lead. With `recheck`, a live value installed since the caller's
  // miss is returned instead.
  fn claim(&self, key: &K, recheck: bool) -> Claim<V> {
    let mut pending = self.pending_loads[self.store.shard_index(key)].lock();

    if let Some(existing) = pending.get(key) {
      return Claim::Joined(existing.clone());
    }

    if recheck {
      if let Some(entry) = self.store.get(key) {
        if !self.is_expired(&entry, self.now()) {
          return Claim::Present(entry.value());
        }
      }
    }

    let future = Arc::new(LoadFuture::new());
    pending.insert(key.clone(), future.clone());
    Claim::Led(future)
  }

  // Unregisters a load the caller led, then wakes its waiters. The value, if
  // any, is already installed, so a lookup arriving in between finds it.
  fn release(&self, key: &K, future: &LoadFuture<V>, result: LoadResult<V>) {
    self.pending_loads[self.store.shard_index(key)].lock().remove(key);
    future.complete(result);
  }

  // Runs a user computation and installs its value. Panics in the loader or
  // the weigher are turned into `LoadError::Panicked` so that waiters are
  // always released.
  fn compute<F>(
    &self,
    key: &K,
    load: F,
    future: &LoadFuture<V>,
    removals: &mut Removals<K, V>,
  ) -> LoadResult<V>
  where
    F: FnOnce(&K) -> Result<V, BoxError>,
  {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
      load(key).map(|value| {
        let weight = self.weigh(key, &value);
        (value, weight)
      })
    }));

    match outcome {
      Ok(Ok((value, weight))) => {
        self.metrics.load_successes.fetch_add(1, Ordering::Relaxed);
        Ok(self.install(key.clone(), value, weight, Some(future), removals))
      }
      Ok(Err(error)) => {
        self.metrics.load_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(error = %error, "cache load failed");
        Err(LoadError::failed(error))
      }
      Err(payload) => {
        self.metrics.load_failures.fetch_add(1, Ordering::Relaxed);
        let message = panic_message(payload.as_ref());
        tracing::warn!(panic = %message, "cache loader panicked");
        Err(LoadError::Panicked(message))
      }
    }
  }

  /// Returns the values for `keys`, loading every absent key.
  ///
  /// Absent keys go to `CacheLoader::load_all` in one call. A loader without
  /// bulk support gets one `load` per key instead. Keys that another caller
  /// is already loading are waited for rather than computed again. Duplicate
  /// keys are looked up once.
  pub(crate) fn get_all<I>(
    &self,
    keys: I,
    removals: &mut Removals<K, V>,
  ) -> Result<HashMap<K, Arc<V>>, GetAllError>
  where
    I: IntoIterator<Item = K>,
  {
    let mut found = HashMap::new();
    let mut missing = Vec::new();
    let mut seen_missing = HashSet::new();

    for key in keys {
      if found.contains_key(&key) || seen_missing.contains(&key) {
        continue;
      }
      match self.get_live(&key, true, removals) {
        Some(entry) => {
          self.metrics.hits.fetch_add(1, Ordering::Relaxed);
          found.insert(key, entry.value());
        }
        None => {
          seen_missing.insert(key.clone());
          missing.push(key);
        }
      }
    }

    if missing.is_empty() {
      return Ok(found);
    }
    self
      .metrics
      .misses
      .fetch_add(missing.len() as u64, Ordering::Relaxed);

    let loader = self.loader.clone().ok_or(LoadError::NoLoader)?;

    // Keys another caller is already loading are waited for; the rest are
    // claimed, so no key is ever computed twice at once.
    let mut claims = BulkClaims::new(self);
    let mut led = Vec::new();
    let mut joined = Vec::new();
    for key in missing {
      match self.claim(&key, true) {
        Claim::Joined(future) => joined.push((key, future)),
        Claim::Present(value) => {
          found.insert(key, value);
        }
        Claim::Led(future) => {
          claims.futures.insert(key.clone(), future);
          led.push(key);
        }
      }
    }

    if !led.is_empty() {
      self.load_led(loader.as_ref(), led, &mut claims, &mut found, removals)?;
    }

    // Every claim is settled by now, so two overlapping bulk lookups never
    // wait on each other.
    let mut first_error = None;
    for (key, future) in joined {
      match future.wait() {
        Ok(value) => {
          found.insert(key, value);
        }
        Err(error) => {
          first_error.get_or_insert(error);
        }
      }
    }

    match first_error {
      Some(error) => Err(error.into()),
      None => Ok(found),
    }
  }

  // Computes the keys a bulk lookup leads: one `load_all` call, or one `load`
  // per key when the loader has no bulk support. Every claim is released
  // before this returns, whatever the outcome.
  fn load_led(
    &self,
    loader: &dyn CacheLoader<K, V>,
    led: Vec<K>,
    claims: &mut BulkClaims<'_, K, V, H>,
    found: &mut HashMap<K, Arc<V>>,
    removals: &mut Removals<K, V>,
  ) -> Result<(), GetAllError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| loader.load_all(&led)));
    let loaded = match outcome {
      Ok(None) => return self.load_each(loader, led, claims, found, removals),
      Ok(Some(Ok(loaded))) => loaded,
      Ok(Some(Err(error))) => {
        self.metrics.load_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(error = %error, keys = led.len(), "cache bulk load failed");
        let error = LoadError::failed(error);
        claims.finish_all(&error);
        return Err(error.into());
      }
      Err(payload) => {
        self.metrics.load_failures.fetch_add(1, Ordering::Relaxed);
        let message = panic_message(payload.as_ref());
        tracing::warn!(panic = %message, "cache bulk loader panicked");
        let error = LoadError::Panicked(message);
        claims.finish_all(&error);
        return Err(error.into());
      }
    };
    self.metrics.load_successes.fetch_add(1, Ordering::Relaxed);

    // Every returned pair is cached, including keys nobody asked for. Those
    // are plain writes and do not touch anyone else's load.
    for (key, value) in loaded {
      let weight = self.weigh(&key, &value);
      let future = claims.futures.get(&key).cloned();
      let value = self.install(key.clone(), value, weight, future.as_deref(), removals);
      if future.is_some() {
        claims.finish(&key, Ok(value.clone()));
        found.insert(key, value);
      }
    }

    let absent = claims.futures.len();
    if absent > 0 {
      tracing::debug!(requested = led.len(), missing = absent, "cache bulk load incomplete");
      claims.finish_all(&LoadError::NotReturned);
      return Err(
        IncompleteLoadError {
          requested: led.len(),
          missing: absent,
        }
        .into(),
      );
    }
    Ok(())
  }

  // The per-key fallback for loaders without bulk support. Keys load in
  // parallel when the `bulk` feature is on. The first failure, in key order,
  // is returned after every other load has finished and been cached.
  fn load_each(
    &self,
    loader: &dyn CacheLoader<K, V>,
    led: Vec<K>,
    claims: &mut BulkClaims<'_, K, V, H>,
    found: &mut HashMap<K, Arc<V>>,
    removals: &mut Removals<K, V>,
  ) -> Result<(), GetAllError> {
    let work: Vec<_> = led
      .into_iter()
      .filter_map(|key| claims.futures.get(&key).cloned().map(|future| (key, future)))
      .collect();

    let load_one = |(key, future): (K, Arc<LoadFuture<V>>)| {
      let mut local = Vec::new();
      let result = self.compute(&key, |k| loader.load(k), &future, &mut local);
      (key, result, local)
    };

    #[cfg(feature = "bulk")]
    let outcomes: Vec<_> = work.into_par_iter().map(load_one).collect();
    #[cfg(not(feature = "bulk"))]
    let outcomes: Vec<_> = work.into_iter().map(load_one).collect();

    let mut first_error = None;
    for (key, result, local) in outcomes {
      removals.extend(local);
      claims.finish(&key, result.clone());
      match result {
        Ok(value) => {
          found.insert(key, value);
        }
        Err(error) => {
          first_error.get_or_insert(error);
        }
      }
    }

    match first_error {
      Some(error) => Err(error.into()),
      None => Ok(()),
    }
  }

  // --- Writes ---

  /// Writes `value` under `key` and enforces the size and time bounds.
  ///
  /// Replacing a live entry reports `Replaced`; replacing one that had
  /// already expired reports `Expired`. Returns the installed value.
  ///
  /// A value computed by `load` is dropped instead if the key was
  /// invalidated while it was computing; it is still returned.
  pub(crate) fn install(
    &self,
    key: K,
    value: V,
    weight: u64,
    load: Option<&LoadFuture<V>>,
    removals: &mut Removals<K, V>,
  ) -> Arc<V> {
    let mut policy = self.policy.lock();
    // Read under the lock so the write deque stays in timestamp order.
    let now = self.now();
    self.drain_reads(&mut policy);

    if load.is_some_and(LoadFuture::is_discarded) {
      tracing::trace!("cache load discarded by a concurrent invalidation");
      return Arc::new(value);
    }

    let node = policy.admit(key.clone(), weight);
    let entry = Arc::new(CacheEntry::new(value, weight, now, node));
    let value = entry.value();

    if let Some(old) = self.store.insert(key.clone(), entry) {
      policy.on_remove(old.node());
      let cause = if self.is_expired(&old, now) {
        RemovalCause::Expired
      } else {
        RemovalCause::Replaced
      };
      self.account(cause, old.weight());
      removals.push(Removal {
        key,
        value: old.value(),
        cause,
      });
    }
    self.metrics.inserts.fetch_add(1, Ordering::Relaxed);

    self.expire_entries(&mut policy, now, removals);
    self.evict_entries(&mut policy, Some(node), removals);
    value
  }

  /// Writes a value computed by the caller.
  pub(crate) fn put(&self, key: K, value: V, removals: &mut Removals<K, V>) {
    let weight = self.weigh(&key, &value);
    self.install(key, value, weight, None, removals);
  }

  /// Removes `key`. Returns `true` if a live entry was removed.
  ///
  /// An entry found already expired is still removed, but reported as
  /// `Expired` and not counted as an explicit removal. A load of `key` still
  /// computing will not install its value.
  pub(crate) fn invalidate(&self, key: &K, removals: &mut Removals<K, V>) -> bool {
    let mut policy = self.policy.lock();
    let now = self.now();
    self.drain_reads(&mut policy);
    self.discard_load(key);

    let removed = match self.store.remove(key) {
      Some((key, entry)) => {
        policy.on_remove(entry.node());
        let expired = self.is_expired(&entry, now);
        let cause = if expired {
          RemovalCause::Expired
        } else {
          RemovalCause::Explicit
        };
        self.account(cause, entry.weight());
        removals.push(Removal {
          key,
          value: entry.value(),
          cause,
        });
        !expired
      }
      None => false,
    };

    self.expire_entries(&mut policy, now, removals);
    removed
  }

  /// Removes every entry. Live entries are reported as `Explicit`. Loads
  /// still computing will not install their values.
  pub(crate) fn invalidate_all(&self, removals: &mut Removals<K, V>) {
    let mut policy = self.policy.lock();
    let now = self.now();
    self.drain_reads(&mut policy);
    for pending in self.pending_loads.iter() {
      pending.lock().values().for_each(|future| future.discard());
    }

    for shard in self.store.iter_shards() {
      let drained: Vec<_> = shard.write().drain().collect();
      for (key, entry) in drained {
        policy.on_remove(entry.node());
        let cause = if self.is_expired(&entry, now) {
          RemovalCause::Expired
        } else {
          RemovalCause::Explicit
        };
        self.account(cause, entry.weight());
        removals.push(Removal {
          key,
          value: entry.value(),
          cause,
        });
      }
    }
    debug_assert_eq!(policy.len(), 0);
  }

  // Called under the policy lock, which orders the discard against the
  // loader's `install`.
  fn discard_load(&self, key: &K) {
    let pending = self.pending_loads[self.store.shard_index(key)].lock();
    if let Some(future) = pending.get(key) {
      future.discard();
    }
  }

  // --- Maintenance ---

  /// Replays buffered reads, then removes expired entries and enforces the
  /// capacity.
  pub(crate) fn run_pending_tasks(&self, removals: &mut Removals<K, V>) {
    let mut policy = self.policy.lock();
    let now = self.now();
    self.drain_reads(&mut policy);
    self.expire_entries(&mut policy, now, removals);
    self.evict_entries(&mut policy, None, removals);
  }

  fn drain_reads(&self, policy: &mut EvictionPolicy<K>) {
    self.read_buffer.drain(|node| policy.on_access(node));
  }

  // Removes expired entries from the cold end of the write deque (TTL) and
  // the access deque (TTI). Each walk stops at the first entry still alive,
  // except the idle walk right after a read was dropped from the buffer:
  // that read's entry may sit behind idle ones, so the walk covers the deque.
  fn expire_entries(&self, policy: &mut EvictionPolicy<K>, now: u64, removals: &mut Removals<K, V>) {
    if let Some(ttl) = self.time_to_live {
      let expired = self.collect_lapsed(policy.oldest_written(), policy, true, |entry| {
        lapsed(now, entry.last_written(), ttl)
      });
      for (key, node) in expired {
        self.remove_node(policy, &key, node, RemovalCause::Expired, removals);
      }
    }

    if let Some(tti) = self.time_to_idle {
      let stop_at_live = !self.read_buffer.take_dropped();
      let expired = self.collect_lapsed(policy.least_recently_accessed(), policy, stop_at_live, |entry| {
        lapsed(now, entry.last_accessed(), tti)
      });
      for (key, node) in expired {
        self.remove_node(policy, &key, node, RemovalCause::Expired, removals);
      }
    }
  }

  fn collect_lapsed(
    &self,
    nodes: impl Iterator<Item = Index>,
    policy: &EvictionPolicy<K>,
    stop_at_live: bool,
    is_lapsed: impl Fn(&CacheEntry<V>) -> bool,
  ) -> Vec<(K, Index)> {
    let mut expired = Vec::new();
    for node in nodes {
      let Some(key) = policy.node(node).map(|n| &n.key) else {
        break;
      };
      let Some(entry) = self.store.get(key) else {
        break;
      };
      if is_lapsed(&entry) {
        expired.push((key.clone(), node));
      } else if stop_at_live {
        break;
      }
    }
    expired
  }

  // Evicts from the cold end until the total weight fits. A freshly written
  // `candidate` heavier than the whole capacity is evicted first, alone.
  fn evict_entries(
    &self,
    policy: &mut EvictionPolicy<K>,
    candidate: Option<Index>,
    removals: &mut Removals<K, V>,
  ) {
    if !policy.is_over_capacity() {
      return;
    }

    if let Some(node) = candidate {
      let oversized = policy
        .node(node)
        .filter(|n| n.weight > policy.max_weight())
        .map(|n| n.key.clone());
      if let Some(key) = oversized {
        self.remove_node(policy, &key, node, RemovalCause::Size, removals);
      }
    }

    while policy.is_over_capacity() {
      let Some(victim) = policy.victim() else {
        break;
      };
      let Some(key) = policy.node(victim).map(|n| n.key.clone()) else {
        break;
      };
      if !self.remove_node(policy, &key, victim, RemovalCause::Size, removals) {
        debug_assert!(false, "policy node without a store entry");
        policy.on_remove(victim);
      }
    }
  }

  // Removes the entry for `key` if it is still the one behind `node`.
  // Returns `false` when a newer write or a concurrent removal got there
  // first.
  fn remove_node(
    &self,
    policy: &mut EvictionPolicy<K>,
    key: &K,
    node: Index,
    cause: RemovalCause,
    removals: &mut Removals<K, V>,
  ) -> bool {
    let Some((key, entry)) = self.store.remove_if_node(key, node) else {
      return false;
    };
    policy.on_remove(node);
    self.account(cause, entry.weight());
    removals.push(Removal {
      key,
      value: entry.value(),
      cause,
    });
    true
  }

  fn account(&self, cause: RemovalCause, weight: u64) {
    let metrics = &self.metrics;
    match cause {
      RemovalCause::Explicit => {
        metrics.invalidations.fetch_add(1, Ordering::Relaxed);
      }
      RemovalCause::Replaced => {
        metrics.replacements.fetch_add(1, Ordering::Relaxed);
      }
      RemovalCause::Size => {
        metrics.evicted_by_size.fetch_add(1, Ordering::Relaxed);
        metrics.evicted_weight.fetch_add(weight, Ordering::Relaxed);
      }
      RemovalCause::Expired => {
        metrics.evicted_by_expiration.fetch_add(1, Ordering::Relaxed);
        metrics.evicted_weight.fetch_add(weight, Ordering::Relaxed);
      }
    }
  }

  // --- Introspection ---

  pub(crate) fn entry_count(&self) -> u64 {
    self.policy.lock().len() as u64
  }

  pub(crate) fn weighted_size(&self) -> u64 {
    self.policy.lock().weighted_size()
  }

  pub(crate) fn metrics(&self) -> MetricsSnapshot {
    let (entry_count, weighted_size) = {
      let policy = self.policy.lock();
      (policy.len() as u64, policy.weighted_size())
    };
    self.metrics.snapshot(entry_count, weighted_size)
  }
}

#[cfg(test)]
mod tests {
  use crate::builder::CacheBuilder;
  use crate::time::ManualTicker;
  use std::thread;
  use std::time::Duration;

  #[test]
  fn write_is_stamped_once_the_policy_lock_is_held() {
    let ticker = ManualTicker::new();
    let cache = CacheBuilder::<u32, u32>::new()
      .time_to_live(Duration::from_secs(10))
      .ticker(ticker.clone())
      .disable_janitor()
      .build()
      .unwrap();

    let policy = cache.shared.policy.lock();
    let writer = {
      let cache = cache.clone();
      thread::spawn(move || cache.put(1, 1))
    };
    thread::sleep(Duration::from_millis(50));
    ticker.advance(Duration::from_secs(5));
    drop(policy);
    writer.join().unwrap();

    cache.put(2, 2);
    ticker.advance(Duration::from_secs(6));
    cache.run_pending_tasks();

    // Both writes happened at 5s, so neither has lived for 10s yet.
    assert_eq!(cache.peek(&1), Some(std::sync::Arc::new(1)));
    assert_eq!(cache.entry_count(), 2);
  }

  #[test]
  fn idle_sweep_reaches_past_a_dropped_read() {
    let ticker = ManualTicker::new();
    let cache = CacheBuilder::<u32, u32>::new()
      .shards(1)
      .time_to_idle(Duration::from_secs(10))
      .ticker(ticker.clone())
      .disable_janitor()
      .build()
      .unwrap();
    let shared = &cache.shared;

    cache.put(99, 99);
    let stale = shared.store.get(&99).unwrap().node();
    cache.invalidate(&99);
    for key in 0..3 {
      cache.put(key, key);
    }

    // Fill key 0's stripe so its next buffered read is dropped.
    let hash = shared.store.hash(&0);
    while shared.read_buffer.record(hash, stale) {}
    assert!(shared.read_buffer.take_dropped());

    ticker.advance(Duration::from_secs(5));
    {
      let _policy = shared.policy.lock();
      let mut removals = Vec::new();
      assert!(shared.get_live(&0, true, &mut removals).is_some());
      assert!(removals.is_empty());
    }

    // Key 0 is still the coldest node but was read 6s ago. Keys 1 and 2 sit
    // behind it and have been idle for 11s.
    ticker.advance(Duration::from_secs(6));
    cache.run_pending_tasks();

    assert!(cache.peek(&0).is_some());
    assert!(cache.peek(&1).is_none());
    assert!(cache.peek(&2).is_none());
    assert_eq!(cache.entry_count(), 1);
  }
}
