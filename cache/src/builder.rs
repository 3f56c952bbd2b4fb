use crate::error::BuildError;
use crate::handles::Cache;
use crate::listener::{EvictionListener, RemovalListener};
use crate::loader::{CacheLoader, FnLoader};
use crate::metrics::Metrics;
use crate::notifier::Notifier;
use crate::policy::{EvictionOrder, EvictionPolicy};
use crate::shared::{CacheShared, Weigher};
use crate::store::ShardedStore;
use crate::task::janitor::Janitor;
use crate::task::read_buffer::ReadBuffer;
use crate::time::{SystemTicker, Ticker};
use crate::BoxError;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// How often the janitor sweeps for expired entries unless told otherwise.
pub const DEFAULT_JANITOR_TICK: Duration = Duration::from_secs(1);

/// A builder for creating `Cache` instances.
pub struct CacheBuilder<K, V, H = ahash::RandomState> {
  capacity: u64,
  shards: usize,
  time_to_live: Option<Duration>,
  time_to_idle: Option<Duration>,
  hasher: H,
  eviction_order: EvictionOrder,
  janitor_tick_interval: Duration,
  janitor_disabled: bool,
  ticker: Arc<dyn Ticker>,
  weigher: Option<Weigher<K, V>>,
  loader: Option<Arc<dyn CacheLoader<K, V>>>,
  removal_listener: Option<Arc<dyn RemovalListener<K, V>>>,
  eviction_listener: Option<Arc<dyn EvictionListener<K, V>>>,
}

// Manual Debug implementation for CacheBuilder.
impl<K, V, H> fmt::Debug for CacheBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("capacity", &self.capacity)
      .field("shards", &self.shards)
      .field("time_to_live", &self.time_to_live)
      .field("time_to_idle", &self.time_to_idle)
      .field("eviction_order", &self.eviction_order)
      .field("has_weigher", &self.weigher.is_some())
      .field("has_loader", &self.loader.is_some())
      .field("has_removal_listener", &self.removal_listener.is_some())
      .field("has_eviction_listener", &self.eviction_listener.is_some())
      .finish_non_exhaustive()
  }
}

// --- General Configuration Methods ---
// This impl block has no restrictive bounds on K or V.
impl<K, V, H> CacheBuilder<K, V, H> {
  /// Sets the maximum total weight of the cache.
  ///
  /// Without a weigher every entry weighs 1, so this is the maximum number of
  /// entries.
  pub fn capacity(mut self, capacity: u64) -> Self {
    self.capacity = capacity;
    self
  }

  /// Sets the cache to be "unbounded". This is the default.
  pub fn unbounded(mut self) -> Self {
    self.capacity = u64::MAX;
    self
  }

  /// Sets the number of concurrent shards to use.
  ///
  /// Rounded up to a power of two. Zero is rejected by `build`.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = if shards == 0 {
      0
    } else {
      shards.next_power_of_two()
    };
    self
  }

  /// Expires entries this long after they were last written.
  pub fn time_to_live(mut self, duration: Duration) -> Self {
    self.time_to_live = Some(duration);
    self
  }

  /// Expires entries this long after they were last read or written.
  pub fn time_to_idle(mut self, duration: Duration) -> Self {
    self.time_to_idle = Some(duration);
    self
  }

  /// Chooses which entry goes first when the cache is over capacity.
  pub fn eviction_order(mut self, order: EvictionOrder) -> Self {
    self.eviction_order = order;
    self
  }

  /// Sets the function that computes each entry's weight.
  ///
  /// The weigher runs once per write, outside of any cache lock.
  pub fn weigher(mut self, weigher: impl Fn(&K, &V) -> u64 + Send + Sync + 'static) -> Self {
    self.weigher = Some(Arc::new(weigher));
    self
  }

  /// Sets a single-key loader for `get`, `get_all` and `refresh`.
  ///
  /// `get_all` falls back to one call per missing key. Use `cache_loader` to
  /// supply a bulk loader as well.
  pub fn loader<F, E>(mut self, f: F) -> Self
  where
    F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    E: Into<BoxError> + 'static,
    K: 'static,
    V: 'static,
  {
    self.loader = Some(Arc::new(FnLoader::new(f)));
    self
  }

  /// Sets a full `CacheLoader`, possibly with bulk support.
  pub fn cache_loader<L>(mut self, loader: L) -> Self
  where
    L: CacheLoader<K, V> + 'static,
  {
    self.loader = Some(Arc::new(loader));
    self
  }

  /// Sets the listener that is told about every removal, whatever the cause.
  pub fn removal_listener<Listener>(mut self, listener: Listener) -> Self
  where
    Listener: RemovalListener<K, V> + 'static,
  {
    self.removal_listener = Some(Arc::new(listener));
    self
  }

  /// Sets the listener that is told about size and expiration evictions only.
  pub fn eviction_listener<Listener>(mut self, listener: Listener) -> Self
  where
    Listener: EvictionListener<K, V> + 'static,
  {
    self.eviction_listener = Some(Arc::new(listener));
    self
  }

  /// Replaces the clock used for expiration.
  pub fn ticker(mut self, ticker: impl Ticker + 'static) -> Self {
    self.ticker = Arc::new(ticker);
    self
  }

  /// Sets the tick interval for the background cleanup task (janitor).
  pub fn janitor_tick_interval(mut self, duration: Duration) -> Self {
    self.janitor_tick_interval = duration;
    self
  }

  /// Never spawns the janitor thread.
  ///
  /// Expired entries are then removed only when they are read, when a write
  /// sweeps them, or on `run_pending_tasks`.
  pub fn disable_janitor(mut self) -> Self {
    self.janitor_disabled = true;
    self
  }
}

// --- Default Constructor ---
impl<K, V, H: BuildHasher + Default> CacheBuilder<K, V, H> {
  /// Creates a new `CacheBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      capacity: u64::MAX,
      shards: (num_cpus::get() * 4).max(1).next_power_of_two(),
      time_to_live: None,
      time_to_idle: None,
      hasher: H::default(),
      eviction_order: EvictionOrder::default(),
      janitor_tick_interval: DEFAULT_JANITOR_TICK,
      janitor_disabled: false,
      ticker: Arc::new(SystemTicker),
      weigher: None,
      loader: None,
      removal_listener: None,
      eviction_listener: None,
    }
  }
}

impl<K, V> Default for CacheBuilder<K, V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(feature = "rapidhash")]
impl<K, V> CacheBuilder<K, V, rapidhash::RapidRandomState> {
  /// Creates a builder whose cache hashes keys with rapidhash.
  pub fn rapidhash() -> Self {
    Self::new()
  }
}

// --- Build Methods ---
// This impl block contains the full set of trait bounds required to actually
// construct the cache, including `K: Clone` for the eviction policy.
impl<K, V, H> CacheBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Sets the hasher for the cache.
  pub fn hasher(mut self, hasher: H) -> Self {
    self.hasher = hasher;
    self
  }

  /// Builds a `Cache`.
  pub fn build(self) -> Result<Cache<K, V, H>, BuildError> {
    self.validate()?;

    let expires = self.time_to_live.is_some() || self.time_to_idle.is_some();
    let tick_interval = self.janitor_tick_interval;
    let spawn_janitor = expires && !self.janitor_disabled;

    let shared = Arc::new(CacheShared {
      store: ShardedStore::new(self.shards, self.hasher),
      policy: Mutex::new(EvictionPolicy::new(self.eviction_order, self.capacity)),
      read_buffer: ReadBuffer::new(),
      pending_loads: (0..self.shards).map(|_| Mutex::new(Default::default())).collect(),
      loader: self.loader,
      weigher: self.weigher,
      notifier: Notifier::new(self.removal_listener, self.eviction_listener),
      metrics: Metrics::new(),
      ticker: self.ticker,
      time_to_live: self.time_to_live,
      time_to_idle: self.time_to_idle,
    });

    tracing::debug!(
      capacity = self.capacity,
      shards = self.shards,
      time_to_live = ?self.time_to_live,
      time_to_idle = ?self.time_to_idle,
      "cache built"
    );

    let janitor = spawn_janitor.then(|| Arc::new(Janitor::spawn(Arc::downgrade(&shared), tick_interval)));
    Ok(Cache { shared, janitor })
  }

  /// Validates the builder configuration.
  fn validate(&self) -> Result<(), BuildError> {
    if self.capacity == 0 {
      return Err(BuildError::ZeroCapacity);
    }
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    if self.janitor_tick_interval.is_zero() && !self.janitor_disabled {
      return Err(BuildError::ZeroTickInterval);
    }
    Ok(())
  }
}
