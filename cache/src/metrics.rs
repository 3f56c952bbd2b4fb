use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Hit/Miss Ratios ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Loads ---
  pub(crate) load_successes: CachePadded<AtomicU64>,
  pub(crate) load_failures: CachePadded<AtomicU64>,

  // --- Throughput ---
  pub(crate) inserts: CachePadded<AtomicU64>,
  pub(crate) replacements: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,

  // --- Eviction Stats ---
  pub(crate) evicted_by_size: CachePadded<AtomicU64>,
  pub(crate) evicted_by_expiration: CachePadded<AtomicU64>,
  pub(crate) evicted_weight: CachePadded<AtomicU64>,

  // --- Timestamps for Uptime ---
  created_at: Instant,
}

// Manual implementation of Default to handle the non-default `Instant`.
impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      load_successes: CachePadded::new(AtomicU64::new(0)),
      load_failures: CachePadded::new(AtomicU64::new(0)),
      inserts: CachePadded::new(AtomicU64::new(0)),
      replacements: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      evicted_by_size: CachePadded::new(AtomicU64::new(0)),
      evicted_by_expiration: CachePadded::new(AtomicU64::new(0)),
      evicted_weight: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Creates a point-in-time snapshot of the current metrics.
  ///
  /// Sizes come from the policy, which counts them exactly under its lock.
  pub(crate) fn snapshot(&self, entry_count: u64, weighted_size: u64) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      load_successes: self.load_successes.load(Ordering::Relaxed),
      load_failures: self.load_failures.load(Ordering::Relaxed),
      inserts: self.inserts.load(Ordering::Relaxed),
      replacements: self.replacements.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      evicted_by_size: self.evicted_by_size.load(Ordering::Relaxed),
      evicted_by_expiration: self.evicted_by_expiration.load(Ordering::Relaxed),
      evicted_weight: self.evicted_weight.load(Ordering::Relaxed),
      entry_count,
      weighted_size,
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
  /// The number of lookups that found a live value, including callers that
  /// joined a load already in flight.
  pub hits: u64,
  /// The number of lookups that found nothing.
  pub misses: u64,
  /// The cache hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// The number of loader calls that produced a value.
  pub load_successes: u64,
  /// The number of loader calls that failed or panicked.
  pub load_failures: u64,
  /// The total number of entries written, by `put` or by a load.
  pub inserts: u64,
  /// The number of writes that overwrote a live entry.
  pub replacements: u64,
  /// The number of entries removed by `invalidate` and friends.
  pub invalidations: u64,
  /// The number of entries evicted due to exceeding capacity.
  pub evicted_by_size: u64,
  /// The number of entries evicted due to TTL or TTI expiration.
  pub evicted_by_expiration: u64,
  /// The total weight of all size and expiration evictions.
  pub evicted_weight: u64,
  /// The number of entries currently held.
  pub entry_count: u64,
  /// The current total weight of all entries.
  pub weighted_size: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("load_successes", &self.load_successes)
      .field("load_failures", &self.load_failures)
      .field("inserts", &self.inserts)
      .field("replacements", &self.replacements)
      .field("invalidations", &self.invalidations)
      .field("evicted_by_size", &self.evicted_by_size)
      .field("evicted_by_expiration", &self.evicted_by_expiration)
      .field("evicted_weight", &self.evicted_weight)
      .field("entry_count", &self.entry_count)
      .field("weighted_size", &self.weighted_size)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
