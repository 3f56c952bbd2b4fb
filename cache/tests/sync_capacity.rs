mod common;

use cinder_cache::{CacheBuilder, EvictionOrder, ManualTicker, RemovalCause};
use std::sync::{Arc, Barrier};
use std::thread;

use crate::common::{build_recorded_cache, build_test_cache_with_cap, Recorder};

#[test]
fn test_sync_lru_evicts_least_recently_used() {
  let cache = build_test_cache_with_cap(4, 2);

  cache.put(1, "a".to_string());
  cache.put(2, "b".to_string());
  // Reading 1 makes 2 the eviction candidate.
  assert!(cache.get_if_present(&1).is_some());
  cache.put(3, "c".to_string());

  assert!(cache.peek(&1).is_some());
  assert!(cache.peek(&2).is_none(), "Key 2 should have been evicted");
  assert!(cache.peek(&3).is_some());
  assert_eq!(cache.entry_count(), 2);
}

#[test]
fn test_sync_lru_without_reads_evicts_oldest() {
  let cache = build_test_cache_with_cap(4, 2);

  cache.put(1, "a".to_string());
  cache.put(2, "b".to_string());
  cache.put(3, "c".to_string());

  assert!(cache.peek(&1).is_none());
  assert_eq!(cache.as_map().len(), 2);
}

#[test]
fn test_sync_fifo_ignores_reads() {
  let cache = CacheBuilder::<i32, String>::new()
    .capacity(2)
    .eviction_order(EvictionOrder::Fifo)
    .build()
    .unwrap();

  cache.put(1, "a".to_string());
  cache.put(2, "b".to_string());
  for _ in 0..5 {
    cache.get(&1).unwrap();
  }
  cache.put(3, "c".to_string());

  assert!(cache.peek(&1).is_none(), "FIFO evicts the oldest write");
  assert!(cache.peek(&2).is_some());
  assert!(cache.peek(&3).is_some());
}

#[test]
fn test_sync_weight_never_exceeds_capacity() {
  let capacity = 50;
  let cache = CacheBuilder::<i32, String>::new()
    .capacity(capacity)
    .weigher(|_key, value: &String| value.len() as u64)
    .build()
    .unwrap();

  for i in 0..200 {
    let len = (i * 7 % 13 + 1) as usize;
    cache.put(i, "x".repeat(len));
    assert!(
      cache.weighted_size() <= capacity,
      "Weight {} exceeds capacity after put {}",
      cache.weighted_size(),
      i
    );
  }

  let total: u64 = cache.as_map().values().map(|v| v.len() as u64).sum();
  assert_eq!(total, cache.weighted_size());
}

#[test]
fn test_sync_oversized_entry_is_evicted_alone() {
  let removals = Recorder::new();
  let cache = CacheBuilder::<i32, String>::new()
    .capacity(10)
    .weigher(|_key, value: &String| value.len() as u64)
    .removal_listener(removals.listener())
    .build()
    .unwrap();

  cache.put(1, "aaaa".to_string());
  cache.put(2, "bbbb".to_string());
  cache.put(3, "c".repeat(20));

  assert!(cache.peek(&3).is_none());
  assert!(cache.peek(&1).is_some(), "Smaller entries are left alone");
  assert!(cache.peek(&2).is_some());
  assert_eq!(removals.events(), vec![(3, "c".repeat(20), RemovalCause::Size)]);
  assert_eq!(cache.weighted_size(), 8);
}

#[test]
fn test_sync_eviction_reports_every_victim() {
  let ticker = ManualTicker::new();
  let (cache, removals, evictions) = build_recorded_cache(3, &ticker);

  for i in 0..10 {
    cache.put(i, i.to_string());
  }

  let evicted: Vec<_> = evictions.events().into_iter().map(|(key, _, _)| key).collect();
  assert_eq!(evicted, (0..7).collect::<Vec<_>>());
  assert_eq!(removals.events(), evictions.events());

  let metrics = cache.metrics();
  assert_eq!(metrics.evicted_by_size, 7);
  assert_eq!(metrics.evicted_weight, 7);
  assert_eq!(metrics.entry_count, 3);
}

#[test]
fn test_sync_concurrent_puts_respect_capacity() {
  let capacity = 64;
  let num_threads = 8;
  let removals = Recorder::new();
  let cache = CacheBuilder::<i32, String>::new()
    .capacity(capacity)
    .shards(4)
    .removal_listener(removals.listener())
    .build()
    .unwrap();

  let barrier = Arc::new(Barrier::new(num_threads));
  let handles: Vec<_> = (0..num_threads as i32)
    .map(|t| {
      let cache = cache.clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        for i in 0..500 {
          let key = t * 1000 + i;
          cache.put(key, key.to_string());
          cache.get_if_present(&(key - 1));
        }
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  assert_eq!(cache.entry_count(), capacity);
  assert_eq!(cache.weighted_size(), capacity);
  assert_eq!(cache.as_map().len() as u64, capacity);

  // Every entry that was ever written is either present or was reported.
  let written = (num_threads * 500) as u64;
  assert_eq!(removals.events().len() as u64 + capacity, written);
}
