mod common;

use cinder_cache::{Cache, CacheBuilder, ManualTicker, RemovalCause};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  mpsc, Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use crate::common::{build_recorded_cache, init_tracing, Recorder};

#[test]
fn test_sync_listener_for_capacity() {
  let ticker = ManualTicker::new();
  let (cache, removals, evictions) = build_recorded_cache(2, &ticker);

  cache.put(1, "a".to_string());
  cache.put(2, "b".to_string());
  cache.get(&1).unwrap();
  cache.put(3, "c".to_string());

  // Key 2 was the least recently used.
  let expected = vec![(2, "b".to_string(), RemovalCause::Size)];
  assert_eq!(removals.events(), expected);
  assert_eq!(evictions.events(), expected);
  assert!(cache.peek(&1).is_some());
  assert!(cache.peek(&3).is_some());
  assert_eq!(cache.metrics().evicted_by_size, 1);
}

#[test]
fn test_sync_listener_for_invalidation() {
  let ticker = ManualTicker::new();
  let (cache, removals, evictions) = build_recorded_cache(10, &ticker);

  cache.put(1, "one".to_string());
  assert!(cache.invalidate(&1));
  assert!(!cache.invalidate(&1));
  assert!(!cache.invalidate(&2));

  assert_eq!(
    removals.events(),
    vec![(1, "one".to_string(), RemovalCause::Explicit)]
  );
  assert!(
    evictions.events().is_empty(),
    "Explicit removals never reach the eviction listener"
  );
}

#[test]
fn test_sync_listener_for_replacement() {
  let ticker = ManualTicker::new();
  let (cache, removals, evictions) = build_recorded_cache(10, &ticker);

  cache.put(1, "old".to_string());
  cache.put(1, "new".to_string());

  assert_eq!(
    removals.events(),
    vec![(1, "old".to_string(), RemovalCause::Replaced)]
  );
  assert!(evictions.events().is_empty());
}

#[test]
fn test_sync_listener_for_expiration_fires_once() {
  let ticker = ManualTicker::new();
  let removals = Recorder::new();
  let evictions = Recorder::new();
  let cache = CacheBuilder::<i32, String>::new()
    .time_to_live(Duration::from_secs(10))
    .ticker(ticker.clone())
    .disable_janitor()
    .removal_listener(removals.listener())
    .eviction_listener(evictions.listener())
    .build()
    .unwrap();

  cache.put(1, "one".to_string());
  ticker.advance(Duration::from_secs(11));

  assert!(cache.get_if_present(&1).is_none());
  assert!(cache.get_if_present(&1).is_none());
  cache.run_pending_tasks();

  let expected = vec![(1, "one".to_string(), RemovalCause::Expired)];
  assert_eq!(removals.events(), expected);
  assert_eq!(evictions.events(), expected);
}

#[test]
fn test_sync_listener_for_invalidate_all() {
  let ticker = ManualTicker::new();
  let (cache, removals, evictions) = build_recorded_cache(100, &ticker);

  for i in 0..20 {
    cache.put(i, i.to_string());
  }
  cache.invalidate_all();

  let mut keys: Vec<_> = removals.events().into_iter().map(|(key, _, _)| key).collect();
  keys.sort_unstable();
  assert_eq!(keys, (0..20).collect::<Vec<_>>(), "Exactly one event per entry");
  assert!(removals
    .causes()
    .iter()
    .all(|cause| *cause == RemovalCause::Explicit));
  assert!(evictions.events().is_empty());
}

#[test]
fn test_sync_panicking_listener_does_not_break_operations() {
  init_tracing();
  let evictions = Recorder::new();
  let calls = Arc::new(AtomicUsize::new(0));

  let cache = CacheBuilder::<i32, String>::new()
    .capacity(1)
    .removal_listener({
      let calls = calls.clone();
      move |_key: &i32, _value: Arc<String>, _cause: RemovalCause| {
        calls.fetch_add(1, Ordering::SeqCst);
        panic!("listener failure");
      }
    })
    .eviction_listener(evictions.listener())
    .build()
    .unwrap();

  cache.put(1, "one".to_string());
  cache.put(1, "uno".to_string()); // Replaced
  cache.put(2, "two".to_string()); // Evicts 1
  assert!(cache.invalidate(&2)); // Explicit

  assert_eq!(calls.load(Ordering::SeqCst), 3);
  assert_eq!(
    evictions.events(),
    vec![(1, "uno".to_string(), RemovalCause::Size)],
    "The other listener still receives its notifications"
  );
  assert_eq!(cache.entry_count(), 0);
}

#[test]
fn test_sync_listener_may_call_back_into_cache() {
  let slot: Arc<Mutex<Option<Cache<i32, String>>>> = Arc::new(Mutex::new(None));

  let cache = CacheBuilder::<i32, String>::new()
    .removal_listener({
      let slot = slot.clone();
      move |key: &i32, value: Arc<String>, _cause: RemovalCause| {
        let cache = slot.lock().unwrap().clone();
        if let Some(cache) = cache {
          if *key < 1000 {
            cache.put(key + 1000, format!("tombstone {value}"));
          }
        }
      }
    })
    .build()
    .unwrap();
  *slot.lock().unwrap() = Some(cache.clone());

  cache.put(1, "one".to_string());
  assert!(cache.invalidate(&1));

  assert_eq!(*cache.get(&1001).unwrap(), "tombstone one");
  slot.lock().unwrap().take();
}

#[test]
fn test_sync_listener_runs_on_janitor_thread_for_expiration() {
  let (tx, rx) = mpsc::channel();
  let cache = CacheBuilder::<i32, String>::new()
    .time_to_live(Duration::from_millis(50))
    .janitor_tick_interval(Duration::from_millis(10))
    .eviction_listener(move |key: &i32, value: Arc<String>, cause: RemovalCause| {
      let _ = tx.send((*key, value, cause));
    })
    .build()
    .unwrap();

  cache.put(1, "one".to_string());
  thread::sleep(Duration::from_millis(250));

  // Nobody read the key; only the janitor can have removed it.
  let (key, value, cause) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
  assert_eq!(key, 1);
  assert_eq!(*value, "one");
  assert_eq!(cause, RemovalCause::Expired);
  assert_eq!(cache.entry_count(), 0);
}
