mod common;

use cinder_cache::{CacheBuilder, LoadError};
use std::sync::Arc;

use crate::common::build_test_cache;

#[test]
fn test_sync_put_and_get_if_present() {
  let cache = build_test_cache(4);
  cache.put(1, "one".to_string());

  // Test get hit
  assert_eq!(cache.get_if_present(&1), Some(Arc::new("one".to_string())));

  // Test get miss
  assert!(cache.get_if_present(&2).is_none());

  let metrics = cache.metrics();
  assert_eq!(metrics.inserts, 1);
  assert_eq!(metrics.hits, 1);
  assert_eq!(metrics.misses, 1);
  assert_eq!(metrics.entry_count, 1);
  assert_eq!(metrics.weighted_size, 1);
}

#[test]
fn test_sync_get_without_loader_fails_on_miss() {
  let cache = build_test_cache(4);
  cache.put(1, "one".to_string());

  assert_eq!(*cache.get(&1).unwrap(), "one");
  assert!(matches!(cache.get(&2), Err(LoadError::NoLoader)));
}

#[test]
fn test_sync_put_replaces_value() {
  let cache = build_test_cache(4);
  cache.put(1, "one".to_string());
  cache.put(1, "uno".to_string());

  assert_eq!(*cache.get(&1).unwrap(), "uno");
  assert_eq!(cache.entry_count(), 1);

  let metrics = cache.metrics();
  assert_eq!(metrics.inserts, 2);
  assert_eq!(metrics.replacements, 1);
}

#[test]
fn test_sync_peek_does_not_count() {
  let cache = build_test_cache(4);
  cache.put(1, "one".to_string());

  assert_eq!(cache.peek(&1), Some(Arc::new("one".to_string())));
  assert!(cache.peek(&2).is_none());
  assert!(cache.contains_key(&1));
  assert!(!cache.contains_key(&2));

  let metrics = cache.metrics();
  assert_eq!(metrics.hits, 0, "peek and contains_key are not lookups");
  assert_eq!(metrics.misses, 0);
}

#[test]
fn test_sync_invalidate_and_invalidate_all() {
  let cache = build_test_cache(4);
  cache.put(1, "one".to_string());
  cache.put(2, "two".to_string());
  cache.put(3, "three".to_string());

  // Test invalidate
  assert!(cache.invalidate(&1));
  assert!(
    !cache.invalidate(&1),
    "Double invalidate should report nothing removed"
  );
  assert!(!cache.invalidate(&42), "Absent key is a no-op");
  assert!(cache.get_if_present(&1).is_none());
  assert_eq!(cache.entry_count(), 2);

  // Test invalidate_all
  cache.invalidate_all();
  assert_eq!(cache.entry_count(), 0);
  assert_eq!(cache.weighted_size(), 0);
  assert!(cache.get_if_present(&2).is_none());
  assert_eq!(cache.metrics().invalidations, 3);

  // The cache is fully usable afterwards.
  cache.put(2, "again".to_string());
  assert_eq!(*cache.get(&2).unwrap(), "again");
}

#[test]
fn test_sync_put_all_and_invalidate_many() {
  let cache = build_test_cache(4);
  cache.put_all((0..10).map(|i| (i, i.to_string())));
  assert_eq!(cache.entry_count(), 10);

  cache.invalidate_many(&[0, 1, 2, 99]);
  assert_eq!(cache.entry_count(), 7);
  assert!(cache.peek(&0).is_none());
  assert!(cache.peek(&3).is_some());
  assert_eq!(cache.metrics().invalidations, 3);
}

#[test]
fn test_sync_weigher_sets_entry_weight() {
  let cache = CacheBuilder::<i32, String>::new()
    .weigher(|_key, value: &String| value.len() as u64)
    .build()
    .unwrap();

  cache.put(1, "abc".to_string());
  cache.put(2, "hello".to_string());
  assert_eq!(cache.weighted_size(), 8);

  cache.put(1, "a".to_string());
  assert_eq!(cache.weighted_size(), 6, "Replacing should swap the weight");

  cache.invalidate(&2);
  assert_eq!(cache.weighted_size(), 1);
}

#[test]
fn test_sync_clones_share_state() {
  let cache = build_test_cache(2);
  let other = cache.clone();

  cache.put(7, "seven".to_string());
  assert_eq!(*other.get(&7).unwrap(), "seven");
  other.invalidate(&7);
  assert!(cache.peek(&7).is_none());
}
