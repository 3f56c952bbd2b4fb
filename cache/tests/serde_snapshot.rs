#![cfg(feature = "serde")]

use cinder_cache::{CacheBuilder, MetricsSnapshot, RemovalCause};

#[test]
fn metrics_snapshot_survives_bincode() {
  let cache = CacheBuilder::<i32, i32>::new().capacity(2).build().unwrap();
  for i in 0..4 {
    cache.put(i, i);
  }
  cache.get_if_present(&3);

  let snapshot = cache.metrics();
  let bytes = bincode::serialize(&snapshot).unwrap();
  let decoded: MetricsSnapshot = bincode::deserialize(&bytes).unwrap();

  assert_eq!(decoded, snapshot);
  assert_eq!(decoded.evicted_by_size, 2);
  assert_eq!(decoded.hits, 1);
}

#[test]
fn removal_cause_survives_bincode() {
  for cause in [
    RemovalCause::Explicit,
    RemovalCause::Replaced,
    RemovalCause::Size,
    RemovalCause::Expired,
  ] {
    let bytes = bincode::serialize(&cause).unwrap();
    assert_eq!(bincode::deserialize::<RemovalCause>(&bytes).unwrap(), cause);
  }
}
