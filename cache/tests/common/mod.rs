#![allow(dead_code)]

use std::hash::{BuildHasher, Hasher};
use std::sync::{Arc, Mutex};

use cinder_cache::{Cache, CacheBuilder, ManualTicker, RemovalCause};
use tracing_subscriber::EnvFilter;

// A custom hasher that allows us to control which shard a key is assigned to.
// It simply uses the integer value of the key as its hash.
// For a 4-shard cache:
// - key 0 -> shard 0 (0 % 4 = 0)
// - key 1 -> shard 1 (1 % 4 = 1)
// - key 2 -> shard 2 (2 % 4 = 2)
// - key 3 -> shard 3 (3 % 4 = 3)
// - key 4 -> shard 0 (4 % 4 = 0)
#[derive(Clone, Default)]
pub struct ShardControllingHasher;
impl BuildHasher for ShardControllingHasher {
  type Hasher = TestHasher;
  fn build_hasher(&self) -> Self::Hasher {
    TestHasher(0)
  }
}
pub struct TestHasher(u64);
impl Hasher for TestHasher {
  fn finish(&self) -> u64 {
    self.0
  }
  fn write(&mut self, _: &[u8]) {
    unimplemented!()
  }
  fn write_i32(&mut self, i: i32) {
    self.0 = i as u64;
  }
}

pub type Event = (i32, String, RemovalCause);

/// Collects every notification a listener receives, in delivery order.
#[derive(Clone, Default)]
pub struct Recorder {
  events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn listener(&self) -> impl Fn(&i32, Arc<String>, RemovalCause) + Send + Sync + 'static {
    let events = self.events.clone();
    move |key: &i32, value: Arc<String>, cause: RemovalCause| {
      events.lock().unwrap().push((*key, (*value).clone(), cause));
    }
  }

  pub fn events(&self) -> Vec<Event> {
    self.events.lock().unwrap().clone()
  }

  pub fn causes(&self) -> Vec<RemovalCause> {
    self.events().into_iter().map(|(_, _, cause)| cause).collect()
  }

  pub fn clear(&self) {
    self.events.lock().unwrap().clear();
  }
}

pub fn build_test_cache(shards: usize) -> Cache<i32, String, ShardControllingHasher> {
  CacheBuilder::new()
    .shards(shards)
    .hasher(ShardControllingHasher)
    .build()
    .unwrap()
}

// Helper to build a cache for testing purposes.
pub fn build_test_cache_with_cap(shards: usize, capacity: u64) -> Cache<i32, String, ShardControllingHasher> {
  CacheBuilder::new()
    .shards(shards)
    .capacity(capacity)
    .hasher(ShardControllingHasher)
    .build()
    .unwrap()
}

/// A bounded cache on a manual clock that reports removals to both recorders:
/// `(cache, removals, evictions)`.
pub fn build_recorded_cache(
  capacity: u64,
  ticker: &ManualTicker,
) -> (Cache<i32, String, ShardControllingHasher>, Recorder, Recorder) {
  let removals = Recorder::new();
  let evictions = Recorder::new();
  let cache = CacheBuilder::new()
    .shards(4)
    .capacity(capacity)
    .hasher(ShardControllingHasher)
    .ticker(ticker.clone())
    .removal_listener(removals.listener())
    .eviction_listener(evictions.listener())
    .build()
    .unwrap();
  (cache, removals, evictions)
}

/// Routes the cache's tracing output to the test harness. Set `RUST_LOG` to
/// see it, e.g. `RUST_LOG=cinder_cache=debug`.
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}
