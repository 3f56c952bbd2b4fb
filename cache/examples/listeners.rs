use cinder_cache::{CacheBuilder, EvictionListener, EvictionOrder, RemovalCause};
use std::sync::Arc;

// A simple listener that just prints evicted entries.
struct PrintingListener;

impl EvictionListener<i32, String> for PrintingListener {
  fn on_evict(&self, key: &i32, value: Arc<String>, cause: RemovalCause) {
    println!(
      "[Eviction] Key: {}, Value: '{}', Cause: {}",
      key, value, cause
    );
  }
}

fn main() {
  println!("--- FIFO Cache with Removal and Eviction Listeners ---");

  let cache = CacheBuilder::default()
    .capacity(3) // A small capacity to easily trigger evictions
    .eviction_order(EvictionOrder::Fifo)
    .eviction_listener(PrintingListener)
    .removal_listener(|key: &i32, _value: Arc<String>, cause: RemovalCause| {
      println!("[Removal] Key: {}, Cause: {:?}", key, cause);
    })
    .build()
    .expect("Failed to build cache");

  // Insert 3 items. Cache is now full.
  cache.put(1, "one".to_string());
  cache.put(2, "two".to_string());
  cache.put(3, "three".to_string());
  println!("\nInserted keys 1, 2, 3. Cache is full.");

  // Under FIFO, reading key 1 does not protect it.
  println!("\nReading key 1...");
  let _ = cache.get_if_present(&1);

  // Listeners have already run by the time `put` returns.
  println!("\nInserting key 4. This evicts the oldest write.");
  cache.put(4, "four".to_string());

  println!("\nReplacing key 3 and invalidating key 2.");
  cache.put(3, "drei".to_string());
  cache.invalidate(&2);

  println!("\n--- Final State ---");
  assert!(cache.peek(&1).is_none(), "Key 1 was written first");
  assert!(cache.peek(&3).is_some());
  assert!(cache.peek(&4).is_some());

  println!("\nCache metrics: {:#?}", cache.metrics());
}
