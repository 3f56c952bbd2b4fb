use cinder_cache::CacheBuilder;
use std::io;
use std::thread;
use std::time::Duration;

fn main() {
  // Create a cache with a capacity of 100 items, a 5-second TTL,
  // and a 1-second janitor tick interval.
  let cache = CacheBuilder::default()
    .capacity(100)
    .time_to_live(Duration::from_secs(5))
    .janitor_tick_interval(Duration::from_secs(1))
    .loader(|key: &String| {
      println!("[Loader] Computing value for '{}'", key);
      Ok::<_, io::Error>(key.len() * 100)
    })
    .build()
    .expect("Failed to build cache");

  println!("Putting ('key1', 100) into the cache.");
  cache.put("key1".to_string(), 100);

  // A present key is served without the loader.
  match cache.get(&"key1".to_string()) {
    Ok(value) => println!("Found value for key1: {}", value),
    Err(e) => println!("Lookup for key1 failed: {}", e),
  }

  // An absent key is loaded, cached and returned.
  let loaded = cache.get(&"a-longer-key".to_string()).expect("loader never fails");
  println!("Loaded value for a-longer-key: {}", loaded);

  println!("\nCache metrics: {:#?}", cache.metrics());

  println!("\nWaiting for 6 seconds for the items to expire...");
  thread::sleep(Duration::from_secs(6));

  // The janitor runs every second and will have removed the expired items.
  match cache.get_if_present(&"key1".to_string()) {
    Some(value) => println!("Found value for key1: {}", value),
    None => println!("Value for key1 not found (as expected after TTL)."),
  }

  println!("\nCache metrics after expiration: {:#?}", cache.metrics());
}
