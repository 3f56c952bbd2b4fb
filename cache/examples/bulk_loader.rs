use cinder_cache::{BoxError, CacheBuilder, CacheLoader};
use std::collections::HashMap;

// Pretends to be a database that answers many keys in one round trip.
struct UserTable;

impl CacheLoader<u64, String> for UserTable {
  fn load(&self, id: &u64) -> Result<String, BoxError> {
    println!("[Loader] single query for user {}", id);
    Ok(format!("user-{}", id))
  }

  fn load_all(&self, ids: &[u64]) -> Option<Result<HashMap<u64, String>, BoxError>> {
    println!("[Loader] batch query for users {:?}", ids);
    Some(Ok(ids.iter().map(|id| (*id, format!("user-{}", id))).collect()))
  }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let cache = CacheBuilder::default()
    .capacity(1_000)
    .cache_loader(UserTable)
    .build()?;

  cache.put(2, "cached-user-2".to_string());

  // Keys 1 and 3 are fetched in a single batch; key 2 is already cached.
  let users = cache.get_all([1, 2, 3])?;
  let mut ids: Vec<_> = users.keys().copied().collect();
  ids.sort_unstable();
  for id in ids {
    println!("{} => {}", id, users[&id]);
  }

  // A single miss still goes through the single-key path.
  println!("{}", cache.get(&7)?);

  println!("\nCache metrics: {:#?}", cache.metrics());
  Ok(())
}
