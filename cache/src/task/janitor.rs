use crate::shared::CacheShared;

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, Thread};
use std::time::Duration;

/// The background thread that periodically expires entries.
///
/// It only holds a weak reference to the cache, so the cache is freed as soon
/// as the last handle goes away. Dropping the `Janitor` stops the thread at
/// its next wakeup; it is never joined, because the last handle may well be
/// dropped by a listener running on the janitor thread itself.
#[derive(Debug)]
pub(crate) struct Janitor {
  thread: Option<Thread>,
  stop_flag: Arc<AtomicBool>,
}

impl Janitor {
  /// Spawns a new janitor thread.
  pub(crate) fn spawn<K, V, H>(shared: Weak<CacheShared<K, V, H>>, tick_interval: Duration) -> Self
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Clone + Send + Sync + 'static,
  {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_clone = stop_flag.clone();

    let handle = thread::Builder::new()
      .name("cinder-cache-janitor".into())
      .spawn(move || {
        tracing::debug!(?tick_interval, "cache janitor started");
        loop {
          thread::park_timeout(tick_interval);
          if stop_clone.load(Ordering::Acquire) {
            break;
          }
          let Some(shared) = shared.upgrade() else {
            break;
          };
          Self::cleanup(&shared);
        }
        tracing::debug!("cache janitor stopped");
      });

    // Without the thread, expiration still happens on reads and writes.
    let thread = match handle {
      Ok(handle) => Some(handle.thread().clone()),
      Err(error) => {
        tracing::error!(%error, "failed to spawn cache janitor; expiring lazily only");
        None
      }
    };

    Self { thread, stop_flag }
  }

  fn cleanup<K, V, H>(shared: &CacheShared<K, V, H>)
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Clone + Send + Sync + 'static,
  {
    let mut removals = Vec::new();
    shared.run_pending_tasks(&mut removals);
    if !removals.is_empty() {
      tracing::trace!(removed = removals.len(), "cache janitor tick");
    }
    shared.notifier.dispatch(removals);
  }

  /// Signals the janitor thread to stop and wakes it up.
  pub(crate) fn stop(&self) {
    self.stop_flag.store(true, Ordering::Release);
    if let Some(thread) = &self.thread {
      thread.unpark();
    }
  }
}

impl Drop for Janitor {
  fn drop(&mut self) {
    self.stop();
  }
}
