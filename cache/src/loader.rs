use crate::error::{BoxError, LoadError};

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};

/// Computes values for keys that are missing from the cache.
///
/// `load` is required. `load_all` is optional: the default returns `None`,
/// which tells the cache to fall back to one `load` per missing key.
pub trait CacheLoader<K, V>: Send + Sync {
  /// Computes the value for a single key.
  fn load(&self, key: &K) -> Result<V, BoxError>;

  /// Computes the values for several keys in one call.
  ///
  /// The returned map may contain keys that were not requested; they are
  /// cached like any other write but not handed to the caller. Requested keys
  /// missing from the map make `get_all` fail once the rest is cached.
  fn load_all(&self, keys: &[K]) -> Option<Result<HashMap<K, V>, BoxError>> {
    let _ = keys;
    None
  }
}

/// Adapts a closure into a single-key `CacheLoader`.
pub(crate) struct FnLoader<F, E> {
  f: F,
  _error: PhantomData<fn() -> E>,
}

impl<F, E> FnLoader<F, E> {
  pub(crate) fn new(f: F) -> Self {
    Self {
      f,
      _error: PhantomData,
    }
  }
}

impl<K, V, F, E> CacheLoader<K, V> for FnLoader<F, E>
where
  F: Fn(&K) -> Result<V, E> + Send + Sync,
  E: Into<BoxError>,
{
  fn load(&self, key: &K) -> Result<V, BoxError> {
    (self.f)(key).map_err(Into::into)
  }
}

/// The outcome shared by every caller waiting on one load.
pub(crate) type LoadResult<V> = Result<Arc<V>, LoadError>;

/// The internal state of a value being loaded.
enum State<V> {
  Computing,
  Complete(LoadResult<V>),
}

/// The internal, mutex-protected core of the LoadFuture.
struct Inner<V> {
  state: State<V>,
  waiters: VecDeque<Thread>,
}

/// An in-flight computation for one key.
///
/// The thread that registers it runs the loader; every other thread asking
/// for the same key parks on it and receives the same outcome.
///
/// An invalidation that arrives while the computation runs marks the future
/// discarded: its callers still receive the value, but it is not cached.
pub(crate) struct LoadFuture<V> {
  inner: Mutex<Inner<V>>,
  discarded: AtomicBool,
}

impl<V> fmt::Debug for LoadFuture<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let complete = matches!(self.inner.lock().state, State::Complete(_));
    f.debug_struct("LoadFuture")
      .field("complete", &complete)
      .field("discarded", &self.is_discarded())
      .finish()
  }
}

impl<V> LoadFuture<V> {
  /// Creates a new `LoadFuture` in the "Computing" state.
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Computing,
        waiters: VecDeque::new(),
      }),
      discarded: AtomicBool::new(false),
    }
  }

  /// Marks the value being computed as stale. Called under the policy lock.
  pub(crate) fn discard(&self) {
    self.discarded.store(true, Ordering::Release);
  }

  /// Checked under the policy lock right before the value is installed.
  pub(crate) fn is_discarded(&self) -> bool {
    self.discarded.load(Ordering::Acquire)
  }

  /// Publishes the outcome, waking all waiters.
  pub(crate) fn complete(&self, result: LoadResult<V>) {
    let mut inner = self.inner.lock();
    inner.state = State::Complete(result);
    for waiter in inner.waiters.drain(..) {
      waiter.unpark();
    }
  }

  /// Blocks the current thread until the outcome is published.
  pub(crate) fn wait(&self) -> LoadResult<V> {
    let mut inner = self.inner.lock();
    loop {
      if let State::Complete(result) = &inner.state {
        return result.clone();
      }
      inner.waiters.push_back(thread::current());
      drop(inner); // Unlock before parking.
      thread::park();
      // Spurious wakeups land back here and re-check the state.
      inner = self.inner.lock();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn waiters_receive_the_published_value() {
    let future = Arc::new(LoadFuture::<u32>::new());
    let handles: Vec<_> = (0..4)
      .map(|_| {
        let future = future.clone();
        thread::spawn(move || future.wait())
      })
      .collect();

    thread::sleep(Duration::from_millis(20));
    future.complete(Ok(Arc::new(7)));

    for handle in handles {
      assert_eq!(*handle.join().unwrap().unwrap(), 7);
    }
  }

  #[test]
  fn waiters_receive_the_published_failure() {
    let future = Arc::new(LoadFuture::<u32>::new());
    let waiter = {
      let future = future.clone();
      thread::spawn(move || future.wait())
    };

    future.complete(Err(LoadError::Panicked("boom".into())));
    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(LoadError::Panicked(msg)) if msg == "boom"));
  }

  #[test]
  fn wait_after_completion_returns_immediately() {
    let future = LoadFuture::<&str>::new();
    future.complete(Ok(Arc::new("done")));
    assert_eq!(*future.wait().unwrap(), "done");
  }

  #[test]
  fn fn_loader_boxes_errors() {
    let loader = FnLoader::new(|key: &u32| {
      if *key == 0 {
        Err(std::io::Error::other("zero"))
      } else {
        Ok(key * 2)
      }
    });
    assert_eq!(CacheLoader::<u32, u32>::load(&loader, &4).unwrap(), 8);
    assert!(CacheLoader::<u32, u32>::load(&loader, &0).is_err());
    assert!(CacheLoader::<u32, u32>::load_all(&loader, &[1, 2]).is_none());
  }
}
