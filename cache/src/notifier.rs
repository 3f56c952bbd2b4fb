use crate::listener::{EvictionListener, RemovalCause, RemovalListener};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// An entry that has been physically removed and still has to be announced.
pub(crate) struct Removal<K, V> {
  pub(crate) key: K,
  pub(crate) value: Arc<V>,
  pub(crate) cause: RemovalCause,
}

/// The removals produced by one cache operation, in the order they happened.
pub(crate) type Removals<K, V> = Vec<Removal<K, V>>;

/// Delivers removal notifications to the configured listeners.
///
/// Every delivery happens on the calling thread. Each listener call is
/// isolated: a panic is logged and dropped, and the rest of the batch is still
/// delivered.
pub(crate) struct Notifier<K, V> {
  removal_listener: Option<Arc<dyn RemovalListener<K, V>>>,
  eviction_listener: Option<Arc<dyn EvictionListener<K, V>>>,
}

impl<K, V> Notifier<K, V> {
  pub(crate) fn new(
    removal_listener: Option<Arc<dyn RemovalListener<K, V>>>,
    eviction_listener: Option<Arc<dyn EvictionListener<K, V>>>,
  ) -> Self {
    Self {
      removal_listener,
      eviction_listener,
    }
  }

  #[inline]
  pub(crate) fn is_enabled(&self) -> bool {
    self.removal_listener.is_some() || self.eviction_listener.is_some()
  }

  pub(crate) fn notify(&self, key: &K, value: Arc<V>, cause: RemovalCause) {
    if let Some(listener) = &self.removal_listener {
      let value = value.clone();
      guarded("removal", cause, || listener.on_removal(key, value, cause));
    }
    if !cause.was_evicted() {
      return;
    }
    if let Some(listener) = &self.eviction_listener {
      guarded("eviction", cause, || listener.on_evict(key, value, cause));
    }
  }

  /// Delivers a batch in order. Must be called with no cache lock held.
  pub(crate) fn dispatch(&self, removals: Removals<K, V>) {
    if !self.is_enabled() {
      return;
    }
    for Removal { key, value, cause } in removals {
      self.notify(&key, value, cause);
    }
  }
}

fn guarded(listener: &'static str, cause: RemovalCause, call: impl FnOnce()) {
  if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(call)) {
    tracing::warn!(
      listener,
      %cause,
      panic = %panic_message(payload.as_ref()),
      "cache listener panicked; notification dropped"
    );
  }
}

/// Extracts the message from a panic payload when it is a string.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
