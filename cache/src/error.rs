use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// A boxed, thread-safe error as returned by user-supplied loaders.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The cache was configured with a capacity of zero, which is not allowed
  /// for a bounded cache. Use `unbounded()` for an unbounded cache.
  #[error("bounded cache capacity cannot be zero")]
  ZeroCapacity,
  /// The cache was configured with zero shards, which is not allowed.
  #[error("shard count cannot be zero")]
  ZeroShards,
  /// The janitor was configured with a zero tick interval.
  #[error("janitor tick interval cannot be zero")]
  ZeroTickInterval,
}

/// The failure of a value computation.
///
/// A single failed load is shared by every caller that was waiting on it, so
/// the error is cheaply clonable.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
  /// The key was absent and the cache has no loader to compute it.
  #[error("key is absent and no loader is configured")]
  NoLoader,
  /// The loader returned an error.
  #[error("loader failed: {0}")]
  Failed(Arc<dyn StdError + Send + Sync + 'static>),
  /// The loader panicked. The payload message is kept when it was a string.
  #[error("loader panicked: {0}")]
  Panicked(String),
  /// A bulk load that was computing this key finished without returning it.
  #[error("bulk loader did not return the key")]
  NotReturned,
}

impl LoadError {
  pub(crate) fn failed(error: BoxError) -> Self {
    LoadError::Failed(Arc::from(error))
  }

  /// Returns the loader's own error, if this failure came from one.
  pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
    match self {
      LoadError::Failed(inner) => Some(inner.as_ref()),
      _ => None,
    }
  }
}

/// A bulk load returned fewer keys than were requested.
///
/// Whatever the loader did return has already been cached when this error is
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bulk load did not return {missing} of {requested} requested keys")]
pub struct IncompleteLoadError {
  /// The number of keys that had to be loaded.
  pub requested: usize,
  /// The number of those keys the loader did not return.
  pub missing: usize,
}

/// Errors returned by `Cache::get_all`.
#[derive(Debug, Clone, Error)]
pub enum GetAllError {
  #[error(transparent)]
  Load(#[from] LoadError),
  #[error(transparent)]
  Incomplete(#[from] IncompleteLoadError),
}
