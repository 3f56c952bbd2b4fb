//! An in-process, concurrent loading cache.
//!
//! # Features
//! - **Single-flight loading**: concurrent misses on one key share a single
//!   loader call, with an optional bulk loader for `get_all`.
//! - **Bounded by weight**: an LRU or FIFO eviction order over per-entry
//!   weights computed by a user weigher.
//! - **Expiration**: Time-to-Live (TTL) and Time-to-Idle (TTI), enforced
//!   lazily on access and by a background janitor.
//! - **Removal notifications**: exactly one synchronous callback per removal,
//!   with the cause, to a general removal listener and an eviction-only one.
//! - **Non-Clone Support**: Stores values in an `Arc<V>`, avoiding `V: Clone` bounds.
//! - **Observability**: Exposes hit, load and eviction statistics.
//!
//! ```
//! use cinder_cache::CacheBuilder;
//!
//! let cache = CacheBuilder::default()
//!   .capacity(100)
//!   .loader(|key: &u32| Ok::<_, std::io::Error>(key * 2))
//!   .build()
//!   .unwrap();
//!
//! assert_eq!(*cache.get(&21).unwrap(), 42);
//! ```

// Public modules that form the API
pub mod builder;
pub mod error;
pub mod handles;
pub mod iter;
pub mod listener;
pub mod loader;
pub mod metrics;
pub mod policy;
pub mod time;

// Internal, crate-only modules
mod entry;
mod notifier;
mod shared;
mod store;
mod task;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
pub use error::{BoxError, BuildError, GetAllError, IncompleteLoadError, LoadError};
pub use handles::Cache;
pub use listener::{EvictionListener, RemovalCause, RemovalListener};
pub use loader::CacheLoader;
pub use metrics::MetricsSnapshot;
pub use policy::EvictionOrder;
pub use time::{ManualTicker, SystemTicker, Ticker};
