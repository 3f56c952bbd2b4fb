//! Maintenance machinery: the background janitor for expiration and the
//! buffer that defers recency updates under contention.

pub(crate) mod janitor;
pub(crate) mod read_buffer;
