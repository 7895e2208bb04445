//! Cache Module
//!
//! Typed caching over a remote store with key namespacing, expiry and
//! graceful degradation when the store misbehaves.

mod codec;
mod entry;
mod object_store;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use codec::JsonCodec;
pub use entry::{namespaced_key, CacheEntry, TimeToLive, PREFIX_SEPARATOR};
pub use object_store::{parse_field, require_field, HashMapped, ObjectStore};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::{CacheStore, Lookup};
