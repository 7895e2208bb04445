//! Resilient Cache - a fault-tolerant client layer for a remote key-value store
//!
//! Pools lazily dialled connections, recycles a connection after a sustained
//! error streak and degrades cache operations to neutral results instead of
//! failing callers when the store is unavailable.

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod store;

pub use cache::{CacheStore, Lookup, ObjectStore};
pub use config::CacheConfig;
pub use connection::{ConnectionPool, ConnectionSource, ReconnectController};
pub use error::{CacheError, Result};
