//! Store Module
//!
//! The seam between the cache layer and the remote key-value store. A
//! [`Connector`] dials connections; a [`StoreConnection`] executes commands.

pub mod memory;
pub mod redis;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

pub use memory::{MemoryBackend, MemoryConnection, MemoryConnector};
pub use self::redis::{RedisConnection, RedisConnector};

/// One live, multiplexed connection to the remote store.
///
/// Implementations must be safe for concurrent dispatch; the cache layer
/// never serializes access to a connection.
#[async_trait]
pub trait StoreConnection: Send + Sync + 'static {
    /// Fetches the raw payload stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes `value` unconditionally, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<bool>;

    /// Deletes `key`. Returns true if something was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Writes every field of the hash stored under `key`.
    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()>;

    /// Reads all fields of a hash. Missing keys yield an empty map.
    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    fn is_connected(&self) -> bool;

    /// Releases the connection. Best effort.
    fn close(&self) -> StoreResult<()>;
}

/// Dials new connections to the remote store.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: StoreConnection;

    async fn connect(&self) -> StoreResult<Self::Connection>;
}
