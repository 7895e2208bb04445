//! Error types for the cache client
//!
//! Provides unified error handling using thiserror. Transport failures are
//! classified into [`StoreError`]; everything surfaced to callers is a
//! [`CacheError`].

use serde::Serialize;
use thiserror::Error;

// == Store Error Enum ==
/// Failure reported by the remote store, classified by cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection refused, socket failure or dropped connection
    #[error("Connection failure: {0}")]
    Connection(String),

    /// Operation did not complete within the transport timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Store answered with an error reply
    #[error("Server error: {0}")]
    Server(String),

    /// Any failure outside the transient classes
    #[error("Store error: {0}")]
    Other(String),
}

/// Transient failure classes that degrade to a neutral result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    Connection,
    Timeout,
    Server,
}

impl StoreError {
    /// Returns the transient class, or None for fatal errors.
    pub fn transient_kind(&self) -> Option<TransientKind> {
        match self {
            StoreError::Connection(_) => Some(TransientKind::Connection),
            StoreError::Timeout(_) => Some(TransientKind::Timeout),
            StoreError::Server(_) => Some(TransientKind::Server),
            StoreError::Other(_) => None,
        }
    }
}

// == Cache Error Enum ==
/// Unified error type for the cache client.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Required environment variable is absent
    #[error("Environment variable {0} was not found")]
    MissingSetting(&'static str),

    /// Environment variable is present but cannot be parsed
    #[error("Invalid value {value:?} for {name}")]
    InvalidSetting { name: &'static str, value: String },

    /// Caller misuse, e.g. an empty key or prefix
    #[error("Invalid usage: {0}")]
    Usage(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Hash fields could not be mapped to a typed object
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Non-transient store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

// == Result Type Aliases ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Result type returned by store connections.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
