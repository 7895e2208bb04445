//! Cache Store Module
//!
//! Typed get/add/remove/exists over a connection source, with key
//! namespacing and graceful degradation.
//!
//! Transient store failures never reach the caller. Connection failures are
//! logged as warnings and reported to the connection source; timeouts and
//! server errors are logged as errors. In each case the operation yields its
//! neutral result (`None`, `false`). Anything else is returned as an error,
//! as are undecodable payloads and invalid keys or prefixes.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::cache::codec::JsonCodec;
use crate::cache::entry::{namespaced_key, validate_key, validate_prefix, CacheEntry, TimeToLive};
use crate::cache::stats::{CacheStats, CacheStatsSnapshot};
use crate::connection::ConnectionSource;
use crate::error::{CacheError, Result, StoreResult, TransientKind};
use crate::store::StoreConnection;

// == Lookup ==
/// Result of a read, keeping "absent" apart from "store unavailable".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Hit(T),
    Miss,
    /// The store could not be reached; the value may or may not exist
    Unavailable(TransientKind),
}

impl<T> Lookup<T> {
    /// Collapses misses and failures into `None`.
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::Unavailable(_) => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

/// A store call that either completed or was absorbed as a transient failure.
enum Outcome<R> {
    Completed(R),
    Degraded(TransientKind),
}

impl<R> Outcome<R> {
    fn or(self, neutral: R) -> R {
        match self {
            Outcome::Completed(value) => value,
            Outcome::Degraded(_) => neutral,
        }
    }
}

// == Cache Store ==
/// Stateless cache facade; safe to share across any number of tasks.
#[derive(Debug)]
pub struct CacheStore<S: ConnectionSource> {
    source: S,
    codec: JsonCodec,
    default_prefix: Option<String>,
    stats: CacheStats,
}

impl<S: ConnectionSource> CacheStore<S> {
    // == Constructor ==
    /// Creates a store with no default namespace.
    pub fn new(source: S) -> Self {
        Self {
            source,
            codec: JsonCodec::new(),
            default_prefix: None,
            stats: CacheStats::new(),
        }
    }

    /// Creates a store whose unprefixed operations use `prefix`.
    ///
    /// A blank prefix means no namespace.
    pub fn with_default_prefix(source: S, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            default_prefix: (!prefix.trim().is_empty()).then_some(prefix),
            ..Self::new(source)
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn default_prefix(&self) -> Option<&str> {
        self.default_prefix.as_deref()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    // == Get ==
    /// Fetches and decodes the value under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or the store is unavailable.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self.lookup(key).await?.into_option())
    }

    /// [`get`](Self::get) under an explicit namespace.
    pub async fn get_with_prefix<T: DeserializeOwned>(
        &self,
        key: &str,
        prefix: &str,
    ) -> Result<Option<T>> {
        Ok(self.lookup_with_prefix(key, prefix).await?.into_option())
    }

    /// Like [`get`](Self::get), but tells a miss apart from a failure.
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<Lookup<T>> {
        validate_key(key)?;
        let store_key = namespaced_key(self.default_prefix(), key);
        self.lookup_key(&store_key).await
    }

    pub async fn lookup_with_prefix<T: DeserializeOwned>(
        &self,
        key: &str,
        prefix: &str,
    ) -> Result<Lookup<T>> {
        validate_prefix(prefix)?;
        validate_key(key)?;
        self.lookup_key(&namespaced_key(Some(prefix), key)).await
    }

    async fn lookup_key<T: DeserializeOwned>(&self, store_key: &str) -> Result<Lookup<T>> {
        match self.absorb("get", store_key, self.fetch(store_key).await)? {
            Outcome::Degraded(kind) => Ok(Lookup::Unavailable(kind)),
            Outcome::Completed(None) => {
                debug!(key = store_key, "Cache MISS");
                self.stats.record_miss();
                Ok(Lookup::Miss)
            }
            Outcome::Completed(Some(payload)) => {
                let value = self.codec.decode(&payload)?;
                debug!(key = store_key, "Cache HIT");
                self.stats.record_hit();
                Ok(Lookup::Hit(value))
            }
        }
    }

    /// Fetches several keys at once under the default namespace.
    ///
    /// Lookups run concurrently. Misses and unavailable reads are skipped, so
    /// the result holds only the values found, in the order of `keys`.
    pub async fn get_many<T: DeserializeOwned>(&self, keys: &[&str]) -> Result<Vec<T>> {
        for key in keys {
            validate_key(key)?;
        }

        let lookups = join_all(keys.iter().map(|key| self.lookup::<T>(key))).await;
        let mut found = Vec::with_capacity(lookups.len());
        for lookup in lookups {
            if let Lookup::Hit(value) = lookup? {
                found.push(value);
            }
        }
        Ok(found)
    }

    // == Add ==
    /// Stores `value` under `key`, overwriting any previous value.
    ///
    /// With `expires_at`, the entry lives until that instant. An instant
    /// already in the past stores nothing, clears any previous value and
    /// returns `false`.
    pub async fn add<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        validate_key(key)?;
        let payload = self.codec.encode(value)?;
        self.put(CacheEntry::new(key, self.default_prefix.clone(), payload, expires_at))
            .await
    }

    /// [`add`](Self::add) under an explicit namespace.
    pub async fn add_with_prefix<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
        prefix: &str,
    ) -> Result<bool> {
        validate_prefix(prefix)?;
        validate_key(key)?;
        let payload = self.codec.encode(value)?;
        self.put(CacheEntry::new(key, Some(prefix.to_string()), payload, expires_at))
            .await
    }

    async fn put(&self, entry: CacheEntry) -> Result<bool> {
        let store_key = entry.store_key();
        let ttl = match entry.ttl() {
            TimeToLive::Persistent => None,
            TimeToLive::Remaining(ttl) => Some(ttl),
            TimeToLive::Elapsed => {
                debug!(key = %store_key, "Expiry already passed, clearing stored value");
                self.absorb("add", &store_key, self.erase(&store_key).await)?;
                return Ok(false);
            }
        };

        let written = self
            .absorb("add", &store_key, self.write(&store_key, entry.payload, ttl).await)?
            .or(false);
        if written {
            self.stats.record_write();
        }
        Ok(written)
    }

    // == Remove ==
    /// Deletes `key`. Returns `true` if a value was removed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let store_key = namespaced_key(self.default_prefix(), key);
        self.remove_key(&store_key).await
    }

    /// [`remove`](Self::remove) under an explicit namespace.
    pub async fn remove_with_prefix(&self, key: &str, prefix: &str) -> Result<bool> {
        validate_prefix(prefix)?;
        validate_key(key)?;
        self.remove_key(&namespaced_key(Some(prefix), key)).await
    }

    async fn remove_key(&self, store_key: &str) -> Result<bool> {
        let removed = self
            .absorb("remove", store_key, self.erase(store_key).await)?
            .or(false);
        if removed {
            self.stats.record_removal();
        }
        Ok(removed)
    }

    // == Exists ==
    /// Checks whether `key` holds a value, under the default namespace.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let store_key = namespaced_key(self.default_prefix(), key);
        Ok(self
            .absorb("exists", &store_key, self.probe(&store_key).await)?
            .or(false))
    }

    // == Store Calls ==
    async fn fetch(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let checkout = self.source.acquire().checkout();
        checkout.connection().await?.get(key).await
    }

    async fn write(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) -> StoreResult<bool> {
        let checkout = self.source.acquire().checkout();
        checkout.connection().await?.set(key, payload, ttl).await
    }

    async fn erase(&self, key: &str) -> StoreResult<bool> {
        let checkout = self.source.acquire().checkout();
        checkout.connection().await?.delete(key).await
    }

    async fn probe(&self, key: &str) -> StoreResult<bool> {
        let checkout = self.source.acquire().checkout();
        checkout.connection().await?.exists(key).await
    }

    // == Error Classification ==
    /// Turns transient failures into `Outcome::Degraded`, logging and
    /// reporting them; anything else becomes a [`CacheError`].
    fn absorb<R>(&self, op: &'static str, key: &str, result: StoreResult<R>) -> Result<Outcome<R>> {
        let err = match result {
            Ok(value) => return Ok(Outcome::Completed(value)),
            Err(err) => err,
        };

        let Some(kind) = err.transient_kind() else {
            return Err(CacheError::Store(err));
        };

        self.stats.record_failure(kind);
        match kind {
            TransientKind::Connection => {
                warn!(op, key, error = %err, "Cache store unreachable - will reconnect");
                self.source.notify_error();
            }
            TransientKind::Timeout | TransientKind::Server => {
                error!(op, key, error = %err, "Cache operation failed");
            }
        }
        Ok(Outcome::Degraded(kind))
    }
}
