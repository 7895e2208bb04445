//! In-Memory Store
//!
//! An in-process stand-in for the remote store. All connections dialled from
//! one [`MemoryConnector`] share a single [`MemoryBackend`], so writes through
//! one pooled connection are visible through every other.
//!
//! Failures can be injected to exercise the degradation and reconnect paths:
//! queued one-shot errors, a persistent outage, refused dials and slow dials.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::store::{Connector, StoreConnection};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Stored {
    value: Value,
    expires_at: Option<Instant>,
}

impl Stored {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

// == Memory Backend ==
/// Shared keyspace plus failure-injection switches.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Stored>>,
    injected: Mutex<VecDeque<StoreError>>,
    outage: Mutex<Option<StoreError>>,
    refuse_dials: AtomicBool,
    dial_delay: Mutex<Duration>,
    dials: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next operation on any connection with `error`.
    ///
    /// Multiple calls queue up, one error per subsequent operation.
    pub fn inject_failure(&self, error: StoreError) {
        self.injected.lock().push_back(error);
    }

    /// Fails every operation with `error` until cleared with `None`.
    pub fn set_outage(&self, error: Option<StoreError>) {
        *self.outage.lock() = error;
    }

    /// Makes new dials fail with a connection error.
    pub fn refuse_dials(&self, refuse: bool) {
        self.refuse_dials.store(refuse, Ordering::SeqCst);
    }

    /// Delays every dial, widening the window for racing initializations.
    pub fn set_dial_delay(&self, delay: Duration) {
        *self.dial_delay.lock() = delay;
    }

    /// Number of connections successfully dialled so far.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|stored| !stored.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `key` holds a live value, bypassing failure injection.
    pub fn contains_key(&self, key: &str) -> bool {
        self.live(key).is_some()
    }

    fn check_failure(&self) -> StoreResult<()> {
        if let Some(error) = self.outage.lock().clone() {
            return Err(error);
        }
        match self.injected.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn live(&self, key: &str) -> Option<Stored> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired = entries.get(key)?.is_expired(now);
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).cloned()
    }
}

// == Memory Connector ==
/// Dials [`MemoryConnection`]s against a shared backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    backend: Arc<MemoryBackend>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<MemoryBackend> {
        &self.backend
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> StoreResult<MemoryConnection> {
        let delay = *self.backend.dial_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.backend.refuse_dials.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("connection refused".to_string()));
        }

        self.backend.dials.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            backend: Arc::clone(&self.backend),
            closed: AtomicBool::new(false),
        })
    }
}

// == Memory Connection ==
#[derive(Debug)]
pub struct MemoryConnection {
    backend: Arc<MemoryBackend>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn guard(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("connection closed".to_string()));
        }
        self.backend.check_failure()
    }
}

fn deadline(ttl: Duration) -> StoreResult<Instant> {
    if ttl.is_zero() {
        return Err(StoreError::Server("invalid expire time".to_string()));
    }
    Ok(Instant::now() + ttl)
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.guard()?;
        match self.backend.live(key) {
            Some(Stored {
                value: Value::Bytes(bytes),
                ..
            }) => Ok(Some(bytes)),
            Some(_) => Err(StoreError::Server(
                "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
            )),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<bool> {
        self.guard()?;
        let expires_at = ttl.map(deadline).transpose()?;
        self.backend.entries.lock().insert(
            key.to_string(),
            Stored {
                value: Value::Bytes(value),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.guard()?;
        let existed = self.backend.live(key).is_some();
        self.backend.entries.lock().remove(key);
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.guard()?;
        Ok(self.backend.live(key).is_some())
    }

    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()> {
        self.guard()?;
        let now = Instant::now();
        let mut entries = self.backend.entries.lock();
        let stored = entries
            .entry(key.to_string())
            .and_modify(|stored| {
                if stored.is_expired(now) {
                    *stored = Stored {
                        value: Value::Hash(HashMap::new()),
                        expires_at: None,
                    };
                }
            })
            .or_insert_with(|| Stored {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            });

        match &mut stored.value {
            Value::Hash(hash) => {
                hash.extend(fields);
                Ok(())
            }
            Value::Bytes(_) => Err(StoreError::Server(
                "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
            )),
        }
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.guard()?;
        match self.backend.live(key) {
            Some(Stored {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash),
            Some(_) => Err(StoreError::Server(
                "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
            )),
            None => Ok(HashMap::new()),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.guard()?;
        let at = deadline(ttl)?;
        if self.backend.live(key).is_none() {
            return Ok(false);
        }
        Ok(match self.backend.entries.lock().get_mut(key) {
            Some(stored) => {
                stored.expires_at = Some(at);
                true
            }
            None => false,
        })
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
