//! Redis Store
//!
//! Production backend built on `redis::aio::ConnectionManager`, which
//! multiplexes commands over one socket and re-dials dropped sockets on its
//! own. Forced recreation on top of that is the reconnect controller's job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use ::redis::{Client, ErrorKind, IntoConnectionInfo, RedisError};
use async_trait::async_trait;
use tracing::debug;

use crate::config::{CacheConfig, ENDPOINT_VAR};
use crate::error::{CacheError, Result, StoreError, StoreResult};
use crate::store::{Connector, StoreConnection};

const TLS_PORT: u16 = 6380;
const PLAIN_PORT: u16 = 6379;

// == Redis Connector ==
/// Dials [`RedisConnection`]s with the fixed transport options.
#[derive(Clone)]
pub struct RedisConnector {
    client: Client,
    manager_config: ConnectionManagerConfig,
    endpoint: String,
}

impl std::fmt::Debug for RedisConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnector")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl RedisConnector {
    /// Builds a connector from configuration. Nothing is dialled here.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let url = connection_url(&config.endpoint, config.transport.tls, config.database);
        let mut info = url
            .as_str()
            .into_connection_info()
            .map_err(|_| CacheError::InvalidSetting {
                name: ENDPOINT_VAR,
                value: config.endpoint.clone(),
            })?;
        info.redis.password = Some(config.password.clone());

        let client = Client::open(info).map_err(|e| CacheError::Store(classify(e)))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_response_timeout(config.transport.operation_timeout)
            .set_connection_timeout(config.transport.connect_timeout);

        Ok(Self {
            client,
            manager_config,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = RedisConnection;

    async fn connect(&self) -> StoreResult<RedisConnection> {
        debug!(endpoint = %self.endpoint, "Dialling cache store");
        let manager =
            ConnectionManager::new_with_config(self.client.clone(), self.manager_config.clone())
                .await
                .map_err(classify)?;

        Ok(RedisConnection {
            manager,
            closed: AtomicBool::new(false),
        })
    }
}

// == Redis Connection ==
pub struct RedisConnection {
    manager: ConnectionManager,
    closed: AtomicBool,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl RedisConnection {
    fn manager(&self) -> StoreResult<ConnectionManager> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("connection closed".to_string()));
        }
        Ok(self.manager.clone())
    }
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.manager()?;
        ::redis::cmd("GET")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(classify)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<bool> {
        let mut conn = self.manager()?;
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        cmd.query_async::<()>(&mut conn).await.map_err(classify)?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.manager()?;
        let removed = ::redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(classify)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.manager()?;
        let count = ::redis::cmd("EXISTS")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(classify)?;
        Ok(count > 0)
    }

    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager()?;
        let mut cmd = ::redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in &fields {
            cmd.arg(field).arg(value);
        }
        cmd.query_async::<()>(&mut conn).await.map_err(classify)
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.manager()?;
        ::redis::cmd("HGETALL")
            .arg(key)
            .query_async::<HashMap<String, String>>(&mut conn)
            .await
            .map_err(classify)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.manager()?;
        let applied = ::redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl.as_millis() as u64)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(classify)?;
        Ok(applied == 1)
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> StoreResult<()> {
        // The socket is released when the last manager clone drops.
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// == Helpers ==
/// Maps a client error onto the transport failure classes.
pub fn classify(error: RedisError) -> StoreError {
    let message = error.to_string();
    if error.is_timeout() {
        StoreError::Timeout(message)
    } else if error.is_connection_refusal() || error.is_connection_dropped() || error.is_io_error()
    {
        StoreError::Connection(message)
    } else if matches!(
        error.kind(),
        ErrorKind::ResponseError
            | ErrorKind::ExtensionError
            | ErrorKind::BusyLoadingError
            | ErrorKind::TryAgain
            | ErrorKind::ReadOnly
            | ErrorKind::ExecAbortError
    ) {
        StoreError::Server(message)
    } else {
        StoreError::Other(message)
    }
}

/// Builds the connection URL. Credentials are attached separately so they
/// never need escaping or show up in logs.
fn connection_url(endpoint: &str, tls: bool, database: i64) -> String {
    let endpoint = endpoint.trim();
    let scheme = if tls { "rediss" } else { "redis" };
    if endpoint.contains(':') {
        format!("{scheme}://{endpoint}/{database}")
    } else {
        let port = if tls { TLS_PORT } else { PLAIN_PORT };
        format!("{scheme}://{endpoint}:{port}/{database}")
    }
}
