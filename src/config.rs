//! Configuration Module
//!
//! Loads connection settings from environment variables. The endpoint and
//! credential are required; everything else has a sensible default.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::error::{CacheError, Result};

// == Variable Names ==
/// Store endpoint, `host[:port]`
pub const ENDPOINT_VAR: &str = "REDIS_CONNECTIONSTRING_TLS";
/// Store credential
pub const PASSWORD_VAR: &str = "REDIS_PASSWORD";
pub const POOL_SIZE_VAR: &str = "CACHE_POOL_SIZE";
pub const DATABASE_VAR: &str = "CACHE_DATABASE";
pub const KEY_PREFIX_VAR: &str = "CACHE_KEY_PREFIX";
/// Local development only: `false` talks to an unencrypted store
pub const TLS_VAR: &str = "CACHE_TLS";

// == Defaults ==
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_DATABASE: i64 = 1;

/// Fixed transport options applied to every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Timeout for a single command round trip
    pub operation_timeout: Duration,
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
    /// Encrypt the transport
    pub tls: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_millis(1000),
            connect_timeout: Duration::from_millis(15_000),
            tls: true,
        }
    }
}

/// Windows used by the reconnect controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Two forced reconnects never happen closer together than this
    pub min_reconnect_interval: Duration,
    /// How long an error streak must persist, and the largest gap it may contain
    pub error_threshold: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_reconnect_interval: Duration::from_secs(60),
            error_threshold: Duration::from_secs(30),
        }
    }
}

/// Cache client configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Store endpoint, `host[:port]`
    pub endpoint: String,
    /// Store credential
    pub password: String,
    /// Number of pooled connections
    pub pool_size: usize,
    /// Logical database index
    pub database: i64,
    /// Namespace applied when no explicit prefix is given
    pub key_prefix: Option<String>,
    pub transport: TransportOptions,
    pub reconnect: ReconnectPolicy,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_CONNECTIONSTRING_TLS` - Store endpoint (required)
    /// - `REDIS_PASSWORD` - Store credential (required)
    /// - `CACHE_POOL_SIZE` - Pooled connections (default: 10)
    /// - `CACHE_DATABASE` - Logical database (default: 1)
    /// - `CACHE_KEY_PREFIX` - Default key namespace (default: none)
    /// - `CACHE_TLS` - Set to `false` for unencrypted local stores only (default: true)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(ENDPOINT_VAR).ok_or(CacheError::MissingSetting(ENDPOINT_VAR))?;
        let password = lookup(PASSWORD_VAR).ok_or(CacheError::MissingSetting(PASSWORD_VAR))?;

        let pool_size = parse_or(&lookup, POOL_SIZE_VAR, DEFAULT_POOL_SIZE)?;
        if pool_size == 0 {
            return Err(CacheError::InvalidSetting {
                name: POOL_SIZE_VAR,
                value: "0".to_string(),
            });
        }

        let tls = parse_or(&lookup, TLS_VAR, true)?;
        if !tls {
            warn!(
                variable = TLS_VAR,
                "TLS disabled - traffic to the cache store is unencrypted"
            );
        }
        let transport = TransportOptions {
            tls,
            ..TransportOptions::default()
        };

        Ok(Self {
            endpoint,
            password,
            pool_size,
            database: parse_or(&lookup, DATABASE_VAR, DEFAULT_DATABASE)?,
            key_prefix: lookup(KEY_PREFIX_VAR).filter(|p| !p.trim().is_empty()),
            transport,
            reconnect: ReconnectPolicy::default(),
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CacheError::InvalidSetting { name, value: raw }),
        None => Ok(default),
    }
}
