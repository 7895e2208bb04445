//! Cache Probe - checks that the configured cache store is reachable
//!
//! Writes, reads, checks and removes a probe key through the pooled cache
//! client, then prints the resulting statistics as JSON.

use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resilient_cache::store::RedisConnector;
use resilient_cache::{CacheConfig, CacheStore, ConnectionPool, Lookup};

const PROBE_KEY: &str = "cache-probe";
const PROBE_TTL_SECS: i64 = 60;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Probe {
    host: String,
    written_at: chrono::DateTime<Utc>,
}

/// Main entry point for the cache probe.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build a connection pool over the Redis connector
/// 4. Add, get, check and remove a probe key
/// 5. Print the stats snapshot
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resilient_cache=info,cache_probe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env().context("Failed to load cache configuration")?;
    info!(
        endpoint = %config.endpoint,
        pool_size = config.pool_size,
        database = config.database,
        tls = config.transport.tls,
        "Configuration loaded"
    );

    let connector = RedisConnector::from_config(&config)?;
    let pool = ConnectionPool::new(connector, config.pool_size);
    let cache = match &config.key_prefix {
        Some(prefix) => CacheStore::with_default_prefix(pool, prefix.clone()),
        None => CacheStore::new(pool),
    };

    let key = format!(
        "{PROBE_KEY}-{}-{}",
        std::process::id(),
        Utc::now().timestamp_millis()
    );
    let probe = Probe {
        host: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
        written_at: Utc::now(),
    };
    let expires_at = Utc::now() + ChronoDuration::seconds(PROBE_TTL_SECS);

    let written = cache.add(&key, &probe, Some(expires_at)).await?;
    info!(key = %key, written, "Probe written");

    match cache.lookup::<Probe>(&key).await? {
        Lookup::Hit(read) if read == probe => info!(key = %key, "Probe read back"),
        Lookup::Hit(read) => warn!(key = %key, ?read, "Probe read back with different content"),
        Lookup::Miss => warn!(key = %key, "Probe missing after write"),
        Lookup::Unavailable(kind) => warn!(key = %key, ?kind, "Store unavailable"),
    }

    let exists = cache.exists(&key).await?;
    info!(key = %key, exists, "Probe existence checked");

    let removed = cache.remove(&key).await?;
    info!(key = %key, removed, "Probe removed");

    let stats = cache.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if stats.degraded() > 0 {
        anyhow::bail!("{} cache operations degraded", stats.degraded());
    }
    Ok(())
}
