//! Cache Statistics Module
//!
//! Tracks lookup outcomes and transient failures. Counters are lock-free so
//! they can be bumped from any number of concurrent callers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::TransientKind;

// == Cache Stats ==
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    removals: AtomicU64,
    connection_failures: AtomicU64,
    timeouts: AtomicU64,
    server_errors: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a transient failure by class.
    pub fn record_failure(&self, kind: TransientKind) {
        let counter = match kind {
            TransientKind::Connection => &self.connection_failures,
            TransientKind::Timeout => &self.timeouts,
            TransientKind::Server => &self.server_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Lookups that found a value
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Successful writes
    pub writes: u64,
    /// Successful removals
    pub removals: u64,
    pub connection_failures: u64,
    pub timeouts: u64,
    pub server_errors: u64,
}

impl CacheStatsSnapshot {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have completed.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total operations degraded by transient failures.
    pub fn degraded(&self) -> u64 {
        self.connection_failures + self.timeouts + self.server_errors
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new().snapshot();
        assert_eq!(stats, CacheStatsSnapshot::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.snapshot().hit_rate(), 0.75);
    }

    #[test]
    fn test_record_failures_by_kind() {
        let stats = CacheStats::new();
        stats.record_failure(TransientKind::Connection);
        stats.record_failure(TransientKind::Connection);
        stats.record_failure(TransientKind::Timeout);
        stats.record_failure(TransientKind::Server);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connection_failures, 2);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.server_errors, 1);
        assert_eq!(snapshot.degraded(), 4);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = CacheStats::new();
        stats.record_write();
        stats.record_removal();

        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["writes"], 1);
        assert_eq!(json["removals"], 1);
        assert_eq!(json["hits"], 0);
    }
}
