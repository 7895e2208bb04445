//! Reconnect Controller Module
//!
//! Owns a single connection and recreates it when connection errors persist.
//!
//! The transport normally heals dropped sockets by itself, so a reported error
//! only starts a clock. The connection is replaced once errors have kept
//! arriving for at least the error threshold with no gap longer than that
//! threshold, and never more often than the minimum reconnect interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::config::ReconnectPolicy;
use crate::connection::{ConnectionHandle, ConnectionSource};
use crate::store::Connector;

/// Sentinel for "never reconnected" in the lock-free timestamp.
const NEVER: u64 = 0;

/// What a single error notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Too soon after the last reconnect; the error was ignored
    Suppressed,
    /// First error of a new streak
    StreakStarted,
    /// The previous error was too long ago; the streak began again here
    StreakRestarted,
    /// Streak continues but has not lasted long enough yet
    Accumulating,
    /// The connection was discarded and recreated
    Reconnected,
}

#[derive(Debug, Default)]
struct ErrorStreak {
    first_error_at: Option<Instant>,
    previous_error_at: Option<Instant>,
}

// == Reconnect Controller ==
pub struct ReconnectController<K: Connector> {
    connector: Arc<K>,
    policy: ReconnectPolicy,
    current: RwLock<Arc<ConnectionHandle<K>>>,
    streak: Mutex<ErrorStreak>,
    /// Origin for `last_reconnect`
    epoch: Instant,
    /// Nanoseconds after `epoch` of the last reconnect, plus one; `NEVER` if none
    last_reconnect: AtomicU64,
    reconnects: AtomicU64,
}

impl<K: Connector> ReconnectController<K> {
    pub fn new(connector: K, policy: ReconnectPolicy) -> Self {
        Self::with_connector(Arc::new(connector), policy)
    }

    pub fn with_connector(connector: Arc<K>, policy: ReconnectPolicy) -> Self {
        let current = Arc::new(ConnectionHandle::new(Arc::clone(&connector)));
        Self {
            connector,
            policy,
            current: RwLock::new(current),
            streak: Mutex::new(ErrorStreak::default()),
            epoch: Instant::now(),
            last_reconnect: AtomicU64::new(NEVER),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Returns the current handle. It dials on first use.
    pub fn connection(&self) -> Arc<ConnectionHandle<K>> {
        Arc::clone(&self.current.read())
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Number of forced reconnects so far.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Acquire)
    }

    /// Start of the active error streak, if any.
    pub fn streak_started_at(&self) -> Option<Instant> {
        self.streak.lock().first_error_at
    }

    // == Notify Error ==
    /// Reports a connection or socket failure.
    ///
    /// Do not call this for timeouts or server errors. Never fails, and never
    /// retries the caller's operation.
    pub fn notify_error(&self) -> ReconnectDecision {
        self.notify_error_at(Instant::now())
    }

    /// [`notify_error`](Self::notify_error) with an explicit clock reading.
    pub fn notify_error_at(&self, now: Instant) -> ReconnectDecision {
        if self.within_min_interval(now) {
            return ReconnectDecision::Suppressed;
        }

        let retired = {
            let mut streak = self.streak.lock();

            let (first, previous) = match (streak.first_error_at, streak.previous_error_at) {
                (Some(first), Some(previous)) => (first, previous),
                _ => {
                    streak.first_error_at = Some(now);
                    streak.previous_error_at = Some(now);
                    return ReconnectDecision::StreakStarted;
                }
            };

            // Another caller may have reconnected while we waited for the lock.
            if self.within_min_interval(now) {
                return ReconnectDecision::Suppressed;
            }

            let since_first = now.saturating_duration_since(first);
            let since_previous = now.saturating_duration_since(previous);
            streak.previous_error_at = Some(now);

            let threshold = self.policy.error_threshold;
            if since_previous > threshold {
                streak.first_error_at = Some(now);
                debug!(
                    gap_ms = since_previous.as_millis() as u64,
                    "Stale error streak discarded"
                );
                return ReconnectDecision::StreakRestarted;
            }
            if since_first < threshold {
                return ReconnectDecision::Accumulating;
            }

            *streak = ErrorStreak::default();
            let fresh = Arc::new(ConnectionHandle::new(Arc::clone(&self.connector)));
            let retired = std::mem::replace(&mut *self.current.write(), fresh);
            self.last_reconnect
                .store(self.encode(now), Ordering::Release);
            self.reconnects.fetch_add(1, Ordering::AcqRel);

            info!(
                retired = retired.id(),
                streak_ms = since_first.as_millis() as u64,
                "Recreating cache store connection"
            );
            retired
        };

        if let Err(e) = retired.close() {
            error!(handle = retired.id(), error = %e, "Failed to close retired connection");
        }
        ReconnectDecision::Reconnected
    }

    fn within_min_interval(&self, now: Instant) -> bool {
        match self.last_reconnect.load(Ordering::Acquire) {
            NEVER => false,
            raw => {
                let at = self.epoch + Duration::from_nanos(raw - 1);
                now.saturating_duration_since(at) <= self.policy.min_reconnect_interval
            }
        }
    }

    fn encode(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch).as_nanos() as u64 + 1
    }
}

impl<K: Connector> ConnectionSource for ReconnectController<K> {
    type Connector = K;

    fn acquire(&self) -> Arc<ConnectionHandle<K>> {
        self.connection()
    }

    fn notify_error(&self) {
        let decision = ReconnectController::notify_error(self);
        debug!(?decision, "Connection failure reported to controller");
    }
}

impl<K: Connector> std::fmt::Debug for ReconnectController<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectController")
            .field("policy", &self.policy)
            .field("reconnects", &self.reconnect_count())
            .finish()
    }
}
