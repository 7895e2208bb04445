//! Connection Pool Module
//!
//! A fixed set of lazily dialled connections. Until every slot has been
//! dialled, each request warms the first cold slot; afterwards requests go
//! to the least loaded connection.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::connection::{ConnectionHandle, ConnectionSource};
use crate::store::Connector;

// == Connection Pool ==
pub struct ConnectionPool<K: Connector> {
    slots: Vec<Arc<ConnectionHandle<K>>>,
}

impl<K: Connector> ConnectionPool<K> {
    /// Creates a pool of `size` uninitialized slots (at least one).
    ///
    /// No connection is dialled here, so the pool comes up even while the
    /// store is unreachable.
    pub fn new(connector: K, size: usize) -> Self {
        Self::with_connector(Arc::new(connector), size)
    }

    pub fn with_connector(connector: Arc<K>, size: usize) -> Self {
        let slots = (0..size.max(1))
            .map(|_| Arc::new(ConnectionHandle::new(Arc::clone(&connector))))
            .collect();
        Self { slots }
    }

    // == Get Connection ==
    /// Selects the handle for the next operation.
    ///
    /// While any slot is cold (not yet live), the first cold slot is returned
    /// so the warm set grows one connection at a time. Once all slots are
    /// live, the handle with the fewest outstanding operations wins, ties
    /// going to the earliest slot.
    pub fn get_connection(&self) -> Arc<ConnectionHandle<K>> {
        if let Some(cold) = self.slots.iter().find(|slot| !slot.is_live()) {
            trace!(handle = cold.id(), "Creating a new connection to the cache store");
            return Arc::clone(cold);
        }

        let least_loaded = self
            .slots
            .iter()
            .min_by_key(|slot| slot.outstanding())
            .unwrap_or(&self.slots[0]);
        Arc::clone(least_loaded)
    }

    /// Number of slots. Fixed for the pool's lifetime.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots with a live connection.
    pub fn warm_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_live()).count()
    }

    pub fn handles(&self) -> &[Arc<ConnectionHandle<K>>] {
        &self.slots
    }
}

impl<K: Connector> ConnectionSource for ConnectionPool<K> {
    type Connector = K;

    fn acquire(&self) -> Arc<ConnectionHandle<K>> {
        self.get_connection()
    }

    fn notify_error(&self) {
        // Pooled connections re-dial dropped sockets on their own.
        debug!(
            warm = self.warm_count(),
            size = self.size(),
            "Connection failure reported to pool"
        );
    }
}

impl<K: Connector> std::fmt::Debug for ConnectionPool<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("size", &self.size())
            .field("warm", &self.warm_count())
            .finish()
    }
}
