//! Connection Handle Module
//!
//! A lazily dialled connection with an outstanding-operation counter.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{error, trace};

use crate::error::{StoreError, StoreResult};
use crate::store::{Connector, StoreConnection};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const LIVE: u8 = 2;
const CLOSED: u8 = 3;

/// Lifecycle of a [`ConnectionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Uninitialized,
    Initializing,
    Live,
    Closed,
}

impl HandleState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            UNINITIALIZED => HandleState::Uninitialized,
            INITIALIZING => HandleState::Initializing,
            LIVE => HandleState::Live,
            _ => HandleState::Closed,
        }
    }
}

// == Connection Handle ==
/// Wraps one connection to the remote store.
///
/// The connection is dialled on first use, at most once, no matter how many
/// callers race on it. A failed dial leaves the handle uninitialized so the
/// next use retries.
pub struct ConnectionHandle<K: Connector> {
    id: u64,
    connector: Arc<K>,
    cell: OnceCell<K::Connection>,
    state: AtomicU8,
    outstanding: AtomicUsize,
}

impl<K: Connector> ConnectionHandle<K> {
    /// Creates an uninitialized handle. Nothing is dialled yet.
    pub fn new(connector: Arc<K>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            connector,
            cell: OnceCell::new(),
            state: AtomicU8::new(UNINITIALIZED),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Process-unique identity.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> HandleState {
        HandleState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_live(&self) -> bool {
        self.state() == HandleState::Live
    }

    /// Number of operations currently checked out against this handle.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Marks the start of an operation. The guard ends it on drop.
    pub fn checkout(self: &Arc<Self>) -> Checkout<K> {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Checkout {
            handle: Arc::clone(self),
        }
    }

    /// Returns the live connection, dialling it if this is the first use.
    pub async fn connection(&self) -> StoreResult<&K::Connection> {
        if self.state() == HandleState::Closed {
            return Err(self.closed_error());
        }

        let conn = self.cell.get_or_try_init(|| self.dial()).await?;

        // Closed while the dial was in flight: nobody else will release it.
        if self.state() == HandleState::Closed {
            if let Err(e) = conn.close() {
                error!(handle = self.id, error = %e, "Failed to close late connection");
            }
            return Err(self.closed_error());
        }
        let _ = self
            .state
            .compare_exchange(INITIALIZING, LIVE, Ordering::AcqRel, Ordering::Acquire);
        Ok(conn)
    }

    fn closed_error(&self) -> StoreError {
        StoreError::Connection(format!("connection handle {} was closed", self.id))
    }

    async fn dial(&self) -> StoreResult<K::Connection> {
        let _ = self.state.compare_exchange(
            UNINITIALIZED,
            INITIALIZING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        trace!(handle = self.id, "Dialling connection");

        match self.connector.connect().await {
            Ok(conn) => Ok(conn),
            Err(err) => {
                let _ = self.state.compare_exchange(
                    INITIALIZING,
                    UNINITIALIZED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                Err(err)
            }
        }
    }

    /// Closes the handle. Later use fails with a connection error.
    ///
    /// Closing a handle that never dialled does not dial it.
    pub fn close(&self) -> StoreResult<()> {
        self.state.store(CLOSED, Ordering::Release);
        match self.cell.get() {
            Some(conn) => conn.close(),
            None => Ok(()),
        }
    }
}

impl<K: Connector> PartialEq for ConnectionHandle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<K: Connector> Eq for ConnectionHandle<K> {}

impl<K: Connector> fmt::Debug for ConnectionHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

// == Checkout Guard ==
/// Counts one in-flight operation against a handle for as long as it lives.
pub struct Checkout<K: Connector> {
    handle: Arc<ConnectionHandle<K>>,
}

impl<K: Connector> Checkout<K> {
    pub fn handle(&self) -> &Arc<ConnectionHandle<K>> {
        &self.handle
    }
}

impl<K: Connector> Deref for Checkout<K> {
    type Target = ConnectionHandle<K>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<K: Connector> Drop for Checkout<K> {
    fn drop(&mut self) {
        self.handle.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}
