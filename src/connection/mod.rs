//! Connection Module
//!
//! Hands out connection handles to the cache layer, either from a
//! load-balanced pool or from a single self-recycling connection.

mod handle;
mod pool;
mod reconnect;


use std::sync::Arc;

pub use handle::{Checkout, ConnectionHandle, HandleState};
pub use pool::ConnectionPool;
pub use reconnect::{ReconnectController, ReconnectDecision};

use crate::store::Connector;

/// Where the cache layer gets its connections from.
pub trait ConnectionSource: Send + Sync {
    type Connector: Connector;

    /// Returns a handle to run the next operation on. Never fails; dialling
    /// is deferred to the handle's first use.
    fn acquire(&self) -> Arc<ConnectionHandle<Self::Connector>>;

    /// Reports a connection-level failure observed by a caller.
    fn notify_error(&self);
}

impl<T: ConnectionSource + ?Sized> ConnectionSource for Arc<T> {
    type Connector = T::Connector;

    fn acquire(&self) -> Arc<ConnectionHandle<Self::Connector>> {
        (**self).acquire()
    }

    fn notify_error(&self) {
        (**self).notify_error()
    }
}
