//! Pooled origin connections and their close notification.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track the open → closed transition exactly once
//! - Announce the transition to registered listeners
//!
//! # Design Decisions
//! - `close` is idempotent; only the call that flips the state announces
//! - Listeners are isolated from each other through `Announcer`

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::origins::origin::Origin;
use crate::registry::Announcer;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough, only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Notified when a connection transitions to closed.
pub trait ConnectionListener: Send + Sync {
    /// Called at most once per connection.
    fn connection_closed(&self, connection: &dyn Connection);
}

/// A connection to an origin as seen by pools and load balancers.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn origin(&self) -> &Origin;

    fn is_connected(&self) -> bool;

    /// Close the connection. Closing an already closed connection is a no-op.
    fn close(&self);

    fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>);

    fn remove_connection_listener(&self, listener: &Arc<dyn ConnectionListener>);
}

/// In-memory connection handle. Transport I/O lives outside this crate;
/// this type only owns the lifecycle.
pub struct PooledConnection {
    id: ConnectionId,
    origin: Origin,
    closed: AtomicBool,
    listeners: Announcer<dyn ConnectionListener>,
}

impl PooledConnection {
    pub fn new(origin: Origin) -> Self {
        Self {
            id: ConnectionId::new(),
            origin,
            closed: AtomicBool::new(false),
            listeners: Announcer::new("connection"),
        }
    }
}

impl Connection for PooledConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn origin(&self) -> &Origin {
        &self.origin
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        tracing::trace!(connection_id = %self.id, origin = %self.origin, "Connection closed");
        self.listeners.announce(|l| l.connection_closed(self));
    }

    fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.listeners.add_listener(listener);
    }

    fn remove_connection_listener(&self, listener: &Arc<dyn ConnectionListener>) {
        self.listeners.remove_listener(listener);
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("origin", &self.origin.application_info())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ClosedLog {
        closed: Mutex<Vec<ConnectionId>>,
    }

    impl ConnectionListener for ClosedLog {
        fn connection_closed(&self, connection: &dyn Connection) {
            self.closed.lock().unwrap().push(connection.id());
        }
    }

    fn origin() -> Origin {
        Origin::new("shop", "shop-01", "localhost:9090")
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn close_is_idempotent() {
        let connection = PooledConnection::new(origin());
        let log = Arc::new(ClosedLog::default());
        connection.add_connection_listener(log.clone());

        assert!(connection.is_connected());
        connection.close();
        connection.close();

        assert!(!connection.is_connected());
        assert_eq!(*log.closed.lock().unwrap(), vec![connection.id()]);
    }

    #[test]
    fn removed_listener_is_not_notified() {
        let connection = PooledConnection::new(origin());
        let log = Arc::new(ClosedLog::default());
        let handle: Arc<dyn ConnectionListener> = log.clone();
        connection.add_connection_listener(handle.clone());
        connection.remove_connection_listener(&handle);

        connection.close();

        assert!(log.closed.lock().unwrap().is_empty());
    }
}
