//! Per-origin connection pool.
//!
//! # Responsibilities
//! - Hand out connections up to `max_connections_per_host`
//! - Evict connections as soon as they announce closure
//! - Close every connection when the origin goes away

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::origins::connection::{Connection, ConnectionId, ConnectionListener, PooledConnection};
use crate::origins::origin::{ConnectionPoolSettings, Origin};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("connection pool for {origin} exhausted ({max} connections)")]
    Exhausted { origin: String, max: usize },

    #[error("connection pool for {0} is closed")]
    Closed(String),
}

#[derive(Default)]
struct PoolState {
    connections: DashMap<ConnectionId, Arc<PooledConnection>>,
    active: AtomicUsize,
}

/// Registered on every pooled connection; drops it from the pool on close.
struct EvictOnClose {
    state: Arc<PoolState>,
}

impl ConnectionListener for EvictOnClose {
    fn connection_closed(&self, connection: &dyn Connection) {
        if self.state.connections.remove(&connection.id()).is_some() {
            self.state.active.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(
                connection_id = %connection.id(),
                origin = %connection.origin(),
                "Evicted closed connection from pool"
            );
        }
    }
}

/// Connections to a single origin.
pub struct ConnectionPool {
    origin: Origin,
    settings: ConnectionPoolSettings,
    state: Arc<PoolState>,
    evictor: Arc<dyn ConnectionListener>,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(origin: Origin, settings: ConnectionPoolSettings) -> Self {
        let state = Arc::new(PoolState::default());
        let evictor: Arc<dyn ConnectionListener> = Arc::new(EvictOnClose { state: state.clone() });
        Self {
            origin,
            settings,
            state,
            evictor,
            closed: AtomicBool::new(false),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn settings(&self) -> &ConnectionPoolSettings {
        &self.settings
    }

    /// Open a new connection, failing once the per-host limit is reached.
    pub fn open_connection(&self) -> Result<Arc<PooledConnection>, PoolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed(self.origin.to_string()));
        }

        let max = self.settings.max_connections_per_host;
        let mut prev = self.state.active.load(Ordering::Acquire);
        loop {
            if prev >= max {
                return Err(PoolError::Exhausted {
                    origin: self.origin.to_string(),
                    max,
                });
            }
            match self.state.active.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }

        let connection = Arc::new(PooledConnection::new(self.origin.clone()));
        connection.add_connection_listener(self.evictor.clone());
        self.state.connections.insert(connection.id(), connection.clone());

        // A close() that ran since the first check may have missed this
        // connection. Closing evicts it and releases the slot.
        if self.closed.load(Ordering::SeqCst) {
            connection.close();
            return Err(PoolError::Closed(self.origin.to_string()));
        }
        Ok(connection)
    }

    /// Number of open connections.
    pub fn active_connections(&self) -> usize {
        self.state.active.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the pool and every connection in it. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Collect first: closing triggers eviction, which mutates the map.
        let connections: Vec<Arc<PooledConnection>> = self
            .state
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        tracing::info!(origin = %self.origin, connections = connections.len(), "Closing connection pool");
        for connection in connections {
            connection.close();
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("origin", &self.origin.to_string())
            .field("active", &self.active_connections())
            .field("closed", &self.is_closed())
            .finish()
    }
}
