//! Origin-side consumers of the registry.
//!
//! # Data Flow
//! ```text
//! Registry<BackendService>
//!     → inventory.rs (ChangeListener: per-origin state machines)
//!         → pool.rs (one ConnectionPool per origin)
//!             → connection.rs (idempotent close, closed-listeners)
//!     ← command.rs (enable / disable an origin)
//!     → OriginsSnapshot → OriginsChangeListener (e.g. ConfigStore publisher)
//! ```
//!
//! # Design Decisions
//! - The inventory owns traffic admission; the registry only describes services
//! - Unchanged origins keep their state across service reloads
//! - Pools are closed as soon as their origin is replaced or removed

pub mod command;
pub mod connection;
pub mod inventory;
pub mod origin;
pub mod pool;

pub use command::{CommandError, OriginCommand};
pub use connection::{Connection, ConnectionId, ConnectionListener, PooledConnection};
pub use inventory::{
    OriginState, OriginsChangeListener, OriginsInventory, OriginsSnapshot, OriginsStatusPublisher,
};
pub use origin::{BackendService, ConnectionPoolSettings, HealthCheckSettings, Origin};
pub use pool::{ConnectionPool, PoolError};
