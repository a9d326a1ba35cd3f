//! Dynamic registry and reactive configuration for a reverse proxy.

pub mod config;
pub mod config_store;
pub mod lifecycle;
pub mod observability;
pub mod origins;
pub mod registry;

pub use config::schema::ProxyConfig;
pub use config_store::ConfigStore;
pub use lifecycle::{Runtime, Shutdown};
pub use origins::{BackendService, Origin, OriginCommand, OriginsInventory};
pub use registry::{Changes, Id, Identifiable, Registry};
