//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! daemon config (TOML)
//!     → loader::load_config → validation::validate_config → ProxyConfig
//!
//! backend services file (TOML)
//!     → TomlBackendServicesReader (parse, validate, convert)
//!     → FileBackedRegistry::reload → Registry<BackendService>
//!
//! On change:
//!     watcher.rs or SIGHUP emits a reload request
//!     → FileBackedRegistry::reload
//! ```

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_backend_services, ConfigError, TomlBackendServicesReader};
pub use schema::{BackendServiceConfig, BackendServicesFile, OriginConfig, ProxyConfig};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
