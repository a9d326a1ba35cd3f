//! Configuration schema definitions.
//!
//! Two files are involved: the daemon config (`ProxyConfig`) and the
//! backend services file it points at (`BackendServicesFile`), which is
//! re-read on every reload. All types derive Serde traits for
//! deserialization from TOML.

use serde::{Deserialize, Serialize};

use crate::origins::{BackendService, ConnectionPoolSettings, HealthCheckSettings, Origin};
use crate::registry::Id;

/// Root configuration for the registry daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Where backend services come from and how they are reloaded.
    pub backends: BackendsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Backend services source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Path to the backend services TOML file.
    pub path: String,

    /// Reload automatically when the file changes.
    pub watch: bool,

    /// Poll interval for the file watcher in seconds.
    pub poll_interval_secs: u64,

    /// Refuse reloads that would leave no backend service at all.
    pub require_non_empty: bool,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            path: "conf/backends.toml".to_string(),
            watch: true,
            poll_interval_secs: 2,
            require_non_empty: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Content of the backend services file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BackendServicesFile {
    pub services: Vec<BackendServiceConfig>,
}

/// One backend service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendServiceConfig {
    /// Unique service identifier.
    pub id: String,

    /// Path prefix routed to this service.
    #[serde(default = "default_path")]
    pub path: String,

    /// Origins serving this service.
    #[serde(default)]
    pub origins: Vec<OriginConfig>,

    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Response timeout in milliseconds.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_response_timeout_ms() -> u64 {
    BackendService::DEFAULT_RESPONSE_TIMEOUT_MS
}

/// Origin definition. The application id is taken from the enclosing service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OriginConfig {
    /// Origin identifier, unique within the service.
    pub id: String,

    /// Origin address (e.g., "127.0.0.1:3000").
    pub host: String,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    pub max_connections_per_host: usize,
    pub max_pending_connections_per_host: usize,
    pub connect_timeout_ms: u64,
    pub pending_connection_timeout_ms: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        let defaults = ConnectionPoolSettings::default();
        Self {
            max_connections_per_host: defaults.max_connections_per_host,
            max_pending_connections_per_host: defaults.max_pending_connections_per_host,
            connect_timeout_ms: defaults.connect_timeout_ms,
            pending_connection_timeout_ms: defaults.pending_connection_timeout_ms,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Path requested by HTTP health checks.
    pub path: String,

    /// Health check interval in milliseconds.
    pub interval_ms: u64,

    /// Health check timeout in milliseconds.
    pub timeout_ms: u64,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        let defaults = HealthCheckSettings::default();
        Self {
            enabled: defaults.enabled,
            path: defaults.path,
            interval_ms: defaults.interval_ms,
            timeout_ms: defaults.timeout_ms,
            healthy_threshold: defaults.healthy_threshold,
            unhealthy_threshold: defaults.unhealthy_threshold,
        }
    }
}

impl BackendServiceConfig {
    /// Convert into the domain type, stamping origins with the service id.
    pub fn into_backend_service(self) -> BackendService {
        let id = Id::from(self.id);
        let origins = self
            .origins
            .into_iter()
            .map(|origin| Origin::new(id.clone(), origin.id, origin.host))
            .collect();

        BackendService {
            id,
            path: self.path,
            origins,
            connection_pool: ConnectionPoolSettings {
                max_connections_per_host: self.connection_pool.max_connections_per_host,
                max_pending_connections_per_host: self.connection_pool.max_pending_connections_per_host,
                connect_timeout_ms: self.connection_pool.connect_timeout_ms,
                pending_connection_timeout_ms: self.connection_pool.pending_connection_timeout_ms,
            },
            health_check: HealthCheckSettings {
                enabled: self.health_check.enabled,
                path: self.health_check.path,
                interval_ms: self.health_check.interval_ms,
                timeout_ms: self.health_check.timeout_ms,
                healthy_threshold: self.health_check.healthy_threshold,
                unhealthy_threshold: self.health_check.unhealthy_threshold,
            },
            response_timeout_ms: self.response_timeout_ms,
        }
    }
}
