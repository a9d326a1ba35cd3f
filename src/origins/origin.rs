//! Origins and the backend services grouping them.

use std::fmt;

use serde::Serialize;

use crate::registry::{Id, Identifiable};

/// A single backend endpoint serving an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Origin {
    pub id: Id,
    pub application_id: Id,
    /// `host:port`.
    pub host: String,
}

impl Origin {
    pub fn new(application_id: impl Into<Id>, id: impl Into<Id>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            application_id: application_id.into(),
            host: host.into(),
        }
    }

    /// `APP-host:port`, the label used in logs and status views.
    pub fn application_info(&self) -> String {
        format!("{}-{}", self.application_id.as_str().to_uppercase(), self.host)
    }
}

impl Identifiable for Origin {
    fn id(&self) -> &Id {
        &self.id
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.application_id, self.id, self.host)
    }
}

/// Connection pool settings applied to every origin of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionPoolSettings {
    pub max_connections_per_host: usize,
    pub max_pending_connections_per_host: usize,
    pub connect_timeout_ms: u64,
    pub pending_connection_timeout_ms: u64,
}

impl Default for ConnectionPoolSettings {
    fn default() -> Self {
        Self {
            max_connections_per_host: 50,
            max_pending_connections_per_host: 25,
            connect_timeout_ms: 2000,
            pending_connection_timeout_ms: 8000,
        }
    }
}

/// Active health check settings for a service's origins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckSettings {
    pub enabled: bool,
    pub path: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/health".to_string(),
            interval_ms: 5000,
            timeout_ms: 2000,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
        }
    }
}

/// A named group of origins plus the settings used to reach them.
///
/// Two services are equal only if every field matches; any difference in
/// settings or origins shows up as an update in registry diffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendService {
    pub id: Id,
    /// Path prefix routed to this service.
    pub path: String,
    pub origins: Vec<Origin>,
    pub connection_pool: ConnectionPoolSettings,
    pub health_check: HealthCheckSettings,
    pub response_timeout_ms: u64,
}

impl BackendService {
    pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;

    /// A service with default settings and no origins.
    pub fn new(id: impl Into<Id>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            origins: Vec::new(),
            connection_pool: ConnectionPoolSettings::default(),
            health_check: HealthCheckSettings::default(),
            response_timeout_ms: Self::DEFAULT_RESPONSE_TIMEOUT_MS,
        }
    }

    /// Add an origin, stamping it with this service's id.
    pub fn with_origin(mut self, id: impl Into<Id>, host: impl Into<String>) -> Self {
        self.origins.push(Origin::new(self.id.clone(), id, host));
        self
    }

    pub fn with_response_timeout_ms(mut self, response_timeout_ms: u64) -> Self {
        self.response_timeout_ms = response_timeout_ms;
        self
    }
}

impl Identifiable for BackendService {
    fn id(&self) -> &Id {
        &self.id
    }
}
