//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics. Every check runs
//! and all errors are returned together so one edit can fix a whole file.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{BackendServiceConfig, BackendServicesFile, ProxyConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("service #{index} has an empty id")]
    EmptyServiceId { index: usize },

    #[error("duplicate service id '{0}'")]
    DuplicateServiceId(String),

    #[error("service '{service}' path '{path}' must start with '/'")]
    InvalidPath { service: String, path: String },

    #[error("service '{0}' has no origins")]
    NoOrigins(String),

    #[error("service '{service}' declares origin '{origin}' twice")]
    DuplicateOriginId { service: String, origin: String },

    #[error("service '{service}' declares host '{host}' twice")]
    DuplicateOriginHost { service: String, host: String },

    #[error("origin '{origin}' of service '{service}' has invalid host '{host}', expected host:port")]
    InvalidHost { service: String, origin: String, host: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Validate the daemon configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.path.trim().is_empty() {
        errors.push(ValidationError::Empty("backends.path"));
    }
    if config.backends.poll_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "backends.poll_interval_secs".to_string() });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    finish(errors)
}

/// Validate a backend services file.
pub fn validate_backend_services(file: &BackendServicesFile) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, service) in file.services.iter().enumerate() {
        if service.id.trim().is_empty() {
            errors.push(ValidationError::EmptyServiceId { index });
        } else if !seen.insert(service.id.as_str()) {
            errors.push(ValidationError::DuplicateServiceId(service.id.clone()));
        }
        validate_service(service, &mut errors);
    }

    finish(errors)
}

fn validate_service(service: &BackendServiceConfig, errors: &mut Vec<ValidationError>) {
    if !service.path.starts_with('/') {
        errors.push(ValidationError::InvalidPath {
            service: service.id.clone(),
            path: service.path.clone(),
        });
    }
    if service.origins.is_empty() {
        errors.push(ValidationError::NoOrigins(service.id.clone()));
    }
    if service.response_timeout_ms == 0 {
        errors.push(ValidationError::Zero {
            field: format!("services.{}.response_timeout_ms", service.id),
        });
    }
    if service.connection_pool.max_connections_per_host == 0 {
        errors.push(ValidationError::Zero {
            field: format!("services.{}.connection_pool.max_connections_per_host", service.id),
        });
    }

    let mut ids = HashSet::new();
    let mut hosts = HashSet::new();
    for origin in &service.origins {
        if !ids.insert(origin.id.as_str()) {
            errors.push(ValidationError::DuplicateOriginId {
                service: service.id.clone(),
                origin: origin.id.clone(),
            });
        }
        if !hosts.insert(origin.host.as_str()) {
            errors.push(ValidationError::DuplicateOriginHost {
                service: service.id.clone(),
                host: origin.host.clone(),
            });
        }
        if !is_host_port(&origin.host) {
            errors.push(ValidationError::InvalidHost {
                service: service.id.clone(),
                origin: origin.id.clone(),
                host: origin.host.clone(),
            });
        }
    }
}

fn is_host_port(host: &str) -> bool {
    match host.rsplit_once(':') {
        Some((name, port)) => !name.is_empty() && port.parse::<u16>().map_or(false, |p| p > 0),
        None => false,
    }
}

fn finish(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
