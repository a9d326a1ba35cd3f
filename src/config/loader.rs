//! Configuration loading from disk.

use std::fmt::Display;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{BackendServicesFile, ProxyConfig};
use crate::config::validation::{validate_backend_services, validate_config, ValidationError};
use crate::origins::BackendService;
use crate::registry::ResourceReader;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid content: {0}")]
    Invalid(String),
}

fn join<E: Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse and validate the content of a backend services file.
pub fn parse_backend_services(content: &str) -> Result<Vec<BackendService>, ConfigError> {
    let file: BackendServicesFile = toml::from_str(content)?;

    validate_backend_services(&file).map_err(ConfigError::Validation)?;

    Ok(file
        .services
        .into_iter()
        .map(|service| service.into_backend_service())
        .collect())
}

/// Reads `[[services]]` tables from TOML into backend services.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlBackendServicesReader;

impl ResourceReader<BackendService> for TomlBackendServicesReader {
    fn read(&self, content: &[u8]) -> Result<Vec<BackendService>, ConfigError> {
        let content = std::str::from_utf8(content)
            .map_err(|e| ConfigError::Invalid(format!("backend services file is not UTF-8: {}", e)))?;
        parse_backend_services(content)
    }
}
