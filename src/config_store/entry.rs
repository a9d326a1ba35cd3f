//! Config store values, entries and errors.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// An untyped stored value.
pub type ConfigValue = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigStoreError {
    /// The stored value is not of the requested type.
    #[error("config entry '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

/// A key together with its typed value.
#[derive(PartialEq)]
pub struct ConfigEntry<V> {
    pub key: String,
    pub value: Arc<V>,
}

impl<V> Clone for ConfigEntry<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for ConfigEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{:?}", self.key, self.value)
    }
}

/// What travels through watch channels before being typed.
#[derive(Clone)]
pub(crate) struct RawEntry {
    pub(crate) key: String,
    pub(crate) value: ConfigValue,
}

impl RawEntry {
    pub(crate) fn cast<V: Any + Send + Sync>(self) -> Result<ConfigEntry<V>, ConfigStoreError> {
        let value = downcast::<V>(&self.key, self.value)?;
        Ok(ConfigEntry { key: self.key, value })
    }
}

pub(crate) fn downcast<V: Any + Send + Sync>(key: &str, value: ConfigValue) -> Result<Arc<V>, ConfigStoreError> {
    value.downcast::<V>().map_err(|_| ConfigStoreError::TypeMismatch {
        key: key.to_string(),
        expected: type_name::<V>(),
    })
}
