//! Registry fed from a single configuration file.
//!
//! # Responsibilities
//! - Read the file on demand (`reload`)
//! - Skip parsing when the content hash is unchanged
//! - Apply the parsed resources to the wrapped `Registry`
//! - Report the outcome without ever discarding the current snapshot
//!
//! # Design Decisions
//! - Parsing is delegated to a `ResourceReader`, the registry never knows the format
//! - The content hash is only remembered after a successful apply, so a
//!   broken file is retried on the next reload even if it did not change
//! - The hash is a SHA-256 hex digest, stable across builds, so operators
//!   can match a logged `content-hash` against `sha256sum` of the file

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use crate::config::loader::ConfigError;
use crate::registry::dynamic::Registry;
use crate::registry::id::Identifiable;

/// Turns raw file content into resources.
pub trait ResourceReader<T>: Send + Sync {
    fn read(&self, content: &[u8]) -> Result<Vec<T>, ConfigError>;
}

/// Outcome of a reload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadResult {
    /// New resources were applied and listeners notified.
    Reloaded(String),
    /// Nothing to apply, either identical bytes or no semantic difference.
    Unchanged(String),
    /// The file could not be read, parsed or accepted.
    Failed { message: String, cause: String },
}

impl ReloadResult {
    pub fn message(&self) -> &str {
        match self {
            ReloadResult::Reloaded(message) | ReloadResult::Unchanged(message) => message,
            ReloadResult::Failed { message, .. } => message,
        }
    }

    pub fn is_reloaded(&self) -> bool {
        matches!(self, ReloadResult::Reloaded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ReloadResult::Failed { .. })
    }
}

impl fmt::Display for ReloadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadResult::Reloaded(message) => write!(f, "RELOADED: {}", message),
            ReloadResult::Unchanged(message) => write!(f, "UNCHANGED: {}", message),
            ReloadResult::Failed { message, cause } => write!(f, "FAILED: {} cause={}", message, cause),
        }
    }
}

/// A `Registry` whose content comes from a file.
pub struct FileBackedRegistry<T> {
    path: PathBuf,
    reader: Box<dyn ResourceReader<T>>,
    registry: Arc<Registry<T>>,
    /// Hash of the last successfully applied content. Also serializes reloads.
    applied_hash: Mutex<Option<String>>,
}

impl<T> FileBackedRegistry<T>
where
    T: Identifiable + Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(
        path: impl Into<PathBuf>,
        reader: impl ResourceReader<T> + 'static,
        registry: Arc<Registry<T>>,
    ) -> Self {
        Self {
            path: path.into(),
            reader: Box::new(reader),
            registry,
            applied_hash: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The wrapped registry, for `get` and listener registration.
    pub fn registry(&self) -> &Arc<Registry<T>> {
        &self.registry
    }

    /// Re-read the file and apply it if it changed.
    pub fn reload(&self) -> ReloadResult {
        let mut applied_hash = self
            .applied_hash
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Not reloading, file unreadable");
                return ReloadResult::Failed {
                    message: format!("timestamp={}, Reload failure.", self.modified()),
                    cause: e.to_string(),
                };
            }
        };

        let hash = content_hash(&content);
        let prefix = format!("timestamp={}, content-hash={}", self.modified(), hash);

        if applied_hash.as_deref() == Some(hash.as_str()) {
            tracing::info!(path = %self.path.display(), "Not reloading, content did not change");
            return ReloadResult::Unchanged(format!("{}, Identical file content.", prefix));
        }

        let outcome = self
            .reader
            .read(&content)
            .map_err(|e| e.to_string())
            .and_then(|resources| self.registry.set(resources).map_err(|e| e.to_string()));

        match outcome {
            Ok(changes) => {
                *applied_hash = Some(hash);
                if changes.is_empty() {
                    tracing::info!(path = %self.path.display(), "Not firing change event, content not semantically different");
                    ReloadResult::Unchanged(format!("{}, No semantic changes.", prefix))
                } else {
                    tracing::debug!(path = %self.path.display(), changes = changes.len(), "Changes applied");
                    ReloadResult::Reloaded(format!("{}, File reloaded.", prefix))
                }
            }
            Err(cause) => {
                tracing::error!(path = %self.path.display(), error = %cause, "Not reloading, content rejected");
                ReloadResult::Failed {
                    message: format!("{}, Reload failure.", prefix),
                    cause,
                }
            }
        }
    }

    fn modified(&self) -> String {
        fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|since| since.as_secs().to_string())
            .unwrap_or_else(|| "NA".to_string())
    }
}

fn content_hash(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
