//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use proxy_registry::registry::{ChangeListener, Changes, Id, Identifiable};

/// Minimal registry resource: an id plus one setting.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResource {
    pub id: Id,
    pub setting: String,
}

impl TestResource {
    pub fn new(id: &str, setting: &str) -> Self {
        Self {
            id: Id::new(id),
            setting: setting.to_string(),
        }
    }
}

impl Identifiable for TestResource {
    fn id(&self) -> &Id {
        &self.id
    }
}

/// Listener that records every diff it receives.
pub struct RecordingListener<T> {
    received: Mutex<Vec<Changes<T>>>,
}

impl<T: Clone + Send + Sync + 'static> RecordingListener<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<Changes<T>> {
        self.received.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl<T: Clone + Send + Sync> ChangeListener<T> for RecordingListener<T> {
    fn on_change(&self, changes: &Changes<T>) {
        self.received.lock().unwrap().push(changes.clone());
    }
}

/// A file in the temp dir, removed on drop.
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn new(prefix: &str, content: &str) -> Self {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", prefix, uuid::Uuid::new_v4()));
        fs::write(&path, content).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, content: &str) {
        fs::write(&self.path, content).unwrap();
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// A `[[services]]` table with the given origins as `(id, host)`.
pub fn service_toml(id: &str, origins: &[(&str, &str)]) -> String {
    let mut toml = format!("[[services]]\nid = \"{}\"\npath = \"/{}\"\n", id, id);
    for (origin_id, host) in origins {
        toml.push_str(&format!(
            "\n[[services.origins]]\nid = \"{}\"\nhost = \"{}\"\n",
            origin_id, host
        ));
    }
    toml
}
