//! Backend services file watcher for hot reload.
//!
//! The watcher only signals that the file changed. Reading and applying
//! the content is left to the receiver, which funnels file events and
//! SIGHUP through the same reload path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Monitors a file and emits a reload request on every change.
pub struct ConfigWatcher {
    path: PathBuf,
    poll_interval: Duration,
    reload_tx: mpsc::UnboundedSender<()>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher feeding `reload_tx`.
    pub fn new(path: &Path, poll_interval: Duration, reload_tx: mpsc::UnboundedSender<()>) -> Self {
        Self {
            path: path.to_path_buf(),
            poll_interval,
            reload_tx,
        }
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.reload_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::debug!(paths = ?event.paths, "Backend services file change detected");
                        if tx.send(()).is_err() {
                            tracing::debug!("Reload receiver gone, ignoring file change");
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Backend services watcher started");
        Ok(watcher)
    }
}
