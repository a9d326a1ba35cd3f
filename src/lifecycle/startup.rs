//! Startup orchestration.
//!
//! Wires the subsystems in dependency order:
//! config store → origins inventory → backend services registry → file source.
//! The registry replays its snapshot to listeners as they attach, so the
//! order only matters for who sees the first reload.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{ProxyConfig, TomlBackendServicesReader};
use crate::config_store::ConfigStore;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::origins::{BackendService, OriginsInventory, OriginsStatusPublisher};
use crate::registry::{ChangeListener, FileBackedRegistry, Registry, ReloadResult};

/// Name used in logs and metrics for the backend services registry.
pub const BACKEND_SERVICES: &str = "backend-services";

/// The running registry subsystems.
pub struct Runtime {
    services: Arc<FileBackedRegistry<BackendService>>,
    inventory: Arc<OriginsInventory>,
    store: Arc<ConfigStore>,
}

impl Runtime {
    /// Build and connect the subsystems. Nothing is read from disk yet.
    pub fn build(config: &ProxyConfig) -> Self {
        let store = Arc::new(ConfigStore::new());

        let inventory = Arc::new(OriginsInventory::new());
        inventory.add_origins_change_listener(Arc::new(OriginsStatusPublisher::new(store.clone())));

        let registry = if config.backends.require_non_empty {
            Registry::with_constraint(BACKEND_SERVICES, |services: &[BackendService]| !services.is_empty())
        } else {
            Registry::new(BACKEND_SERVICES)
        };
        let registry = Arc::new(registry);
        registry.add_listener(inventory.clone() as Arc<dyn ChangeListener<BackendService>>);

        let services = Arc::new(FileBackedRegistry::new(
            &config.backends.path,
            TomlBackendServicesReader,
            registry,
        ));

        Self {
            services,
            inventory,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<Registry<BackendService>> {
        self.services.registry()
    }

    pub fn inventory(&self) -> &Arc<OriginsInventory> {
        &self.inventory
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Re-read the backend services file and apply it.
    pub fn reload(&self) -> ReloadResult {
        let result = self.services.reload();
        metrics::record_reload(&result);
        match &result {
            ReloadResult::Failed { message, cause } => {
                tracing::warn!(outcome = %message, %cause, "Keeping current backend services")
            }
            other => tracing::info!(outcome = other.message(), "Backend services reload"),
        }
        result
    }

    /// Serve reload requests until shutdown, then close every origin pool.
    pub async fn run(&self, mut reload_rx: mpsc::UnboundedReceiver<()>, shutdown: &Shutdown) {
        let mut stop = shutdown.subscribe();
        if shutdown.is_triggered() {
            self.inventory.close();
            return;
        }

        loop {
            tokio::select! {
                request = reload_rx.recv() => match request {
                    Some(()) => {
                        // Editors often emit several events per save.
                        while reload_rx.try_recv().is_ok() {}
                        self.reload();
                    }
                    None => break,
                },
                _ = stop.recv() => break,
            }
        }

        tracing::info!("Closing origin pools");
        self.inventory.close();
    }
}
