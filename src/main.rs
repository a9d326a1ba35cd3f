//! proxy-registry daemon.
//!
//! Loads backend services from a TOML file into the registry, keeps the
//! origins inventory in sync with it and reloads on file change or SIGHUP.
//!
//! ```text
//!   backends.toml ──▶ FileBackedRegistry ──▶ Registry<BackendService>
//!        ▲                                         │ Changes
//!   watcher / SIGHUP                               ▼
//!                                          OriginsInventory ──▶ ConfigStore
//!                                          (state, pools)       origins.<app>
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use proxy_registry::config::{load_config, ConfigWatcher, ProxyConfig};
use proxy_registry::lifecycle::{signals, Runtime, Shutdown};
use proxy_registry::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "proxy-registry")]
#[command(about = "Dynamic backend registry for the reverse proxy", long_about = None)]
struct Cli {
    /// Daemon configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend services file, overriding `backends.path`.
    #[arg(short, long)]
    backends: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(backends) = cli.backends {
        config.backends.path = backends.display().to_string();
    }

    logging::init(&config.observability.log_level);
    tracing::info!("proxy-registry v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        backends = %config.backends.path,
        watch = config.backends.watch,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let runtime = Runtime::build(&config);
    runtime.reload();

    let shutdown = Arc::new(Shutdown::new());
    let (reload_tx, reload_rx) = mpsc::unbounded_channel();

    let _watcher = if config.backends.watch {
        let watcher = ConfigWatcher::new(
            PathBuf::from(&config.backends.path).as_path(),
            Duration::from_secs(config.backends.poll_interval_secs),
            reload_tx.clone(),
        );
        match watcher.run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "File watching disabled, reload with SIGHUP");
                None
            }
        }
    } else {
        None
    };

    let signal_shutdown = shutdown.clone();
    let signal_task = tokio::spawn(async move {
        if let Err(e) = signals::handle_signals(signal_shutdown.clone(), reload_tx).await {
            tracing::error!(error = %e, "Signal handling failed, shutting down");
            signal_shutdown.trigger();
        }
    });

    runtime.run(reload_rx, &shutdown).await;
    signal_task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
