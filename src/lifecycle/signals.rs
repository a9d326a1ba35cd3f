//! OS signal handling.
//!
//! # Responsibilities
//! - SIGTERM / SIGINT trigger graceful shutdown
//! - SIGHUP requests a reload of the backend services file
//!
//! Uses Tokio's signal handling, so handlers are async-safe.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::lifecycle::shutdown::Shutdown;

/// Translate OS signals into shutdown and reload requests until shutdown.
#[cfg(unix)]
pub async fn handle_signals(
    shutdown: Arc<Shutdown>,
    reload_tx: mpsc::UnboundedSender<()>,
) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, shutting down");
                shutdown.trigger();
                return Ok(());
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                shutdown.trigger();
                return Ok(());
            }
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, reloading backend services");
                let _ = reload_tx.send(());
            }
            _ = stop.recv() => return Ok(()),
        }
    }
}

#[cfg(not(unix))]
pub async fn handle_signals(
    shutdown: Arc<Shutdown>,
    _reload_tx: mpsc::UnboundedSender<()>,
) -> std::io::Result<()> {
    let mut stop = shutdown.subscribe();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Ctrl-C received, shutting down");
            shutdown.trigger();
        }
        _ = stop.recv() => {}
    }
    Ok(())
}
