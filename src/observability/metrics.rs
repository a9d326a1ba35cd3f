//! Metrics collection and exposition.
//!
//! # Metrics
//! - `registry_updates_total` (counter): non-empty diffs applied, by registry
//! - `registry_changes_total` (counter): resources changed, by registry and kind
//! - `registry_listener_failures_total` (counter): panicking listeners, by announcer
//! - `registry_reloads_total` (counter): file reloads, by outcome
//! - `config_store_updates_total` (counter): config store publications
//! - `origin_status` (gauge): 1=active, 0=inactive, -1=disabled, -2=removed,
//!   by app and origin
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus endpoint is optional and installed from `main`
//! - The facade cannot unregister a series, so a removed origin's
//!   `origin_status` is set to `ORIGIN_REMOVED` instead of keeping its
//!   last state; alerting on `origin_status >= -1` ignores it

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::origins::OriginState;
use crate::registry::{Changes, Id, ReloadResult};

/// Install the Prometheus recorder and its scrape endpoint.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_registry_update<T>(registry: &'static str, changes: &Changes<T>) {
    ::metrics::counter!("registry_updates_total", "registry" => registry).increment(1);
    for (kind, count) in [
        ("added", changes.added().len()),
        ("removed", changes.removed().len()),
        ("updated", changes.updated().len()),
    ] {
        ::metrics::counter!("registry_changes_total", "registry" => registry, "kind" => kind)
            .increment(count as u64);
    }
}

pub fn record_listener_failure(announcer: &'static str) {
    ::metrics::counter!("registry_listener_failures_total", "announcer" => announcer).increment(1);
}

pub fn record_reload(result: &ReloadResult) {
    let outcome = match result {
        ReloadResult::Reloaded(_) => "reloaded",
        ReloadResult::Unchanged(_) => "unchanged",
        ReloadResult::Failed { .. } => "failed",
    };
    ::metrics::counter!("registry_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_config_update() {
    ::metrics::counter!("config_store_updates_total").increment(1);
}

/// `origin_status` value of an origin that is no longer configured.
pub const ORIGIN_REMOVED: f64 = -2.0;

pub fn record_origin_state(app: &Id, origin: &Id, state: OriginState) {
    ::metrics::gauge!(
        "origin_status",
        "app" => app.to_string(),
        "origin" => origin.to_string()
    )
    .set(state.gauge_value());
}

pub fn record_origin_removed(app: &Id, origin: &Id) {
    ::metrics::gauge!(
        "origin_status",
        "app" => app.to_string(),
        "origin" => origin.to_string()
    )
    .set(ORIGIN_REMOVED);
}
