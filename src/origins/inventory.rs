//! Origins inventory: which origins may receive traffic.
//!
//! # Data Flow
//! ```text
//! Registry<BackendService> changes
//!     → OriginsInventory::on_change (add / replace / drop origins)
//! OriginCommand (admin)          → enable / disable
//! Health monitor                 → healthy / unhealthy
//!     → per-origin state machine
//!     → OriginsSnapshot announced to OriginsChangeListeners
//! ```
//!
//! # State Transitions
//! ```text
//! Active   → Inactive : unhealthy
//! Inactive → Active   : healthy
//! Active   → Disabled : disable
//! Inactive → Disabled : disable
//! Disabled → Inactive : enable
//! ```
//! Any other event leaves the state unchanged.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::config_store::ConfigStore;
use crate::observability::metrics;
use crate::origins::command::{CommandError, OriginCommand};
use crate::origins::origin::{BackendService, ConnectionPoolSettings, Origin};
use crate::origins::pool::ConnectionPool;
use crate::registry::{Announcer, ChangeListener, Changes, Id};

/// Traffic admission state of one origin.
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OriginState {
    Active = 1,
    Inactive = 0,
    Disabled = -1,
}

impl OriginState {
    /// Value exported by the `origin_status` gauge.
    pub fn gauge_value(self) -> f64 {
        self as i8 as f64
    }
}

impl fmt::Display for OriginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OriginState::Active => "ACTIVE",
            OriginState::Inactive => "INACTIVE",
            OriginState::Disabled => "DISABLED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OriginEvent {
    Healthy,
    Unhealthy,
    Enable,
    Disable,
}

fn transition(state: OriginState, event: OriginEvent) -> OriginState {
    use OriginEvent::*;
    use OriginState::*;

    match (state, event) {
        (Active, Unhealthy) => Inactive,
        (Inactive, Healthy) => Active,
        (Active | Inactive, Disable) => Disabled,
        (Disabled, Enable) => Inactive,
        (state, _) => state,
    }
}

/// Point-in-time view of one application's origins, grouped by state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginsSnapshot {
    pub app_id: Id,
    pub active: Vec<Origin>,
    pub inactive: Vec<Origin>,
    pub disabled: Vec<Origin>,
}

impl OriginsSnapshot {
    pub fn contains_origin(&self, origin_id: &Id) -> bool {
        self.active
            .iter()
            .chain(&self.inactive)
            .chain(&self.disabled)
            .any(|origin| &origin.id == origin_id)
    }
}

/// Notified whenever an application's origin states change.
pub trait OriginsChangeListener: Send + Sync {
    fn origins_changed(&self, snapshot: &OriginsSnapshot);
}

impl<F> OriginsChangeListener for F
where
    F: Fn(&OriginsSnapshot) + Send + Sync,
{
    fn origins_changed(&self, snapshot: &OriginsSnapshot) {
        self(snapshot)
    }
}

struct MonitoredOrigin {
    origin: Origin,
    state: OriginState,
    pool: Arc<ConnectionPool>,
}

impl MonitoredOrigin {
    fn new(origin: Origin, settings: ConnectionPoolSettings) -> Self {
        let pool = Arc::new(ConnectionPool::new(origin.clone(), settings));
        let monitored = Self {
            origin,
            state: OriginState::Active,
            pool,
        };
        monitored.export_state();
        monitored
    }

    fn handle(&mut self, event: OriginEvent) -> bool {
        let old = self.state;
        self.state = transition(old, event);
        if old == self.state {
            return false;
        }
        tracing::info!(
            app = %self.origin.application_id,
            origin = %self.origin.id,
            change = %format!("{}->{}", old, self.state),
            "Origin state change"
        );
        self.export_state();
        true
    }

    /// Stop admitting traffic for good: close the pool and retire the gauge.
    fn retire(self) {
        self.pool.close();
        metrics::record_origin_removed(&self.origin.application_id, &self.origin.id);
    }

    fn export_state(&self) {
        metrics::record_origin_state(&self.origin.application_id, &self.origin.id, self.state);
    }
}

#[derive(Default)]
struct Application {
    pool_settings: ConnectionPoolSettings,
    origins: BTreeMap<Id, MonitoredOrigin>,
}

impl Application {
    fn snapshot(&self, app_id: &Id) -> OriginsSnapshot {
        let in_state = |state: OriginState| -> Vec<Origin> {
            self.origins
                .values()
                .filter(|m| m.state == state)
                .map(|m| m.origin.clone())
                .collect()
        };
        OriginsSnapshot {
            app_id: app_id.clone(),
            active: in_state(OriginState::Active),
            inactive: in_state(OriginState::Inactive),
            disabled: in_state(OriginState::Disabled),
        }
    }

    /// Reconcile with a new service definition. Returns true if anything changed.
    fn set_origins(&mut self, service: &BackendService) -> bool {
        let settings_changed = self.pool_settings != service.connection_pool;
        self.pool_settings = service.connection_pool.clone();

        let mut previous = std::mem::take(&mut self.origins);
        let mut changed = false;

        for origin in &service.origins {
            let monitored = match previous.remove(&origin.id) {
                Some(existing) if !settings_changed && existing.origin == *origin => {
                    tracing::debug!(origin = %origin, "Existing origin has been left unchanged");
                    existing
                }
                Some(stale) => {
                    changed = true;
                    stale.pool.close();
                    tracing::info!(origin = %origin, "Existing origin has been updated");
                    MonitoredOrigin::new(origin.clone(), self.pool_settings.clone())
                }
                None => {
                    changed = true;
                    tracing::info!(origin = %origin, "New origin added and activated");
                    MonitoredOrigin::new(origin.clone(), self.pool_settings.clone())
                }
            };
            self.origins.insert(origin.id.clone(), monitored);
        }

        for (_, removed) in previous {
            changed = true;
            tracing::info!(origin = %removed.origin, "Existing origin has been removed");
            removed.retire();
        }

        changed
    }

    fn close(&mut self) {
        for (_, monitored) in std::mem::take(&mut self.origins) {
            monitored.retire();
        }
    }
}

/// Tracks every application's origins and their admission state.
///
/// Registered as a `ChangeListener<BackendService>` on the backend services
/// registry, it follows service additions, updates and removals.
///
/// Snapshots reach listeners in the order the state changed. Listeners may
/// read the inventory but must not change it from `origins_changed`.
pub struct OriginsInventory {
    applications: Mutex<HashMap<Id, Application>>,
    /// Held from state change through announcement; taken before `applications`.
    announcing: Mutex<()>,
    listeners: Announcer<dyn OriginsChangeListener>,
}

impl OriginsInventory {
    pub fn new() -> Self {
        Self {
            applications: Mutex::new(HashMap::new()),
            announcing: Mutex::new(()),
            listeners: Announcer::new("origins_inventory"),
        }
    }

    /// Register a listener; it immediately receives the snapshot of every
    /// known application.
    pub fn add_origins_change_listener(&self, listener: Arc<dyn OriginsChangeListener>) {
        let _announcing = self.lock_announcements();
        self.listeners.add_listener(listener.clone());
        for snapshot in self.snapshots() {
            self.listeners
                .announce_one(&*listener, |l| l.origins_changed(&snapshot));
        }
    }

    pub fn remove_origins_change_listener(&self, listener: &Arc<dyn OriginsChangeListener>) {
        self.listeners.remove_listener(listener);
    }

    /// Apply a backend service definition (add or update).
    pub fn set_origins(&self, service: &BackendService) {
        let _announcing = self.lock_announcements();
        let snapshot = {
            let mut applications = self.lock();
            let application = applications.entry(service.id.clone()).or_default();
            application
                .set_origins(service)
                .then(|| application.snapshot(&service.id))
        };
        self.notify(snapshot);
    }

    /// Forget an application, closing its pools.
    pub fn remove_application(&self, app_id: &Id) {
        let _announcing = self.lock_announcements();
        let snapshot = {
            let mut applications = self.lock();
            applications.remove(app_id).map(|mut application| {
                application.close();
                application.snapshot(app_id)
            })
        };
        if snapshot.is_some() {
            tracing::info!(app = %app_id, "Application removed from origins inventory");
        }
        self.notify(snapshot);
    }

    /// Enable or disable an origin.
    pub fn on_command(&self, command: &OriginCommand) -> Result<(), CommandError> {
        let event = match command {
            OriginCommand::EnableOrigin { .. } => OriginEvent::Enable,
            OriginCommand::DisableOrigin { .. } => OriginEvent::Disable,
        };
        tracing::info!(command = %command, "Origin command received");

        let _announcing = self.lock_announcements();
        let snapshot = {
            let mut applications = self.lock();
            let app_id = command.application_id();
            let application = applications
                .get_mut(app_id)
                .ok_or_else(|| CommandError::UnknownApplication(app_id.clone()))?;
            let monitored = application.origins.get_mut(command.origin_id()).ok_or_else(|| {
                CommandError::UnknownOrigin {
                    application_id: app_id.clone(),
                    origin_id: command.origin_id().clone(),
                }
            })?;
            monitored.handle(event).then(|| application.snapshot(app_id))
        };
        self.notify(snapshot);
        Ok(())
    }

    /// Health monitor report: the origin answered its health check.
    pub fn origin_healthy(&self, app_id: &Id, origin_id: &Id) {
        self.on_health_event(app_id, origin_id, OriginEvent::Healthy);
    }

    /// Health monitor report: the origin failed its health check.
    pub fn origin_unhealthy(&self, app_id: &Id, origin_id: &Id) {
        self.on_health_event(app_id, origin_id, OriginEvent::Unhealthy);
    }

    fn on_health_event(&self, app_id: &Id, origin_id: &Id, event: OriginEvent) {
        let _announcing = self.lock_announcements();
        let snapshot = {
            let mut applications = self.lock();
            applications.get_mut(app_id).and_then(|application| {
                let changed = application
                    .origins
                    .get_mut(origin_id)
                    .is_some_and(|monitored| monitored.handle(event));
                changed.then(|| application.snapshot(app_id))
            })
        };
        self.notify(snapshot);
    }

    pub fn snapshot(&self, app_id: &Id) -> Option<OriginsSnapshot> {
        self.lock().get(app_id).map(|application| application.snapshot(app_id))
    }

    /// Snapshots of every application, ordered by application id.
    pub fn snapshots(&self) -> Vec<OriginsSnapshot> {
        let applications = self.lock();
        let mut snapshots: Vec<_> = applications
            .iter()
            .map(|(app_id, application)| application.snapshot(app_id))
            .collect();
        snapshots.sort_by(|a, b| a.app_id.cmp(&b.app_id));
        snapshots
    }

    /// Origins currently admitted to receive traffic.
    pub fn active_origins(&self, app_id: &Id) -> Vec<Origin> {
        self.snapshot(app_id).map(|s| s.active).unwrap_or_default()
    }

    pub fn origin_state(&self, app_id: &Id, origin_id: &Id) -> Option<OriginState> {
        self.lock()
            .get(app_id)
            .and_then(|application| application.origins.get(origin_id))
            .map(|monitored| monitored.state)
    }

    /// Connection pool of an origin, for the load balancer to draw from.
    pub fn pool(&self, app_id: &Id, origin_id: &Id) -> Option<Arc<ConnectionPool>> {
        self.lock()
            .get(app_id)
            .and_then(|application| application.origins.get(origin_id))
            .map(|monitored| monitored.pool.clone())
    }

    /// Re-announce every application's snapshot.
    pub fn notify_all(&self) {
        let _announcing = self.lock_announcements();
        for snapshot in self.snapshots() {
            self.notify(Some(snapshot));
        }
    }

    /// Close every pool and forget all applications.
    pub fn close(&self) {
        let app_ids: Vec<Id> = self.lock().keys().cloned().collect();
        for app_id in app_ids {
            self.remove_application(&app_id);
        }
    }

    fn notify(&self, snapshot: Option<OriginsSnapshot>) {
        if let Some(snapshot) = snapshot {
            self.listeners.announce(|l| l.origins_changed(&snapshot));
        }
    }

    fn lock_announcements(&self) -> MutexGuard<'_, ()> {
        self.announcing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Id, Application>> {
        self.applications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for OriginsInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeListener<BackendService> for OriginsInventory {
    fn on_change(&self, changes: &Changes<BackendService>) {
        for service in changes.added_and_updated() {
            self.set_origins(service);
        }
        for service in changes.removed() {
            self.remove_application(&service.id);
        }
    }
}

/// Publishes every origins snapshot into a `ConfigStore` under
/// `origins.<app_id>`, so other components can `watch` origin health.
pub struct OriginsStatusPublisher {
    store: Arc<ConfigStore>,
}

impl OriginsStatusPublisher {
    pub const ROOT_KEY: &'static str = "origins";

    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub fn key_for(app_id: &Id) -> String {
        format!("{}.{}", Self::ROOT_KEY, app_id)
    }
}

impl OriginsChangeListener for OriginsStatusPublisher {
    fn origins_changed(&self, snapshot: &OriginsSnapshot) {
        self.store.set(Self::key_for(&snapshot.app_id), snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origins::connection::Connection;

    fn shop() -> BackendService {
        BackendService::new("shop", "/shop")
            .with_origin("shop-01", "localhost:9091")
            .with_origin("shop-02", "localhost:9092")
    }

    fn ids(origins: &[Origin]) -> Vec<&str> {
        origins.iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn state_machine_transitions() {
        use OriginEvent::*;
        use OriginState::*;

        assert_eq!(transition(Active, Unhealthy), Inactive);
        assert_eq!(transition(Inactive, Healthy), Active);
        assert_eq!(transition(Active, Disable), Disabled);
        assert_eq!(transition(Inactive, Disable), Disabled);
        assert_eq!(transition(Disabled, Enable), Inactive);
        assert_eq!(transition(Disabled, Healthy), Disabled);
        assert_eq!(transition(Active, Enable), Active);
    }

    #[test]
    fn new_origins_start_active() {
        let inventory = OriginsInventory::new();
        inventory.set_origins(&shop());

        assert_eq!(ids(&inventory.active_origins(&Id::new("shop"))), vec!["shop-01", "shop-02"]);
    }

    #[test]
    fn disable_and_enable_commands() {
        let inventory = OriginsInventory::new();
        inventory.set_origins(&shop());
        let app = Id::new("shop");
        let origin = Id::new("shop-01");

        inventory.on_command(&OriginCommand::disable("shop", "shop-01")).unwrap();
        assert_eq!(inventory.origin_state(&app, &origin), Some(OriginState::Disabled));

        // Health reports do not resurrect a disabled origin.
        inventory.origin_healthy(&app, &origin);
        assert_eq!(inventory.origin_state(&app, &origin), Some(OriginState::Disabled));

        inventory.on_command(&OriginCommand::enable("shop", "shop-01")).unwrap();
        assert_eq!(inventory.origin_state(&app, &origin), Some(OriginState::Inactive));

        inventory.origin_healthy(&app, &origin);
        assert_eq!(inventory.origin_state(&app, &origin), Some(OriginState::Active));
    }

    #[test]
    fn commands_for_unknown_targets_fail() {
        let inventory = OriginsInventory::new();
        inventory.set_origins(&shop());

        assert_eq!(
            inventory.on_command(&OriginCommand::disable("landing", "x")),
            Err(CommandError::UnknownApplication(Id::new("landing")))
        );
        assert!(matches!(
            inventory.on_command(&OriginCommand::disable("shop", "shop-99")),
            Err(CommandError::UnknownOrigin { .. })
        ));
    }

    #[test]
    fn unchanged_origins_keep_state_across_updates() {
        let inventory = OriginsInventory::new();
        inventory.set_origins(&shop());
        let app = Id::new("shop");
        inventory.origin_unhealthy(&app, &Id::new("shop-01"));

        let updated = shop().with_origin("shop-03", "localhost:9093");
        inventory.set_origins(&updated);

        let snapshot = inventory.snapshot(&app).unwrap();
        assert_eq!(ids(&snapshot.inactive), vec!["shop-01"]);
        assert_eq!(ids(&snapshot.active), vec!["shop-02", "shop-03"]);
    }

    #[test]
    fn listeners_receive_snapshots_on_change_only() {
        let inventory = OriginsInventory::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        inventory.add_origins_change_listener(Arc::new(move |s: &OriginsSnapshot| {
            sink.lock().unwrap().push(s.clone());
        }));

        inventory.set_origins(&shop());
        inventory.set_origins(&shop());
        inventory.origin_healthy(&Id::new("shop"), &Id::new("shop-01"));

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn removed_application_closes_pools() {
        let inventory = OriginsInventory::new();
        inventory.set_origins(&shop());
        let app = Id::new("shop");
        let pool = inventory.pool(&app, &Id::new("shop-01")).unwrap();
        let connection = pool.open_connection().unwrap();

        inventory.remove_application(&app);

        assert!(pool.is_closed());
        assert!(!connection.is_connected());
        assert!(inventory.snapshot(&app).is_none());
    }

    #[test]
    fn snapshots_are_published_in_state_change_order() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;
        use std::time::Duration;

        let inventory = Arc::new(OriginsInventory::new());
        inventory.set_origins(&shop());
        let app = Id::new("shop");

        // Stalls on the first snapshot that shows a disabled origin.
        let stalled = Arc::new(AtomicBool::new(false));
        let gate = stalled.clone();
        inventory.add_origins_change_listener(Arc::new(move |s: &OriginsSnapshot| {
            if !s.disabled.is_empty() && !gate.swap(true, Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(100));
            }
        }));
        let store = Arc::new(ConfigStore::new());
        inventory.add_origins_change_listener(Arc::new(OriginsStatusPublisher::new(store.clone())));

        let disabler = {
            let inventory = inventory.clone();
            thread::spawn(move || {
                inventory
                    .on_command(&OriginCommand::disable("shop", "shop-01"))
                    .unwrap()
            })
        };
        thread::sleep(Duration::from_millis(30));
        inventory.origin_unhealthy(&app, &Id::new("shop-02"));
        disabler.join().unwrap();

        assert!(stalled.load(Ordering::SeqCst));
        let published = store
            .get::<OriginsSnapshot>(&OriginsStatusPublisher::key_for(&app))
            .unwrap()
            .unwrap();
        assert_eq!(*published, inventory.snapshot(&app).unwrap());
        assert_eq!(ids(&published.inactive), vec!["shop-02"]);
        assert_eq!(ids(&published.disabled), vec!["shop-01"]);
    }

    /// Captures the last value set on each `origin_status` gauge, by origin.
    #[derive(Default)]
    struct GaugeRecorder {
        values: Arc<Mutex<HashMap<String, f64>>>,
    }

    struct OriginGauge {
        origin: String,
        values: Arc<Mutex<HashMap<String, f64>>>,
    }

    impl ::metrics::GaugeFn for OriginGauge {
        fn increment(&self, _value: f64) {}

        fn decrement(&self, _value: f64) {}

        fn set(&self, value: f64) {
            self.values.lock().unwrap().insert(self.origin.clone(), value);
        }
    }

    impl ::metrics::Recorder for GaugeRecorder {
        fn describe_counter(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}

        fn describe_gauge(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}

        fn describe_histogram(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}

        fn register_counter(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Counter {
            ::metrics::Counter::noop()
        }

        fn register_gauge(&self, key: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Gauge {
            let origin = key
                .labels()
                .find(|label| label.key() == "origin")
                .map(|label| label.value().to_string())
                .unwrap_or_default();
            ::metrics::Gauge::from_arc(Arc::new(OriginGauge {
                origin,
                values: self.values.clone(),
            }))
        }

        fn register_histogram(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Histogram {
            ::metrics::Histogram::noop()
        }
    }

    impl GaugeRecorder {
        fn value(&self, origin: &str) -> Option<f64> {
            self.values.lock().unwrap().get(origin).copied()
        }
    }

    #[test]
    fn removed_origins_retire_their_gauge() {
        let recorder = GaugeRecorder::default();

        ::metrics::with_local_recorder(&recorder, || {
            let inventory = OriginsInventory::new();
            inventory.set_origins(&shop());
            inventory.on_command(&OriginCommand::disable("shop", "shop-01")).unwrap();
            assert_eq!(recorder.value("shop-01"), Some(-1.0));

            inventory.set_origins(
                &BackendService::new("shop", "/shop").with_origin("shop-01", "localhost:9091"),
            );
            assert_eq!(recorder.value("shop-01"), Some(-1.0));
            assert_eq!(recorder.value("shop-02"), Some(metrics::ORIGIN_REMOVED));

            inventory.remove_application(&Id::new("shop"));
        });

        assert_eq!(recorder.value("shop-01"), Some(metrics::ORIGIN_REMOVED));
    }
}
