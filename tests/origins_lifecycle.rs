//! Backend services file → registry → origins inventory → config store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proxy_registry::config::ProxyConfig;
use proxy_registry::lifecycle::Runtime;
use proxy_registry::origins::{
    Connection, ConnectionListener, OriginCommand, OriginState, OriginsSnapshot,
    OriginsStatusPublisher,
};
use proxy_registry::registry::{Id, ReloadResult};

mod common;
use common::{service_toml, TempFile};

fn runtime_for(file: &TempFile) -> Runtime {
    let mut config = ProxyConfig::default();
    config.backends.path = file.path().display().to_string();
    Runtime::build(&config)
}

#[test]
fn test_reload_populates_inventory_and_store() {
    let file = TempFile::new("services", &service_toml("shop", &[("shop-01", "10.0.0.1:80")]));
    let runtime = runtime_for(&file);

    assert!(runtime.reload().is_reloaded());

    let shop = Id::new("shop");
    assert_eq!(runtime.registry().get().len(), 1);
    assert_eq!(runtime.inventory().active_origins(&shop).len(), 1);

    let published = runtime
        .store()
        .get::<OriginsSnapshot>(&OriginsStatusPublisher::key_for(&shop))
        .unwrap()
        .unwrap();
    assert!(published.contains_origin(&Id::new("shop-01")));
}

#[test]
fn test_reload_outcomes() {
    let file = TempFile::new("services", &service_toml("shop", &[("shop-01", "10.0.0.1:80")]));
    let runtime = runtime_for(&file);

    assert!(runtime.reload().is_reloaded());
    assert!(matches!(runtime.reload(), ReloadResult::Unchanged(m) if m.ends_with("Identical file content.")));

    // Same services, different bytes.
    file.write(&format!("# comment\n{}", service_toml("shop", &[("shop-01", "10.0.0.1:80")])));
    assert!(matches!(runtime.reload(), ReloadResult::Unchanged(m) if m.ends_with("No semantic changes.")));

    file.write("[[services]");
    assert!(runtime.reload().is_failed());
    assert_eq!(runtime.registry().get().len(), 1);

    // An empty file would leave no services and is refused by default.
    file.write("");
    assert!(runtime.reload().is_failed());
    assert_eq!(runtime.registry().get().len(), 1);
}

#[test]
fn test_removed_service_closes_pools() {
    let file = TempFile::new(
        "services",
        &format!(
            "{}\n{}",
            service_toml("shop", &[("shop-01", "10.0.0.1:80")]),
            service_toml("search", &[("search-01", "10.0.1.1:80")])
        ),
    );
    let runtime = runtime_for(&file);
    runtime.reload();

    let search = Id::new("search");
    let pool = runtime.inventory().pool(&search, &Id::new("search-01")).unwrap();
    let connection = pool.open_connection().unwrap();

    file.write(&service_toml("shop", &[("shop-01", "10.0.0.1:80")]));
    assert!(runtime.reload().is_reloaded());

    assert!(runtime.inventory().snapshot(&search).is_none());
    assert!(pool.is_closed());
    assert!(!connection.is_connected());
}

#[test]
fn test_disable_command_survives_reload() {
    let file = TempFile::new(
        "services",
        &service_toml("shop", &[("shop-01", "10.0.0.1:80"), ("shop-02", "10.0.0.2:80")]),
    );
    let runtime = runtime_for(&file);
    runtime.reload();

    let shop = Id::new("shop");
    let command = OriginCommand::parse("disable_origin", "shop", "shop-02").unwrap();
    runtime.inventory().on_command(&command).unwrap();

    file.write(&service_toml(
        "shop",
        &[("shop-01", "10.0.0.1:80"), ("shop-02", "10.0.0.2:80"), ("shop-03", "10.0.0.3:80")],
    ));
    runtime.reload();

    assert_eq!(
        runtime.inventory().origin_state(&shop, &Id::new("shop-02")),
        Some(OriginState::Disabled)
    );
    let published = runtime
        .store()
        .get::<OriginsSnapshot>(&OriginsStatusPublisher::key_for(&shop))
        .unwrap()
        .unwrap();
    assert_eq!(published.active.len(), 2);
    assert_eq!(published.disabled.len(), 1);
}

struct CountingListener(AtomicUsize);

impl ConnectionListener for CountingListener {
    fn connection_closed(&self, _connection: &dyn Connection) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_connection_close_is_idempotent_across_threads() {
    let file = TempFile::new("services", &service_toml("shop", &[("shop-01", "10.0.0.1:80")]));
    let runtime = runtime_for(&file);
    runtime.reload();

    let pool = runtime.inventory().pool(&Id::new("shop"), &Id::new("shop-01")).unwrap();
    let connection = pool.open_connection().unwrap();
    let counter = Arc::new(CountingListener(AtomicUsize::new(0)));
    connection.add_connection_listener(counter.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let connection = connection.clone();
            std::thread::spawn(move || connection.close())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    assert!(!connection.is_connected());
    assert_eq!(pool.active_connections(), 0);
}
