//! Reactive config store: replay then live updates.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use proxy_registry::config_store::{ConfigStore, ConfigStoreError};

#[tokio::test]
async fn test_watch_replays_current_value_then_follows_updates() {
    let store = ConfigStore::new();
    store.set("timeout", 100u64);

    let mut watch = store.watch::<u64>("timeout");
    assert_eq!(*watch.recv().await.unwrap().unwrap(), 100);

    store.set("timeout", 200u64);
    store.set("timeout", 300u64);
    assert_eq!(*watch.recv().await.unwrap().unwrap(), 200);
    assert_eq!(*watch.recv().await.unwrap().unwrap(), 300);
    assert!(watch.try_recv().is_none());
}

#[tokio::test]
async fn test_watch_of_unset_key_waits_for_first_value() {
    let store = Arc::new(ConfigStore::new());
    let mut watch = store.watch::<String>("greeting");
    assert!(watch.try_recv().is_none());

    let writer = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.set("greeting", "hello".to_string());
    });

    let value = tokio::time::timeout(Duration::from_secs(1), watch.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(value.as_str(), "hello");
}

#[tokio::test]
async fn test_tree_watch_sees_children_only() {
    let store = ConfigStore::new();
    store.set("origins.shop", 1u32);
    store.set("originsx", 2u32);

    let mut watch = store.watch_all::<u32>("origins");
    let first = watch.recv().await.unwrap().unwrap();
    assert_eq!(first.key, "origins.shop");

    store.set("origins", 3u32);
    store.set("origins.search", 4u32);
    store.set("other", 5u32);

    let keys: Vec<String> = [watch.recv().await, watch.recv().await]
        .into_iter()
        .map(|entry| entry.unwrap().unwrap().key)
        .collect();
    assert_eq!(keys, vec!["origins".to_string(), "origins.search".to_string()]);
    assert!(watch.try_recv().is_none());
}

#[tokio::test]
async fn test_type_mismatch_is_reported_not_dropped() {
    let store = ConfigStore::new();
    store.set("limit", "ten".to_string());

    let mut watch = store.watch::<u64>("limit");
    assert!(matches!(
        watch.recv().await,
        Some(Err(ConfigStoreError::TypeMismatch { .. }))
    ));

    store.set("limit", 10u64);
    assert_eq!(*watch.recv().await.unwrap().unwrap(), 10);
}

#[tokio::test]
async fn test_dropped_watch_does_not_block_publishers() {
    let store = ConfigStore::new();
    drop(store.watch::<u64>("k"));

    store.set("k", 1u64);
    assert_eq!(*store.get::<u64>("k").unwrap().unwrap(), 1);
}

#[test]
fn test_watchers_racing_writer_see_gap_free_sequences() {
    const UPDATES: u64 = 2_000;
    const WATCHERS: usize = 8;

    let store = Arc::new(ConfigStore::new());

    let writer = {
        let store = store.clone();
        std::thread::spawn(move || {
            for i in 0..UPDATES {
                store.set("k", i);
            }
        })
    };
    let subscribers: Vec<_> = (0..WATCHERS)
        .map(|n| {
            let store = store.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_micros(50 * n as u64));
                store.watch::<u64>("k")
            })
        })
        .collect();

    writer.join().unwrap();
    for subscriber in subscribers {
        let mut watch = subscriber.join().unwrap();
        let seen: Vec<u64> = std::iter::from_fn(|| watch.try_recv())
            .map(|value| *value.unwrap())
            .collect();

        // Starts at whatever was current on subscribe, then no gap and no repeat.
        assert!(seen.windows(2).all(|pair| pair[1] == pair[0] + 1), "{:?}", seen);
        assert_eq!(seen.last(), Some(&(UPDATES - 1)));
    }
}
