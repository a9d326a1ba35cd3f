//! The config store.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::config_store::entry::{downcast, ConfigEntry, ConfigStoreError, ConfigValue, RawEntry};
use crate::config_store::watch::{EntryWatch, Watch};
use crate::observability::metrics;

const DELIMITER: char = '.';

enum KeyMatcher {
    Exact(String),
    /// `root` itself and anything under `root.`.
    Tree(String),
}

impl KeyMatcher {
    fn matches(&self, key: &str) -> bool {
        match self {
            KeyMatcher::Exact(expected) => expected == key,
            KeyMatcher::Tree(root) => is_under(root, key),
        }
    }
}

fn is_under(root: &str, key: &str) -> bool {
    key == root
        || key
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with(DELIMITER))
}

struct Subscriber {
    matcher: KeyMatcher,
    tx: mpsc::UnboundedSender<RawEntry>,
}

/// Keyed values that components publish and watch.
///
/// Any `Send + Sync + 'static` type can be stored. Reads name the expected
/// type and fail with `ConfigStoreError::TypeMismatch` when it is wrong.
pub struct ConfigStore {
    values: DashMap<String, ConfigValue>,
    /// Guards publication order and replay/live handover.
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Store `value` under `key`, replacing any previous value, and publish it
    /// to every matching watcher.
    pub fn set<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        self.set_value(key, Arc::new(value));
    }

    /// Like `set`, for a value that is already shared.
    pub fn set_value(&self, key: impl Into<String>, value: ConfigValue) {
        let key = key.into();
        let mut subscribers = self.lock_subscribers();

        self.values.insert(key.clone(), value.clone());

        // Dropped watches are pruned here.
        subscribers.retain(|subscriber| {
            if !subscriber.matcher.matches(&key) {
                return !subscriber.tx.is_closed();
            }
            subscriber
                .tx
                .send(RawEntry {
                    key: key.clone(),
                    value: value.clone(),
                })
                .is_ok()
        });

        tracing::debug!(key = %key, watchers = subscribers.len(), "Config entry published");
        metrics::record_config_update();
    }

    /// The current value of `key`, untyped.
    pub fn get_value(&self, key: &str) -> Option<ConfigValue> {
        self.values.get(key).map(|value| value.clone())
    }

    /// The current value of `key` as a `V`.
    pub fn get<V: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<V>>, ConfigStoreError> {
        self.get_value(key)
            .map(|value| downcast::<V>(key, value))
            .transpose()
    }

    /// Subscribe to `key`: the current value is delivered first (if present),
    /// then every later update.
    pub fn watch<V: Any + Send + Sync>(&self, key: impl Into<String>) -> Watch<V> {
        let key = key.into();
        let rx = self.subscribe(KeyMatcher::Exact(key.clone()));
        Watch::new(key, rx)
    }

    /// Subscribe to `root_key` and every key under `root_key.`: all current
    /// entries are delivered first (ordered by key), then every later update.
    pub fn watch_all<V: Any + Send + Sync>(&self, root_key: impl Into<String>) -> EntryWatch<V> {
        let root_key = root_key.into();
        let rx = self.subscribe(KeyMatcher::Tree(root_key.clone()));
        EntryWatch::new(root_key, rx)
    }

    /// Current entries for `root_key` and every key under `root_key.`,
    /// ordered by key.
    pub fn starting_with<V: Any + Send + Sync>(
        &self,
        root_key: &str,
    ) -> Result<Vec<ConfigEntry<V>>, ConfigStoreError> {
        self.current_entries(&KeyMatcher::Tree(root_key.to_string()))
            .into_iter()
            .map(RawEntry::cast)
            .collect()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn subscribe(&self, matcher: KeyMatcher) -> mpsc::UnboundedReceiver<RawEntry> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.lock_subscribers();

        // No set can interleave here: replay and registration are one step.
        for entry in self.current_entries(&matcher) {
            // rx is alive in this scope, the send cannot fail.
            let _ = tx.send(entry);
        }
        subscribers.push(Subscriber { matcher, tx });

        rx
    }

    fn current_entries(&self, matcher: &KeyMatcher) -> Vec<RawEntry> {
        let mut entries: Vec<RawEntry> = self
            .values
            .iter()
            .filter(|entry| matcher.matches(entry.key()))
            .map(|entry| RawEntry {
                key: entry.key().clone(),
                value: entry.value().clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("keys", &self.keys())
            .field("watchers", &self.lock_subscribers().len())
            .finish()
    }
}
