//! Replay-then-live subscriptions.

use std::any::Any;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::config_store::entry::{downcast, ConfigEntry, ConfigStoreError, RawEntry};

/// Values of a single key: the current value (if any) followed by every
/// later update, in publication order.
///
/// Ends only when the store itself is dropped. Dropping the `Watch`
/// unsubscribes.
pub struct Watch<V> {
    key: String,
    rx: mpsc::UnboundedReceiver<RawEntry>,
    _value: PhantomData<fn() -> V>,
}

impl<V: Any + Send + Sync> Watch<V> {
    pub(crate) fn new(key: String, rx: mpsc::UnboundedReceiver<RawEntry>) -> Self {
        Self {
            key,
            rx,
            _value: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next value.
    pub async fn recv(&mut self) -> Option<Result<Arc<V>, ConfigStoreError>> {
        self.rx.recv().await.map(typed)
    }

    /// Take the next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<Result<Arc<V>, ConfigStoreError>> {
        self.rx.try_recv().ok().map(typed)
    }
}

impl<V: Any + Send + Sync> Stream for Watch<V> {
    type Item = Result<Arc<V>, ConfigStoreError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx).map(|entry| entry.map(typed))
    }
}

fn typed<V: Any + Send + Sync>(entry: RawEntry) -> Result<Arc<V>, ConfigStoreError> {
    downcast::<V>(&entry.key, entry.value)
}

/// Entries of a key tree (`root` and `root.*`): all current entries first,
/// then every later update under the tree.
pub struct EntryWatch<V> {
    root_key: String,
    rx: mpsc::UnboundedReceiver<RawEntry>,
    _value: PhantomData<fn() -> V>,
}

impl<V: Any + Send + Sync> EntryWatch<V> {
    pub(crate) fn new(root_key: String, rx: mpsc::UnboundedReceiver<RawEntry>) -> Self {
        Self {
            root_key,
            rx,
            _value: PhantomData,
        }
    }

    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    pub async fn recv(&mut self) -> Option<Result<ConfigEntry<V>, ConfigStoreError>> {
        self.rx.recv().await.map(RawEntry::cast)
    }

    pub fn try_recv(&mut self) -> Option<Result<ConfigEntry<V>, ConfigStoreError>> {
        self.rx.try_recv().ok().map(RawEntry::cast)
    }
}

impl<V: Any + Send + Sync> Stream for EntryWatch<V> {
    type Item = Result<ConfigEntry<V>, ConfigStoreError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx).map(|entry| entry.map(RawEntry::cast))
    }
}
