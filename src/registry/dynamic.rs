//! Versioned, atomically swapped resource snapshot with change fan-out.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::observability::metrics;
use crate::registry::announcer::Announcer;
use crate::registry::changes::{changes, ChangeListener, Changes};
use crate::registry::id::{Id, Identifiable};

/// Errors returned by `Registry::set`. The snapshot is untouched when any of
/// these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two resources in the same collection share an id.
    #[error("duplicate resource id '{0}'")]
    DuplicateId(Id),

    /// The collection failed the registry's resource constraint.
    #[error("resource constraint failure: {0}")]
    ConstraintViolated(String),
}

type Constraint<T> = Box<dyn Fn(&[T]) -> bool + Send + Sync>;

/// Holds the current snapshot of a named resource collection.
///
/// `get` is lock-free. `set` is serialized: it diffs against the snapshot it
/// replaces, swaps, and then runs every listener on the calling thread before
/// returning. Listeners must therefore be quick, and must not call `set` on
/// the same registry from inside `on_change`.
pub struct Registry<T> {
    name: &'static str,
    snapshot: ArcSwap<Vec<T>>,
    update_lock: Mutex<()>,
    announcer: Announcer<dyn ChangeListener<T>>,
    constraint: Constraint<T>,
}

impl<T> Registry<T>
where
    T: Identifiable + Clone + PartialEq + Send + Sync + 'static,
{
    /// Create an empty registry accepting any collection.
    pub fn new(name: &'static str) -> Self {
        Self::with_constraint(name, |_| true)
    }

    /// Create an empty registry that refuses collections failing `constraint`.
    pub fn with_constraint<F>(name: &'static str, constraint: F) -> Self
    where
        F: Fn(&[T]) -> bool + Send + Sync + 'static,
    {
        Self {
            name,
            snapshot: ArcSwap::from_pointee(Vec::new()),
            update_lock: Mutex::new(()),
            announcer: Announcer::new(name),
            constraint: Box::new(constraint),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The latest fully constructed snapshot.
    pub fn get(&self) -> Arc<Vec<T>> {
        self.snapshot.load_full()
    }

    /// Replace the registry contents and notify listeners of the difference.
    ///
    /// Returns the computed changes. Listeners are only invoked when the
    /// changes are non-empty.
    pub fn set(&self, resources: Vec<T>) -> Result<Changes<T>, RegistryError> {
        check_distinct(&resources)?;

        if !(self.constraint)(&resources) {
            tracing::warn!(
                registry = self.name,
                resources = resources.len(),
                "Rejected resources failing registry constraint"
            );
            return Err(RegistryError::ConstraintViolated(format!(
                "{} rejected {} resources",
                self.name,
                resources.len()
            )));
        }

        let _guard = self
            .update_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.snapshot.load_full();
        let diff = changes(&resources, &current);
        self.snapshot.store(Arc::new(resources));

        if !diff.is_empty() {
            self.notify_listeners(&diff);
        }

        Ok(diff)
    }

    /// Register a listener. It immediately receives the current snapshot as
    /// "all added", then every later non-empty diff.
    ///
    /// The catch-up delivery is not atomic with a concurrent `set`: a diff
    /// swapped in between registration and catch-up may be observed again.
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener<T>>) -> &Self {
        self.announcer.add_listener(listener.clone());

        let current = self.snapshot.load_full();
        let catch_up = Changes::all_added(current.iter().cloned());
        self.announcer
            .announce_one(&*listener, |l| l.on_change(&catch_up));
        self
    }

    /// Deregister a listener by identity. Announcements already under way
    /// are not retracted.
    pub fn remove_listener(&self, listener: &Arc<dyn ChangeListener<T>>) -> &Self {
        if !self.announcer.remove_listener(listener) {
            tracing::debug!(registry = self.name, "Removing a listener that was not registered");
        }
        self
    }

    /// Number of registered listeners.
    pub fn listeners(&self) -> usize {
        self.announcer.listeners()
    }

    fn notify_listeners(&self, diff: &Changes<T>) {
        tracing::info!(
            registry = self.name,
            added = ?ids(diff.added()),
            removed = ?ids(diff.removed()),
            updated = ?ids(diff.updated()),
            listeners = self.announcer.listeners(),
            "Notifying listeners of registry changes"
        );
        metrics::record_registry_update(self.name, diff);

        self.announcer.announce(|l| l.on_change(diff));
    }
}

impl<T> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("resources", &self.snapshot.load().len())
            .field("announcer", &self.announcer)
            .finish()
    }
}

fn check_distinct<T: Identifiable>(resources: &[T]) -> Result<(), RegistryError> {
    let mut seen = HashSet::with_capacity(resources.len());
    for resource in resources {
        if !seen.insert(resource.id()) {
            return Err(RegistryError::DuplicateId(resource.id().clone()));
        }
    }
    Ok(())
}

fn ids<T: Identifiable>(resources: &[T]) -> Vec<&str> {
    resources.iter().map(|r| r.id().as_str()).collect()
}
