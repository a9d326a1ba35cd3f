//! Structural diff between two resource collections.
//!
//! # Responsibilities
//! - Project both collections to `Id -> resource` maps
//! - Classify ids as added, removed or updated
//! - Carry the result to listeners as an immutable `Changes<T>`
//!
//! # Design Decisions
//! - O(n) via hash projections, no pairwise comparison
//! - Only set membership is contractual; output follows input order
//!   for readability of logs and nothing more
//! - Duplicate ids inside one input collapse to the last element;
//!   `Registry::set` rejects such input before diffing

use std::collections::HashMap;
use std::fmt;

use crate::registry::id::{Id, Identifiable};

/// Receives registry diffs.
///
/// Implementations run on the thread calling `Registry::set` and must return
/// quickly. Offload slow work to a task or channel.
pub trait ChangeListener<T>: Send + Sync {
    fn on_change(&self, changes: &Changes<T>);
}

impl<T, F> ChangeListener<T> for F
where
    F: Fn(&Changes<T>) + Send + Sync,
{
    fn on_change(&self, changes: &Changes<T>) {
        self(changes)
    }
}

/// The added / removed / updated sets between two snapshots.
#[derive(Clone)]
pub struct Changes<T> {
    added: Vec<T>,
    removed: Vec<T>,
    updated: Vec<T>,
}

impl<T> Changes<T> {
    /// Start building a `Changes` value.
    pub fn builder() -> ChangesBuilder<T> {
        ChangesBuilder::default()
    }

    /// Changes describing every given resource as newly added.
    pub fn all_added(resources: impl IntoIterator<Item = T>) -> Self {
        Self::builder().added(resources).build()
    }

    /// Resources whose id exists only in the new collection.
    pub fn added(&self) -> &[T] {
        &self.added
    }

    /// Resources whose id exists only in the previous collection.
    pub fn removed(&self) -> &[T] {
        &self.removed
    }

    /// Resources present in both collections with a different value.
    /// These are the new values.
    pub fn updated(&self) -> &[T] {
        &self.updated
    }

    /// Everything a listener needs to (re)build: added followed by updated.
    pub fn added_and_updated(&self) -> impl Iterator<Item = &T> {
        self.added.iter().chain(self.updated.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    /// Total number of resources mentioned by this diff.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.updated.len()
    }
}

impl<T: PartialEq> PartialEq for Changes<T> {
    fn eq(&self, other: &Self) -> bool {
        same_members(&self.added, &other.added)
            && same_members(&self.removed, &other.removed)
            && same_members(&self.updated, &other.updated)
    }
}

fn same_members<T: PartialEq>(left: &[T], right: &[T]) -> bool {
    left.len() == right.len() && right.iter().all(|item| left.contains(item))
}

impl<T: fmt::Debug> fmt::Debug for Changes<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Changes")
            .field("added", &self.added)
            .field("removed", &self.removed)
            .field("updated", &self.updated)
            .finish()
    }
}

/// Builder for `Changes`.
pub struct ChangesBuilder<T> {
    added: Vec<T>,
    removed: Vec<T>,
    updated: Vec<T>,
}

impl<T> Default for ChangesBuilder<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            updated: Vec::new(),
        }
    }
}

impl<T> ChangesBuilder<T> {
    pub fn added(mut self, resources: impl IntoIterator<Item = T>) -> Self {
        self.added.extend(resources);
        self
    }

    pub fn removed(mut self, resources: impl IntoIterator<Item = T>) -> Self {
        self.removed.extend(resources);
        self
    }

    pub fn updated(mut self, resources: impl IntoIterator<Item = T>) -> Self {
        self.updated.extend(resources);
        self
    }

    pub fn build(self) -> Changes<T> {
        Changes {
            added: self.added,
            removed: self.removed,
            updated: self.updated,
        }
    }
}

/// Compute the diff that turns `current` into `new`.
pub fn changes<T>(new: &[T], current: &[T]) -> Changes<T>
where
    T: Identifiable + Clone + PartialEq,
{
    let new_by_id = by_id(new);
    let current_by_id = by_id(current);

    let mut builder = Changes::builder();

    for resource in distinct(new, &new_by_id) {
        match current_by_id.get(resource.id()) {
            None => builder.added.push(resource.clone()),
            Some(previous) if *previous != resource => builder.updated.push(resource.clone()),
            Some(_) => {}
        }
    }

    for resource in distinct(current, &current_by_id) {
        if !new_by_id.contains_key(resource.id()) {
            builder.removed.push(resource.clone());
        }
    }

    builder.build()
}

fn by_id<T: Identifiable>(resources: &[T]) -> HashMap<&Id, &T> {
    resources.iter().map(|r| (r.id(), r)).collect()
}

// Yields each resource that won the id projection, in input order.
fn distinct<'a, T: Identifiable>(
    resources: &'a [T],
    projection: &'a HashMap<&'a Id, &'a T>,
) -> impl Iterator<Item = &'a T> + 'a {
    resources.iter().filter(move |r| {
        projection
            .get(r.id())
            .is_some_and(|winner| std::ptr::eq(*winner, *r))
    })
}
