//! Dynamic resource registry.
//!
//! # Data Flow
//! ```text
//! reload source (file watcher, discovery poll)
//!     → Registry::set(resources)
//!     → changes.rs (diff against the current snapshot)
//!     → atomic swap of Arc<Vec<T>>
//!     → announcer.rs (fan out non-empty Changes to listeners)
//!     → listeners (origins inventory, pools, admin views)
//!
//! New listener:
//!     Registry::add_listener
//!     → receives "everything added" for the current snapshot
//!     → then every subsequent non-empty diff
//! ```
//!
//! # Design Decisions
//! - Readers never lock; the snapshot lives in an `ArcSwap`
//! - Writers are serialized so diffs are gap-free and ordered
//! - Listeners run synchronously inside `set` and must not block
//! - A panicking listener is isolated from its peers and from the snapshot

pub mod announcer;
pub mod changes;
pub mod dynamic;
pub mod file_backed;
pub mod id;

pub use announcer::Announcer;
pub use changes::{changes, ChangeListener, Changes, ChangesBuilder};
pub use dynamic::{Registry, RegistryError};
pub use file_backed::{FileBackedRegistry, ReloadResult, ResourceReader};
pub use id::{Id, Identifiable};
