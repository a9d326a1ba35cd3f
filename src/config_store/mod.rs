//! Keyed store of live configuration values.
//!
//! # Data Flow
//! ```text
//! ConfigStore::set(key, value)
//!     → values (DashMap, point reads never wait on publishers)
//!     → every Watch whose key matches, in publication order
//!
//! ConfigStore::watch(key)
//!     → current value replayed first, if any
//!     → then every later set of that key
//! ```
//!
//! # Design Decisions
//! - Values are `Arc<dyn Any + Send + Sync>`; the type is checked on read
//!   and a mismatch is a `ConfigStoreError::TypeMismatch`
//! - Publication and subscription share one lock, so the replayed value
//!   and the live stream hand over with no gap and no duplicate
//! - Watches are unbounded channels; dropping a `Watch` unsubscribes

pub mod entry;
pub mod store;
pub mod watch;

pub use entry::{ConfigEntry, ConfigStoreError, ConfigValue};
pub use store::ConfigStore;
pub use watch::{EntryWatch, Watch};
