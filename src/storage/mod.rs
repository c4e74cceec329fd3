//! Storage for the contact graph.
//!
//! [`ContactStore`] and [`ContactTransaction`] are the abstract contract; the
//! in-memory backend is always available and the durable backend is behind the
//! `persistent` feature. Both share one committed index and one lock table.

mod index;
mod locks;
mod memory;
mod staged;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use index::CommitBatch;
pub use memory::InMemoryContactStore;
pub use traits::{ContactStore, ContactTransaction, LockKey, StorageError};

#[cfg(feature = "persistent")]
pub use persistent::{open_database, PersistentConfig, PersistentContactStore};
