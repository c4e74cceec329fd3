//! Durable storage backend.
//!
//! A database is a directory:
//!
//! ```text
//! <dir>/.lock          exclusive OS lock, holds the owner's pid
//! <dir>/contacts.snap  last compacted snapshot (optional)
//! <dir>/contacts.wal   committed transactions since that snapshot
//! ```
//!
//! Reads are served from the same in-memory index the in-memory backend
//! uses. Commits are appended to the WAL before they are published, so a
//! crash loses at most transactions whose `commit` never returned.

mod codec;
mod file_lock;
mod store;
mod wal;

pub use store::{CompactionResult, PersistentContactStore};
pub use wal::{WalEntry, WalEntryKind};

use std::path::Path;

use crate::error::{ContactError, ContactResult, ValidationError};

/// Configuration for persistent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentConfig {
    /// WAL size that triggers compaction when the database is opened (bytes).
    pub max_wal_size: u64,
    /// Whether to fsync after every commit (slower but safer).
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            max_wal_size: 64 * 1024 * 1024,
            sync_on_write: true,
        }
    }
}

impl PersistentConfig {
    const MIN_WAL_SIZE: u64 = 4 * 1024;

    /// Checks the configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if `max_wal_size` is below 4 KiB.
    pub fn validate(self) -> ContactResult<Self> {
        if self.max_wal_size < Self::MIN_WAL_SIZE {
            return Err(ContactError::Validation(ValidationError::InvalidConfig {
                reason: format!(
                    "max_wal_size must be at least {} bytes (got {})",
                    Self::MIN_WAL_SIZE,
                    self.max_wal_size
                ),
            }));
        }
        Ok(self)
    }
}

/// Open or create a durable contact database at `path`.
///
/// # Errors
/// - If the directory cannot be created or accessed
/// - If another process holds the lock
/// - If the snapshot or WAL is corrupted
///
/// # Example
/// ```rust,ignore
/// use std::sync::Arc;
/// use contactgraph::storage::open_database;
/// use contactgraph::Reconciler;
///
/// let store = open_database("./contacts.db", None)?;
/// let reconciler = Reconciler::new(Arc::new(store));
/// ```
pub fn open_database(path: impl AsRef<Path>, config: Option<PersistentConfig>) -> ContactResult<PersistentContactStore> {
    let cfg = config.unwrap_or_default().validate()?;
    PersistentContactStore::open(path.as_ref(), cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejects_tiny_wal() {
        let err = PersistentConfig {
            max_wal_size: 100,
            ..PersistentConfig::default()
        }
        .validate()
        .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("max_wal_size"));
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfg = PersistentConfig::default().validate().unwrap();
        assert!(cfg.sync_on_write);
    }
}
