//! Abstract storage traits for contactgraph.
//!
//! These traits define the contract that storage backends must implement.
//! By using traits, we enable:
//! - In-memory backends for testing and embedded use
//! - Persistent backends for production

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::contact::{Contact, ContactId, NewContact};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Contact not found.
    #[error("Contact not found: {0}")]
    ContactNotFound(ContactId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// A lock could not be acquired or the locked view went stale.
    /// The whole unit of work should be retried.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// A write would break a record-level rule.
    #[error("Invalid contact {id}: {reason}")]
    InvalidContact {
        /// Offending contact.
        id: ContactId,
        /// What was wrong.
        reason: String,
    },

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl StorageError {
    /// Returns true if the failed unit of work may succeed when retried from scratch.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Key of an exclusive reconciliation lock.
///
/// Keys are totally ordered; a transaction must request its whole key set in
/// one [`ContactTransaction::lock`] call so every holder acquires in the same
/// order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    /// Serializes first sightings of an email.
    Email(String),
    /// Serializes first sightings of a phone.
    Phone(String),
    /// Guards a cluster by its primary.
    Primary(ContactId),
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Identifier values stay out of messages and logs.
            Self::Email(v) => write!(f, "email:{}", crate::identity::fingerprint(Some(v))),
            Self::Phone(v) => write!(f, "phone:{}", crate::identity::fingerprint(Some(v))),
            Self::Primary(id) => write!(f, "primary:{id}"),
        }
    }
}

/// A contact store.
///
/// # Safety Considerations
/// - All mutations happen inside a [`ContactTransaction`]
/// - Implementations must handle concurrent transactions safely
pub trait ContactStore: Send + Sync {
    /// Open a new transaction.
    fn begin(&self) -> Result<Box<dyn ContactTransaction + '_>, StorageError>;

    /// Snapshot of every committed contact, ordered by id.
    fn all_contacts(&self) -> Result<Vec<Contact>, StorageError>;

    /// Get a committed contact by id.
    fn get(&self, id: ContactId) -> Result<Option<Contact>, StorageError>;
}

/// One isolated unit of work against a [`ContactStore`].
///
/// Reads observe committed state plus this transaction's own staged writes.
/// Writes become visible to others only on [`ContactTransaction::commit`];
/// dropping the transaction discards them and releases its locks.
pub trait ContactTransaction {
    /// Find contacts whose email equals `email` or whose phone equals `phone`.
    /// `None` terms do not participate. Results are ordered by id.
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<Contact>, StorageError>;

    /// Find contacts whose id or linked id is in `ids`. Results are ordered by id.
    fn find_by_ids_or_linked_ids(&self, ids: &BTreeSet<ContactId>) -> Result<Vec<Contact>, StorageError>;

    /// Stage a new contact. Assigns `id`, `created_at` and `updated_at`.
    ///
    /// # Errors
    /// - `InvalidContact` if the draft carries neither email nor phone
    fn insert(&mut self, contact: NewContact) -> Result<Contact, StorageError>;

    /// Stage rewrites of existing contacts as one batch. Either every row is
    /// staged or none is.
    ///
    /// # Errors
    /// - `ContactNotFound` if an id does not exist
    /// - `InvalidContact` if `created_at` changes or a secondary is promoted
    fn update_batch(&mut self, contacts: Vec<Contact>) -> Result<(), StorageError>;

    /// Acquire exclusive locks on `keys`, held until commit or drop.
    ///
    /// Keys are acquired in ascending order. Keys this transaction already
    /// holds are skipped.
    ///
    /// # Errors
    /// - `Conflict` if a key cannot be acquired within `timeout`
    fn lock(&mut self, keys: &[LockKey], timeout: Duration) -> Result<(), StorageError>;

    /// Publish all staged writes atomically and release locks.
    fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_contact_store_object_safe(_: &dyn ContactStore) {}
    fn _assert_contact_transaction_object_safe(_: &dyn ContactTransaction) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::ContactNotFound(ContactId::new(42));
        assert!(err.to_string().contains("Contact not found: 42"));

        let err = StorageError::BackendError("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
        assert!(!err.is_conflict());

        assert!(StorageError::Conflict("busy".to_string()).is_conflict());
    }

    #[test]
    fn test_lock_keys_order_identifiers_before_primaries() {
        let mut keys = vec![
            LockKey::Primary(ContactId::new(9)),
            LockKey::Phone("123".to_string()),
            LockKey::Primary(ContactId::new(2)),
            LockKey::Email("a@x".to_string()),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                LockKey::Email("a@x".to_string()),
                LockKey::Phone("123".to_string()),
                LockKey::Primary(ContactId::new(2)),
                LockKey::Primary(ContactId::new(9)),
            ]
        );
    }

    #[test]
    fn test_lock_key_display_hides_identifiers() {
        let shown = LockKey::Email("doc@hillvalley.edu".to_string()).to_string();
        assert!(shown.starts_with("email:"));
        assert!(!shown.contains("hillvalley"));
        assert_eq!(LockKey::Primary(ContactId::new(3)).to_string(), "primary:3");
    }
}
