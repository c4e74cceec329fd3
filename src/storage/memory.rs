//! In-memory storage backend.
//!
//! This module provides a thread-safe in-memory implementation of the storage traits.
//! It is intended for embedded usage, tests, and as a reference implementation.

use crate::contact::{Contact, ContactId};
use crate::storage::index::ContactIndex;
use crate::storage::staged::{SharedState, StagedTransaction};
use crate::storage::traits::{ContactStore, ContactTransaction, StorageError};

/// Thread-safe in-memory contact store.
#[derive(Debug, Default)]
pub struct InMemoryContactStore {
    shared: SharedState,
}

impl InMemoryContactStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `contacts`, for fixtures and imports.
    ///
    /// Ids and timestamps are taken as given; later inserts continue after the
    /// largest id.
    ///
    /// # Errors
    /// - `DuplicateKey` if two contacts share an id
    /// - `InvalidContact` if a contact breaks a record rule
    pub fn with_contacts(contacts: Vec<Contact>) -> Result<Self, StorageError> {
        Ok(Self {
            shared: SharedState::from_index(ContactIndex::from_contacts(contacts)?),
        })
    }

    /// Number of stored contacts.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.shared.read()?.len())
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl ContactStore for InMemoryContactStore {
    fn begin(&self) -> Result<Box<dyn ContactTransaction + '_>, StorageError> {
        Ok(Box::new(StagedTransaction::new(&self.shared, None)))
    }

    fn all_contacts(&self) -> Result<Vec<Contact>, StorageError> {
        self.shared.all_contacts()
    }

    fn get(&self, id: ContactId) -> Result<Option<Contact>, StorageError> {
        self.shared.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    use chrono::Utc;

    use crate::contact::NewContact;
    use crate::storage::traits::LockKey;

    #[test]
    fn test_insert_commit_and_get() {
        let store = InMemoryContactStore::new();
        let mut tx = store.begin().unwrap();
        let c = tx
            .insert(NewContact::primary(Some("lorraine@hillvalley.edu".into()), Some("123456".into())))
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(store.get(c.id).unwrap(), Some(c));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_uncommitted_writes_are_invisible() {
        let store = InMemoryContactStore::new();
        {
            let mut tx = store.begin().unwrap();
            tx.insert(NewContact::primary(Some("a@x".into()), None)).unwrap();
        }
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_seeded_store_continues_ids() {
        let now = Utc::now();
        let seeded = NewContact::primary(Some("a@x".into()), None).into_contact(ContactId::new(40), now);
        let store = InMemoryContactStore::with_contacts(vec![seeded]).unwrap();

        let mut tx = store.begin().unwrap();
        let next = tx.insert(NewContact::primary(Some("b@x".into()), None)).unwrap();
        assert_eq!(next.id, ContactId::new(41));
        assert!(next.created_at >= now);
    }

    #[test]
    fn test_merge_batch_is_atomic() {
        let store = InMemoryContactStore::new();
        let (a, b) = {
            let mut tx = store.begin().unwrap();
            let a = tx.insert(NewContact::primary(Some("a@x".into()), None)).unwrap();
            let b = tx.insert(NewContact::primary(Some("b@x".into()), None)).unwrap();
            tx.commit().unwrap();
            (a, b)
        };

        let mut tx = store.begin().unwrap();
        let ghost = NewContact::primary(Some("g@x".into()), None).into_contact(ContactId::new(999), Utc::now());
        let err = tx
            .update_batch(vec![b.demoted_to(a.id, Utc::now()), ghost])
            .unwrap_err();
        assert!(matches!(err, StorageError::ContactNotFound(_)));
        tx.commit().unwrap();

        assert!(store.get(b.id).unwrap().unwrap().is_primary());
    }

    #[test]
    fn test_locks_exclude_other_transactions() {
        let store = InMemoryContactStore::new();
        let key = LockKey::Primary(ContactId::new(1));

        let mut first = store.begin().unwrap();
        first.lock(&[key.clone()], Duration::from_millis(10)).unwrap();

        let mut second = store.begin().unwrap();
        let err = second.lock(&[key.clone()], Duration::from_millis(20)).unwrap_err();
        assert!(err.is_conflict());

        first.commit().unwrap();
        second.lock(&[key], Duration::from_millis(20)).unwrap();
    }

    #[test]
    fn test_linked_lookup_spans_committed_and_staged() {
        let store = InMemoryContactStore::new();
        let p = {
            let mut tx = store.begin().unwrap();
            let p = tx.insert(NewContact::primary(Some("p@x".into()), None)).unwrap();
            tx.commit().unwrap();
            p
        };

        let mut tx = store.begin().unwrap();
        let s = tx.insert(NewContact::secondary(None, Some("2".into()), p.id)).unwrap();
        let cluster = tx
            .find_by_ids_or_linked_ids(&BTreeSet::from([p.id]))
            .unwrap();
        assert_eq!(cluster.iter().map(|c| c.id).collect::<Vec<_>>(), vec![p.id, s.id]);
    }
}
