//! Transactions that stage writes locally and publish them on commit.
//!
//! Both backends share this machinery; the persistent backend adds a
//! [`CommitLog`] that makes each batch durable before it is published.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, RwLock, RwLockReadGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::contact::{Contact, ContactId, NewContact};
use crate::storage::index::{check_record, check_rewrite, CommitBatch, ContactIndex};
use crate::storage::locks::{HeldLocks, LockTable};
use crate::storage::traits::{ContactTransaction, LockKey, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Durable sink for committed batches.
pub(crate) trait CommitLog: Send + Sync {
    /// Make `batch` durable. Called with the index write lock held, so log
    /// order equals publish order.
    fn append(&self, batch: &CommitBatch) -> Result<(), StorageError>;
}

/// Hands out `(id, created_at)` pairs that increase together.
#[derive(Debug)]
struct IdAllocator {
    last: Mutex<(i64, DateTime<Utc>)>,
}

impl IdAllocator {
    fn starting_after(last_id: i64, last_created: DateTime<Utc>) -> Self {
        Self {
            last: Mutex::new((last_id, last_created)),
        }
    }

    fn next(&self) -> Result<(ContactId, DateTime<Utc>), StorageError> {
        let mut last = self.last.lock().map_err(|_| lock_err("ids.next"))?;
        let id = last.0 + 1;
        let now = Utc::now().max(last.1);
        *last = (id, now);
        Ok((ContactId::new(id), now))
    }
}

/// State shared by every transaction of one store.
#[derive(Debug)]
pub(crate) struct SharedState {
    index: RwLock<ContactIndex>,
    locks: LockTable,
    ids: IdAllocator,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::from_index(ContactIndex::default())
    }
}

impl SharedState {
    pub(crate) fn from_index(index: ContactIndex) -> Self {
        let last_id = index.max_id().map_or(0, ContactId::get);
        let last_created = index
            .contacts()
            .map(|c| c.created_at)
            .max()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            index: RwLock::new(index),
            locks: LockTable::default(),
            ids: IdAllocator::starting_after(last_id, last_created),
        }
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, ContactIndex>, StorageError> {
        self.index.read().map_err(|_| lock_err("index.read"))
    }

    pub(crate) fn all_contacts(&self) -> Result<Vec<Contact>, StorageError> {
        Ok(self.read()?.contacts().cloned().collect())
    }

    pub(crate) fn get(&self, id: ContactId) -> Result<Option<Contact>, StorageError> {
        Ok(self.read()?.get(id).cloned())
    }

    /// Run `f` with the index write lock held. Blocks all commits meanwhile.
    pub(crate) fn with_index_exclusive<T>(
        &self,
        f: impl FnOnce(&ContactIndex) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let index = self.index.write().map_err(|_| lock_err("index.exclusive"))?;
        f(&index)
    }

    #[cfg(test)]
    pub(crate) fn held_lock_count(&self) -> usize {
        self.locks.held_count()
    }
}

/// A transaction over a [`SharedState`].
pub(crate) struct StagedTransaction<'a> {
    shared: &'a SharedState,
    log: Option<&'a dyn CommitLog>,
    inserts: BTreeMap<ContactId, Contact>,
    updates: BTreeMap<ContactId, Contact>,
    held: HeldLocks<'a>,
}

impl<'a> StagedTransaction<'a> {
    pub(crate) fn new(shared: &'a SharedState, log: Option<&'a dyn CommitLog>) -> Self {
        Self {
            shared,
            log,
            inserts: BTreeMap::new(),
            updates: BTreeMap::new(),
            held: HeldLocks::new(&shared.locks),
        }
    }

    /// The version of `id` this transaction sees.
    fn visible(&self, index: &ContactIndex, id: ContactId) -> Option<Contact> {
        self.updates
            .get(&id)
            .or_else(|| self.inserts.get(&id))
            .or_else(|| index.get(id))
            .cloned()
    }

    /// Resolve candidate ids (committed matches plus everything staged) to
    /// visible contacts that satisfy `keep`.
    fn select(
        &self,
        index: &ContactIndex,
        committed: BTreeSet<ContactId>,
        keep: impl Fn(&Contact) -> bool,
    ) -> Vec<Contact> {
        let mut candidates = committed;
        candidates.extend(self.inserts.keys().copied());
        candidates.extend(self.updates.keys().copied());
        candidates
            .into_iter()
            .filter_map(|id| self.visible(index, id))
            .filter(|c| keep(c))
            .collect()
    }
}

impl ContactTransaction for StagedTransaction<'_> {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<Contact>, StorageError> {
        let index = self.shared.read()?;
        let committed = index.ids_by_email_or_phone(email, phone);
        Ok(self.select(&index, committed, |c| {
            (email.is_some() && c.email.as_deref() == email) || (phone.is_some() && c.phone.as_deref() == phone)
        }))
    }

    fn find_by_ids_or_linked_ids(&self, ids: &BTreeSet<ContactId>) -> Result<Vec<Contact>, StorageError> {
        let index = self.shared.read()?;
        let committed = index.ids_by_ids_or_linked(ids);
        Ok(self.select(&index, committed, |c| {
            ids.contains(&c.id) || c.linked_id.is_some_and(|l| ids.contains(&l))
        }))
    }

    fn insert(&mut self, contact: NewContact) -> Result<Contact, StorageError> {
        let (id, now) = self.shared.ids.next()?;
        let contact = contact.into_contact(id, now);
        check_record(&contact)?;
        self.inserts.insert(id, contact.clone());
        Ok(contact)
    }

    fn update_batch(&mut self, contacts: Vec<Contact>) -> Result<(), StorageError> {
        {
            let index = self.shared.read()?;
            for c in &contacts {
                let old = self.visible(&index, c.id).ok_or(StorageError::ContactNotFound(c.id))?;
                check_rewrite(&old, c)?;
            }
        }
        for c in contacts {
            if let Some(staged) = self.inserts.get_mut(&c.id) {
                *staged = c;
            } else {
                self.updates.insert(c.id, c);
            }
        }
        Ok(())
    }

    fn lock(&mut self, keys: &[LockKey], timeout: Duration) -> Result<(), StorageError> {
        self.shared.locks.acquire(keys, timeout, &mut self.held)
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let this = *self;
        if this.inserts.is_empty() && this.updates.is_empty() {
            return Ok(());
        }
        let batch = CommitBatch {
            inserts: this.inserts.into_values().collect(),
            updates: this.updates.into_values().collect(),
        };

        let mut index = this.shared.index.write().map_err(|_| lock_err("index.commit"))?;
        index.validate(&batch)?;
        if let Some(log) = this.log {
            log.append(&batch)?;
        }
        index.apply(&batch)?;
        drop(index);
        // `this.held` drops here, releasing locks after publish.
        Ok(())
    }
}
