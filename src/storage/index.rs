//! Committed contact state with secondary indexes.
//!
//! Shared by the in-memory and persistent backends. Mutation happens only
//! through [`ContactIndex::apply`], one committed batch at a time.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::contact::{Contact, ContactId, LinkPrecedence};
use crate::storage::traits::StorageError;

/// The writes of one committed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitBatch {
    /// Newly created contacts.
    pub inserts: Vec<Contact>,
    /// Rewritten existing contacts.
    pub updates: Vec<Contact>,
}

impl CommitBatch {
    /// Returns true when the batch carries no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }
}

/// Record-level rules every stored contact obeys.
pub(crate) fn check_record(contact: &Contact) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidContact {
        id: contact.id,
        reason: reason.to_string(),
    };
    if contact.email.is_none() && contact.phone.is_none() {
        return Err(invalid("email and phone are both empty"));
    }
    match (contact.precedence, contact.linked_id) {
        (LinkPrecedence::Primary, Some(_)) => Err(invalid("primary carries a link")),
        (LinkPrecedence::Secondary, None) => Err(invalid("secondary has no link")),
        (LinkPrecedence::Secondary, Some(link)) if link == contact.id => {
            Err(invalid("secondary links to itself"))
        }
        _ => Ok(()),
    }
}

/// Rules for rewriting `old` as `new`.
pub(crate) fn check_rewrite(old: &Contact, new: &Contact) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidContact {
        id: new.id,
        reason: reason.to_string(),
    };
    if old.created_at != new.created_at {
        return Err(invalid("created_at is immutable"));
    }
    if old.precedence == LinkPrecedence::Secondary && new.precedence == LinkPrecedence::Primary {
        return Err(invalid("secondary cannot be promoted"));
    }
    check_record(new)
}

fn index_add(map: &mut HashMap<String, BTreeSet<ContactId>>, key: Option<&String>, id: ContactId) {
    if let Some(k) = key {
        map.entry(k.clone()).or_default().insert(id);
    }
}

fn index_remove(map: &mut HashMap<String, BTreeSet<ContactId>>, key: Option<&String>, id: ContactId) {
    if let Some(k) = key {
        if let Some(ids) = map.get_mut(k) {
            ids.remove(&id);
            if ids.is_empty() {
                map.remove(k);
            }
        }
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct ContactIndex {
    by_id: BTreeMap<ContactId, Contact>,
    by_email: HashMap<String, BTreeSet<ContactId>>,
    by_phone: HashMap<String, BTreeSet<ContactId>>,
    by_linked: HashMap<ContactId, BTreeSet<ContactId>>,
}

impl ContactIndex {
    pub(crate) fn from_contacts(contacts: Vec<Contact>) -> Result<Self, StorageError> {
        let mut index = Self::default();
        index.apply(&CommitBatch {
            inserts: contacts,
            updates: Vec::new(),
        })?;
        Ok(index)
    }

    pub(crate) fn get(&self, id: ContactId) -> Option<&Contact> {
        self.by_id.get(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    pub(crate) fn max_id(&self) -> Option<ContactId> {
        self.by_id.keys().next_back().copied()
    }

    pub(crate) fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.by_id.values()
    }

    pub(crate) fn ids_by_email_or_phone(&self, email: Option<&str>, phone: Option<&str>) -> BTreeSet<ContactId> {
        let mut out = BTreeSet::new();
        if let Some(ids) = email.and_then(|e| self.by_email.get(e)) {
            out.extend(ids.iter().copied());
        }
        if let Some(ids) = phone.and_then(|p| self.by_phone.get(p)) {
            out.extend(ids.iter().copied());
        }
        out
    }

    pub(crate) fn ids_by_ids_or_linked(&self, ids: &BTreeSet<ContactId>) -> BTreeSet<ContactId> {
        let mut out = BTreeSet::new();
        for id in ids {
            if self.by_id.contains_key(id) {
                out.insert(*id);
            }
            if let Some(linked) = self.by_linked.get(id) {
                out.extend(linked.iter().copied());
            }
        }
        out
    }

    /// Check a batch against current state without applying it.
    pub(crate) fn validate(&self, batch: &CommitBatch) -> Result<(), StorageError> {
        let mut fresh = BTreeSet::new();
        for c in &batch.inserts {
            if self.by_id.contains_key(&c.id) || !fresh.insert(c.id) {
                return Err(StorageError::DuplicateKey(c.id.to_string()));
            }
            check_record(c)?;
        }
        for c in &batch.updates {
            let old = self.by_id.get(&c.id).ok_or(StorageError::ContactNotFound(c.id))?;
            check_rewrite(old, c)?;
        }
        Ok(())
    }

    /// Validate then apply a batch. Nothing is applied if validation fails.
    pub(crate) fn apply(&mut self, batch: &CommitBatch) -> Result<(), StorageError> {
        self.validate(batch)?;
        for c in &batch.inserts {
            self.put(c.clone());
        }
        for c in &batch.updates {
            self.put(c.clone());
        }
        Ok(())
    }

    fn put(&mut self, contact: Contact) {
        let id = contact.id;
        if let Some(old) = self.by_id.remove(&id) {
            index_remove(&mut self.by_email, old.email.as_ref(), id);
            index_remove(&mut self.by_phone, old.phone.as_ref(), id);
            if let Some(link) = old.linked_id {
                if let Some(set) = self.by_linked.get_mut(&link) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.by_linked.remove(&link);
                    }
                }
            }
        }
        index_add(&mut self.by_email, contact.email.as_ref(), id);
        index_add(&mut self.by_phone, contact.phone.as_ref(), id);
        if let Some(link) = contact.linked_id {
            self.by_linked.entry(link).or_default().insert(id);
        }
        self.by_id.insert(id, contact);
    }
}
