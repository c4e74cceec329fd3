//! Whole-graph invariant checks.
//!
//! Storage enforces record-level rules on every write; the rules that span
//! records (links resolve, links point at primaries) only hold because every
//! writer goes through the reconciler. `check_invariants` verifies them over
//! a snapshot, for tests and for operators.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::contact::{Contact, ContactId};

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// A secondary links to an id that does not exist.
    DanglingLink {
        /// The secondary.
        id: ContactId,
        /// Its missing link target.
        linked_id: ContactId,
    },
    /// A secondary links to another secondary.
    LinkToSecondary {
        /// The secondary.
        id: ContactId,
        /// The secondary it links to.
        linked_id: ContactId,
    },
    /// A primary carries a link.
    PrimaryWithLink {
        /// The primary.
        id: ContactId,
    },
    /// A secondary carries no link.
    SecondaryWithoutLink {
        /// The secondary.
        id: ContactId,
    },
    /// Neither email nor phone is set.
    NoIdentifiers {
        /// The contact.
        id: ContactId,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingLink { id, linked_id } => {
                write!(f, "contact {id} links to missing contact {linked_id}")
            }
            Self::LinkToSecondary { id, linked_id } => {
                write!(f, "contact {id} links to secondary {linked_id}")
            }
            Self::PrimaryWithLink { id } => write!(f, "primary {id} carries a link"),
            Self::SecondaryWithoutLink { id } => write!(f, "secondary {id} has no link"),
            Self::NoIdentifiers { id } => write!(f, "contact {id} has neither email nor phone"),
        }
    }
}

/// Every invariant violation in `contacts`, in id order.
///
/// With no links chaining and every link resolving to a primary, each
/// connected cluster has exactly one primary.
#[must_use]
pub fn check_invariants(contacts: &[Contact]) -> Vec<InvariantViolation> {
    let by_id: HashMap<ContactId, &Contact> = contacts.iter().map(|c| (c.id, c)).collect();
    let mut sorted: Vec<&Contact> = contacts.iter().collect();
    sorted.sort_by_key(|c| c.id);

    let mut out = Vec::new();
    for c in sorted {
        if c.email.is_none() && c.phone.is_none() {
            out.push(InvariantViolation::NoIdentifiers { id: c.id });
        }
        match (c.is_primary(), c.linked_id) {
            (true, Some(_)) => out.push(InvariantViolation::PrimaryWithLink { id: c.id }),
            (true, None) => {}
            (false, None) => out.push(InvariantViolation::SecondaryWithoutLink { id: c.id }),
            (false, Some(linked_id)) => match by_id.get(&linked_id) {
                None => out.push(InvariantViolation::DanglingLink { id: c.id, linked_id }),
                Some(target) if !target.is_primary() => {
                    out.push(InvariantViolation::LinkToSecondary { id: c.id, linked_id });
                }
                Some(_) => {}
            },
        }
    }
    out
}
