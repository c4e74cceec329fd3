//! Contact records and identity links.
//!
//! A `Contact` is the only entity in the graph. Each person is represented
//! by one `Primary` contact; every other record known to belong to the same
//! person is a `Secondary` linked directly to that primary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage-assigned contact identifier.
///
/// Ids are strictly increasing across creations, so a larger id is always
/// the more recently created record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(i64);

impl ContactId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ContactId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl From<ContactId> for i64 {
    fn from(id: ContactId) -> Self {
        id.0
    }
}

/// Role of a contact within its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
    /// The canonical record of an identity.
    Primary,
    /// A record subordinate to a primary.
    Secondary,
}

impl LinkPrecedence {
    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for LinkPrecedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored contact record.
///
/// Values are immutable by convention: merge operations produce new values via
/// [`Contact::demoted_to`] and [`Contact::relinked_to`] which are then written back
/// through an explicit batch update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Storage-assigned id.
    pub id: ContactId,
    /// Email address, if known.
    pub email: Option<String>,
    /// Phone number, if known.
    pub phone: Option<String>,
    /// The primary this contact belongs to. Set only for secondaries.
    pub linked_id: Option<ContactId>,
    /// Primary or secondary.
    pub precedence: LinkPrecedence,
    /// Creation time; the authoritative "who is older" key.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Carried through storage, never set here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Contact {
    /// Returns true for primary contacts.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.precedence == LinkPrecedence::Primary
    }

    /// Returns true for secondary contacts.
    #[must_use]
    pub fn is_secondary(&self) -> bool {
        self.precedence == LinkPrecedence::Secondary
    }

    /// The id of the primary this contact answers to: its own id when it is a
    /// primary, its link otherwise.
    ///
    /// Returns `None` only for a secondary with no link, which is a broken record.
    #[must_use]
    pub fn primary_id(&self) -> Option<ContactId> {
        match self.precedence {
            LinkPrecedence::Primary => Some(self.id),
            LinkPrecedence::Secondary => self.linked_id,
        }
    }

    /// Total order key for seniority: older first, smaller id on ties.
    #[must_use]
    pub fn seniority_key(&self) -> (DateTime<Utc>, ContactId) {
        (self.created_at, self.id)
    }

    /// Returns this contact demoted to a secondary of `primary`.
    #[must_use]
    pub fn demoted_to(&self, primary: ContactId, now: DateTime<Utc>) -> Self {
        Self {
            precedence: LinkPrecedence::Secondary,
            linked_id: Some(primary),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Returns this secondary re-pointed at `primary`.
    #[must_use]
    pub fn relinked_to(&self, primary: ContactId, now: DateTime<Utc>) -> Self {
        Self {
            linked_id: Some(primary),
            updated_at: now,
            ..self.clone()
        }
    }
}

/// An unsaved contact. Storage assigns `id`, `created_at` and `updated_at` on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    /// Email address, if known.
    pub email: Option<String>,
    /// Phone number, if known.
    pub phone: Option<String>,
    /// Link for secondaries.
    pub linked_id: Option<ContactId>,
    /// Primary or secondary.
    pub precedence: LinkPrecedence,
}

impl NewContact {
    /// A new primary contact, the first record of a previously unseen identity.
    #[must_use]
    pub fn primary(email: Option<String>, phone: Option<String>) -> Self {
        Self {
            email,
            phone,
            linked_id: None,
            precedence: LinkPrecedence::Primary,
        }
    }

    /// A new secondary contact linked to `primary`.
    #[must_use]
    pub fn secondary(email: Option<String>, phone: Option<String>, primary: ContactId) -> Self {
        Self {
            email,
            phone,
            linked_id: Some(primary),
            precedence: LinkPrecedence::Secondary,
        }
    }

    /// Materializes the draft with storage-assigned fields.
    #[must_use]
    pub fn into_contact(self, id: ContactId, now: DateTime<Utc>) -> Contact {
        Contact {
            id,
            email: self.email,
            phone: self.phone,
            linked_id: self.linked_id,
            precedence: self.precedence,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
