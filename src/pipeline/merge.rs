//! Folding bridged clusters into one.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::contact::{Contact, ContactId};
use crate::error::ContactResult;
use crate::storage::ContactTransaction;

/// Rewrites needed to leave exactly one primary in a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// The surviving primary.
    pub primary: ContactId,
    /// Former primaries, rewritten as secondaries of `primary`.
    pub demote: Vec<Contact>,
    /// Secondaries re-pointed at `primary`.
    pub relink: Vec<Contact>,
}

impl MergePlan {
    /// Returns true when the cluster is already consistent.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.demote.is_empty() && self.relink.is_empty()
    }

    fn outcome(&self) -> MergeOutcome {
        MergeOutcome {
            demoted: self.demote.iter().map(|c| c.id).collect(),
            relinked: self.relink.iter().map(|c| c.id).collect(),
        }
    }
}

/// What a merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Primaries demoted to secondaries.
    pub demoted: Vec<ContactId>,
    /// Secondaries moved to the surviving primary.
    pub relinked: Vec<ContactId>,
}

impl MergeOutcome {
    /// Returns true if nothing was rewritten.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.demoted.is_empty() && self.relinked.is_empty()
    }
}

/// Plan the rewrites that make `primary` the only primary of `members`.
#[must_use]
pub fn plan_merge(primary: ContactId, members: &[Contact], now: DateTime<Utc>) -> MergePlan {
    let mut plan = MergePlan {
        primary,
        demote: Vec::new(),
        relink: Vec::new(),
    };
    for c in members.iter().filter(|c| c.id != primary) {
        if c.is_primary() {
            plan.demote.push(c.demoted_to(primary, now));
        } else if c.linked_id != Some(primary) {
            plan.relink.push(c.relinked_to(primary, now));
        }
    }
    plan
}

/// Merge `members` under `primary` and return the post-merge membership.
///
/// All rewrites go out as one batch. When nothing needs rewriting, `members`
/// is returned as is and no write is staged.
pub fn execute_merge(
    tx: &mut dyn ContactTransaction,
    primary: ContactId,
    members: Vec<Contact>,
) -> ContactResult<(Vec<Contact>, MergeOutcome)> {
    let plan = plan_merge(primary, &members, Utc::now());
    if plan.is_noop() {
        return Ok((members, MergeOutcome::default()));
    }

    let outcome = plan.outcome();
    let mut batch = plan.demote;
    batch.extend(plan.relink);
    tx.update_batch(batch)?;

    let refreshed = tx.find_by_ids_or_linked_ids(&BTreeSet::from([primary]))?;
    Ok((refreshed, outcome))
}
