//! Expansion of direct matches into whole clusters.

use std::collections::BTreeSet;

use crate::contact::{Contact, ContactId};
use crate::error::{ContactError, ContactResult, ExecutionError};
use crate::storage::ContactTransaction;

/// Every contact belonging to the identities a request touched.
///
/// When a request bridges identities that were separate until now, `primary_ids`
/// holds more than one id and `members` spans all of their clusters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// Primary of every identity the matches belong to.
    pub primary_ids: BTreeSet<ContactId>,
    /// All members of those identities, ordered by id.
    pub members: Vec<Contact>,
}

/// The primary each match answers to: its own id for primaries, the link for
/// secondaries.
///
/// # Errors
/// `InvariantViolated` if a secondary has no link.
pub fn candidate_primaries(matches: &[Contact]) -> ContactResult<BTreeSet<ContactId>> {
    matches
        .iter()
        .map(|c| {
            c.primary_id().ok_or_else(|| {
                ContactError::from(ExecutionError::InvariantViolated {
                    reason: format!("secondary contact {} has no link", c.id),
                })
            })
        })
        .collect()
}

/// Fetch the full cluster(s) behind `matches`.
///
/// Returns `None` when nothing matched: the request describes someone not
/// seen before.
pub fn collect(tx: &dyn ContactTransaction, matches: &[Contact]) -> ContactResult<Option<Cluster>> {
    if matches.is_empty() {
        return Ok(None);
    }
    let primary_ids = candidate_primaries(matches)?;
    let members = tx.find_by_ids_or_linked_ids(&primary_ids)?;
    Ok(Some(Cluster { primary_ids, members }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::contact;
    use crate::storage::{ContactStore, InMemoryContactStore};

    fn ids(raw: &[i64]) -> BTreeSet<ContactId> {
        raw.iter().copied().map(ContactId::new).collect()
    }

    #[test]
    fn test_candidates_follow_links() {
        let matches = vec![
            contact(1, Some("a@x"), None, None, 0),
            contact(4, Some("b@x"), None, Some(3), 5),
            contact(5, None, Some("9"), Some(1), 6),
        ];
        assert_eq!(candidate_primaries(&matches).unwrap(), ids(&[1, 3]));
    }

    #[test]
    fn test_unlinked_secondary_is_an_invariant_breach() {
        let mut broken = contact(2, Some("a@x"), None, Some(1), 0);
        broken.linked_id = None;
        let err = candidate_primaries(&[broken]).unwrap_err();
        assert!(matches!(
            err,
            ContactError::Execution(ExecutionError::InvariantViolated { .. })
        ));
    }

    #[test]
    fn test_empty_matches_short_circuit() {
        let store = InMemoryContactStore::new();
        let tx = store.begin().unwrap();
        assert_eq!(collect(tx.as_ref(), &[]).unwrap(), None);
    }

    #[test]
    fn test_collect_spans_bridged_clusters() {
        let store = InMemoryContactStore::with_contacts(vec![
            contact(1, Some("a@x"), Some("1"), None, 0),
            contact(2, Some("b@x"), Some("1"), Some(1), 1),
            contact(3, Some("c@x"), Some("3"), None, 2),
            contact(4, Some("d@x"), Some("3"), Some(3), 3),
            contact(5, Some("e@x"), Some("5"), None, 4),
        ])
        .unwrap();
        let tx = store.begin().unwrap();

        let matches = vec![
            store.get(ContactId::new(2)).unwrap().unwrap(),
            store.get(ContactId::new(3)).unwrap().unwrap(),
        ];
        let cluster = collect(tx.as_ref(), &matches).unwrap().unwrap();
        assert_eq!(cluster.primary_ids, ids(&[1, 3]));
        assert_eq!(
            cluster.members.iter().map(|c| c.id.get()).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }
}
