//! Direct matches on email or phone.

use crate::contact::Contact;
use crate::error::ContactResult;
use crate::identity::Identifiers;
use crate::storage::ContactTransaction;

/// Every contact whose email or phone equals the request's.
///
/// `Identifiers` guarantees at least one term is present, so the query is
/// never unconstrained. Results are ordered by id. No side effects.
pub fn find_matches(tx: &dyn ContactTransaction, ids: &Identifiers) -> ContactResult<Vec<Contact>> {
    Ok(tx.find_by_email_or_phone(ids.email(), ids.phone())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::NewContact;
    use crate::storage::{ContactStore, InMemoryContactStore};

    #[test]
    fn test_matches_either_identifier() {
        let store = InMemoryContactStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert(NewContact::primary(Some("a@x".into()), Some("1".into()))).unwrap();
        tx.insert(NewContact::primary(Some("b@x".into()), Some("2".into()))).unwrap();
        tx.insert(NewContact::primary(Some("c@x".into()), Some("3".into()))).unwrap();

        let ids = Identifiers::new(Some("a@x".into()), Some("2".into())).unwrap();
        let found = find_matches(tx.as_ref(), &ids).unwrap();
        let emails: Vec<_> = found.iter().filter_map(|c| c.email.as_deref()).collect();
        assert_eq!(emails, vec!["a@x", "b@x"]);
    }

    #[test]
    fn test_absent_term_does_not_match_null_columns() {
        let store = InMemoryContactStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert(NewContact::primary(None, Some("1".into()))).unwrap();

        let ids = Identifiers::new(Some("a@x".into()), None).unwrap();
        assert!(find_matches(tx.as_ref(), &ids).unwrap().is_empty());
    }

    #[test]
    fn test_matching_is_exact() {
        let store = InMemoryContactStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert(NewContact::primary(Some("Doc@HillValley.edu".into()), None)).unwrap();

        let ids = Identifiers::new(Some("doc@hillvalley.edu".into()), None).unwrap();
        assert!(find_matches(tx.as_ref(), &ids).unwrap().is_empty());
    }
}
