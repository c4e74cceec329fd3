//! Recording identifier combinations not seen before.

use crate::contact::{Contact, ContactId, NewContact};
use crate::error::ContactResult;
use crate::identity::Identifiers;

use crate::storage::ContactTransaction;

/// True if the request brings an email or phone the cluster does not hold yet.
#[must_use]
pub fn has_new_info(ids: &Identifiers, members: &[Contact]) -> bool {
    let email_new = ids
        .email()
        .is_some_and(|e| !members.iter().any(|c| c.email.as_deref() == Some(e)));
    let phone_new = ids
        .phone()
        .is_some_and(|p| !members.iter().any(|c| c.phone.as_deref() == Some(p)));
    email_new || phone_new
}

/// Stage one secondary carrying the request's identifiers if it brings new
/// information; otherwise stage nothing.
pub fn record_new_info(
    tx: &mut dyn ContactTransaction,
    ids: &Identifiers,
    primary: ContactId,
    members: &[Contact],
) -> ContactResult<Option<Contact>> {
    if !has_new_info(ids, members) {
        return Ok(None);
    }
    let draft = NewContact::secondary(ids.email().map(str::to_string), ids.phone().map(str::to_string), primary);
    Ok(Some(tx.insert(draft)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::contact;
    use crate::storage::{ContactStore, InMemoryContactStore};

    fn ids(email: Option<&str>, phone: Option<&str>) -> Identifiers {
        Identifiers::new(email.map(str::to_string), phone.map(str::to_string)).unwrap()
    }

    fn cluster() -> Vec<Contact> {
        vec![
            contact(1, Some("a@x"), Some("1"), None, 0),
            contact(2, Some("b@x"), None, Some(1), 1),
        ]
    }

    #[test]
    fn test_known_values_are_not_new() {
        assert!(!has_new_info(&ids(Some("a@x"), Some("1")), &cluster()));
        assert!(!has_new_info(&ids(Some("b@x"), Some("1")), &cluster()));
        assert!(!has_new_info(&ids(None, Some("1")), &cluster()));
    }

    #[test]
    fn test_any_unseen_value_is_new() {
        assert!(has_new_info(&ids(Some("a@x"), Some("2")), &cluster()));
        assert!(has_new_info(&ids(Some("c@x"), Some("1")), &cluster()));
        assert!(has_new_info(&ids(Some("c@x"), None), &cluster()));
    }

    #[test]
    fn test_new_info_creates_one_linked_secondary() {
        let store = InMemoryContactStore::with_contacts(cluster()).unwrap();
        let mut tx = store.begin().unwrap();

        let created = record_new_info(tx.as_mut(), &ids(Some("a@x"), Some("2")), ContactId::new(1), &cluster())
            .unwrap()
            .unwrap();
        assert!(created.is_secondary());
        assert_eq!(created.linked_id, Some(ContactId::new(1)));
        assert_eq!(created.email.as_deref(), Some("a@x"));
        assert_eq!(created.phone.as_deref(), Some("2"));
        assert_eq!(created.id, ContactId::new(3));
    }

    #[test]
    fn test_repeat_request_creates_nothing() {
        let store = InMemoryContactStore::with_contacts(cluster()).unwrap();
        let mut tx = store.begin().unwrap();
        let created = record_new_info(tx.as_mut(), &ids(Some("b@x"), Some("1")), ContactId::new(1), &cluster()).unwrap();
        assert_eq!(created, None);
    }
}
