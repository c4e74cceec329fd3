//! Assembly of the consolidated view.

use crate::contact::Contact;
use crate::view::ClusterView;

fn push_unique(list: &mut Vec<String>, value: Option<&String>) {
    if let Some(v) = value {
        if !list.contains(v) {
            list.push(v.clone());
        }
    }
}

/// Build the view of `primary`'s cluster.
///
/// The primary's own email and phone come first; the rest follow in seniority
/// order, each value once. `members` may or may not include `primary`.
#[must_use]
pub fn build_view(primary: &Contact, members: &[Contact]) -> ClusterView {
    let mut rest: Vec<&Contact> = members.iter().filter(|c| c.id != primary.id).collect();
    rest.sort_by_key(|c| c.seniority_key());

    let mut view = ClusterView {
        primary_id: primary.id,
        emails: Vec::new(),
        phones: Vec::new(),
        secondary_ids: Vec::new(),
    };
    push_unique(&mut view.emails, primary.email.as_ref());
    push_unique(&mut view.phones, primary.phone.as_ref());
    for c in rest {
        push_unique(&mut view.emails, c.email.as_ref());
        push_unique(&mut view.phones, c.phone.as_ref());
        if c.is_secondary() {
            view.secondary_ids.push(c.id);
        }
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::ContactId;
    use crate::pipeline::fixtures::contact;

    #[test]
    fn test_primary_values_come_first() {
        let primary = contact(5, Some("p@x"), Some("5"), None, 10);
        let members = vec![
            contact(2, Some("old@x"), Some("2"), Some(5), 0),
            primary.clone(),
            contact(7, Some("p@x"), Some("7"), Some(5), 20),
        ];
        let view = build_view(&primary, &members);

        assert_eq!(view.primary_id, ContactId::new(5));
        assert_eq!(view.emails, vec!["p@x", "old@x"]);
        assert_eq!(view.phones, vec!["5", "2", "7"]);
        assert_eq!(view.secondary_ids, vec![ContactId::new(2), ContactId::new(7)]);
    }

    #[test]
    fn test_nulls_are_skipped_and_values_deduplicated() {
        let primary = contact(1, None, Some("1"), None, 0);
        let members = vec![
            primary.clone(),
            contact(2, Some("a@x"), None, Some(1), 1),
            contact(3, Some("a@x"), Some("1"), Some(1), 2),
        ];
        let view = build_view(&primary, &members);
        assert_eq!(view.emails, vec!["a@x"]);
        assert_eq!(view.phones, vec!["1"]);
        assert_eq!(view.size(), 3);
    }

    #[test]
    fn test_seniority_ties_use_id() {
        let primary = contact(1, Some("p@x"), None, None, 0);
        let members = vec![
            contact(9, Some("z@x"), None, Some(1), 5),
            contact(4, Some("y@x"), None, Some(1), 5),
        ];
        let view = build_view(&primary, &members);
        assert_eq!(view.emails, vec!["p@x", "y@x", "z@x"]);
        assert_eq!(view.secondary_ids, vec![ContactId::new(4), ContactId::new(9)]);
    }

    #[test]
    fn test_lone_primary_has_no_secondaries() {
        let primary = contact(1, Some("new@x.com"), Some("999"), None, 0);
        let view = build_view(&primary, std::slice::from_ref(&primary));
        assert_eq!(view.emails, vec!["new@x.com"]);
        assert_eq!(view.phones, vec!["999"]);
        assert!(view.secondary_ids.is_empty());
    }
}
