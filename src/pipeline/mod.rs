//! The reconciliation pipeline.
//!
//! Each stage is a plain function over a [`ContactTransaction`](crate::storage::ContactTransaction):
//!
//! ```text
//! find_matches → collect → resolve_primary → execute_merge
//!              → record_new_info → build_view
//! ```
//!
//! Stages never open, lock or commit transactions; that belongs to
//! [`Reconciler`](crate::engine::Reconciler).

mod cluster;
mod detect;
mod matcher;
mod merge;
mod resolver;
mod response;

pub use cluster::{candidate_primaries, collect, Cluster};
pub use detect::{has_new_info, record_new_info};
pub use matcher::find_matches;
pub use merge::{execute_merge, plan_merge, MergeOutcome, MergePlan};
pub use resolver::resolve_primary;
pub use response::build_view;

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::contact::{Contact, ContactId, LinkPrecedence};

    pub(crate) fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 4, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    /// A contact created `secs` after a fixed epoch; a link makes it secondary.
    pub(crate) fn contact(id: i64, email: Option<&str>, phone: Option<&str>, linked: Option<i64>, secs: i64) -> Contact {
        Contact {
            id: ContactId::new(id),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            linked_id: linked.map(ContactId::new),
            precedence: if linked.is_some() {
                LinkPrecedence::Secondary
            } else {
                LinkPrecedence::Primary
            },
            created_at: at(secs),
            updated_at: at(secs),
            deleted_at: None,
        }
    }
}
