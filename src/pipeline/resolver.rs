//! Choice of the canonical primary.

use crate::contact::Contact;
use crate::error::{ContactResult, ExecutionError};

/// The oldest primary among `members`; ties go to the smaller id.
///
/// # Errors
/// `InvariantViolated` if `members` holds no primary at all. A collected
/// cluster always includes the primaries it was collected by, so this means
/// the stored graph is broken.
pub fn resolve_primary(members: &[Contact]) -> ContactResult<&Contact> {
    members
        .iter()
        .filter(|c| c.is_primary())
        .min_by_key(|c| c.seniority_key())
        .ok_or_else(|| {
            ExecutionError::InvariantViolated {
                reason: format!("cluster of {} contacts has no primary", members.len()),
            }
            .into()
        })
}
