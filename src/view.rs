//! Consolidated identity views.
//!
//! `ClusterView` is what `reconcile` returns. `IdentifyRequest` and
//! `IdentifyResponse` are the caller-visible JSON shapes of the identify
//! endpoint, kept key-for-key compatible with existing clients.

use serde::{Deserialize, Serialize};

use crate::contact::ContactId;
use crate::error::TransportError;

/// The consolidated view of one identity.
///
/// Lists are de-duplicated and keep first-appearance order; the primary's own
/// email and phone always come first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterView {
    /// The canonical primary contact id.
    pub primary_id: ContactId,
    /// Every distinct email in the cluster.
    pub emails: Vec<String>,
    /// Every distinct phone in the cluster.
    pub phones: Vec<String>,
    /// Ids of every secondary in the cluster, in creation order.
    pub secondary_ids: Vec<ContactId>,
}

impl ClusterView {
    /// Number of contacts in the identity, primary included.
    #[must_use]
    pub fn size(&self) -> usize {
        self.secondary_ids.len() + 1
    }
}

/// Identify request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyRequest {
    /// Email, if any.
    #[serde(default)]
    pub email: Option<String>,
    /// Phone number, if any.
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: Option<String>,
}

impl IdentifyRequest {
    /// Parses a JSON request body.
    ///
    /// # Errors
    /// Returns `DeserializationFailed` for malformed JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(bytes).map_err(|e| TransportError::DeserializationFailed {
            message: e.to_string(),
        })
    }
}

/// Identify response body: `{"contact": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    /// The consolidated contact.
    pub contact: ContactDetails,
}

/// Wire form of [`ClusterView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDetails {
    /// Existing clients read this exact key spelling.
    #[serde(rename = "primaryContatctId", alias = "primaryContactId")]
    pub primary_contact_id: i64,
    /// Distinct emails, primary's first.
    pub emails: Vec<String>,
    /// Distinct phone numbers, primary's first.
    pub phone_numbers: Vec<String>,
    /// Secondary contact ids.
    pub secondary_contact_ids: Vec<i64>,
}

impl From<ClusterView> for IdentifyResponse {
    fn from(view: ClusterView) -> Self {
        Self {
            contact: ContactDetails {
                primary_contact_id: view.primary_id.get(),
                emails: view.emails,
                phone_numbers: view.phones,
                secondary_contact_ids: view.secondary_ids.into_iter().map(ContactId::get).collect(),
            },
        }
    }
}

impl IdentifyResponse {
    /// Serializes to JSON bytes.
    ///
    /// # Errors
    /// Returns `SerializationFailed` if encoding fails.
    pub fn to_json(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::SerializationFailed {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ClusterView {
        ClusterView {
            primary_id: ContactId::new(1),
            emails: vec!["lorraine@hillvalley.edu".into(), "mcfly@hillvalley.edu".into()],
            phones: vec!["123456".into()],
            secondary_ids: vec![ContactId::new(23)],
        }
    }

    #[test]
    fn test_response_uses_existing_wire_keys() {
        let resp = IdentifyResponse::from(view());
        let v: serde_json::Value = serde_json::from_slice(&resp.to_json().unwrap()).unwrap();
        assert_eq!(v["contact"]["primaryContatctId"], 1);
        assert_eq!(v["contact"]["emails"][1], "mcfly@hillvalley.edu");
        assert_eq!(v["contact"]["phoneNumbers"][0], "123456");
        assert_eq!(v["contact"]["secondaryContactIds"][0], 23);
    }

    #[test]
    fn test_response_accepts_corrected_key_spelling() {
        let json = br#"{"contact":{"primaryContactId":4,"emails":[],"phoneNumbers":["1"],"secondaryContactIds":[]}}"#;
        let resp: IdentifyResponse = serde_json::from_slice(json).unwrap();
        assert_eq!(resp.contact.primary_contact_id, 4);
    }

    #[test]
    fn test_request_fields_default_to_absent() {
        let req = IdentifyRequest::from_json(br#"{"phoneNumber":"123456"}"#).unwrap();
        assert_eq!(req.email, None);
        assert_eq!(req.phone_number.as_deref(), Some("123456"));

        let req = IdentifyRequest::from_json(br#"{"email":null,"phoneNumber":null}"#).unwrap();
        assert_eq!(req, IdentifyRequest::default());
    }

    #[test]
    fn test_malformed_request_is_a_transport_error() {
        let err = IdentifyRequest::from_json(b"{not json").unwrap_err();
        assert!(matches!(err, TransportError::DeserializationFailed { .. }));
    }

    #[test]
    fn test_size_counts_primary() {
        assert_eq!(view().size(), 2);
    }
}
