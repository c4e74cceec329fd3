//! Request identifiers.
//!
//! An incoming reconciliation carries an optional email and an optional phone.
//! Empty and whitespace-only values count as absent; anything else is kept
//! byte-for-byte since matching is exact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Longest accepted identifier, in bytes.
pub const DEFAULT_MAX_IDENTIFIER_LEN: usize = 320;

/// A validated (email, phone) pair with at least one value present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identifiers {
    email: Option<String>,
    phone: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_len(field: &str, value: Option<&String>, max_length: usize) -> Result<(), ValidationError> {
    match value {
        Some(v) if v.len() > max_length => Err(ValidationError::FieldTooLong {
            field: field.to_string(),
            max_length,
        }),
        _ => Ok(()),
    }
}

impl Identifiers {
    /// Validates a raw pair using the default length limit.
    ///
    /// # Errors
    /// - `MissingIdentifier` if both values are absent or blank
    /// - `FieldTooLong` if a value exceeds [`DEFAULT_MAX_IDENTIFIER_LEN`]
    pub fn new(email: Option<String>, phone: Option<String>) -> Result<Self, ValidationError> {
        Self::with_limit(email, phone, DEFAULT_MAX_IDENTIFIER_LEN)
    }

    /// Validates a raw pair with an explicit length limit.
    ///
    /// # Errors
    /// Same as [`Identifiers::new`].
    pub fn with_limit(
        email: Option<String>,
        phone: Option<String>,
        max_length: usize,
    ) -> Result<Self, ValidationError> {
        let email = present(email);
        let phone = present(phone);
        if email.is_none() && phone.is_none() {
            return Err(ValidationError::MissingIdentifier);
        }
        check_len("email", email.as_ref(), max_length)?;
        check_len("phoneNumber", phone.as_ref(), max_length)?;
        Ok(Self { email, phone })
    }

    /// The email, if supplied.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// The phone, if supplied.
    #[must_use]
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    /// Splits into owned parts.
    #[must_use]
    pub fn into_parts(self) -> (Option<String>, Option<String>) {
        (self.email, self.phone)
    }
}

/// A reconciliation request with correlation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRequest {
    /// Unique identifier for this request (for tracing/debugging).
    pub request_id: Uuid,
    /// When the request was received.
    pub received_at: DateTime<Utc>,
    /// Raw email as supplied by the caller.
    pub email: Option<String>,
    /// Raw phone as supplied by the caller.
    pub phone: Option<String>,
}

impl ReconcileRequest {
    /// Creates a request with a fresh id.
    #[must_use]
    pub fn new(email: Option<String>, phone: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            received_at: Utc::now(),
            email,
            phone,
        }
    }

    /// Sets a custom request id (useful for correlation).
    #[must_use]
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }
}

/// Short, stable digest of an identifier for log fields.
///
/// Raw emails and phone numbers never reach the logs; equal inputs produce
/// equal fingerprints so log lines can still be correlated.
#[must_use]
pub fn fingerprint(value: Option<&str>) -> String {
    match value {
        None => "-".to_string(),
        Some(v) => {
            let hash = blake3::hash(v.as_bytes());
            hash.to_hex().as_str()[..12].to_string()
        }
    }
}
