//! Error types for contactgraph.
//!
//! All errors are strongly typed using thiserror so callers can match on the
//! failure class: validation faults belong to the caller, conflicts may be
//! retried, everything else is internal.

use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors that occur during input validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Either email or phoneNumber must be provided")]
    MissingIdentifier,

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong {
        field: String,
        max_length: usize,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors that occur while reconciling against storage.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("Reconciliation conflicted with concurrent writers after {attempts} attempts")]
    Conflict {
        attempts: u32,
    },

    /// A single attempt lost a race; the reconciler retries these internally.
    #[error("Concurrent modification: {reason}")]
    Contended {
        reason: String,
    },

    #[error("Contact graph invariant violated: {reason}")]
    InvariantViolated {
        reason: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Reconcile queue is full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Reconcile worker pool is disconnected")]
    Disconnected,
}

/// Transport errors for client-server communication.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
    },

    #[error("Failed to serialize request: {message}")]
    SerializationFailed {
        message: String,
    },

    #[error("Failed to deserialize response: {message}")]
    DeserializationFailed {
        message: String,
    },

    #[error("Server error (code {code}): {message}")]
    ServerError {
        code: u32,
        message: String,
    },
}

/// Top-level error type for contactgraph.
#[derive(Debug, Error)]
pub enum ContactError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ContactError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a storage execution error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::Storage {
            message: message.into(),
        })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if retries were exhausted against concurrent writers.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Conflict { .. }))
    }

    /// Returns true if a single attempt lost a race and should be rerun.
    #[must_use]
    pub const fn is_contended(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Contended { .. }))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the caller may retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Conflict { .. }
                    | ExecutionError::Contended { .. }
                    | ExecutionError::Timeout { .. }
                    | ExecutionError::QueueFull { .. }
            ),
            Self::Transport(e) => match e {
                TransportError::ConnectionFailed { .. } => true,
                TransportError::ServerError { code, .. } => *code >= 500,
                _ => false,
            },
            Self::Internal { .. } => false,
        }
    }
}

impl From<StorageError> for ContactError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(reason) => Self::Execution(ExecutionError::Contended { reason }),
            other => Self::storage(other.to_string()),
        }
    }
}

/// Result type alias for contactgraph operations.
pub type ContactResult<T> = Result<T, ContactError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_identifier_message() {
        let msg = ValidationError::MissingIdentifier.to_string();
        assert!(msg.contains("email or phoneNumber"));
    }

    #[test]
    fn test_field_too_long() {
        let err = ValidationError::FieldTooLong {
            field: "email".to_string(),
            max_length: 320,
        };
        let msg = format!("{err}");
        assert!(msg.contains("email"));
        assert!(msg.contains("320"));
    }

    #[test]
    fn test_execution_error_conflict() {
        let err = ExecutionError::Conflict { attempts: 5 };
        assert!(err.to_string().contains("5 attempts"));
    }

    #[test]
    fn test_execution_error_timeout() {
        let err = ExecutionError::Timeout { duration_ms: 5000 };
        assert!(err.to_string().contains("5000ms"));
    }

    #[test]
    fn test_contact_error_from_validation() {
        let err: ContactError = ValidationError::MissingIdentifier.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_contact_error_conflict_is_retryable() {
        let err: ContactError = ExecutionError::Conflict { attempts: 3 }.into();
        assert!(err.is_execution());
        assert!(err.is_conflict());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_storage_error_not_retryable() {
        let err = ContactError::storage("disk full");
        assert!(err.is_execution());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_storage_conflict_becomes_contended() {
        let err: ContactError = StorageError::Conflict("lock busy".to_string()).into();
        assert!(matches!(err, ContactError::Execution(ExecutionError::Contended { .. })));
        assert!(err.is_retryable());
        assert!(!err.is_conflict());

        let err: ContactError = StorageError::BackendError("io".to_string()).into();
        assert!(matches!(err, ContactError::Execution(ExecutionError::Storage { .. })));
    }

    #[test]
    fn test_contact_error_internal() {
        let err = ContactError::internal("unexpected state");
        assert!(err.is_internal());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("unexpected state"));
    }

    #[test]
    fn test_transport_retryable() {
        let err: ContactError = TransportError::ServerError {
            code: 503,
            message: "unavailable".to_string(),
        }
        .into();
        assert!(err.is_retryable());

        let err: ContactError = TransportError::DeserializationFailed {
            message: "bad json".to_string(),
        }
        .into();
        assert!(!err.is_retryable());
    }
}
