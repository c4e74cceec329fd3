//! Tunables for the reconciler and its runtime.
//!
//! Every config is a plain struct with sensible defaults; `validate` consumes
//! and returns it so construction reads `Config { .. }.validate()?`.

use std::time::Duration;

use crate::error::{ContactError, ContactResult, ValidationError};
use crate::identity::DEFAULT_MAX_IDENTIFIER_LEN;

#[cfg(feature = "persistent")]
pub use crate::storage::PersistentConfig;

fn invalid(reason: impl Into<String>) -> ContactError {
    ContactError::Validation(ValidationError::InvalidConfig { reason: reason.into() })
}

/// Reconciler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Attempts per request before giving up with a conflict.
    pub max_attempts: u32,
    /// How long one attempt waits for its locks.
    pub lock_timeout: Duration,
    /// Base backoff between attempts; attempt `n` sleeps `n * retry_backoff`.
    pub retry_backoff: Duration,
    /// Longest accepted email or phone, in bytes.
    pub max_identifier_len: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lock_timeout: Duration::from_secs(2),
            retry_backoff: Duration::from_millis(10),
            max_identifier_len: DEFAULT_MAX_IDENTIFIER_LEN,
        }
    }
}

impl ReconcilerConfig {
    /// Checks the configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if `max_attempts`, `lock_timeout` or `max_identifier_len` is zero.
    pub fn validate(self) -> ContactResult<Self> {
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1"));
        }
        if self.lock_timeout.is_zero() {
            return Err(invalid("lock_timeout must be non-zero"));
        }
        if self.max_identifier_len == 0 {
            return Err(invalid("max_identifier_len must be non-zero"));
        }
        Ok(self)
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum queued requests.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

impl RuntimeConfig {
    /// Checks the configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if either field is zero.
    pub fn validate(self) -> ContactResult<Self> {
        if self.workers == 0 {
            return Err(invalid("workers must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be at least 1"));
        }
        Ok(self)
    }
}
