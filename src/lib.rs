//! # contactgraph - identity reconciliation over contact records
//!
//! contactgraph consolidates contact records that share an email or a phone
//! number into one identity. Every identity has exactly one primary contact
//! (the oldest); every other record of the same person is a secondary linked
//! directly to it. When a request bridges two identities, the younger primary
//! is demoted and its cluster folded into the older one.
//!
//! ## Core Concepts
//!
//! - **Contact**: A stored record with an optional email and phone
//! - **Cluster**: A primary plus every secondary linked to it
//! - **Reconciler**: Matches, merges and records new information atomically
//! - **ClusterView**: The consolidated identity returned to callers
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use contactgraph::{InMemoryContactStore, Reconciler};
//!
//! let reconciler = Reconciler::new(Arc::new(InMemoryContactStore::new()));
//! reconciler.reconcile(Some("lorraine@hillvalley.edu".into()), Some("123456".into()))?;
//! let view = reconciler.reconcile(Some("mcfly@hillvalley.edu".into()), Some("123456".into()))?;
//!
//! assert_eq!(view.emails, vec!["lorraine@hillvalley.edu", "mcfly@hillvalley.edu"]);
//! assert_eq!(view.secondary_ids.len(), 1);
//! # Ok::<(), contactgraph::ContactError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod contact;
pub mod error;
pub mod identity;
pub mod view;

// Storage, pipeline and engine
pub mod audit;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod storage;

#[cfg(feature = "transport-grpc")]
pub mod transport;

// Re-export primary types at crate root for convenience
pub use audit::{check_invariants, InvariantViolation};
pub use config::{ReconcilerConfig, RuntimeConfig};
pub use contact::{Contact, ContactId, LinkPrecedence, NewContact};
pub use engine::runtime::{ReconcileHandle, ReconcileRuntime};
pub use engine::Reconciler;
pub use error::{ContactError, ContactResult, ExecutionError, TransportError, ValidationError};
pub use identity::{Identifiers, ReconcileRequest};
pub use storage::{ContactStore, ContactTransaction, InMemoryContactStore, LockKey, StorageError};
pub use view::{ClusterView, ContactDetails, IdentifyRequest, IdentifyResponse};

#[cfg(feature = "persistent")]
pub use storage::{open_database, PersistentConfig, PersistentContactStore};
