//! Reconciliation engine.
//!
//! [`Reconciler`] runs the pipeline inside one transaction per attempt,
//! takes the locks that make the attempt safe against concurrent writers and
//! retries attempts that lose a race.

/// Bounded worker pool in front of a [`Reconciler`].
pub mod runtime;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, info_span, warn};

use crate::config::ReconcilerConfig;
use crate::contact::{ContactId, NewContact};
use crate::error::{ContactResult, ExecutionError};
use crate::identity::{fingerprint, Identifiers, ReconcileRequest};
use crate::pipeline::{
    build_view, candidate_primaries, collect, execute_merge, find_matches, record_new_info, resolve_primary,
};
use crate::storage::{ContactStore, LockKey, StorageError};
use crate::view::ClusterView;

/// Resolves requests against a contact store.
pub struct Reconciler {
    store: Arc<dyn ContactStore>,
    config: ReconcilerConfig,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").field("config", &self.config).finish_non_exhaustive()
    }
}

fn lock_keys(ids: &Identifiers, primaries: &BTreeSet<ContactId>) -> Vec<LockKey> {
    let mut keys = Vec::with_capacity(primaries.len() + 2);
    if let Some(e) = ids.email() {
        keys.push(LockKey::Email(e.to_string()));
    }
    if let Some(p) = ids.phone() {
        keys.push(LockKey::Phone(p.to_string()));
    }
    keys.extend(primaries.iter().copied().map(LockKey::Primary));
    keys
}

/// Linear backoff before retry `attempt`, saturating instead of overflowing.
fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

impl Reconciler {
    /// Create a reconciler with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn ContactStore>) -> Self {
        Self {
            store,
            config: ReconcilerConfig::default(),
        }
    }

    /// Create a reconciler with a custom configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if the configuration does not validate.
    pub fn with_config(store: Arc<dyn ContactStore>, config: ReconcilerConfig) -> ContactResult<Self> {
        Ok(Self {
            store,
            config: config.validate()?,
        })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ContactStore> {
        &self.store
    }

    /// Reconcile an (email, phone) pair and return the identity it belongs to.
    ///
    /// # Errors
    /// - `Validation` if both values are absent or blank, or one is too long
    /// - `Execution(Conflict)` if every attempt lost a race with concurrent writers
    /// - `Execution(Storage | InvariantViolated)` on storage faults
    pub fn reconcile(&self, email: Option<String>, phone: Option<String>) -> ContactResult<ClusterView> {
        self.reconcile_request(ReconcileRequest::new(email, phone))
    }

    /// [`Reconciler::reconcile`] with caller-supplied correlation metadata.
    ///
    /// # Errors
    /// Same as [`Reconciler::reconcile`].
    pub fn reconcile_request(&self, request: ReconcileRequest) -> ContactResult<ClusterView> {
        let span = info_span!("reconcile", request_id = %request.request_id);
        let _guard = span.enter();

        let ids = Identifiers::with_limit(request.email, request.phone, self.config.max_identifier_len)?;
        debug!(
            email = %fingerprint(ids.email()),
            phone = %fingerprint(ids.phone()),
            "reconciling"
        );

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt(&ids) {
                Err(e) if e.is_contended() => {
                    if attempt >= self.config.max_attempts {
                        warn!(attempts = attempt, error = %e, "giving up after repeated conflicts");
                        return Err(ExecutionError::Conflict { attempts: attempt }.into());
                    }
                    let backoff = retry_backoff(self.config.retry_backoff, attempt);
                    warn!(
                        attempt,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "reconcile attempt conflicted, retrying"
                    );
                    thread::sleep(backoff);
                }
                other => return other,
            }
        }
    }

    /// One transaction: read, lock, re-read, then merge, record and commit.
    fn attempt(&self, ids: &Identifiers) -> ContactResult<ClusterView> {
        let mut tx = self.store.begin()?;

        let seen = candidate_primaries(&find_matches(tx.as_ref(), ids)?)?;
        tx.lock(&lock_keys(ids, &seen), self.config.lock_timeout)?;

        let matches = find_matches(tx.as_ref(), ids)?;
        let Some(cluster) = collect(tx.as_ref(), &matches)? else {
            let (email, phone) = ids.clone().into_parts();
            let created = tx.insert(NewContact::primary(email, phone))?;
            tx.commit()?;
            info!(contact_id = %created.id, "created primary for unseen identity");
            return Ok(build_view(&created, &[]));
        };
        if cluster.primary_ids != seen {
            return Err(StorageError::Conflict("cluster membership changed before lock".to_string()).into());
        }
        debug!(
            primaries = cluster.primary_ids.len(),
            members = cluster.members.len(),
            "collected cluster"
        );

        let primary = resolve_primary(&cluster.members)?.clone();
        let (mut members, outcome) = execute_merge(tx.as_mut(), primary.id, cluster.members)?;
        if !outcome.is_empty() {
            info!(
                primary_id = %primary.id,
                demoted = ?outcome.demoted,
                relinked = ?outcome.relinked,
                "merged clusters"
            );
        }

        if let Some(created) = record_new_info(tx.as_mut(), ids, primary.id, &members)? {
            info!(primary_id = %primary.id, contact_id = %created.id, "recorded new identifiers");
            members.push(created);
        }
        tx.commit()?;

        let view = build_view(&primary, &members);
        debug!(primary_id = %view.primary_id, size = view.size(), "reconciled");
        Ok(view)
    }
}
