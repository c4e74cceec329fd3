//! A small bounded thread pool that runs reconciliations off the caller's
//! thread.
//!
//! Submission never blocks: when the queue is full the request is refused
//! with `QueueFull` so callers can shed load. Dropping the runtime drains the
//! queue and joins every worker.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::engine::Reconciler;
use crate::error::{ContactError, ContactResult, ExecutionError};
use crate::identity::ReconcileRequest;
use crate::view::ClusterView;

enum Job {
    Reconcile {
        request: ReconcileRequest,
        reply: Sender<ContactResult<ClusterView>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(config: &RuntimeConfig, reconciler: &Arc<Reconciler>) -> ContactResult<Self> {
        let (tx, rx) = bounded::<Job>(config.queue_capacity);

        let mut workers = Vec::with_capacity(config.workers);
        for idx in 0..config.workers {
            let rx: Receiver<Job> = rx.clone();
            let reconciler = Arc::clone(reconciler);
            let handle = thread::Builder::new()
                .name(format!("contactgraph-worker-{idx}"))
                .spawn(move || worker_loop(&rx, &reconciler))
                .map_err(|e| ContactError::internal(format!("failed to spawn worker: {e}")))?;
            workers.push(handle);
        }

        Ok(Self {
            tx,
            workers,
            queue_capacity: config.queue_capacity,
        })
    }

    fn try_submit(&self, job: Job) -> ContactResult<()> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ExecutionError::QueueFull {
                capacity: self.queue_capacity,
            }
            .into()),
            Err(TrySendError::Disconnected(_)) => Err(ExecutionError::Disconnected.into()),
        }
    }

    fn shutdown(self) {
        // Closing the channel lets workers drain queued jobs and exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

fn worker_loop(rx: &Receiver<Job>, reconciler: &Reconciler) {
    while let Ok(job) = rx.recv() {
        match job {
            Job::Reconcile { request, reply } => {
                // The submitter may have stopped waiting; that is not an error here.
                let _ = reply.send(reconciler.reconcile_request(request));
            }

            #[cfg(test)]
            Job::Sleep { duration, reply } => {
                thread::sleep(duration);
                let _ = reply.send(());
            }
        }
    }
    debug!("worker exiting");
}

/// Pending result of a submitted reconciliation.
#[derive(Debug)]
pub struct ReconcileHandle {
    request_id: Uuid,
    rx: Receiver<ContactResult<ClusterView>>,
}

impl ReconcileHandle {
    /// Correlation id of the submitted request.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Waits for the result.
    ///
    /// # Errors
    /// The reconciliation's own error, or `Disconnected` if the worker died.
    pub fn join(self) -> ContactResult<ClusterView> {
        self.rx.recv().map_err(|_| ExecutionError::Disconnected)?
    }

    /// Waits for the result at most `timeout`.
    ///
    /// # Errors
    /// As [`ReconcileHandle::join`], plus `Timeout`. The reconciliation keeps
    /// running after a timeout and may still commit.
    pub fn join_timeout(self, timeout: Duration) -> ContactResult<ClusterView> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => ContactError::from(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => ContactError::from(ExecutionError::Disconnected),
        })?
    }
}

/// Bounded worker pool over a shared [`Reconciler`].
pub struct ReconcileRuntime {
    reconciler: Arc<Reconciler>,
    pool: Option<WorkerPool>,
}

impl ReconcileRuntime {
    /// Start the workers.
    ///
    /// # Errors
    /// `InvalidConfig` for a zero-sized pool or queue; `Internal` if a thread
    /// cannot be spawned.
    pub fn new(reconciler: Reconciler, config: RuntimeConfig) -> ContactResult<Self> {
        let config = config.validate()?;
        let reconciler = Arc::new(reconciler);
        let pool = WorkerPool::start(&config, &reconciler)?;
        Ok(Self {
            reconciler,
            pool: Some(pool),
        })
    }

    fn pool(&self) -> ContactResult<&WorkerPool> {
        self.pool.as_ref().ok_or_else(|| ExecutionError::Disconnected.into())
    }

    /// Queue a request without blocking.
    ///
    /// # Errors
    /// `QueueFull` if the queue is at capacity.
    pub fn submit(&self, request: ReconcileRequest) -> ContactResult<ReconcileHandle> {
        let request_id = request.request_id;
        let (tx, rx) = bounded::<ContactResult<ClusterView>>(1);
        self.pool()?.try_submit(Job::Reconcile { request, reply: tx })?;
        Ok(ReconcileHandle { request_id, rx })
    }

    /// Queue a request and wait for its result.
    ///
    /// # Errors
    /// As [`ReconcileRuntime::submit`] and [`ReconcileHandle::join`].
    pub fn reconcile(&self, email: Option<String>, phone: Option<String>) -> ContactResult<ClusterView> {
        self.submit(ReconcileRequest::new(email, phone))?.join()
    }

    /// The shared reconciler.
    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    #[cfg(test)]
    fn submit_sleep(&self, duration: Duration) -> ContactResult<Receiver<()>> {
        let (tx, rx) = bounded::<()>(1);
        self.pool()?.try_submit(Job::Sleep { duration, reply: tx })?;
        Ok(rx)
    }
}

impl Drop for ReconcileRuntime {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
    }
}
