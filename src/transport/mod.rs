//! gRPC transport.
//!
//! `IdentityService.Identify` queues the request on a [`ReconcileRuntime`]
//! and waits for it on tokio's blocking pool, so reconciliation never runs
//! on an async worker thread.

use std::sync::Arc;
use std::time::Duration;

use tonic::{Request, Response, Status};
use tracing::warn;
use uuid::Uuid;

use crate::engine::runtime::ReconcileRuntime;
use crate::error::{ContactError, ExecutionError};
use crate::identity::ReconcileRequest;
use crate::view::ClusterView;

#[allow(missing_docs, clippy::pedantic)]
pub mod proto {
    tonic::include_proto!("contactgraph");
}

use proto::identity_service_server::{IdentityService, IdentityServiceServer};

/// Metadata key carrying a caller-chosen correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Default time an Identify call waits for its result.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// gRPC service implementation.
pub struct IdentityServiceImpl {
    runtime: Arc<ReconcileRuntime>,
    request_timeout: Duration,
}

impl IdentityServiceImpl {
    /// Serve requests through `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<ReconcileRuntime>) -> Self {
        Self {
            runtime,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bound how long one Identify call waits for its result.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Wrap in the tonic server type.
    #[must_use]
    pub fn into_server(self) -> IdentityServiceServer<Self> {
        IdentityServiceServer::new(self)
    }
}

fn status_from_contact_error(err: ContactError) -> Status {
    match err {
        ContactError::Validation(v) => Status::invalid_argument(v.to_string()),
        ContactError::Execution(e) => match e {
            ExecutionError::Conflict { .. } | ExecutionError::Contended { .. } => Status::aborted(e.to_string()),
            ExecutionError::QueueFull { .. } => Status::resource_exhausted(e.to_string()),
            ExecutionError::Timeout { .. } => Status::deadline_exceeded(e.to_string()),
            ExecutionError::Storage { .. } | ExecutionError::InvariantViolated { .. } | ExecutionError::Disconnected => {
                Status::internal(e.to_string())
            }
        },
        ContactError::Transport(t) => Status::internal(t.to_string()),
        ContactError::Internal { message } => Status::internal(message),
    }
}

fn request_id<T>(request: &Request<T>) -> Uuid {
    request
        .metadata()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
}

impl From<ClusterView> for proto::ContactDetails {
    fn from(view: ClusterView) -> Self {
        Self {
            primary_contact_id: view.primary_id.get(),
            emails: view.emails,
            phone_numbers: view.phones,
            secondary_contact_ids: view.secondary_ids.into_iter().map(i64::from).collect(),
        }
    }
}

#[tonic::async_trait]
impl IdentityService for IdentityServiceImpl {
    async fn identify(
        &self,
        request: Request<proto::IdentifyRequest>,
    ) -> Result<Response<proto::IdentifyResponse>, Status> {
        let id = request_id(&request);
        let req = request.into_inner();
        let handle = self
            .runtime
            .submit(ReconcileRequest::new(req.email, req.phone_number).with_request_id(id))
            .map_err(status_from_contact_error)?;

        let timeout = self.request_timeout;
        let view = tokio::task::spawn_blocking(move || handle.join_timeout(timeout))
            .await
            .map_err(|e| Status::internal(format!("reconcile task failed: {e}")))?
            .map_err(|e| {
                if !e.is_validation() {
                    warn!(request_id = %id, error = %e, "identify failed");
                }
                status_from_contact_error(e)
            })?;

        Ok(Response::new(proto::IdentifyResponse {
            contact: Some(view.into()),
        }))
    }

    async fn health(
        &self,
        _request: Request<proto::HealthRequest>,
    ) -> Result<Response<proto::HealthResponse>, Status> {
        Ok(Response::new(proto::HealthResponse {
            status: "ok".to_string(),
        }))
    }
}
