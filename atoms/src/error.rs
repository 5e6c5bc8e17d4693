use crate::sellers::ApplicationStatus;
use crate::store::StoreError;
use thiserror::Error;

/// Failures surfaced to the operator. Every variant carries enough text to show as-is.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("You must be signed in")]
    Unauthenticated,
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Failed to load {entity}: {source}")]
    QueryFailed {
        entity: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("Seller application workflow failed: {0}")]
    WorkflowFailed(#[source] StoreError),
    #[error("Cannot move application from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("Failed to update {entity}: {source}")]
    MutationFailed {
        entity: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("Failed to compute dashboard stats: {0}")]
    StatsFailed(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type AdminResult<T> = Result<T, AdminError>;

impl AdminError {
    /// Stable machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AdminError::Unauthenticated => "Unauthenticated",
            AdminError::PermissionDenied(_) => "PermissionDenied",
            AdminError::QueryFailed { .. } => "QueryFailed",
            AdminError::WorkflowFailed(_) => "WorkflowFailed",
            AdminError::InvalidTransition { .. } => "InvalidTransition",
            AdminError::MutationFailed { .. } => "MutationFailed",
            AdminError::StatsFailed(_) => "StatsFailed",
            AdminError::NotFound(_) => "NotFound",
            AdminError::InvalidRequest(_) => "InvalidRequest",
        }
    }
}
