use connectors::error::DbError;
use planner::error::PlanError;
use thiserror::Error;

/// Failures of the authorization collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// No access. The engine treats the collection as denied.
    #[error("Access denied: {0}")]
    Denied(String),

    /// The permission source could not be reached. Aborts the request.
    #[error("Authorization backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed policy file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Malformed query tree: {0}")]
    Contract(#[from] PlanError),

    #[error("Store failure: {0}")]
    Store(#[from] DbError),

    #[error("Authorization failed: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Unknown store: {0}")]
    UnknownStore(String),
}
