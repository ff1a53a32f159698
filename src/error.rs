use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors produced by the document store and identifier allocation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,

    #[error("write conflict: {0}")]
    WriteConflict(String),

    /// A stored key does not parse as `<prefix><non-negative integer>`.
    /// Fatal for the allocation attempt; never skipped.
    #[error("malformed identifier {id:?} for prefix {prefix:?}")]
    AllocationIntegrity { id: String, prefix: &'static str },

    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redb::TransactionError> for StoreError {
    fn from(error: redb::TransactionError) -> Self {
        StoreError::Storage(error.into())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(error: redb::TableError) -> Self {
        StoreError::Storage(error.into())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(error: redb::StorageError) -> Self {
        StoreError::Storage(error.into())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(error: redb::CommitError) -> Self {
        StoreError::Storage(error.into())
    }
}

/// Request-level errors, mapped onto HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("user not found: {0}")]
    UnknownUser(String),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(StoreError::NotFound) | ApiError::UnknownUser(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Store(StoreError::WriteConflict(_)) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::AllocationIntegrity { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Store(_) | ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
