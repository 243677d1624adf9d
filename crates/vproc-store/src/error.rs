//! Error types for store operations.

use thiserror::Error;
use vproc_models::{RequestId, RequestStatus};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the request store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Unknown id, including ids that were deleted
    #[error("Request not found: {0}")]
    NotFound(RequestId),

    #[error("Cannot {operation} request {id} while it is {status}")]
    InvalidState {
        id: RequestId,
        status: RequestStatus,
        operation: &'static str,
    },
}

impl StoreError {
    pub fn invalid_state(id: &RequestId, status: RequestStatus, operation: &'static str) -> Self {
        Self::InvalidState {
            id: id.clone(),
            status,
            operation,
        }
    }
}
