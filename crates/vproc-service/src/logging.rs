//! Structured request logging utilities.
//!
//! Provides consistent, structured logging for request processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use vproc_models::{RequestId, RequestType};

/// Request logger with consistent formatting.
///
/// Every line carries the request ID and the operation kind.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    request_id: String,
    operation: String,
}

impl RequestLogger {
    pub fn new(request_id: &RequestId, operation: RequestType) -> Self {
        Self {
            request_id: request_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Logger for operations that never become tracked requests.
    pub fn untracked(operation: &str) -> Self {
        Self {
            request_id: "-".to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Request started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Request progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Request warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Request error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Request completed: {}", message
        );
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span covering one engine delegation.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_logger_creation() {
        let id = RequestId::new();
        let logger = RequestLogger::new(&id, RequestType::Merge);

        assert_eq!(logger.request_id(), id.to_string());
        assert_eq!(logger.operation(), "merge");
    }

    #[test]
    fn test_untracked_logger() {
        let logger = RequestLogger::untracked("thumbnail");

        assert_eq!(logger.request_id(), "-");
        assert_eq!(logger.operation(), "thumbnail");
    }
}
