//! Caller-facing error taxonomy.

use thiserror::Error;

use vproc_media::MediaError;
use vproc_models::ConfigError;
use vproc_store::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Every operation fails with exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Malformed or missing input to a builder or operation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration payload not parseable as structured data
    #[error("Invalid configuration: {0}")]
    ConfigParse(String),

    /// Operation not allowed in the request's current status
    #[error("{0}")]
    InvalidState(String),

    /// Unknown or deleted request id
    #[error("{0}")]
    NotFound(String),

    /// The transform engine reported a failure
    #[error("Engine error: {0}")]
    Engine(String),
}

impl ServiceError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config_parse(msg: impl Into<String>) -> Self {
        Self::ConfigParse(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Stable code reported to bridge callers.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidRequest(_) => "invalid_request",
            ServiceError::ConfigParse(_) => "config_parse",
            ServiceError::InvalidState(_) => "invalid_state",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Engine(_) => "engine",
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound(err.to_string()),
            StoreError::InvalidState { .. } => Self::InvalidState(err.to_string()),
        }
    }
}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

impl From<MediaError> for ServiceError {
    fn from(err: MediaError) -> Self {
        Self::Engine(err.detail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vproc_models::{RequestId, RequestStatus};

    #[test]
    fn test_store_errors_map_to_kinds() {
        let id = RequestId::from("req-1");

        let not_found: ServiceError = StoreError::NotFound(id.clone()).into();
        assert_eq!(not_found.kind(), "not_found");
        assert_eq!(not_found.to_string(), "Request not found: req-1");

        let invalid: ServiceError =
            StoreError::invalid_state(&id, RequestStatus::Completed, "cancel").into();
        assert_eq!(invalid.kind(), "invalid_state");
        assert_eq!(invalid.to_string(), "Cannot cancel request req-1 while it is complete");
    }

    #[test]
    fn test_config_and_media_errors() {
        let config: ServiceError = ConfigError::malformed("expected value").into();
        assert_eq!(config.kind(), "config_parse");

        let media: ServiceError = MediaError::FfprobeNotFound.into();
        assert_eq!(media, ServiceError::Engine("FFprobe not found in PATH".to_string()));
    }
}
