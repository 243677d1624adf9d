//! Tracked video processing requests.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::{JobConfig, RequestStatus};

/// Unique identifier for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Join inputs back to back without re-encoding
    Concat,
    /// Join inputs into a single re-encoded output
    Merge,
    /// Re-encode a single input
    Encode,
    /// Single frame extraction (never tracked)
    Thumbnail,
    /// Audio noise reduction (never tracked)
    NoiseClean,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Concat => "concat",
            RequestType::Merge => "merge",
            RequestType::Encode => "encode",
            RequestType::Thumbnail => "thumbnail",
            RequestType::NoiseClean => "noise_clean",
        }
    }

    /// Whether requests of this type live in the request store.
    pub fn is_tracked(&self) -> bool {
        matches!(self, RequestType::Concat | RequestType::Merge | RequestType::Encode)
    }

    /// Whether this type carries a resolved [`JobConfig`].
    pub fn takes_config(&self) -> bool {
        matches!(self, RequestType::Merge | RequestType::Encode)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a request writes its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    /// Explicit filesystem path
    Path(PathBuf),
    /// Logical result name, resolved under the result directory
    ResultName(String),
}

impl From<PathBuf> for OutputTarget {
    fn from(path: PathBuf) -> Self {
        OutputTarget::Path(path)
    }
}

impl From<&str> for OutputTarget {
    fn from(path: &str) -> Self {
        OutputTarget::Path(PathBuf::from(path))
    }
}

impl From<String> for OutputTarget {
    fn from(path: String) -> Self {
        OutputTarget::Path(PathBuf::from(path))
    }
}

/// Validated description of a request about to be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub request_type: RequestType,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub config: Option<JobConfig>,
}

/// Illegal status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot move request from {from} to {to}")]
pub struct TransitionError {
    pub from: RequestStatus,
    pub to: RequestStatus,
}

/// A tracked unit of work and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Request {
    /// Unique request ID
    pub id: RequestId,

    /// Operation kind
    #[serde(rename = "type")]
    pub request_type: RequestType,

    /// Current status
    #[serde(default)]
    pub status: RequestStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,

    /// Source files, in operation order
    pub inputs: Vec<PathBuf>,

    /// Destination file
    pub output: PathBuf,

    /// Resolved configuration (encode and merge only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<JobConfig>,

    /// Engine failure detail (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Request {
    /// Create a new idle request with a fresh ID.
    pub fn new(draft: NewRequest) -> Self {
        let now = Utc::now();

        Self {
            id: RequestId::new(),
            request_type: draft.request_type,
            status: RequestStatus::Idle,
            created_at: now,
            updated_at: now,
            inputs: draft.inputs,
            output: draft.output,
            config: draft.config,
            error_message: None,
        }
    }

    /// Move to `next`, bumping `updated_at`.
    pub fn transition(&mut self, next: RequestStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.touch();
        Ok(())
    }

    /// Record an engine failure.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(RequestStatus::Error)?;
        self.error_message = Some(error.into());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    // Strictly monotonic even when the clock has not moved since the last change.
    fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat_draft() -> NewRequest {
        NewRequest {
            request_type: RequestType::Concat,
            inputs: vec!["a.mp4".into(), "b.mp4".into()],
            output: "out.mp4".into(),
            config: None,
        }
    }

    #[test]
    fn test_request_id_generation() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_request_creation() {
        let request = Request::new(concat_draft());

        assert_eq!(request.status, RequestStatus::Idle);
        assert_eq!(request.created_at, request.updated_at);
        assert_eq!(request.inputs, vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]);
    }

    #[test]
    fn test_request_transitions_advance_timestamp() {
        let mut request = Request::new(concat_draft());

        request.transition(RequestStatus::Processing).unwrap();
        let started = request.updated_at;
        assert!(started > request.created_at);

        request.transition(RequestStatus::Completed).unwrap();
        assert!(request.updated_at > started);
        assert!(request.is_terminal());
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut request = Request::new(concat_draft());
        let before = request.clone();

        let err = request.transition(RequestStatus::Completed).unwrap_err();
        assert_eq!(err.from, RequestStatus::Idle);
        assert_eq!(err.to, RequestStatus::Completed);
        assert_eq!(request, before);
    }

    #[test]
    fn test_fail_records_detail() {
        let mut request = Request::new(concat_draft());
        request.transition(RequestStatus::Processing).unwrap();
        request.fail("codec missing").unwrap();

        assert_eq!(request.status, RequestStatus::Error);
        assert_eq!(request.error_message.as_deref(), Some("codec missing"));
    }

    #[test]
    fn test_tracked_types() {
        assert!(RequestType::Concat.is_tracked());
        assert!(!RequestType::Thumbnail.is_tracked());
        assert!(RequestType::Encode.takes_config());
        assert!(!RequestType::Concat.takes_config());
    }
}
