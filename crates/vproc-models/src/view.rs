//! Wire projection of a [`Request`] for callers across the host bridge.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{JobConfig, Request, RequestId, RequestStatus, RequestType};

/// Immutable snapshot of a request as handed to callers and subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: RequestId,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub inputs: Vec<String>,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<JobConfig>,
    /// Engine failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Request> for RequestView {
    fn from(request: &Request) -> Self {
        Self {
            id: request.id.clone(),
            request_type: request.request_type,
            status: request.status,
            created_at: request.created_at,
            updated_at: request.updated_at,
            inputs: request
                .inputs
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            output: request.output.to_string_lossy().into_owned(),
            config: request.config,
            error: request.error_message.clone(),
        }
    }
}

impl From<Request> for RequestView {
    fn from(request: Request) -> Self {
        Self::from(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameRate, NewRequest};

    #[test]
    fn test_view_wire_shape() {
        let mut request = Request::new(NewRequest {
            request_type: RequestType::Encode,
            inputs: vec!["a.mp4".into()],
            output: "out.mp4".into(),
            config: Some(JobConfig::default().with_frame_rate(FrameRate::Sixty)),
        });
        request.transition(RequestStatus::Processing).unwrap();
        request.fail("boom").unwrap();

        let json = serde_json::to_value(RequestView::from(&request)).unwrap();

        assert_eq!(json["type"], "encode");
        assert_eq!(json["status"], "error");
        assert_eq!(json["inputs"][0], "a.mp4");
        assert_eq!(json["config"]["frameRate"], "sixtyFps");
        assert_eq!(json["error"], "boom");
        assert!(json["createdAt"].is_string());
        assert!(json["updatedAt"].is_string());
    }

    #[test]
    fn test_optional_fields_omitted() {
        let request = Request::new(NewRequest {
            request_type: RequestType::Concat,
            inputs: vec!["a.mp4".into(), "b.mp4".into()],
            output: "out.mp4".into(),
            config: None,
        });

        let json = serde_json::to_value(RequestView::from(request)).unwrap();
        assert_eq!(json["status"], "idle");
        assert!(json.get("config").is_none());
        assert!(json.get("error").is_none());
    }
}
