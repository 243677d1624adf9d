//! Shared data models for the video request lifecycle.
//!
//! This crate provides Serde-serializable types for:
//! - Requests, their status graph and list filters
//! - Encode/merge job configuration and its payload resolver
//! - Encoding settings for the FFmpeg engine
//! - Video/audio track metadata
//! - The request wire projection

pub mod encoding;
pub mod job_config;
pub mod request;
pub mod request_status;
pub mod video_info;
pub mod view;

// Re-export common types
pub use encoding::EncodingConfig;
pub use job_config::{ConfigError, ConfigResult, FrameRate, JobConfig};
pub use request::{NewRequest, OutputTarget, Request, RequestId, RequestType, TransitionError};
pub use request_status::{RequestStatus, StatusFilter, UnknownStatus};
pub use video_info::{AudioTrack, VideoInformation, VideoTrack};
pub use view::RequestView;
