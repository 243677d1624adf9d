//! Job builders.
//!
//! A builder collects inputs, an output and (for merge and encode) a
//! configuration. [`JobBuilder::validate`] checks every constraint before
//! anything is registered, so a failed build never leaves a partial request.

use serde_json::Value;
use std::path::PathBuf;

use vproc_models::{FrameRate, JobConfig, NewRequest, OutputTarget, RequestType};

use crate::error::{ServiceError, ServiceResult};
use crate::paths::ResultPaths;

/// Common surface of the concat, merge and encode builders.
pub trait JobBuilder {
    fn request_type(&self) -> RequestType;

    fn inputs(&self) -> &[PathBuf];

    fn output(&self) -> &OutputTarget;

    fn config(&self) -> Option<JobConfig>;

    /// Check inputs and resolve the output into a registrable request.
    fn validate(&self, paths: &ResultPaths) -> ServiceResult<NewRequest> {
        let request_type = self.request_type();
        let inputs = self.inputs();

        match request_type {
            RequestType::Encode if inputs.len() != 1 => {
                return Err(ServiceError::invalid_request(format!(
                    "encode takes exactly one input file, got {}",
                    inputs.len()
                )));
            }
            _ if inputs.is_empty() => {
                return Err(ServiceError::invalid_request(format!(
                    "{} needs at least one input file",
                    request_type
                )));
            }
            _ => {}
        }

        if let Some(position) = inputs.iter().position(|p| p.as_os_str().is_empty()) {
            return Err(ServiceError::invalid_request(format!(
                "input file #{} is empty",
                position + 1
            )));
        }

        let config = self.config();
        if let Some(config) = &config {
            for (field, value) in [("width", config.width), ("height", config.height)] {
                if value == Some(0) {
                    return Err(ServiceError::invalid_request(format!(
                        "{} must be a positive integer",
                        field
                    )));
                }
            }
        }

        let output = paths.resolve_target(self.output())?;

        Ok(NewRequest {
            request_type,
            inputs: inputs.to_vec(),
            output,
            config,
        })
    }
}

/// Builder for stream-copy concatenation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatBuilder {
    inputs: Vec<PathBuf>,
    output: OutputTarget,
}

impl ConcatBuilder {
    pub fn new<I, P>(inputs: I, output: impl Into<OutputTarget>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: output.into(),
        }
    }
}

impl JobBuilder for ConcatBuilder {
    fn request_type(&self) -> RequestType {
        RequestType::Concat
    }

    fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    fn output(&self) -> &OutputTarget {
        &self.output
    }

    fn config(&self) -> Option<JobConfig> {
        None
    }
}

/// Generates the config mutators shared by the merge and encode builders.
macro_rules! config_mutators {
    ($builder:ty) => {
        impl $builder {
            pub fn set_height(mut self, height: u32) -> Self {
                self.config = self.config.with_height(height);
                self
            }

            pub fn set_width(mut self, width: u32) -> Self {
                self.config = self.config.with_width(width);
                self
            }

            pub fn set_frame_rate(mut self, frame_rate: FrameRate) -> Self {
                self.config = self.config.with_frame_rate(frame_rate);
                self
            }

            /// Replace the configuration.
            pub fn with_config(mut self, config: JobConfig) -> Self {
                self.config = config;
                self
            }

            /// Resolve an untyped payload (object, JSON text or null).
            pub fn with_payload(self, payload: &Value) -> ServiceResult<Self> {
                let config = JobConfig::from_value(payload)?;
                Ok(self.with_config(config))
            }

            pub fn job_config(&self) -> &JobConfig {
                &self.config
            }
        }
    };
}

/// Builder for re-encoded joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeBuilder {
    inputs: Vec<PathBuf>,
    output: OutputTarget,
    config: JobConfig,
}

impl MergeBuilder {
    pub fn new<I, P>(inputs: I, output: impl Into<OutputTarget>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: output.into(),
            config: JobConfig::default(),
        }
    }
}

config_mutators!(MergeBuilder);

impl JobBuilder for MergeBuilder {
    fn request_type(&self) -> RequestType {
        RequestType::Merge
    }

    fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    fn output(&self) -> &OutputTarget {
        &self.output
    }

    fn config(&self) -> Option<JobConfig> {
        Some(self.config)
    }
}

/// Builder for single file re-encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeBuilder {
    inputs: Vec<PathBuf>,
    output: OutputTarget,
    config: JobConfig,
}

impl EncodeBuilder {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<OutputTarget>) -> Self {
        Self::from_inputs([input.into()], output)
    }

    /// Hosts sometimes hand over a list; validation insists on one entry.
    pub fn from_inputs<I, P>(inputs: I, output: impl Into<OutputTarget>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: output.into(),
            config: JobConfig::default(),
        }
    }
}

config_mutators!(EncodeBuilder);

impl JobBuilder for EncodeBuilder {
    fn request_type(&self) -> RequestType {
        RequestType::Encode
    }

    fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    fn output(&self) -> &OutputTarget {
        &self.output
    }

    fn config(&self) -> Option<JobConfig> {
        Some(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths() -> (tempfile::TempDir, ResultPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResultPaths::new(dir.path());
        (dir, paths)
    }

    #[test]
    fn test_concat_validates() {
        let (_dir, paths) = paths();
        let draft = ConcatBuilder::new(["a.mp4", "b.mp4"], "out.mp4")
            .validate(&paths)
            .unwrap();

        assert_eq!(draft.request_type, RequestType::Concat);
        assert_eq!(draft.inputs, vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]);
        assert_eq!(draft.config, None);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let (_dir, paths) = paths();
        let empty: Vec<PathBuf> = Vec::new();

        assert!(matches!(
            ConcatBuilder::new(empty.clone(), "out.mp4").validate(&paths),
            Err(ServiceError::InvalidRequest(_))
        ));
        assert!(MergeBuilder::new(empty, "out.mp4").validate(&paths).is_err());
        assert!(ConcatBuilder::new([""], "out.mp4").validate(&paths).is_err());
    }

    #[test]
    fn test_encode_requires_exactly_one_input() {
        let (_dir, paths) = paths();

        assert!(EncodeBuilder::new("a.mp4", "out.mp4").validate(&paths).is_ok());
        assert!(EncodeBuilder::from_inputs(["a.mp4", "b.mp4"], "out.mp4")
            .validate(&paths)
            .is_err());
        assert!(EncodeBuilder::from_inputs(Vec::<PathBuf>::new(), "out.mp4")
            .validate(&paths)
            .is_err());
    }

    #[test]
    fn test_config_mutators() {
        let builder = MergeBuilder::new(["a.mp4"], "out.mp4")
            .set_width(1280)
            .set_height(720)
            .set_frame_rate(FrameRate::Thirty);

        assert_eq!(builder.job_config().width, Some(1280));
        assert_eq!(builder.job_config().height, Some(720));
        assert_eq!(builder.job_config().frame_rate, FrameRate::Thirty);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let (_dir, paths) = paths();

        let err = MergeBuilder::new(["a.mp4", "b.mp4"], "out.mp4")
            .set_height(0)
            .validate(&paths)
            .unwrap_err();
        assert_eq!(err, ServiceError::invalid_request("height must be a positive integer"));

        let err = EncodeBuilder::new("a.mp4", "out.mp4")
            .set_width(0)
            .set_height(720)
            .validate(&paths)
            .unwrap_err();
        assert_eq!(err, ServiceError::invalid_request("width must be a positive integer"));
    }

    #[test]
    fn test_payload_resolution() {
        let builder = EncodeBuilder::new("a.mp4", "out.mp4")
            .with_payload(&json!({ "framesRate": "sixtyFps" }))
            .unwrap();
        assert_eq!(builder.job_config().frame_rate.fps(), Some(60));

        let err = EncodeBuilder::new("a.mp4", "out.mp4")
            .with_payload(&json!("{not json"))
            .unwrap_err();
        assert_eq!(err.kind(), "config_parse");
    }

    #[test]
    fn test_result_name_output() {
        let (dir, paths) = paths();
        let draft = EncodeBuilder::new("a.mp4", OutputTarget::ResultName("enc.mp4".into()))
            .validate(&paths)
            .unwrap();

        assert_eq!(draft.output, dir.path().join("camera").join("enc.mp4"));
        assert_eq!(draft.config, Some(JobConfig::default()));
    }
}
