//! Transform engine abstraction and its FFmpeg implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, info};

use vproc_models::{EncodingConfig, JobConfig, RequestId, RequestType, VideoInformation};

use crate::command::FfmpegRunner;
use crate::compare::compatible;
use crate::denoise::clean_noise;
use crate::encode::encode_file;
use crate::error::{MediaError, MediaResult};
use crate::join::{concat_files, merge_files};
use crate::probe::probe_video;
use crate::thumbnail::{generate_thumbnail, ThumbnailRequest};

/// One tracked transformation handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineJob {
    pub request_id: RequestId,
    pub kind: RequestType,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub config: JobConfig,
}

/// The component that performs the actual media work.
///
/// Every call reports success or failure exactly once. `run` watches
/// `cancel` and aborts in-flight work on a best-effort basis once it turns
/// `true`.
#[async_trait]
pub trait TransformEngine: Send + Sync {
    /// Perform a concat, merge or encode job.
    async fn run(&self, job: &EngineJob, cancel: watch::Receiver<bool>) -> MediaResult<()>;

    /// Whether `files` can be concatenated without re-encoding.
    async fn compare(&self, files: &[PathBuf]) -> MediaResult<bool>;

    /// Extract one frame, returning the written path.
    async fn thumbnail(&self, request: &ThumbnailRequest) -> MediaResult<PathBuf>;

    /// Reduce audio noise, returning the written path.
    async fn denoise(&self, input: &Path, output: &Path) -> MediaResult<PathBuf>;

    /// Read container and track metadata.
    async fn read_info(&self, path: &Path) -> MediaResult<VideoInformation>;
}

/// [`TransformEngine`] backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine {
    encoding: EncodingConfig,
}

impl FfmpegEngine {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }
}

#[async_trait]
impl TransformEngine for FfmpegEngine {
    async fn run(&self, job: &EngineJob, cancel: watch::Receiver<bool>) -> MediaResult<()> {
        let runner = FfmpegRunner::new().with_cancel(cancel);

        info!(
            request_id = %job.request_id,
            kind = %job.kind,
            inputs = job.inputs.len(),
            "Engine job started"
        );

        match job.kind {
            RequestType::Concat => concat_files(&runner, &job.inputs, &job.output).await,
            RequestType::Merge => {
                merge_files(&runner, &job.inputs, &job.output, &job.config, &self.encoding).await
            }
            RequestType::Encode => {
                let input = single_input(&job.inputs)?;
                encode_file(&runner, input, &job.output, &job.config, &self.encoding).await
            }
            RequestType::Thumbnail | RequestType::NoiseClean => Err(MediaError::invalid_input(
                format!("{} is not a tracked job kind", job.kind),
            )),
        }
    }

    async fn compare(&self, files: &[PathBuf]) -> MediaResult<bool> {
        let mut infos = Vec::with_capacity(files.len());
        for file in files {
            infos.push(probe_video(file).await?);
        }

        let result = compatible(&infos);
        debug!(files = files.len(), compatible = result, "Compared files");
        Ok(result)
    }

    async fn thumbnail(&self, request: &ThumbnailRequest) -> MediaResult<PathBuf> {
        generate_thumbnail(&FfmpegRunner::new(), request).await
    }

    async fn denoise(&self, input: &Path, output: &Path) -> MediaResult<PathBuf> {
        clean_noise(&FfmpegRunner::new(), input, output).await
    }

    async fn read_info(&self, path: &Path) -> MediaResult<VideoInformation> {
        probe_video(path).await
    }
}

fn single_input(inputs: &[PathBuf]) -> MediaResult<&Path> {
    match inputs {
        [input] => Ok(input),
        _ => Err(MediaError::invalid_input(format!(
            "encode takes exactly one input, got {}",
            inputs.len()
        ))),
    }
}
