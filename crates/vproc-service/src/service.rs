//! The call surface: every caller-facing operation in one facade.

use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use vproc_media::{FfmpegEngine, MediaError, MediaResult, ThumbnailRequest, TransformEngine};
use vproc_models::{
    JobConfig, OutputTarget, Request, RequestId, StatusFilter, VideoInformation,
};
use vproc_store::{RequestEvent, RequestStore, Subscription};

use crate::builder::{ConcatBuilder, EncodeBuilder, JobBuilder, MergeBuilder};
use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::executor::ProcessExecutor;
use crate::logging::RequestLogger;
use crate::paths::ResultPaths;

/// Video request lifecycle service.
///
/// Cheap to share behind an [`Arc`]; all state lives in the request store.
pub struct VideoService {
    config: ServiceConfig,
    store: Arc<RequestStore>,
    engine: Arc<dyn TransformEngine>,
    executor: ProcessExecutor,
    paths: ResultPaths,
}

impl VideoService {
    /// Service backed by the FFmpeg engine.
    pub fn from_config(config: ServiceConfig) -> Self {
        let engine = Arc::new(FfmpegEngine::new(config.encoding.clone()));
        Self::new(config, engine)
    }

    /// Service backed by any engine.
    pub fn new(config: ServiceConfig, engine: Arc<dyn TransformEngine>) -> Self {
        let store = Arc::new(RequestStore::new());
        let executor = ProcessExecutor::new(
            store.clone(),
            engine.clone(),
            config.max_concurrent_jobs,
            config.engine_timeout,
        );
        let paths = ResultPaths::new(&config.result_dir);

        Self {
            config,
            store,
            engine,
            executor,
            paths,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    // ---------------------------------------------------------------------
    // Builders
    // ---------------------------------------------------------------------

    /// Validate a builder and register its request as IDLE.
    pub async fn build<B: JobBuilder>(&self, builder: B) -> ServiceResult<Request> {
        let draft = builder.validate(&self.paths)?;
        Ok(self.store.create(draft))
    }

    /// Build and immediately start processing.
    pub async fn build_and_process<B: JobBuilder>(&self, builder: B) -> ServiceResult<Request> {
        let request = self.build(builder).await?;
        self.process(&request.id).await
    }

    pub async fn build_concat<I, P>(
        &self,
        inputs: I,
        output: impl Into<OutputTarget>,
    ) -> ServiceResult<Request>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.build(ConcatBuilder::new(inputs, output)).await
    }

    pub async fn build_merge<I, P>(
        &self,
        inputs: I,
        output: impl Into<OutputTarget>,
        config: JobConfig,
    ) -> ServiceResult<Request>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.build(MergeBuilder::new(inputs, output).with_config(config))
            .await
    }

    pub async fn build_encode(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<OutputTarget>,
        config: JobConfig,
    ) -> ServiceResult<Request> {
        self.build(EncodeBuilder::new(input, output).with_config(config))
            .await
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// IDLE -> PROCESSING, then hand the work to the engine.
    pub async fn process(&self, id: &RequestId) -> ServiceResult<Request> {
        self.executor.process(id)
    }

    /// IDLE | PROCESSING -> CANCELED, aborting the engine when it runs.
    pub async fn cancel(&self, id: &RequestId) -> ServiceResult<Request> {
        self.executor.cancel(id)
    }

    /// Remove the request. An in-flight engine call keeps running and its
    /// outcome is discarded.
    pub async fn delete(&self, id: &RequestId) -> ServiceResult<Request> {
        Ok(self.store.delete(id)?)
    }

    pub async fn get_by_id(&self, id: &RequestId) -> ServiceResult<Request> {
        Ok(self.store.get(id)?)
    }

    pub async fn list_all(&self, filter: StatusFilter) -> Vec<Request> {
        self.store.list(filter)
    }

    pub fn stream_by_id(&self, id: &RequestId) -> ServiceResult<Subscription<RequestEvent>> {
        Ok(self.store.subscribe_request(id)?)
    }

    pub fn stream_all(&self, filter: StatusFilter) -> Subscription<Vec<Request>> {
        self.store.subscribe_collection(filter)
    }

    // ---------------------------------------------------------------------
    // Pass-through operations
    // ---------------------------------------------------------------------

    pub async fn get_info(&self, path: impl AsRef<Path>) -> ServiceResult<VideoInformation> {
        let path = path.as_ref();
        self.with_timeout(self.engine.read_info(path)).await
    }

    /// Extract one frame. Not tracked in the store.
    pub async fn generate_thumbnail(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<OutputTarget>,
        position_millis: u64,
        width: Option<u32>,
        height: Option<u32>,
        precise: Option<bool>,
    ) -> ServiceResult<PathBuf> {
        let input = non_empty_input(input.into())?;
        let request = ThumbnailRequest {
            input,
            output: self.paths.resolve_target(&output.into())?,
            position_millis,
            width,
            height,
            precise: precise.unwrap_or(false),
        };

        let logger = RequestLogger::untracked("thumbnail");
        logger.log_start(&format!(
            "{} at {}ms -> {}",
            request.input.display(),
            position_millis,
            request.output.display()
        ));

        let written = self.with_timeout(self.engine.thumbnail(&request)).await?;
        logger.log_completion(&written.display().to_string());
        Ok(written)
    }

    /// Reduce audio noise. Not tracked in the store.
    pub async fn clean_noise(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<OutputTarget>,
    ) -> ServiceResult<PathBuf> {
        let input = non_empty_input(input.into())?;
        let output = self.paths.resolve_target(&output.into())?;

        let logger = RequestLogger::untracked("noise_clean");
        logger.log_start(&format!("{} -> {}", input.display(), output.display()));

        let written = self.with_timeout(self.engine.denoise(&input, &output)).await?;
        logger.log_completion(&written.display().to_string());
        Ok(written)
    }

    /// Whether every file can be concatenated without re-encoding.
    pub async fn compare<I, P>(&self, files: I) -> ServiceResult<bool>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let files: Vec<PathBuf> = files.into_iter().map(Into::into).collect();
        if files.len() < 2 {
            return Err(ServiceError::invalid_request(format!(
                "compare needs at least two files, got {}",
                files.len()
            )));
        }

        let result = self.with_timeout(self.engine.compare(&files)).await?;
        info!(files = files.len(), compatible = result, "Compared files");
        Ok(result)
    }

    /// Resolve a logical result name to a writable path.
    pub fn result_path(&self, name: &str) -> ServiceResult<PathBuf> {
        self.paths.resolve(name)
    }

    async fn with_timeout<T, F>(&self, operation: F) -> ServiceResult<T>
    where
        F: Future<Output = MediaResult<T>>,
    {
        let result = match self.config.engine_timeout {
            Some(limit) => run_with_timeout(limit, operation).await,
            None => operation.await,
        };
        Ok(result?)
    }
}

impl std::fmt::Debug for VideoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoService")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("executor", &self.executor)
            .finish()
    }
}

async fn run_with_timeout<T, F>(limit: Duration, operation: F) -> MediaResult<T>
where
    F: Future<Output = MediaResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => {
            debug!(timeout_ms = limit.as_millis() as u64, "Engine call timed out");
            Err(MediaError::Timeout(limit))
        }
    }
}

fn non_empty_input(input: PathBuf) -> ServiceResult<PathBuf> {
    if input.as_os_str().is_empty() {
        Err(ServiceError::invalid_request("input file is empty"))
    } else {
        Ok(input)
    }
}

/// Parse a thumbnail position. Accepts a non-negative integer or its
/// decimal text form.
pub fn parse_position(raw: &Value) -> ServiceResult<u64> {
    let invalid = || {
        ServiceError::invalid_request(format!(
            "position must be a non-negative integer in milliseconds, got {}",
            raw
        ))
    };

    match raw {
        Value::Number(n) => n.as_u64().ok_or_else(invalid),
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}
