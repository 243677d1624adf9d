//! FFmpeg CLI engine for video requests.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation support via tokio
//! - Concat, merge, encode, thumbnail and noise clean operations
//! - FFprobe metadata projection
//! - The [`TransformEngine`] seam used by the request lifecycle

pub mod command;
pub mod compare;
pub mod denoise;
pub mod encode;
pub mod engine;
pub mod error;
pub mod filters;
pub mod join;
pub mod probe;
pub mod progress;
pub mod thumbnail;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use engine::{EngineJob, FfmpegEngine, TransformEngine};
pub use error::{MediaError, MediaResult};
pub use probe::{parse_probe_output, probe_video};
pub use progress::FfmpegProgress;
pub use thumbnail::{generate_thumbnail, ThumbnailRequest};
