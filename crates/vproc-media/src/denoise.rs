//! Audio noise reduction.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::DENOISE_FILTER;

/// Clean the audio track of `input` into `output`, copying video as is.
pub async fn clean_noise(runner: &FfmpegRunner, input: &Path, output: &Path) -> MediaResult<PathBuf> {
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    info!(input = %input.display(), output = %output.display(), "Cleaning audio noise");
    runner.run(&build_denoise_command(input, output)).await?;
    Ok(output.to_path_buf())
}

fn build_denoise_command(input: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .input(input)
        .audio_filter(DENOISE_FILTER)
        .video_codec("copy")
}
