//! Single input re-encode.

use std::path::Path;
use tracing::info;

use vproc_models::{EncodingConfig, JobConfig};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::encode_filter_chain;

/// Re-encode `input` with the dimensions and frame rate from `config`.
pub async fn encode_file(
    runner: &FfmpegRunner,
    input: &Path,
    output: &Path,
    config: &JobConfig,
    encoding: &EncodingConfig,
) -> MediaResult<()> {
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        width = ?config.width,
        height = ?config.height,
        frame_rate = %config.frame_rate,
        "Encoding file"
    );

    runner.run(&build_encode_command(input, output, config, encoding)).await
}

fn build_encode_command(
    input: &Path,
    output: &Path,
    config: &JobConfig,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(output).input(input);
    if let Some(chain) = encode_filter_chain(config) {
        cmd = cmd.video_filter(chain);
    }
    cmd.output_args(encoding.to_ffmpeg_args())
}
