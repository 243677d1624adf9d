//! Concatenation (stream copy) and merging (re-encode) of several inputs.

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use vproc_models::{EncodingConfig, JobConfig};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{concat_list, merge_filter_graph};
use crate::probe::probe_video;

/// Join `inputs` back to back without re-encoding.
///
/// Uses the concat demuxer, so every input must share codecs and parameters.
pub async fn concat_files(
    runner: &FfmpegRunner,
    inputs: &[PathBuf],
    output: &Path,
) -> MediaResult<()> {
    ensure_inputs(inputs)?;

    let base = std::env::current_dir()?;
    let mut list = tempfile::Builder::new()
        .prefix("vproc-concat-")
        .suffix(".txt")
        .tempfile()?;
    list.write_all(concat_list(inputs, &base).as_bytes())?;
    list.flush()?;

    info!(inputs = inputs.len(), output = %output.display(), "Concatenating files");

    let cmd = FfmpegCommand::new(output)
        .input_args(["-f", "concat", "-safe", "0"])
        .input(list.path())
        .stream_copy();

    // `list` must outlive the FFmpeg run
    let result = runner.run(&cmd).await;
    drop(list);
    result
}

/// Join `inputs` into one re-encoded output.
///
/// Every input is letterboxed to the configured size, or to the first
/// input's display size when the config leaves it unset.
pub async fn merge_files(
    runner: &FfmpegRunner,
    inputs: &[PathBuf],
    output: &Path,
    config: &JobConfig,
    encoding: &EncodingConfig,
) -> MediaResult<()> {
    ensure_inputs(inputs)?;

    let mut infos = Vec::with_capacity(inputs.len());
    for input in inputs {
        infos.push(probe_video(input).await?);
    }

    let first = infos[0]
        .primary_video()
        .ok_or_else(|| MediaError::invalid_video(format!("{} has no video track", inputs[0].display())))?;

    let (width, height) = target_size(config, first.rotated_width, first.rotated_height);
    let with_audio = infos.iter().all(|info| !info.audio_tracks.is_empty());

    info!(
        inputs = inputs.len(),
        width,
        height,
        fps = ?config.frame_rate.fps(),
        with_audio,
        output = %output.display(),
        "Merging files"
    );

    let graph = merge_filter_graph(inputs.len(), width, height, config.frame_rate.fps(), with_audio);

    let mut cmd = inputs
        .iter()
        .fold(FfmpegCommand::new(output), |cmd, input| cmd.input(input))
        .filter_complex(graph)
        .map("[outv]");
    if with_audio {
        cmd = cmd.map("[outa]");
    }
    let cmd = cmd.output_args(encoding.to_ffmpeg_args());

    runner.run(&cmd).await
}

/// Output size for a merge. A single configured side scales the other from
/// the source aspect ratio. Results are rounded down to even numbers.
fn target_size(config: &JobConfig, source_width: u32, source_height: u32) -> (u32, u32) {
    let (w, h) = match (config.width, config.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) if source_width > 0 => (w, scale(source_height, w, source_width)),
        (None, Some(h)) if source_height > 0 => (scale(source_width, h, source_height), h),
        (Some(w), None) => (w, source_height),
        (None, Some(h)) => (source_width, h),
        (None, None) => (source_width, source_height),
    };

    (even(w), even(h))
}

fn scale(value: u32, numerator: u32, denominator: u32) -> u32 {
    ((value as u64 * numerator as u64) / denominator as u64) as u32
}

fn even(value: u32) -> u32 {
    (value & !1).max(2)
}

fn ensure_inputs(inputs: &[PathBuf]) -> MediaResult<()> {
    if inputs.is_empty() {
        return Err(MediaError::invalid_input("no input files"));
    }
    for input in inputs {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.clone()));
        }
    }
    Ok(())
}
