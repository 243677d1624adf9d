//! FFprobe video information.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use vproc_models::{AudioTrack, VideoInformation, VideoTrack};

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    codec_tag_string: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    bit_rate: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
    sample_fmt: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

/// Probe a media file.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInformation> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("FFprobe could not read {}", path.display()),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    let info = parse_probe_output(&output.stdout, path)?;
    debug!(
        path = %path.display(),
        video_tracks = info.video_tracks.len(),
        audio_tracks = info.audio_tracks.len(),
        "Probed media file"
    );
    Ok(info)
}

/// Project raw `ffprobe -print_format json` output.
///
/// Track order follows the stream order reported by FFprobe.
pub fn parse_probe_output(json: &[u8], path: &Path) -> MediaResult<VideoInformation> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let mut info = VideoInformation {
        path: path.to_string_lossy().into_owned(),
        size: parse_num(&probe.format.size).unwrap_or(0),
        duration_millis: parse_millis(&probe.format.duration),
        format: probe.format.format_name.clone().unwrap_or_default(),
        video_tracks: Vec::new(),
        audio_tracks: Vec::new(),
    };

    for stream in &probe.streams {
        match stream.codec_type.as_deref() {
            Some("video") => info.video_tracks.push(video_track(stream)),
            Some("audio") => info.audio_tracks.push(audio_track(stream)),
            _ => {}
        }
    }

    Ok(info)
}

fn video_track(stream: &FfprobeStream) -> VideoTrack {
    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    VideoTrack {
        index: stream.index,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        codec: stream.codec_name.clone().unwrap_or_default(),
        codec_tag: stream.codec_tag_string.clone().unwrap_or_default(),
        pixel_format: stream.pix_fmt.clone().unwrap_or_default(),
        bit_rate: parse_num(&stream.bit_rate).unwrap_or(0),
        frame_rate,
        duration_millis: parse_millis(&stream.duration),
        ..Default::default()
    }
    .with_rotation(rotation(stream))
}

fn audio_track(stream: &FfprobeStream) -> AudioTrack {
    AudioTrack {
        index: stream.index,
        bit_rate: parse_num(&stream.bit_rate).unwrap_or(0),
        sample_rate: parse_num(&stream.sample_rate).unwrap_or(0),
        channels: stream.channels.unwrap_or(0),
        codec: stream.codec_name.clone().unwrap_or_default(),
        codec_tag: stream.codec_tag_string.clone().unwrap_or_default(),
        duration_millis: parse_millis(&stream.duration),
        channel_layout: stream.channel_layout.clone().unwrap_or_default(),
        sample_format: stream.sample_fmt.clone().unwrap_or_default(),
    }
}

/// Clockwise rotation from the legacy `rotate` tag or the display matrix.
fn rotation(stream: &FfprobeStream) -> i32 {
    if let Some(rotate) = stream.tags.get("rotate").and_then(|r| r.trim().parse::<i32>().ok()) {
        return rotate;
    }

    // Display matrix rotation is counter-clockwise
    stream
        .side_data_list
        .iter()
        .find_map(|side| side.rotation)
        .map(|r| -(r.round() as i32))
        .unwrap_or(0)
}

fn parse_num<T: std::str::FromStr>(value: &Option<String>) -> Option<T> {
    value.as_deref().and_then(|v| v.trim().parse().ok())
}

fn parse_millis(seconds: &Option<String>) -> u64 {
    parse_num::<f64>(seconds)
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| (s * 1000.0).round() as u64)
        .unwrap_or(0)
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.trim().parse().ok()?
    };

    (rate.is_finite() && rate > 0.0).then_some(rate)
}
