//! Thumbnail generation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::thumbnail_scale;

/// A single frame extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub position_millis: u64,
    /// Zero or `None` keeps the aspect ratio
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Decode up to the exact frame instead of the nearest keyframe
    #[serde(default)]
    pub precise: bool,
}

/// Generate a thumbnail and return the written path.
pub async fn generate_thumbnail(
    runner: &FfmpegRunner,
    request: &ThumbnailRequest,
) -> MediaResult<PathBuf> {
    if !request.input.exists() {
        return Err(MediaError::FileNotFound(request.input.clone()));
    }

    runner.run(&build_thumbnail_command(request)).await?;
    Ok(request.output.clone())
}

fn build_thumbnail_command(request: &ThumbnailRequest) -> FfmpegCommand {
    let cmd = if request.precise {
        FfmpegCommand::new(&request.output)
            .input(&request.input)
            .seek_output(request.position_millis)
    } else {
        FfmpegCommand::new(&request.output)
            .seek_input(request.position_millis)
            .input(&request.input)
    };

    let cmd = cmd.single_frame();
    match thumbnail_scale(request.width, request.height) {
        Some(filter) => cmd.video_filter(filter),
        None => cmd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(precise: bool) -> ThumbnailRequest {
        ThumbnailRequest {
            input: "in.mp4".into(),
            output: "thumb.jpg".into(),
            position_millis: 1500,
            width: Some(320),
            height: Some(0),
            precise,
        }
    }

    #[test]
    fn test_fast_seek_precedes_input() {
        let args = build_thumbnail_command(&request(false)).build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();

        assert!(ss < i);
        assert_eq!(args[ss + 1], "1.500");
        assert!(args.contains(&"scale=320:-2".to_string()));
    }

    #[test]
    fn test_precise_seek_follows_input() {
        let args = build_thumbnail_command(&request(true)).build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();

        assert!(ss > i);
    }

    #[test]
    fn test_precise_defaults_to_false() {
        let parsed: ThumbnailRequest = serde_json::from_str(
            r#"{"input":"a.mp4","output":"b.jpg","positionMillis":0,"width":null,"height":null}"#,
        )
        .unwrap();
        assert!(!parsed.precise);
    }
}
