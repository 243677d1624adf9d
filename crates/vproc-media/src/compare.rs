//! Compatibility check for stream-copy concatenation.

use vproc_models::{AudioTrack, VideoInformation, VideoTrack};

/// Frame rates closer than this are treated as equal.
const FRAME_RATE_TOLERANCE: f64 = 0.01;

/// True when every file can be concatenated with the first one without
/// re-encoding: same video codec, size, pixel format and frame rate, and
/// the same audio layout.
pub fn compatible(infos: &[VideoInformation]) -> bool {
    let Some((first, rest)) = infos.split_first() else {
        return true;
    };

    rest.iter().all(|other| {
        same_video(first.primary_video(), other.primary_video())
            && same_audio(&first.audio_tracks, &other.audio_tracks)
    })
}

fn same_video(a: Option<&VideoTrack>, b: Option<&VideoTrack>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.codec == b.codec
                && a.width == b.width
                && a.height == b.height
                && a.pixel_format == b.pixel_format
                && (a.frame_rate - b.frame_rate).abs() < FRAME_RATE_TOLERANCE
        }
        _ => false,
    }
}

fn same_audio(a: &[AudioTrack], b: &[AudioTrack]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(a, b)| {
            a.codec == b.codec && a.channels == b.channels && a.sample_rate == b.sample_rate
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(codec: &str, width: u32, fps: f64, channels: u32) -> VideoInformation {
        VideoInformation {
            video_tracks: vec![VideoTrack {
                codec: codec.into(),
                width,
                height: 720,
                pixel_format: "yuv420p".into(),
                frame_rate: fps,
                ..Default::default()
            }],
            audio_tracks: vec![AudioTrack {
                codec: "aac".into(),
                channels,
                sample_rate: 48_000,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_matching_files_are_compatible() {
        let a = info("h264", 1280, 30.0, 2);
        assert!(compatible(&[a.clone(), a.clone(), a]));
    }

    #[test]
    fn test_differences_are_detected() {
        let base = info("h264", 1280, 30.0, 2);

        assert!(!compatible(&[base.clone(), info("hevc", 1280, 30.0, 2)]));
        assert!(!compatible(&[base.clone(), info("h264", 1920, 30.0, 2)]));
        assert!(!compatible(&[base.clone(), info("h264", 1280, 25.0, 2)]));
        assert!(!compatible(&[base.clone(), info("h264", 1280, 30.0, 1)]));

        let mut silent = base.clone();
        silent.audio_tracks.clear();
        assert!(!compatible(&[base, silent]));
    }
}
