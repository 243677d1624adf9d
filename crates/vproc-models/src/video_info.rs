//! Stable external representation of a media file and its tracks.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// File level metadata plus every video and audio track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoInformation {
    /// Path the information was read from
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// Container duration
    pub duration_millis: u64,
    /// Container format name (e.g. "mov,mp4,m4a,3gp,3g2,mj2")
    pub format: String,
    /// Video tracks in engine order
    #[serde(default)]
    pub video_tracks: Vec<VideoTrack>,
    /// Audio tracks in engine order
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,
}

impl VideoInformation {
    /// First video track, if any.
    pub fn primary_video(&self) -> Option<&VideoTrack> {
        self.video_tracks.first()
    }

    /// First audio track, if any.
    pub fn primary_audio(&self) -> Option<&AudioTrack> {
        self.audio_tracks.first()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoTrack {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    /// Width after applying the display rotation
    pub rotated_width: u32,
    /// Height after applying the display rotation
    pub rotated_height: u32,
    pub codec: String,
    pub codec_tag: String,
    pub pixel_format: String,
    pub bit_rate: u64,
    pub frame_rate: f64,
    /// Clockwise display rotation in degrees, normalized to 0..360
    pub rotation: u32,
    pub duration_millis: u64,
}

impl VideoTrack {
    /// Fill `rotated_width`/`rotated_height` from the raw size and rotation.
    pub fn with_rotation(mut self, rotation: i32) -> Self {
        let normalized = rotation.rem_euclid(360) as u32;
        self.rotation = normalized;

        if normalized == 90 || normalized == 270 {
            self.rotated_width = self.height;
            self.rotated_height = self.width;
        } else {
            self.rotated_width = self.width;
            self.rotated_height = self.height;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    pub index: u32,
    pub bit_rate: u64,
    pub sample_rate: u32,
    pub channels: u32,
    pub codec: String,
    pub codec_tag: String,
    pub duration_millis: u64,
    pub channel_layout: String,
    pub sample_format: String,
}
