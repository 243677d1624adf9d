//! Codec settings used whenever the engine has to re-encode.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Highest CRF the x264/x265 encoders accept.
pub const MAX_CRF: u8 = 51;

/// Output codec settings for concat fallback, merge and encode jobs.
///
/// Fields missing from a serialized form take the value from
/// [`EncodingConfig::default`]: H.264 at CRF 20 with the `fast` preset and
/// 128k AAC audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EncodingConfig {
    /// ffmpeg encoder name, `libx264` unless overridden.
    pub codec: String,
    pub preset: String,
    /// Quality target, at most [`MAX_CRF`]. Smaller keeps more detail.
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Appended verbatim after the codec flags.
    pub extra_args: Vec<String>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".into(),
            preset: "fast".into(),
            crf: 20,
            audio_codec: "aac".into(),
            audio_bitrate: "128k".into(),
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    /// Out-of-range values saturate at [`MAX_CRF`].
    pub fn with_crf(self, crf: u8) -> Self {
        Self {
            crf: crf.min(MAX_CRF),
            ..self
        }
    }

    pub fn with_codec(self, codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
            ..self
        }
    }

    /// Encoder flags placed ahead of the output path.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let crf = self.crf.to_string();
        let flags = [
            ("-c:v", self.codec.as_str()),
            ("-preset", self.preset.as_str()),
            ("-crf", crf.as_str()),
            ("-c:a", self.audio_codec.as_str()),
            ("-b:a", self.audio_bitrate.as_str()),
        ];

        flags
            .into_iter()
            .flat_map(|(flag, value)| [flag.to_string(), value.to_string()])
            .chain(self.extra_args.iter().cloned())
            .collect()
    }
}
