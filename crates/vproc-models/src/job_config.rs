//! Job configuration for encode and merge requests.
//!
//! Callers hand over an untyped key/value payload; [`JobConfig::from_payload`]
//! resolves it once into a typed value so nothing downstream ever sees raw
//! text. Missing dimensions stay unset (the engine keeps native size) and any
//! frame rate outside the named set resolves to [`FrameRate::Default`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Payload keys that carry the frame rate. The first one present wins.
pub const FRAME_RATE_KEYS: [&str; 2] = ["framesRate", "frameRate"];

/// Result type for configuration parsing.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while resolving a configuration payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Configuration payload is not a JSON object: {0}")]
    Malformed(String),

    #[error("Invalid value for '{key}': expected a positive integer, got {value}")]
    InvalidDimension { key: &'static str, value: String },
}

impl ConfigError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// Output frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum FrameRate {
    #[serde(rename = "twentyFourFps")]
    TwentyFour,
    #[serde(rename = "twentyFiveFps")]
    TwentyFive,
    #[serde(rename = "thirtyFps")]
    Thirty,
    #[serde(rename = "fiftyFps")]
    Fifty,
    #[serde(rename = "sixtyFps")]
    Sixty,
    /// Keep the source frame rate
    #[default]
    #[serde(rename = "defaultFrameRate")]
    Default,
}

impl FrameRate {
    /// Resolve a caller-supplied name. Only exact matches are recognised.
    pub fn from_name(name: &str) -> Self {
        match name {
            "twentyFourFps" => FrameRate::TwentyFour,
            "twentyFiveFps" => FrameRate::TwentyFive,
            "thirtyFps" => FrameRate::Thirty,
            "fiftyFps" => FrameRate::Fifty,
            "sixtyFps" => FrameRate::Sixty,
            _ => FrameRate::Default,
        }
    }

    /// Frames per second, or `None` to keep the source rate.
    pub fn fps(&self) -> Option<u32> {
        match self {
            FrameRate::TwentyFour => Some(24),
            FrameRate::TwentyFive => Some(25),
            FrameRate::Thirty => Some(30),
            FrameRate::Fifty => Some(50),
            FrameRate::Sixty => Some(60),
            FrameRate::Default => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameRate::TwentyFour => "twentyFourFps",
            FrameRate::TwentyFive => "twentyFiveFps",
            FrameRate::Thirty => "thirtyFps",
            FrameRate::Fifty => "fiftyFps",
            FrameRate::Sixty => "sixtyFps",
            FrameRate::Default => "defaultFrameRate",
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved configuration for encode and merge requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    /// Output height in pixels, `None` keeps the native height
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Output width in pixels, `None` keeps the native width
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Output frame rate
    #[serde(default)]
    pub frame_rate: FrameRate,
}

impl JobConfig {
    /// Parse a JSON text payload.
    pub fn from_payload(payload: &str) -> ConfigResult<Self> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| ConfigError::malformed(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Resolve an already-decoded payload. `null` yields the default config.
    pub fn from_value(value: &Value) -> ConfigResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::from_map(map),
            // Hosts frequently double-encode the payload as a JSON string
            Value::String(text) => Self::from_payload(text),
            other => Err(ConfigError::malformed(format!("unexpected {}", type_name(other)))),
        }
    }

    fn from_map(map: &Map<String, Value>) -> ConfigResult<Self> {
        let height = dimension(map, "height")?;
        let width = dimension(map, "width")?;

        let frame_rate = FRAME_RATE_KEYS
            .iter()
            .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
            .and_then(Value::as_str)
            .map(FrameRate::from_name)
            .unwrap_or_default();

        Ok(Self {
            height,
            width,
            frame_rate,
        })
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// True when nothing differs from the source media.
    pub fn is_passthrough(&self) -> bool {
        self.height.is_none() && self.width.is_none() && self.frame_rate == FrameRate::Default
    }
}

/// Read an optional positive dimension. Numeric strings are accepted.
fn dimension(map: &Map<String, Value>, key: &'static str) -> ConfigResult<Option<u32>> {
    let invalid = |value: &Value| ConfigError::InvalidDimension {
        key,
        value: value.to_string(),
    };

    let parsed = match map.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(v @ Value::Number(n)) => n.as_u64().ok_or_else(|| invalid(v))?,
        Some(v @ Value::String(s)) => s.trim().parse::<u64>().map_err(|_| invalid(v))?,
        Some(other) => return Err(invalid(other)),
    };

    match u32::try_from(parsed) {
        Ok(0) | Err(_) => Err(invalid(&map[key])),
        Ok(value) => Ok(Some(value)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
