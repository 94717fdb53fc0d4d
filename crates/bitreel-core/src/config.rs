use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::EncoderError;
use crate::types::Resolution;

/// Compression effort requested from the encoder backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Low,
    Mid,
    High,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Mid => write!(f, "mid"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = EncoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "mid" => Ok(Self::Mid),
            "high" => Ok(Self::High),
            other => Err(EncoderError::ConfigurationInvalid {
                reason: format!("unknown compression {other:?} (expected low, mid or high)"),
            }),
        }
    }
}

/// Encoder settings, fixed for the whole of a capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    #[serde(alias = "outputPath")]
    pub output_path: PathBuf,
    /// Spacing the encoder assumes between consecutive frames.
    #[serde(alias = "frameDelayMs", alias = "frameDelay")]
    pub frame_delay_ms: u32,
    #[serde(alias = "outputSize")]
    pub resolution: Resolution,
    pub compression: Compression,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("export.argb"),
            frame_delay_ms: 50,
            resolution: Resolution::VGA,
            compression: Compression::Low,
        }
    }
}

impl EncoderConfig {
    pub fn new(output_path: impl Into<PathBuf>, frame_delay_ms: u32, resolution: Resolution) -> Self {
        Self {
            output_path: output_path.into(),
            frame_delay_ms,
            resolution,
            ..Default::default()
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn validate(&self) -> Result<(), EncoderError> {
        let invalid = |reason: &str| EncoderError::ConfigurationInvalid { reason: reason.to_owned() };
        if self.output_path.as_os_str().is_empty() {
            return Err(invalid("output path is empty"));
        }
        if self.frame_delay_ms == 0 {
            return Err(invalid("frame delay must be > 0"));
        }
        if self.resolution.is_empty() {
            return Err(invalid("output width and height must be > 0"));
        }
        Ok(())
    }

    /// Nominal output frame rate implied by the frame delay (at least 1).
    pub fn frame_rate(&self) -> u32 {
        (1000 / self.frame_delay_ms.max(1)).max(1)
    }

    /// Presentation timestamp of the `index`-th encoded frame.
    pub fn pts_ms(&self, index: u64) -> u64 {
        index * self.frame_delay_ms as u64
    }
}
