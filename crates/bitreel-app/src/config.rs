use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bitreel_core::{EncoderConfig, Resolution};
use bitreel_scheduler::BackpressurePolicy;
use serde::{Deserialize, Serialize};

/// Recorder settings. Loaded from `BITREEL_CONFIG` (JSON) when set, then
/// overridden field by field from the environment:
///
/// | Variable | Field |
/// |----------|-------|
/// | `BITREEL_OUTPUT` | `encoder.output_path` |
/// | `BITREEL_FRAME_DELAY_MS` | `encoder.frame_delay_ms` |
/// | `BITREEL_WIDTH` / `BITREEL_HEIGHT` | `encoder.resolution` |
/// | `BITREEL_COMPRESSION` | `encoder.compression` (`low`, `mid`, `high`) |
/// | `BITREEL_TICK_MS` | `tick_interval_ms` |
/// | `BITREEL_DURATION_MS` | `duration_ms` |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub encoder: EncoderConfig,
    #[serde(alias = "tickIntervalMs")]
    pub tick_interval_ms: u64,
    #[serde(alias = "durationMs")]
    pub duration_ms: u64,
    pub backpressure: BackpressurePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            tick_interval_ms: 30,
            duration_ms: 3_000,
            backpressure: BackpressurePolicy::Delay,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("BITREEL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value.trim().parse().with_context(|| format!("{key}={value:?}"))
        }

        if let Some(v) = lookup("BITREEL_OUTPUT") {
            self.encoder.output_path = v.into();
        }
        if let Some(v) = lookup("BITREEL_FRAME_DELAY_MS") {
            self.encoder.frame_delay_ms = parse("BITREEL_FRAME_DELAY_MS", v)?;
        }
        if let Some(v) = lookup("BITREEL_WIDTH") {
            self.encoder.resolution.width = parse("BITREEL_WIDTH", v)?;
        }
        if let Some(v) = lookup("BITREEL_HEIGHT") {
            self.encoder.resolution.height = parse("BITREEL_HEIGHT", v)?;
        }
        if let Some(v) = lookup("BITREEL_COMPRESSION") {
            let compression = parse("BITREEL_COMPRESSION", v)?;
            self.encoder = std::mem::take(&mut self.encoder).with_compression(compression);
        }
        if let Some(v) = lookup("BITREEL_TICK_MS") {
            self.tick_interval_ms = parse("BITREEL_TICK_MS", v)?;
        }
        if let Some(v) = lookup("BITREEL_DURATION_MS") {
            self.duration_ms = parse("BITREEL_DURATION_MS", v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("tick interval must be > 0");
        }
        self.encoder.validate().context("encoder configuration")?;
        Ok(())
    }

    /// The recorded surface matches the encoder output size.
    pub fn surface_size(&self) -> Resolution {
        self.encoder.resolution
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}
