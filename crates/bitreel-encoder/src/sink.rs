use std::fs::File;
use std::io::{BufWriter, Write};

use bitreel_core::{EncoderConfig, EncoderError, Frame, Resolution};
use tracing::{debug, info};

/// Backend half of [`QueuedEncoder`](crate::QueuedEncoder).
///
/// All three hooks run on the encoder's worker thread except `on_start`, which
/// runs on the caller of `begin_encoding`.
pub trait FrameSink: Send + 'static {
    /// Open the output described by `config`.
    fn on_start(&mut self, config: &EncoderConfig) -> Result<(), EncoderError>;

    /// Persist one frame at presentation time `pts_ms`.
    fn on_frame(&mut self, frame: &Frame, pts_ms: u64) -> Result<(), EncoderError>;

    /// Flush and close the output after `frames` frames were written.
    fn on_stop(&mut self, frames: u64) -> Result<(), EncoderError>;
}

// ── RawVideoSink ──────────────────────────────────────────────────────────────

/// Writes packed ARGB frames back to back, with no header.
///
/// The result can be fed to external tools as raw video
/// (`-f rawvideo -pix_fmt argb -s WxH -r <fps>`).
#[derive(Debug, Default)]
pub struct RawVideoSink {
    writer: Option<BufWriter<File>>,
    resolution: Option<Resolution>,
}

impl RawVideoSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for RawVideoSink {
    fn on_start(&mut self, config: &EncoderConfig) -> Result<(), EncoderError> {
        // Truncates a stale export from an earlier run.
        let file = File::create(&config.output_path)?;
        info!(
            "raw sink writing {} ARGB @ {} fps to {}",
            config.resolution,
            config.frame_rate(),
            config.output_path.display()
        );
        self.writer = Some(BufWriter::new(file));
        self.resolution = Some(config.resolution);
        Ok(())
    }

    fn on_frame(&mut self, frame: &Frame, pts_ms: u64) -> Result<(), EncoderError> {
        let (Some(writer), Some(resolution)) = (self.writer.as_mut(), self.resolution) else {
            return Err(EncoderError::InvalidState { reason: "raw sink not started".into() });
        };
        if frame.resolution() != resolution {
            return Err(EncoderError::Ingestion {
                reason: format!("frame is {}, output is {}", frame.resolution(), resolution),
            });
        }
        writer.write_all(frame.data())?;
        debug!("raw sink wrote frame {} (pts {} ms)", frame.sequence(), pts_ms);
        Ok(())
    }

    fn on_stop(&mut self, frames: u64) -> Result<(), EncoderError> {
        self.resolution = None;
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        debug!("raw sink closed after {} frames", frames);
        Ok(())
    }
}
