//! bitreel-encoder — the Encoder capability set the capture scheduler drives.
//!
//! # Backends
//!
//! | Type | Output | Availability |
//! |------|--------|--------------|
//! | [`QueuedEncoder`] + [`RawVideoSink`] | packed ARGB frames, back to back | always |
//! | [`QueuedEncoder`] + `GstMp4Sink` | H.264 in MP4 via GStreamer | feature `gstreamer` |
//!
//! # Pipeline
//!
//! ```text
//! ingest_frame ──► unbounded queue ──► worker thread ──► FrameSink::on_frame
//!                                            │
//! finalize_encoding ── close queue ──► drain ─┴─► FrameSink::on_stop ──► wait_finished()
//! ```

mod queued;
mod sink;

#[cfg(feature = "gstreamer")]
mod gst;

pub use queued::{EncodeSummary, QueuedEncoder};
pub use sink::{FrameSink, RawVideoSink};

#[cfg(feature = "gstreamer")]
pub use gst::GstMp4Sink;

use async_trait::async_trait;
use bitreel_core::{EncoderConfig, EncoderError, Frame};

// MARK: - Encoder trait

/// Turns an ordered sequence of frames into a persisted video artifact.
///
/// Call order: [`configure`](Encoder::configure) once, then
/// [`begin_encoding`](Encoder::begin_encoding), any number of
/// [`ingest_frame`](Encoder::ingest_frame), then
/// [`finalize_encoding`](Encoder::finalize_encoding).
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Store the settings for the next session. Rejected while encoding.
    async fn configure(&self, config: EncoderConfig) -> Result<(), EncoderError>;

    /// Start accepting frames.
    async fn begin_encoding(&self) -> Result<(), EncoderError>;

    /// Accept one frame. Must return promptly; heavy work belongs off this call.
    async fn ingest_frame(&self, frame: Frame) -> Result<(), EncoderError>;

    /// Flush buffered frames and close the output. May complete asynchronously.
    async fn finalize_encoding(&self) -> Result<(), EncoderError>;
}
