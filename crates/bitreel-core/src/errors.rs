use thiserror::Error;

use crate::types::Resolution;

/// Errors raised by the capture pipeline (snapshotter + scheduler).
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Surface has zero extent ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("Surface resized during capture: expected {expected}, rendered {actual}")]
    SizeChanged { expected: Resolution, actual: Resolution },

    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    BufferMismatch { expected: usize, actual: usize },

    #[error("Surface render failed: {reason}")]
    RenderFailed { reason: String },

    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Encoder rejected frame: {reason}")]
    EncoderIngestion { reason: String },

    #[error("Encoder cannot accept frames: {reason}")]
    EncoderFatal { reason: String },
}

impl CaptureError {
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState { reason: reason.into() }
    }

    /// `true` for the zero-extent condition the scheduler recovers from locally.
    pub fn is_empty_frame(&self) -> bool {
        matches!(self, Self::EmptyFrame { .. })
    }
}

/// Errors raised by an encoder backend.
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Encoder not configured")]
    NotConfigured,

    #[error("Encoder in wrong state: {reason}")]
    InvalidState { reason: String },

    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Frame rejected: {reason}")]
    Ingestion { reason: String },

    #[error("Encoder failed: {reason}")]
    Fatal { reason: String },

    #[error("GStreamer pipeline error: {0}")]
    Pipeline(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncoderError {
    /// Whether the encoder can no longer accept frames after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. } | Self::Pipeline(_) | Self::Io(_))
    }
}

impl From<EncoderError> for CaptureError {
    fn from(e: EncoderError) -> Self {
        match e {
            EncoderError::NotConfigured => {
                CaptureError::ConfigurationInvalid { reason: e.to_string() }
            }
            EncoderError::ConfigurationInvalid { reason } => {
                CaptureError::ConfigurationInvalid { reason }
            }
            EncoderError::InvalidState { reason } => CaptureError::InvalidState { reason },
            EncoderError::Ingestion { reason } => CaptureError::EncoderIngestion { reason },
            fatal => CaptureError::EncoderFatal { reason: fatal.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_and_pipeline_errors_are_fatal() {
        let io = EncoderError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(io.is_fatal());
        assert!(EncoderError::Pipeline("no mp4mux".into()).is_fatal());
        assert!(!EncoderError::Ingestion { reason: "size".into() }.is_fatal());
        assert!(!EncoderError::NotConfigured.is_fatal());
    }

    #[test]
    fn encoder_errors_map_onto_capture_taxonomy() {
        let fatal: CaptureError = EncoderError::Fatal { reason: "closed".into() }.into();
        assert!(matches!(fatal, CaptureError::EncoderFatal { .. }));

        let soft: CaptureError = EncoderError::Ingestion { reason: "late".into() }.into();
        assert!(matches!(soft, CaptureError::EncoderIngestion { reason } if reason == "late"));

        let state: CaptureError = EncoderError::InvalidState { reason: "busy".into() }.into();
        assert!(matches!(state, CaptureError::InvalidState { .. }));

        let unconfigured: CaptureError = EncoderError::NotConfigured.into();
        assert!(matches!(unconfigured, CaptureError::ConfigurationInvalid { .. }));
    }
}
