use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::CaptureError;

// MARK: - Resolution

/// Pixel dimensions of a surface or an encoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const VGA: Self = Self { width: 640, height: 480 };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `true` when either side is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn total_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Size in bytes of a tightly packed buffer of this resolution.
    pub fn buffer_len(&self, format: PixelFormat) -> usize {
        self.total_pixels() as usize * format.bytes_per_pixel()
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - PixelFormat

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 4 bytes per pixel: Alpha, Red, Green, Blue.
    Argb,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Argb => 4,
        }
    }
}

// MARK: - Frame

/// One immutable ARGB snapshot of a surface.
///
/// Pixels are tightly packed rows (`width * 4` bytes per row, no padding).
/// The producer never keeps a handle on the buffer, so a `Frame` handed to an
/// encoder is owned by it outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
    resolution: Resolution,
    sequence: u64,
    pts_ms: u64,
}

impl Frame {
    /// Wraps a packed ARGB buffer. Fails if its length does not match `resolution`.
    pub fn from_argb(resolution: Resolution, data: impl Into<Bytes>) -> Result<Self, CaptureError> {
        let data = data.into();
        let expected = resolution.buffer_len(PixelFormat::Argb);
        if data.len() != expected {
            return Err(CaptureError::BufferMismatch { expected, actual: data.len() });
        }
        Ok(Self { data, resolution, sequence: 0, pts_ms: 0 })
    }

    /// Returns the same pixels tagged with their capture order and timestamp.
    pub fn stamped(self, sequence: u64, pts_ms: u64) -> Self {
        Self { sequence, pts_ms, ..self }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    /// Capture order within the session, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Capture time relative to session start, in milliseconds.
    pub fn pts_ms(&self) -> u64 {
        self.pts_ms
    }

    /// ARGB value of the pixel at (`x`, `y`) packed as `0xAARRGGBB`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let at = (y as usize * self.width() as usize + x as usize) * 4;
        let px = &self.data[at..at + 4];
        Some(u32::from_be_bytes([px[0], px[1], px[2], px[3]]))
    }
}
