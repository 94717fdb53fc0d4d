//! bitreel-capture — one-shot snapshots of a renderable surface.
//!
//! # Plug-in point
//!
//! Hosts expose whatever they draw through the [`Surface`] trait. The
//! snapshotter asks for the current size, allocates a fresh [`Canvas`] and lets
//! the surface paint its visible state into it:
//!
//! ```text
//! Surface::size() ──► Canvas::new(w×h, ARGB) ──► Surface::render_into(canvas)
//!                                                       │
//!                                                       ▼
//!                                                 Frame (owned copy)
//! ```
//!
//! | Surface | Backing | Notes |
//! |---------|---------|-------|
//! | [`RasterSurface`] | in-memory ARGB behind `RwLock` | always available |
//! | host-provided | platform renderer | implement [`Surface`] |
//!
//! # Usage
//!
//! ```rust
//! use bitreel_capture::{RasterSurface, SurfaceSnapshotter};
//! use bitreel_core::Resolution;
//!
//! let surface = RasterSurface::new(Resolution::new(4, 4), 0xFF00_00FF);
//! let frame = SurfaceSnapshotter.capture(&surface).unwrap();
//! assert_eq!(frame.pixel(0, 0), Some(0xFF00_00FF));
//! ```

mod raster;

pub use raster::RasterSurface;

use bitreel_core::{CaptureError, Frame, PixelFormat, Resolution};
use tracing::trace;

// ── Surface ───────────────────────────────────────────────────────────────────

/// Something that can paint its current on-screen content into a canvas.
///
/// Implementations must only read their own state; the snapshotter never
/// asks a surface to change.
pub trait Surface: Send + Sync {
    /// Current rendered size.
    fn size(&self) -> Resolution;

    /// Paint the visible state into `canvas`, which is sized to the value
    /// [`Surface::size`] returned just before. A surface that has been resized
    /// in between must report [`CaptureError::SizeChanged`] instead of
    /// painting a partial image.
    fn render_into(&self, canvas: &mut Canvas) -> Result<(), CaptureError>;
}

// ── Canvas ────────────────────────────────────────────────────────────────────

/// Mutable, tightly packed ARGB pixel buffer of a fixed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    resolution: Resolution,
    data: Vec<u8>,
}

impl Canvas {
    /// Transparent black canvas of the given size.
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution, data: vec![0; resolution.buffer_len(PixelFormat::Argb)] }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Overwrite every pixel with `argb` (`0xAARRGGBB`).
    pub fn fill(&mut self, argb: u32) {
        let px = argb.to_be_bytes();
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    /// Set one pixel. Returns `false` when (`x`, `y`) is out of bounds.
    pub fn put_pixel(&mut self, x: u32, y: u32, argb: u32) -> bool {
        match self.offset(x, y) {
            Some(at) => {
                self.data[at..at + 4].copy_from_slice(&argb.to_be_bytes());
                true
            }
            None => false,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        let at = self.offset(x, y)?;
        let px = &self.data[at..at + 4];
        Some(u32::from_be_bytes([px[0], px[1], px[2], px[3]]))
    }

    /// Fill the axis-aligned rectangle clipped to the canvas bounds.
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, argb: u32) {
        let x_end = x.saturating_add(width).min(self.resolution.width);
        let y_end = y.saturating_add(height).min(self.resolution.height);
        for row in y..y_end {
            for col in x..x_end {
                self.put_pixel(col, row, argb);
            }
        }
    }

    /// Copy a full packed ARGB image of identical size into the canvas.
    pub fn copy_from(&mut self, src: &[u8]) -> Result<(), CaptureError> {
        if src.len() != self.data.len() {
            return Err(CaptureError::BufferMismatch { expected: self.data.len(), actual: src.len() });
        }
        self.data.copy_from_slice(src);
        Ok(())
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.resolution.width || y >= self.resolution.height {
            return None;
        }
        Some((y as usize * self.resolution.width as usize + x as usize) * 4)
    }

    fn into_frame(self) -> Result<Frame, CaptureError> {
        Frame::from_argb(self.resolution, self.data)
    }
}

// ── SurfaceSnapshotter ────────────────────────────────────────────────────────

/// Produces one consistent [`Frame`] from a [`Surface`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SurfaceSnapshotter;

impl SurfaceSnapshotter {
    /// Render `target` into a newly allocated frame.
    ///
    /// Fails with [`CaptureError::EmptyFrame`] when the surface has zero width
    /// or height.
    pub fn capture(&self, target: &dyn Surface) -> Result<Frame, CaptureError> {
        let size = target.size();
        if size.is_empty() {
            return Err(CaptureError::EmptyFrame { width: size.width, height: size.height });
        }

        let mut canvas = Canvas::new(size);
        target.render_into(&mut canvas)?;
        if canvas.resolution() != size {
            return Err(CaptureError::SizeChanged { expected: size, actual: canvas.resolution() });
        }
        trace!("captured {} surface", size);
        canvas.into_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports one size but is resized before painting.
    struct ShrinkingSurface {
        calls: AtomicU32,
    }

    impl Surface for ShrinkingSurface {
        fn size(&self) -> Resolution {
            Resolution::new(8, 8)
        }

        fn render_into(&self, canvas: &mut Canvas) -> Result<(), CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CaptureError::SizeChanged {
                expected: canvas.resolution(),
                actual: Resolution::new(4, 4),
            })
        }
    }

    #[test]
    fn zero_extent_is_empty_frame() {
        let surface = RasterSurface::new(Resolution::new(0, 32), 0xFFFF_FFFF);
        let err = SurfaceSnapshotter.capture(&surface).unwrap_err();
        assert!(err.is_empty_frame());

        surface.resize(Resolution::new(32, 0));
        assert!(SurfaceSnapshotter.capture(&surface).unwrap_err().is_empty_frame());
    }

    #[test]
    fn frame_matches_surface_size_and_pixels() {
        let surface = RasterSurface::new(Resolution::new(3, 2), 0xFF00_0000);
        surface.put_pixel(2, 1, 0xFFAB_CDEF);

        let frame = SurfaceSnapshotter.capture(&surface).unwrap();
        assert_eq!(frame.resolution(), Resolution::new(3, 2));
        assert_eq!(frame.data().len(), 3 * 2 * 4);
        assert_eq!(frame.pixel(2, 1), Some(0xFFAB_CDEF));
        assert_eq!(frame.pixel(0, 0), Some(0xFF00_0000));
    }

    #[test]
    fn frame_is_independent_of_later_mutation() {
        let surface = RasterSurface::new(Resolution::new(2, 2), 0xFF11_1111);
        let before = SurfaceSnapshotter.capture(&surface).unwrap();

        surface.fill(0xFF22_2222);
        let after = SurfaceSnapshotter.capture(&surface).unwrap();

        assert_eq!(before.pixel(1, 1), Some(0xFF11_1111));
        assert_eq!(after.pixel(1, 1), Some(0xFF22_2222));
    }

    #[test]
    fn resize_mid_capture_is_reported() {
        let surface = ShrinkingSurface { calls: AtomicU32::new(0) };
        let err = SurfaceSnapshotter.capture(&surface).unwrap_err();
        assert!(matches!(err, CaptureError::SizeChanged { .. }));
        assert_eq!(surface.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn canvas_fill_rect_clips() {
        let mut canvas = Canvas::new(Resolution::new(4, 4));
        canvas.fill_rect(2, 2, 10, 10, 0xFFFF_0000);
        assert_eq!(canvas.pixel(3, 3), Some(0xFFFF_0000));
        assert_eq!(canvas.pixel(1, 1), Some(0));
        assert_eq!(canvas.pixel(4, 4), None);
    }

    #[test]
    fn canvas_copy_from_checks_length() {
        let mut canvas = Canvas::new(Resolution::new(1, 1));
        assert!(canvas.copy_from(&[1, 2, 3]).is_err());
        canvas.copy_from(&[1, 2, 3, 4]).unwrap();
        assert_eq!(canvas.pixel(0, 0), Some(0x0102_0304));
    }
}
