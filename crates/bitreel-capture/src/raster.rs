//! In-memory ARGB surface for hosts without a native renderer.

use std::sync::{PoisonError, RwLock};

use bitreel_core::{CaptureError, Resolution};

use crate::{Canvas, Surface};

/// Shared, thread-safe ARGB surface.
///
/// Writers mutate it through the drawing methods; captures take a read lock
/// for the duration of one copy, so a snapshot never sees a half-applied
/// [`RasterSurface::draw_with`].
#[derive(Debug)]
pub struct RasterSurface {
    canvas: RwLock<Canvas>,
}

impl RasterSurface {
    pub fn new(resolution: Resolution, argb: u32) -> Self {
        let mut canvas = Canvas::new(resolution);
        canvas.fill(argb);
        Self { canvas: RwLock::new(canvas) }
    }

    /// Replace the backing store with a transparent canvas of the new size.
    pub fn resize(&self, resolution: Resolution) {
        let mut canvas = self.canvas.write().unwrap_or_else(PoisonError::into_inner);
        *canvas = Canvas::new(resolution);
    }

    pub fn fill(&self, argb: u32) {
        self.draw_with(|canvas| canvas.fill(argb));
    }

    pub fn put_pixel(&self, x: u32, y: u32, argb: u32) -> bool {
        self.draw_with(|canvas| canvas.put_pixel(x, y, argb))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        self.canvas.read().unwrap_or_else(PoisonError::into_inner).pixel(x, y)
    }

    /// Run `draw` with exclusive access to the pixels.
    pub fn draw_with<R>(&self, draw: impl FnOnce(&mut Canvas) -> R) -> R {
        let mut canvas = self.canvas.write().unwrap_or_else(PoisonError::into_inner);
        draw(&mut canvas)
    }
}

impl Surface for RasterSurface {
    fn size(&self) -> Resolution {
        self.canvas.read().unwrap_or_else(PoisonError::into_inner).resolution()
    }

    fn render_into(&self, canvas: &mut Canvas) -> Result<(), CaptureError> {
        let src = self.canvas.read().unwrap_or_else(PoisonError::into_inner);
        if src.resolution() != canvas.resolution() {
            return Err(CaptureError::SizeChanged {
                expected: canvas.resolution(),
                actual: src.resolution(),
            });
        }
        canvas.copy_from(src.as_slice())
    }
}
