//! Placeholder animation painted into the recorded surface.

use std::sync::Arc;
use std::time::Duration;

use bitreel_capture::{Canvas, RasterSurface};
use tokio_util::sync::CancellationToken;

pub const BACKGROUND: u32 = 0xFF20_2024;
const BAR: u32 = 0xFFE0_8040;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Paint animation step `step`: a vertical bar sweeping left to right over a
/// vertical gradient.
pub fn paint(canvas: &mut Canvas, step: u64) {
    let size = canvas.resolution();
    if size.is_empty() {
        return;
    }
    for y in 0..size.height {
        let shade = y * 0x40 / size.height;
        let row = BACKGROUND + (shade << 16) + (shade << 8) + shade;
        canvas.fill_rect(0, y, size.width, 1, row);
    }
    let bar_width = (size.width / 8).max(1);
    let x = (step * 4 % size.width as u64) as u32;
    canvas.fill_rect(x, 0, bar_width, size.height, BAR);
}

/// Redraw `surface` at ~60 Hz until `cancel` fires.
pub async fn animate(surface: Arc<RasterSurface>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    let mut step: u64 = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                surface.draw_with(|canvas| paint(canvas, step));
                step += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitreel_core::Resolution;

    #[test]
    fn bar_moves_between_steps() {
        let mut canvas = Canvas::new(Resolution::new(64, 8));
        paint(&mut canvas, 0);
        assert_eq!(canvas.pixel(0, 0), Some(BAR));
        assert_ne!(canvas.pixel(40, 0), Some(BAR));

        paint(&mut canvas, 10);
        assert_eq!(canvas.pixel(40, 0), Some(BAR));
        assert_ne!(canvas.pixel(0, 0), Some(BAR));
    }

    #[test]
    fn empty_canvas_is_left_alone() {
        let mut canvas = Canvas::new(Resolution::new(0, 0));
        paint(&mut canvas, 3);
        assert!(canvas.as_slice().is_empty());
    }
}
