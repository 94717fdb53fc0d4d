//! bitreel — records an animated in-memory surface to a video file.
//!
//! ```text
//! animator task ──draw──► RasterSurface ◄──capture── CaptureScheduler (tick)
//!                                                        │
//!                                                        ▼
//!                                   QueuedEncoder ──► RawVideoSink / GstMp4Sink
//! ```
//!
//! Configure with `BITREEL_CONFIG=<file.json>` and/or the `BITREEL_*`
//! variables listed in `config.rs`. `RUST_LOG=debug` shows every tick.

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod animation;
mod app;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .init();

    info!("bitreel v{}", env!("CARGO_PKG_VERSION"));

    match app::run().await {
        Ok(()) => {
            info!("bitreel exited cleanly.");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}
