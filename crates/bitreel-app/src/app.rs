use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bitreel_capture::RasterSurface;
use bitreel_encoder::{Encoder, FrameSink, QueuedEncoder, RawVideoSink};
use bitreel_scheduler::{CaptureScheduler, SessionEvent, SessionHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::animation::{self, BACKGROUND};
use crate::config::AppConfig;

/// Record the animated surface for the configured duration (or until Ctrl-C).
///
/// # Flow
/// 1. Configure a `QueuedEncoder` over the sink matching the output path
/// 2. Paint the first animation step and start the capture session
/// 3. Log session events until the deadline, Ctrl-C or an encoder failure
/// 4. Stop the session and wait for the encoder to close the output
pub async fn run() -> Result<()> {
    let config = AppConfig::load()?;
    info!(
        "Recording {} every {} ms for {} ms → {}",
        config.encoder.resolution,
        config.tick_interval_ms,
        config.duration_ms,
        config.encoder.output_path.display()
    );

    #[cfg(feature = "gstreamer")]
    {
        if is_mp4(&config.encoder.output_path) {
            return record(config, bitreel_encoder::GstMp4Sink::new()).await;
        }
    }
    record(config, RawVideoSink::new()).await
}

#[cfg(feature = "gstreamer")]
fn is_mp4(path: &std::path::Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
}

async fn record<S: FrameSink>(config: AppConfig, sink: S) -> Result<()> {
    let encoder = Arc::new(QueuedEncoder::new(sink));
    encoder
        .configure(config.encoder.clone())
        .await
        .context("configuring encoder")?;

    let surface = Arc::new(RasterSurface::new(config.surface_size(), BACKGROUND));
    surface.draw_with(|canvas| animation::paint(canvas, 0));

    let scheduler = CaptureScheduler::with_policy(config.backpressure);
    let SessionHandle { id, mut events } = scheduler
        .start(surface.clone(), encoder.clone(), config.tick_interval())
        .await
        .context("starting capture")?;

    let cancel = CancellationToken::new();
    let animator = tokio::spawn(animation::animate(surface, cancel.clone()));

    let deadline = tokio::time::sleep(config.duration());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(deadline, ctrl_c);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Recording duration reached");
                break;
            }
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping");
                break;
            }
            maybe_ev = events.recv() => match maybe_ev {
                Some(SessionEvent::Fatal { reason }) => {
                    error!("Encoder failed: {}", reason);
                    break;
                }
                Some(ev) => log_event(&ev),
                None => break,
            },
        }
    }

    let stopped = scheduler.stop(id).await;
    cancel.cancel();
    let _ = animator.await;
    while let Ok(ev) = events.try_recv() {
        log_event(&ev);
    }

    let summary = encoder.wait_finished().await.context("waiting for encoder")?;
    info!(
        "Wrote {} frames to {}",
        summary.frames_encoded,
        summary.output_path.display()
    );
    stopped.context("stopping capture")?;
    if let Some(reason) = summary.error {
        bail!("encoder reported: {reason}");
    }
    Ok(())
}

fn log_event(ev: &SessionEvent) {
    match ev {
        SessionEvent::FrameSubmitted { sequence } => debug!("frame {} submitted", sequence),
        SessionEvent::TickSkipped { tick, error } => debug!("tick {} skipped: {}", tick, error),
        SessionEvent::IngestionFailed { sequence, error } => {
            warn!("frame {} rejected: {}", sequence, error)
        }
        SessionEvent::Fatal { reason } => error!("encoder failed: {}", reason),
        SessionEvent::Stopped { ticks, frames_submitted } => {
            info!("Session stopped: {} ticks, {} frames", ticks, frames_submitted)
        }
    }
}
