//! `CaptureScheduler` — owns the periodic tick task of one capture session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bitreel_capture::{Surface, SurfaceSnapshotter};
use bitreel_core::CaptureError;
use bitreel_encoder::Encoder;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::session::{BackpressurePolicy, SessionEvent, SessionHandle, SessionId};

// ── Session bookkeeping ───────────────────────────────────────────────────────

struct ActiveSession {
    id: SessionId,
    cancel: CancellationToken,
    task: JoinHandle<TickLoopOutcome>,
    encoder: Arc<dyn Encoder>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

enum TickLoopExit {
    Cancelled,
    Fatal(String),
}

struct TickLoopOutcome {
    exit: TickLoopExit,
    ticks: u64,
    frames_submitted: u64,
}

/// Live counters shared with the tick task.
#[derive(Default)]
struct Live {
    running: AtomicBool,
    frames_submitted: AtomicU64,
}

// ── CaptureScheduler ──────────────────────────────────────────────────────────

/// Captures a surface every tick and submits the frames to an encoder.
///
/// At most one session runs at a time. The scheduler borrows the surface and
/// the encoder through `Arc`s; both outlive the session.
pub struct CaptureScheduler {
    policy: BackpressurePolicy,
    snapshotter: SurfaceSnapshotter,
    session: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
    live: Arc<Live>,
}

impl Default for CaptureScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureScheduler {
    pub fn new() -> Self {
        Self::with_policy(BackpressurePolicy::default())
    }

    pub fn with_policy(policy: BackpressurePolicy) -> Self {
        Self {
            policy,
            snapshotter: SurfaceSnapshotter,
            session: Mutex::new(None),
            next_id: AtomicU64::new(0),
            live: Arc::new(Live::default()),
        }
    }

    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    /// `true` from a successful `start` until `stop`, or until the encoder
    /// reports a fatal error.
    pub fn is_running(&self) -> bool {
        self.live.running.load(Ordering::SeqCst)
    }

    /// Frames accepted by the encoder in the current (or last) session.
    pub fn frames_submitted(&self) -> u64 {
        self.live.frames_submitted.load(Ordering::SeqCst)
    }

    /// Begin a session: tell the encoder to start, then capture `target`
    /// every `tick_interval`. The first tick fires one interval from now.
    pub async fn start(
        &self,
        target: Arc<dyn Surface>,
        encoder: Arc<dyn Encoder>,
        tick_interval: Duration,
    ) -> Result<SessionHandle, CaptureError> {
        if tick_interval.is_zero() {
            return Err(CaptureError::ConfigurationInvalid {
                reason: "tick interval must be > 0".into(),
            });
        }

        let mut slot = self.session.lock().await;
        if let Some(active) = slot.as_ref() {
            if self.is_running() {
                return Err(CaptureError::invalid_state(format!("{} is already running", active.id)));
            }
        }
        if let Some(ended) = slot.take() {
            // Ended by an encoder failure and never stopped.
            let _ = ended.task.await;
            warn!("{} ended on its own and was never stopped", ended.id);
        }

        encoder.begin_encoding().await?;

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.live.frames_submitted.store(0, Ordering::SeqCst);
        self.live.running.store(true, Ordering::SeqCst);

        let tick_loop = TickLoop {
            id,
            target,
            encoder: Arc::clone(&encoder),
            snapshotter: self.snapshotter,
            cancel: cancel.clone(),
            events: events_tx.clone(),
            live: Arc::clone(&self.live),
            started: Instant::now(),
            period: tick_interval,
            policy: self.policy,
            ticks: 0,
            captured: 0,
            submitted: 0,
        };
        let task = tokio::spawn(tick_loop.run());
        info!("{} started: tick every {:?} ({:?} backpressure)", id, tick_interval, self.policy);

        *slot = Some(ActiveSession { id, cancel, task, encoder, events: events_tx });
        Ok(SessionHandle { id, events: events_rx })
    }

    /// End the session `id`.
    ///
    /// Future ticks are cancelled at once; a tick already running completes
    /// before this returns, and nothing is submitted afterwards. The encoder
    /// is then told to finalize, which may finish after this returns.
    pub async fn stop(&self, id: SessionId) -> Result<(), CaptureError> {
        let mut slot = self.session.lock().await;
        let active = match slot.take() {
            Some(active) if active.id == id => active,
            other => {
                *slot = other;
                return Err(CaptureError::invalid_state(format!("{id} is not running")));
            }
        };

        active.cancel.cancel();
        let joined = active.task.await;
        self.live.running.store(false, Ordering::SeqCst);

        let outcome = joined.unwrap_or_else(|e| {
            error!("{} tick task failed: {}", id, e);
            TickLoopOutcome {
                exit: TickLoopExit::Cancelled,
                ticks: 0,
                frames_submitted: self.frames_submitted(),
            }
        });

        match outcome.exit {
            TickLoopExit::Fatal(reason) => {
                info!("{} reaped after encoder failure", id);
                Err(CaptureError::EncoderFatal { reason })
            }
            TickLoopExit::Cancelled => {
                let finalized = active.encoder.finalize_encoding().await;
                let _ = active.events.send(SessionEvent::Stopped {
                    ticks: outcome.ticks,
                    frames_submitted: outcome.frames_submitted,
                });
                info!(
                    "{} stopped after {} ticks, {} frames submitted",
                    id, outcome.ticks, outcome.frames_submitted
                );
                finalized.map_err(CaptureError::from)
            }
        }
    }
}

// ── Tick task ─────────────────────────────────────────────────────────────────

struct TickLoop {
    id: SessionId,
    target: Arc<dyn Surface>,
    encoder: Arc<dyn Encoder>,
    snapshotter: SurfaceSnapshotter,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<SessionEvent>,
    live: Arc<Live>,
    started: Instant,
    period: Duration,
    policy: BackpressurePolicy,
    ticks: u64,
    captured: u64,
    submitted: u64,
}

impl TickLoop {
    async fn run(mut self) -> TickLoopOutcome {
        let mut ticker = interval_at(self.started + self.period, self.period);
        ticker.set_missed_tick_behavior(self.policy.into());
        let cancel = self.cancel.clone();

        let exit = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break TickLoopExit::Cancelled,

                at = ticker.tick() => {
                    if cancel.is_cancelled() {
                        break TickLoopExit::Cancelled;
                    }
                    if let Some(exit) = self.on_tick(at).await {
                        break exit;
                    }
                }
            }
        };

        if let TickLoopExit::Fatal(_) = exit {
            self.live.running.store(false, Ordering::SeqCst);
        }
        TickLoopOutcome { exit, ticks: self.ticks, frames_submitted: self.submitted }
    }

    /// One capture → submit cycle. Returns `Some` when the session must end.
    async fn on_tick(&mut self, at: Instant) -> Option<TickLoopExit> {
        self.ticks += 1;
        let frame = match self.snapshotter.capture(self.target.as_ref()) {
            Ok(frame) => frame,
            Err(error) => {
                if error.is_empty_frame() {
                    debug!("{} tick {} skipped: {}", self.id, self.ticks, error);
                } else {
                    warn!("{} tick {} capture failed: {}", self.id, self.ticks, error);
                }
                self.emit(SessionEvent::TickSkipped { tick: self.ticks, error });
                return None;
            }
        };

        let sequence = self.captured;
        self.captured += 1;
        let pts_ms = at.duration_since(self.started).as_millis() as u64;

        match self.encoder.ingest_frame(frame.stamped(sequence, pts_ms)).await {
            Ok(()) => {
                self.submitted += 1;
                self.live.frames_submitted.store(self.submitted, Ordering::SeqCst);
                self.emit(SessionEvent::FrameSubmitted { sequence });
                None
            }
            Err(error) if error.is_fatal() => {
                let reason = error.to_string();
                error!("{} encoder failed on frame {}: {}", self.id, sequence, reason);
                if let Err(e) = self.encoder.finalize_encoding().await {
                    warn!("{} finalize after failure: {}", self.id, e);
                }
                self.emit(SessionEvent::Fatal { reason: reason.clone() });
                Some(TickLoopExit::Fatal(reason))
            }
            Err(error) => {
                warn!("{} frame {} rejected: {}", self.id, sequence, error);
                self.emit(SessionEvent::IngestionFailed { sequence, error });
                None
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
