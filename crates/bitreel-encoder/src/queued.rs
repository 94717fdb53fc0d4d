//! `QueuedEncoder` — buffers frames and hands them to a [`FrameSink`] on a
//! dedicated worker thread.
//!
//! `ingest_frame` only enqueues, so the capture side never waits on disk or
//! codec work. `finalize_encoding` closes the queue; the worker drains what is
//! left, closes the sink and publishes an [`EncodeSummary`] that callers can
//! await with [`QueuedEncoder::wait_finished`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bitreel_core::{EncoderConfig, EncoderError, Frame};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::sink::FrameSink;
use crate::Encoder;

const WORKER_THREAD_NAME: &str = "bitreel-encode";

/// Outcome of one encode session, published once the worker has exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    pub output_path: PathBuf,
    pub frames_encoded: u64,
    /// First fatal error hit by the sink, if any.
    pub error: Option<String>,
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct Shared<S> {
    /// The sink rests here between sessions; the worker owns it while encoding.
    sink: Mutex<Option<S>>,
    fatal: Mutex<Option<String>>,
    frames_encoded: AtomicU64,
    finished: watch::Sender<Option<EncodeSummary>>,
}

impl<S> Shared<S> {
    fn fatal(&self) -> Option<String> {
        lock(&self.fatal).clone()
    }

    fn set_fatal(&self, reason: String) {
        lock(&self.fatal).get_or_insert(reason);
    }
}

#[derive(Default)]
struct Control {
    config: Option<EncoderConfig>,
    /// `Some` between `begin_encoding` and `finalize_encoding`.
    queue: Option<mpsc::UnboundedSender<Frame>>,
    started_once: bool,
}

// ── QueuedEncoder ─────────────────────────────────────────────────────────────

/// [`Encoder`] that queues frames for a [`FrameSink`] running on its own thread.
pub struct QueuedEncoder<S: FrameSink> {
    control: Mutex<Control>,
    shared: Arc<Shared<S>>,
}

impl<S: FrameSink> QueuedEncoder<S> {
    pub fn new(sink: S) -> Self {
        let (finished, _) = watch::channel(None);
        Self {
            control: Mutex::new(Control::default()),
            shared: Arc::new(Shared {
                sink: Mutex::new(Some(sink)),
                fatal: Mutex::new(None),
                frames_encoded: AtomicU64::new(0),
                finished,
            }),
        }
    }

    /// Frames the sink has accepted in the current (or last) session.
    pub fn frames_encoded(&self) -> u64 {
        self.shared.frames_encoded.load(Ordering::Relaxed)
    }

    pub fn is_encoding(&self) -> bool {
        lock(&self.control).queue.is_some()
    }

    pub fn config(&self) -> Option<EncoderConfig> {
        lock(&self.control).config.clone()
    }

    /// Wait until the worker has drained the queue and closed the sink.
    ///
    /// Resolves only after [`Encoder::finalize_encoding`] has been called for
    /// the current session.
    pub async fn wait_finished(&self) -> Result<EncodeSummary, EncoderError> {
        if !lock(&self.control).started_once {
            return Err(EncoderError::InvalidState { reason: "encoding never started".into() });
        }
        let mut rx = self.shared.finished.subscribe();
        let dropped = || EncoderError::Fatal { reason: "encoder dropped".into() };
        let published = rx.wait_for(Option::is_some).await.map_err(|_| dropped())?;
        let summary = published.as_ref().cloned();
        summary.ok_or_else(dropped)
    }

    /// Close a sink whose worker never started and put it back in its slot.
    fn reclaim_sink(&self, handoff: &Mutex<Option<S>>, error: std::io::Error) -> EncoderError {
        error!("cannot start encode worker: {}", error);
        if let Some(mut sink) = lock(handoff).take() {
            if let Err(e) = sink.on_stop(0) {
                warn!("closing sink after failed start: {}", e);
            }
            *lock(&self.shared.sink) = Some(sink);
        }
        EncoderError::Io(error)
    }
}

#[async_trait]
impl<S: FrameSink> Encoder for QueuedEncoder<S> {
    async fn configure(&self, config: EncoderConfig) -> Result<(), EncoderError> {
        config.validate()?;
        let mut control = lock(&self.control);
        if control.queue.is_some() {
            return Err(EncoderError::InvalidState { reason: "cannot reconfigure while encoding".into() });
        }
        debug!(
            "encoder configured: {} {} every {} ms ({} compression)",
            config.output_path.display(),
            config.resolution,
            config.frame_delay_ms,
            config.compression
        );
        control.config = Some(config);
        Ok(())
    }

    async fn begin_encoding(&self) -> Result<(), EncoderError> {
        let mut control = lock(&self.control);
        if control.queue.is_some() {
            return Err(EncoderError::InvalidState { reason: "already encoding".into() });
        }
        let config = control.config.clone().ok_or(EncoderError::NotConfigured)?;

        let mut sink = lock(&self.shared.sink).take().ok_or_else(|| EncoderError::InvalidState {
            reason: "previous session is still finalizing".into(),
        })?;
        if let Err(e) = sink.on_start(&config) {
            *lock(&self.shared.sink) = Some(sink);
            return Err(e);
        }

        *lock(&self.shared.fatal) = None;
        self.shared.frames_encoded.store(0, Ordering::Relaxed);
        self.shared.finished.send_replace(None);

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::clone(&self.shared);
        let worker_config = config.clone();
        let handoff = Arc::new(Mutex::new(Some(sink)));
        let worker_sink = Arc::clone(&handoff);
        let spawned = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || {
                if let Some(sink) = lock(&worker_sink).take() {
                    run_worker(sink, rx, worker_config, shared);
                }
            });
        if let Err(e) = spawned {
            return Err(self.reclaim_sink(&handoff, e));
        }

        control.queue = Some(tx);
        control.started_once = true;
        info!("encoding started → {}", config.output_path.display());
        Ok(())
    }

    async fn ingest_frame(&self, frame: Frame) -> Result<(), EncoderError> {
        if let Some(reason) = self.shared.fatal() {
            return Err(EncoderError::Fatal { reason });
        }
        let control = lock(&self.control);
        let (Some(queue), Some(config)) = (control.queue.as_ref(), control.config.as_ref()) else {
            return Err(EncoderError::InvalidState { reason: "not encoding".into() });
        };
        if frame.resolution() != config.resolution {
            return Err(EncoderError::Ingestion {
                reason: format!(
                    "frame {} is {}, output is {}",
                    frame.sequence(),
                    frame.resolution(),
                    config.resolution
                ),
            });
        }
        queue
            .send(frame)
            .map_err(|_| EncoderError::Fatal { reason: "encode worker exited".into() })
    }

    async fn finalize_encoding(&self) -> Result<(), EncoderError> {
        let queue = lock(&self.control).queue.take();
        match queue {
            Some(queue) => {
                // Dropping the last sender lets the worker drain and exit.
                drop(queue);
                debug!("encoder finalizing");
                Ok(())
            }
            None => Err(EncoderError::InvalidState { reason: "not encoding".into() }),
        }
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

fn run_worker<S: FrameSink>(
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    config: EncoderConfig,
    shared: Arc<Shared<S>>,
) {
    let mut encoded: u64 = 0;

    while let Some(frame) = rx.blocking_recv() {
        match sink.on_frame(&frame, config.pts_ms(encoded)) {
            Ok(()) => {
                encoded += 1;
                shared.frames_encoded.store(encoded, Ordering::Relaxed);
            }
            Err(e) if e.is_fatal() => {
                error!("sink failed on frame {}: {}", frame.sequence(), e);
                shared.set_fatal(e.to_string());
                break;
            }
            Err(e) => warn!("frame {} dropped by sink: {}", frame.sequence(), e),
        }
    }
    rx.close();

    if encoded == 0 {
        warn!("encode finished without any frame added");
    } else {
        info!("total frame count = {}", encoded);
    }
    if let Err(e) = sink.on_stop(encoded) {
        error!("closing sink: {}", e);
        shared.set_fatal(e.to_string());
    }

    let summary = EncodeSummary {
        output_path: config.output_path,
        frames_encoded: encoded,
        error: shared.fatal(),
    };
    *lock(&shared.sink) = Some(sink);
    shared.finished.send_replace(Some(summary));
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitreel_core::Resolution;
    use std::sync::Mutex as StdMutex;

    /// Records every call; fails fatally once `fail_at` frames were written.
    #[derive(Clone, Default)]
    struct ProbeSink {
        log: Arc<StdMutex<Vec<String>>>,
        fail_at: Option<u64>,
    }

    impl ProbeSink {
        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl FrameSink for ProbeSink {
        fn on_start(&mut self, _config: &EncoderConfig) -> Result<(), EncoderError> {
            self.log.lock().unwrap().push("start".into());
            Ok(())
        }

        fn on_frame(&mut self, frame: &Frame, pts_ms: u64) -> Result<(), EncoderError> {
            let written = self.log.lock().unwrap().iter().filter(|e| e.starts_with("frame")).count();
            if self.fail_at == Some(written as u64) {
                return Err(EncoderError::Fatal { reason: "disk full".into() });
            }
            self.log.lock().unwrap().push(format!("frame {} @{}", frame.sequence(), pts_ms));
            Ok(())
        }

        fn on_stop(&mut self, frames: u64) -> Result<(), EncoderError> {
            self.log.lock().unwrap().push(format!("stop {frames}"));
            Ok(())
        }
    }

    fn config() -> EncoderConfig {
        EncoderConfig::new("probe.argb", 40, Resolution::new(2, 2))
    }

    fn frame(seq: u64, resolution: Resolution) -> Frame {
        let len = resolution.total_pixels() as usize * 4;
        Frame::from_argb(resolution, vec![0; len]).unwrap().stamped(seq, seq * 30)
    }

    #[tokio::test]
    async fn drains_queue_in_order_on_finalize() {
        let sink = ProbeSink::default();
        let encoder = QueuedEncoder::new(sink.clone());
        encoder.configure(config()).await.unwrap();
        encoder.begin_encoding().await.unwrap();
        for seq in 0..3 {
            encoder.ingest_frame(frame(seq, Resolution::new(2, 2))).await.unwrap();
        }
        encoder.finalize_encoding().await.unwrap();

        let summary = encoder.wait_finished().await.unwrap();
        assert_eq!(summary.frames_encoded, 3);
        assert_eq!(summary.error, None);
        assert_eq!(
            sink.entries(),
            vec!["start", "frame 0 @0", "frame 1 @40", "frame 2 @80", "stop 3"]
        );
        assert!(!encoder.is_encoding());
    }

    #[tokio::test]
    async fn begin_requires_configuration() {
        let encoder = QueuedEncoder::new(ProbeSink::default());
        assert!(matches!(encoder.begin_encoding().await, Err(EncoderError::NotConfigured)));
    }

    #[tokio::test]
    async fn begin_twice_is_invalid_state() {
        let encoder = QueuedEncoder::new(ProbeSink::default());
        encoder.configure(config()).await.unwrap();
        encoder.begin_encoding().await.unwrap();
        assert!(matches!(encoder.begin_encoding().await, Err(EncoderError::InvalidState { .. })));
        assert!(matches!(encoder.configure(config()).await, Err(EncoderError::InvalidState { .. })));
        encoder.finalize_encoding().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_frames_outside_a_session_and_wrong_sizes() {
        let encoder = QueuedEncoder::new(ProbeSink::default());
        encoder.configure(config()).await.unwrap();
        let early = encoder.ingest_frame(frame(0, Resolution::new(2, 2))).await;
        assert!(matches!(early, Err(EncoderError::InvalidState { .. })));

        encoder.begin_encoding().await.unwrap();
        let wrong = encoder.ingest_frame(frame(0, Resolution::new(3, 3))).await.unwrap_err();
        assert!(matches!(wrong, EncoderError::Ingestion { .. }));
        assert!(!wrong.is_fatal());
        encoder.finalize_encoding().await.unwrap();
        assert!(matches!(encoder.finalize_encoding().await, Err(EncoderError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn sink_failure_turns_ingestion_fatal() {
        let sink = ProbeSink { fail_at: Some(1), ..Default::default() };
        let encoder = QueuedEncoder::new(sink.clone());
        encoder.configure(config()).await.unwrap();
        encoder.begin_encoding().await.unwrap();
        encoder.ingest_frame(frame(0, Resolution::new(2, 2))).await.unwrap();
        encoder.ingest_frame(frame(1, Resolution::new(2, 2))).await.unwrap();

        let mut fatal = None;
        for _ in 0..200 {
            match encoder.ingest_frame(frame(2, Resolution::new(2, 2))).await {
                Err(e) if e.is_fatal() => {
                    fatal = Some(e);
                    break;
                }
                _ => tokio::time::sleep(std::time::Duration::from_millis(5)).await,
            }
        }
        assert!(matches!(fatal, Some(EncoderError::Fatal { .. })));

        encoder.finalize_encoding().await.unwrap();
        let summary = encoder.wait_finished().await.unwrap();
        assert_eq!(summary.frames_encoded, 1);
        assert!(summary.error.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn can_run_a_second_session() {
        let sink = ProbeSink::default();
        let encoder = QueuedEncoder::new(sink.clone());
        encoder.configure(config()).await.unwrap();

        encoder.begin_encoding().await.unwrap();
        encoder.finalize_encoding().await.unwrap();
        assert_eq!(encoder.wait_finished().await.unwrap().frames_encoded, 0);

        encoder.begin_encoding().await.unwrap();
        encoder.ingest_frame(frame(0, Resolution::new(2, 2))).await.unwrap();
        encoder.finalize_encoding().await.unwrap();
        assert_eq!(encoder.wait_finished().await.unwrap().frames_encoded, 1);
        assert_eq!(sink.entries().iter().filter(|e| *e == "start").count(), 2);
    }

    #[tokio::test]
    async fn sink_is_reclaimed_when_worker_cannot_start() {
        let sink = ProbeSink::default();
        let encoder = QueuedEncoder::new(sink.clone());
        encoder.configure(config()).await.unwrap();

        // State of `begin_encoding` right after `on_start`, before the spawn.
        let mut taken = lock(&encoder.shared.sink).take().unwrap();
        taken.on_start(&config()).unwrap();
        let handoff = Mutex::new(Some(taken));
        let err = encoder.reclaim_sink(&handoff, std::io::Error::other("no threads left"));

        assert!(matches!(err, EncoderError::Io(_)));
        assert!(err.is_fatal());
        assert_eq!(sink.entries(), vec!["start", "stop 0"]);
        assert!(!encoder.is_encoding());

        encoder.begin_encoding().await.unwrap();
        encoder.finalize_encoding().await.unwrap();
        assert_eq!(encoder.wait_finished().await.unwrap().frames_encoded, 0);
    }

    #[tokio::test]
    async fn wait_finished_before_start_is_invalid() {
        let encoder = QueuedEncoder::new(ProbeSink::default());
        assert!(matches!(encoder.wait_finished().await, Err(EncoderError::InvalidState { .. })));
    }
}
