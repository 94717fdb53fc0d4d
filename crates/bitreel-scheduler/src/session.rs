use bitreel_core::{CaptureError, EncoderError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

// MARK: - SessionId

/// Identifies one `start`/`stop` lifetime on a [`CaptureScheduler`](crate::CaptureScheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub(crate) u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

// MARK: - SessionEvent

/// Diagnostic emitted by a running session. Never dropped.
#[derive(Debug)]
pub enum SessionEvent {
    /// A frame was accepted by the encoder.
    FrameSubmitted { sequence: u64 },
    /// Nothing was submitted on this tick (1-based tick number).
    TickSkipped { tick: u64, error: CaptureError },
    /// The encoder rejected a frame; the session keeps going.
    IngestionFailed { sequence: u64, error: EncoderError },
    /// The encoder can no longer accept frames; ticking has ended.
    Fatal { reason: String },
    /// Emitted by `stop` once the encoder has been told to finalize.
    Stopped { ticks: u64, frames_submitted: u64 },
}

// MARK: - SessionHandle

/// Returned by `start`: pass `id` to `stop`, drain `events` for diagnostics.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    /// Unbounded, roughly one event per tick. Keep draining it or drop it;
    /// a receiver that is held but never read grows for the whole session.
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

// MARK: - BackpressurePolicy

/// What happens to ticks that come due while a previous tick is still running.
///
/// Ticks are never reordered; the policies only differ in timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Fire the late tick as soon as possible and push the rest of the
    /// schedule back by the delay. Nothing is dropped.
    #[default]
    Delay,
    /// Fire every missed tick back to back until caught up.
    Burst,
    /// Fire the late tick, then drop missed slots and realign to the grid.
    Skip,
}

impl From<BackpressurePolicy> for MissedTickBehavior {
    fn from(policy: BackpressurePolicy) -> Self {
        match policy {
            BackpressurePolicy::Delay => MissedTickBehavior::Delay,
            BackpressurePolicy::Burst => MissedTickBehavior::Burst,
            BackpressurePolicy::Skip => MissedTickBehavior::Skip,
        }
    }
}
