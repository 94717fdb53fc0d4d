//! bitreel-scheduler — drives the capture → encode loop at a fixed cadence.
//!
//! ```text
//!  start ──► Encoder::begin_encoding
//!              │
//!              ▼
//!   interval_at(now + T, T) ──tick──► SurfaceSnapshotter::capture ──► Encoder::ingest_frame
//!              ▲                         │ EmptyFrame: skip this tick
//!              │                         ▼
//!   CancellationToken ◄── stop ──► join tick task ──► Encoder::finalize_encoding
//! ```
//!
//! One tokio task per session runs the ticks one after the other, so captures
//! never overlap and frames reach the encoder in capture order. Diagnostics
//! flow back to the caller through [`SessionHandle::events`].

mod scheduler;
mod session;

pub use scheduler::CaptureScheduler;
pub use session::{BackpressurePolicy, SessionEvent, SessionHandle, SessionId};
