//! Edge video-analytics runner.
//!
//! This crate implements the core of a multi-camera detection runner: it
//! repeatedly pulls raw frames from up to six independent capture sources,
//! hands each frame to an object-detection backend, and logs per-frame and
//! per-round results.
//!
//! # Architecture
//!
//! - `source`: blocking frame byte streams and the round-robin multiplexer
//!   with bounded retry
//! - `detect`: the pluggable backend abstraction; `LocalBackend` delegates
//!   to an in-process inference collaborator, `RemoteBackend` speaks a
//!   synchronous socket wire protocol
//! - `runner`: the run-loop state machine (`Starting → Running → Draining
//!   → Stopped`) and round-based aggregation into the detection/round logs
//! - `config`: resolved typed configuration (JSON file + env overrides)
//! - `liveness`: the supervisor heartbeat marker
//!
//! Everything executes on a single logical thread; the only cross-context
//! state is the cooperative termination flag, set by a signal handler and
//! polled once per loop iteration.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod detect;
pub mod frame;
pub mod liveness;
pub mod runner;
pub mod source;

pub use config::{RunnerConfig, SourceSlot};
pub use detect::{
    select_backend, BackendSelection, Classifier, ClassifyError, Detection, DetectionBackend,
    DetectionBatch, LocalBackend, ProtocolError, RemoteBackend, RemoteInferenceClient,
    StageTimings, StubClassifier,
};
pub use frame::{Frame, FrameDims};
pub use liveness::LivenessMarker;
pub use runner::round::{
    ArtifactSink, DirArtifactSink, NullArtifactSink, RoundAggregator, RoundRecord,
    DETECTION_LOG_HEADER,
};
pub use runner::{LoopDelays, RunLoop, RunMode, RunState};
pub use source::{
    open_stream, FrameStream, ReaderStream, RetryPolicy, SourceMultiplexer, SourceState,
    StubStream, Sweep, MAX_SOURCES,
};

/// Wall-clock seconds since the Unix epoch.
pub fn now_epoch_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
