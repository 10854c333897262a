//! Top-level run loop.
//!
//! - `round`: per-round aggregation and the detection/round log sinks
//! - `RunLoop`: the state machine sequencing capture, classification and
//!   logging
//!
//! The run loop owns every piece of shared mutable state (cursor, failure
//! counters, round table, counters). The single exception is the
//! termination flag, which a signal handler may set from another context
//! and which is therefore the one atomic.

pub mod round;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::DetectionBackend;
use crate::liveness::LivenessMarker;
use crate::runner::round::RoundAggregator;
use crate::source::SourceMultiplexer;

/// Linear lifecycle of one run. No transitions lead backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Continuous operation or a single successful pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Continuous,
    /// Process exactly one frame successfully, then wind down. Used for
    /// single-image runs.
    SinglePass,
}

/// Fixed delays applied by the loop body.
#[derive(Clone, Copy, Debug)]
pub struct LoopDelays {
    /// Sleep after each processed frame.
    pub inter_round: Duration,
    /// Sleep after a scheduling step that produced no frame.
    pub inter_attempt: Duration,
}

pub struct RunLoop {
    mux: SourceMultiplexer,
    backend: Option<Box<dyn DetectionBackend>>,
    aggregator: RoundAggregator,
    liveness: LivenessMarker,
    mode: RunMode,
    delays: LoopDelays,
    term: Arc<AtomicBool>,
    state: RunState,
    frames_processed: u64,
    rounds_completed: u64,
}

impl RunLoop {
    pub fn new(
        mux: SourceMultiplexer,
        backend: Box<dyn DetectionBackend>,
        aggregator: RoundAggregator,
        liveness: LivenessMarker,
        mode: RunMode,
        delays: LoopDelays,
    ) -> Self {
        Self {
            mux,
            backend: Some(backend),
            aggregator,
            liveness,
            mode,
            delays,
            term: Arc::new(AtomicBool::new(false)),
            state: RunState::Starting,
            frames_processed: 0,
            rounds_completed: 0,
        }
    }

    /// Shared cooperative-termination flag. A signal handler sets it; the
    /// loop polls it once per iteration. A blocking read in progress is not
    /// interrupted.
    pub fn termination_flag(&self) -> Arc<AtomicBool> {
        self.term.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    /// Drive the run to completion. Draining (flush + close exactly once)
    /// happens on every exit path, including mid-run errors.
    pub fn run(&mut self) -> Result<()> {
        if self.state != RunState::Starting {
            return Err(anyhow!("run loop already consumed"));
        }
        if self.mux.active_count() == 0 {
            return Err(anyhow!("no active sources configured"));
        }
        let Some(mut backend) = self.backend.take() else {
            return Err(anyhow!("no detection backend configured"));
        };

        self.state = RunState::Running;
        log::info!(
            "run loop entering Running: {} active sources, mode {:?}",
            self.mux.active_count(),
            self.mode
        );

        let outcome = self.run_inner(backend.as_mut());
        self.drain();
        // The backend (and with it any remote connection) is released here,
        // after the sinks and sources are closed.
        drop(backend);
        outcome
    }

    fn run_inner(&mut self, backend: &mut dyn DetectionBackend) -> Result<()> {
        loop {
            if self.term.load(Ordering::SeqCst) {
                log::info!("termination requested, winding down");
                return Ok(());
            }

            self.liveness.clear();

            let (sweep, frame) = self.mux.next_frame();
            if sweep.wrapped {
                self.rounds_completed += 1;
                self.aggregator.flush_round()?;
            }
            if let Some(id) = self.mux.exhausted() {
                log::error!("source {} exhausted its failure budget, ending run", id);
                return Ok(());
            }

            let Some(frame) = frame else {
                if !self.delays.inter_attempt.is_zero() {
                    std::thread::sleep(self.delays.inter_attempt);
                }
                continue;
            };

            let batch = match backend.classify(&frame) {
                Ok(batch) => batch,
                Err(e) => {
                    log::warn!(
                        "classify failed source={} frame={}: {}",
                        frame.source_id,
                        frame.name(),
                        e
                    );
                    continue;
                }
            };

            self.aggregator.record(&frame, &batch)?;
            self.frames_processed += 1;
            log::debug!(
                "frame {} classified: {} detections",
                frame.name(),
                batch.detections.len()
            );

            if self.mode == RunMode::SinglePass {
                log::info!("single pass complete");
                self.term.store(true, Ordering::SeqCst);
            }

            if !self.delays.inter_round.is_zero() {
                std::thread::sleep(self.delays.inter_round);
            }
        }
    }

    /// Flush the in-progress round (if it recorded anything), then close
    /// every collaborator exactly once.
    fn drain(&mut self) {
        self.state = RunState::Draining;
        if self.aggregator.has_pending() {
            if let Err(e) = self.aggregator.flush_round() {
                log::error!("final round flush failed: {}", e);
            } else {
                self.rounds_completed += 1;
            }
        }
        if let Err(e) = self.aggregator.close() {
            log::error!("log sink close failed: {}", e);
        }
        self.mux.close_all();
        self.state = RunState::Stopped;
        log::info!(
            "run stopped: {} frames, {} rounds",
            self.frames_processed,
            self.rounds_completed
        );
    }
}
