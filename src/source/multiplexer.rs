//! Round-robin frame acquisition across up to six sources.
//!
//! The multiplexer owns one `SourceHandle` per slot and advances a cursor by
//! one on every `next_frame` call, regardless of outcome. Inactive and
//! retired slots are skipped without penalty but still count toward the
//! sweep, so wrap-around detection covers every configured slot.
//!
//! Failure policy: each handle keeps its own consecutive-failure counter
//! (a full read resets it to zero). A short or zero-byte read increments
//! the counter and backs off for a fixed interval; once the counter reaches
//! the configured threshold the handle moves to `Failed`, which is terminal,
//! and the run is asked to wind down.

use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::frame::{Frame, FrameDims};
use crate::source::stream::FrameStream;

/// Upper bound on input slots, matching the 1..=6 source-id space.
pub const MAX_SOURCES: usize = 6;

/// Bounded retry policy for source reads.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Consecutive short reads before a source is retired.
    pub failure_threshold: u32,
    /// Sleep after each short read.
    pub read_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 30,
            read_backoff: Duration::from_secs(1),
        }
    }
}

/// Liveness state of one source slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    /// Configured and eligible for reads.
    Active,
    /// Never configured; skipped without touching counters.
    Inactive,
    /// Failure threshold reached. Terminal, no self-healing.
    Failed,
}

struct SourceHandle {
    id: u8,
    state: SourceState,
    failures: u32,
    seq: u64,
    stream: Option<Box<dyn FrameStream>>,
}

impl SourceHandle {
    fn vacant(id: u8) -> Self {
        Self {
            id,
            state: SourceState::Inactive,
            failures: 0,
            seq: 0,
            stream: None,
        }
    }
}

/// Outcome metadata for one scheduling step.
#[derive(Clone, Copy, Debug)]
pub struct Sweep {
    /// Slot visited by this step.
    pub source_id: u8,
    /// True when this step returned the cursor to the first slot, marking a
    /// round boundary. Never set on the very first step.
    pub wrapped: bool,
}

/// Round-robin scheduler over the source slots.
pub struct SourceMultiplexer {
    slots: Vec<SourceHandle>,
    dims: FrameDims,
    policy: RetryPolicy,
    cursor: usize,
    steps: u64,
    exhausted: Option<u8>,
}

impl SourceMultiplexer {
    pub fn new(dims: FrameDims, policy: RetryPolicy) -> Self {
        let slots = (1..=MAX_SOURCES as u8).map(SourceHandle::vacant).collect();
        Self {
            slots,
            dims,
            policy,
            cursor: 0,
            steps: 0,
            exhausted: None,
        }
    }

    /// Attach a stream to a slot, activating it. Slot ids are 1..=6.
    pub fn attach(&mut self, id: u8, stream: Box<dyn FrameStream>) -> Result<()> {
        if id == 0 || id as usize > MAX_SOURCES {
            return Err(anyhow!("source id {} out of range 1..={}", id, MAX_SOURCES));
        }
        let slot = &mut self.slots[id as usize - 1];
        if slot.state != SourceState::Inactive {
            return Err(anyhow!("source {} already attached", id));
        }
        slot.stream = Some(stream);
        slot.state = SourceState::Active;
        Ok(())
    }

    /// Number of active slots.
    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SourceState::Active)
            .count()
    }

    /// Source that hit its failure threshold, if any.
    pub fn exhausted(&self) -> Option<u8> {
        self.exhausted
    }

    pub fn state_of(&self, id: u8) -> SourceState {
        self.slots[id as usize - 1].state
    }

    /// Advance the cursor one slot and attempt to acquire a frame from it.
    ///
    /// Exactly one blocking read is issued for an active slot; inactive and
    /// failed slots return `None` immediately.
    pub fn next_frame(&mut self) -> (Sweep, Option<Frame>) {
        let idx = self.cursor;
        let sweep = Sweep {
            source_id: self.slots[idx].id,
            wrapped: idx == 0 && self.steps > 0,
        };
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.steps += 1;

        let dims = self.dims;
        let policy = self.policy;
        let slot = &mut self.slots[idx];
        if slot.state != SourceState::Active {
            return (sweep, None);
        }

        let Some(stream) = slot.stream.as_mut() else {
            return (sweep, None);
        };

        let expected = dims.byte_len();
        let mut pixels = vec![0u8; expected];
        let got = match stream.read_frame(&mut pixels) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("source {} read error: {}", slot.id, e);
                0
            }
        };

        if got == expected {
            slot.failures = 0;
            slot.seq += 1;
            let frame = Frame::new(slot.id, slot.seq, dims, pixels);
            return (sweep, Some(frame));
        }

        slot.failures += 1;
        log::warn!(
            "source {}: {} bytes read (expected {}), consecutive failures {}",
            slot.id,
            got,
            expected,
            slot.failures
        );
        if slot.failures >= policy.failure_threshold {
            slot.state = SourceState::Failed;
            slot.stream = None;
            self.exhausted = Some(slot.id);
            log::error!(
                "source {} retired after {} consecutive failures",
                slot.id,
                policy.failure_threshold
            );
        } else if !policy.read_backoff.is_zero() {
            std::thread::sleep(policy.read_backoff);
        }
        (sweep, None)
    }

    /// Drop every attached stream. Safe to call more than once; streams are
    /// released exactly once.
    pub fn close_all(&mut self) {
        for slot in &mut self.slots {
            if slot.stream.take().is_some() {
                log::debug!("source {} stream closed", slot.id);
            }
        }
    }
}
