//! Round aggregation and log sinks.
//!
//! A round is one full round-robin sweep across all configured source
//! slots. The aggregator accumulates the distinct class ids seen per source
//! during the round, flushes a structured record on every wrap-around (and
//! at shutdown when the tail round recorded anything), and independently
//! appends one flat CSV row per individual detection.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::detect::DetectionBatch;
use crate::frame::Frame;
use crate::now_epoch_s;

/// Header row of the flat per-detection log.
pub const DETECTION_LOG_HEADER: &str =
    "source_id,time,class_id,class_label,confidence,read_s,convert_s,predict_s,box_s";

/// One record of the append-only round log, serialized as a JSON line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundRecord {
    pub run_id: u64,
    /// Epoch seconds at flush time.
    pub time: u64,
    /// Sorted distinct class ids per configured source. Sources with no
    /// detections this round map to an empty list.
    pub sources: BTreeMap<u8, Vec<i64>>,
}

/// Collaborator that persists an annotated-frame artifact when a frame
/// produced at least one detection. Rendering/encoding is not this crate's
/// concern.
pub trait ArtifactSink: Send {
    fn persist(&mut self, frame: &Frame, batch: &DetectionBatch) -> Result<()>;
}

/// Writes raw frame bytes under the run directory, named after the frame.
pub struct DirArtifactSink {
    dir: PathBuf,
}

impl DirArtifactSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl ArtifactSink for DirArtifactSink {
    fn persist(&mut self, frame: &Frame, _batch: &DetectionBatch) -> Result<()> {
        let path = self.dir.join(format!("{}.raw", frame.name()));
        std::fs::write(&path, frame.pixels())
            .with_context(|| format!("cannot write artifact {}", path.display()))
    }
}

/// Discards artifacts. Used when no output directory is configured.
pub struct NullArtifactSink;

impl ArtifactSink for NullArtifactSink {
    fn persist(&mut self, _frame: &Frame, _batch: &DetectionBatch) -> Result<()> {
        Ok(())
    }
}

pub struct RoundAggregator {
    run_id: u64,
    configured_sources: Vec<u8>,
    round_table: BTreeMap<u8, BTreeSet<i64>>,
    detection_log: Box<dyn Write + Send>,
    round_log: Option<Box<dyn Write + Send>>,
    artifacts: Box<dyn ArtifactSink>,
}

impl RoundAggregator {
    /// Open the aggregator over its sinks. The detection log's header row
    /// is written immediately; failure to do so is a startup failure.
    pub fn new(
        run_id: u64,
        configured_sources: Vec<u8>,
        mut detection_log: Box<dyn Write + Send>,
        round_log: Option<Box<dyn Write + Send>>,
        artifacts: Box<dyn ArtifactSink>,
    ) -> Result<Self> {
        writeln!(detection_log, "{}", DETECTION_LOG_HEADER)
            .context("cannot write detection log header")?;
        detection_log.flush()?;
        Ok(Self {
            run_id,
            configured_sources,
            round_table: BTreeMap::new(),
            detection_log,
            round_log,
            artifacts,
        })
    }

    /// True when the in-progress round has recorded at least one detection.
    pub fn has_pending(&self) -> bool {
        self.round_table.values().any(|set| !set.is_empty())
    }

    /// Record one frame's batch: a CSV row per detection, the class ids
    /// into the round table, and the artifact signal for non-empty batches.
    ///
    /// An artifact write failure affects only this frame; it is logged and
    /// skipped. A detection-log write failure is a sink failure and
    /// propagates.
    pub fn record(&mut self, frame: &Frame, batch: &DetectionBatch) -> Result<()> {
        for det in &batch.detections {
            writeln!(
                self.detection_log,
                "{},{},{},{},{:.4},{:.4},{:.4},{:.4},{:.4}",
                batch.source_id,
                batch.timestamp_s,
                det.class_id,
                det.class_label,
                det.confidence,
                batch.timings.read_s,
                batch.timings.convert_s,
                batch.timings.predict_s,
                batch.timings.box_s,
            )
            .context("cannot append to detection log")?;

            self.round_table
                .entry(batch.source_id)
                .or_default()
                .insert(det.class_id);
        }
        self.detection_log.flush()?;

        if !batch.is_empty() {
            if let Err(e) = self.artifacts.persist(frame, batch) {
                log::warn!("artifact persist failed for {}: {}", frame.name(), e);
            }
        }
        Ok(())
    }

    /// Serialize the finished round and reset the table. Called on every
    /// wrap-around and once more at drain when the tail round is non-empty.
    pub fn flush_round(&mut self) -> Result<()> {
        let mut sources: BTreeMap<u8, Vec<i64>> = BTreeMap::new();
        for id in &self.configured_sources {
            let classes = self
                .round_table
                .get(id)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            sources.insert(*id, classes);
        }
        let record = RoundRecord {
            run_id: self.run_id,
            time: now_epoch_s(),
            sources,
        };

        if let Some(sink) = self.round_log.as_mut() {
            let line = serde_json::to_string(&record).context("cannot serialize round record")?;
            writeln!(sink, "{}", line).context("cannot append to round log")?;
            sink.flush()?;
        }
        self.round_table.clear();
        Ok(())
    }

    /// Flush both sinks. Called exactly once, from Draining.
    pub fn close(&mut self) -> Result<()> {
        self.detection_log.flush()?;
        if let Some(sink) = self.round_log.as_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}
