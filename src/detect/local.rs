//! In-process detection backend.
//!
//! `LocalBackend` wraps an opaque, already-initialized inference
//! collaborator behind the `Classifier` trait. The collaborator's internal
//! math is not this crate's concern; any failure it reports is surfaced as
//! `ClassifyError::Backend` and never crashes the process.

use std::time::Instant;

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectionBackend;
use crate::detect::error::ClassifyError;
use crate::detect::result::{Detection, DetectionBatch, StageTimings};
use crate::frame::{Frame, FrameDims};

/// Opaque in-process inference collaborator.
///
/// Loaded once at startup and reused for the run's lifetime; there is no
/// per-call teardown.
pub trait Classifier: Send {
    fn classify(&mut self, pixels: &[u8], dims: FrameDims, name: &str) -> Result<Vec<Detection>>;
}

pub struct LocalBackend {
    classifier: Box<dyn Classifier>,
}

impl LocalBackend {
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self { classifier }
    }
}

impl DetectionBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn classify(&mut self, frame: &Frame) -> Result<DetectionBatch, ClassifyError> {
        let started = Instant::now();
        let detections = self
            .classifier
            .classify(frame.pixels(), frame.dims, &frame.name())
            .map_err(|e| ClassifyError::Backend(e.to_string()))?;
        let timings = StageTimings {
            predict_s: started.elapsed().as_secs_f64(),
            ..StageTimings::default()
        };
        Ok(DetectionBatch::new(frame.source_id, detections, timings))
    }
}

/// Stub classifier for tests and model-less deployments. Hashes the pixel
/// buffer and reports a single whole-frame detection whenever the scene
/// changed relative to the previous frame of the same source.
pub struct StubClassifier {
    last_hash: Option<[u8; 32]>,
}

impl StubClassifier {
    pub fn new() -> Self {
        Self { last_hash: None }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for StubClassifier {
    fn classify(&mut self, pixels: &[u8], dims: FrameDims, _name: &str) -> Result<Vec<Detection>> {
        let current: [u8; 32] = Sha256::digest(pixels).into();
        let changed = match self.last_hash {
            Some(prev) => prev != current,
            None => false,
        };
        self.last_hash = Some(current);

        if !changed {
            return Ok(vec![]);
        }
        Ok(vec![Detection {
            class_label: "scene_change".to_string(),
            class_id: 0,
            confidence: 0.85,
            x_top_left: 0.0,
            y_top_left: 0.0,
            width: dims.width as f32,
            height: dims.height as f32,
        }])
    }
}
