//! Detection results.

use crate::now_epoch_s;

/// One classified object instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Class label text as produced by the backend.
    pub class_label: String,
    /// Numeric class id.
    pub class_id: i64,
    /// Confidence, expected in [0,1] but not enforced by the wire protocol.
    pub confidence: f32,
    /// Bounding box, image-relative units as produced by the backend.
    pub x_top_left: f32,
    pub y_top_left: f32,
    pub width: f32,
    pub height: f32,
}

/// Per-stage durations for one classify pass, in seconds. Zero-filled when
/// a backend does not measure a stage.
#[derive(Clone, Copy, Debug, Default)]
pub struct StageTimings {
    pub read_s: f64,
    pub convert_s: f64,
    pub predict_s: f64,
    pub box_s: f64,
}

/// Ordered detections for one frame. Produced once per classify call; may
/// be empty.
#[derive(Clone, Debug)]
pub struct DetectionBatch {
    pub source_id: u8,
    /// Epoch seconds at which the batch was produced.
    pub timestamp_s: u64,
    pub detections: Vec<Detection>,
    pub timings: StageTimings,
}

impl DetectionBatch {
    pub fn new(source_id: u8, detections: Vec<Detection>, timings: StageTimings) -> Self {
        Self {
            source_id,
            timestamp_s: now_epoch_s(),
            detections,
            timings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
