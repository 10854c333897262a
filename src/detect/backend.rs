//! Detection backend abstraction.

use anyhow::Result;

use crate::detect::error::ClassifyError;
use crate::detect::local::{LocalBackend, StubClassifier};
use crate::detect::remote::RemoteBackend;
use crate::detect::result::DetectionBatch;
use crate::frame::Frame;

/// The pluggable capability that turns a `Frame` into a `DetectionBatch`.
///
/// Exactly two conforming implementations exist: `LocalBackend` (in-process
/// inference collaborator) and `RemoteBackend` (socket wire protocol). The
/// implementation is chosen once at startup from configuration.
///
/// A per-frame failure is always recoverable: the caller skips logging for
/// that frame and continues the loop.
pub trait DetectionBackend: Send {
    /// Backend identifier for diagnostics.
    fn name(&self) -> &'static str;

    /// Classify one frame.
    fn classify(&mut self, frame: &Frame) -> Result<DetectionBatch, ClassifyError>;
}

/// Resolved backend choice from configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendSelection {
    /// In-process inference (stub collaborator unless a model is wired in).
    Local,
    /// Remote inference server at `host:port`.
    Remote { addr: String },
}

/// Construct the configured backend. Startup-time failures here are fatal
/// to the run.
pub fn select_backend(selection: &BackendSelection) -> Result<Box<dyn DetectionBackend>> {
    match selection {
        BackendSelection::Local => {
            let backend = LocalBackend::new(Box::new(StubClassifier::new()));
            log::info!("backend selected: {}", backend.name());
            Ok(Box::new(backend))
        }
        BackendSelection::Remote { addr } => {
            let backend = RemoteBackend::connect(addr)?;
            log::info!("backend selected: {} addr={}", backend.name(), addr);
            Ok(Box::new(backend))
        }
    }
}
