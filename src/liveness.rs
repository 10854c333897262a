//! Supervisor liveness marker.
//!
//! An external supervisor periodically creates a sentinel file and expects
//! the runner to delete it as an acknowledgment that the loop is still
//! making progress. The marker's semantics are owned by the supervisor;
//! this side only clears it.

use std::path::PathBuf;

pub struct LivenessMarker {
    path: Option<PathBuf>,
}

impl LivenessMarker {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Marker disabled; `clear` becomes a no-op.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Remove the marker if present. Never fatal: a failed removal is the
    /// supervisor's signal to act, not ours.
    pub fn clear(&self) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                log::warn!("cannot clear liveness marker {}: {}", path.display(), e);
            }
        }
    }
}
