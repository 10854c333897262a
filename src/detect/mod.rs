mod backend;
mod error;
mod local;
pub mod remote;
mod result;

pub use backend::{select_backend, BackendSelection, DetectionBackend};
pub use error::{ClassifyError, ProtocolError};
pub use local::{Classifier, LocalBackend, StubClassifier};
pub use remote::{RemoteBackend, RemoteInferenceClient};
pub use result::{Detection, DetectionBatch, StageTimings};
