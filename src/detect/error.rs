//! Per-frame classification error taxonomy.
//!
//! Every variant is recoverable at the call site: the run loop logs the
//! failure, skips recording for that frame, and continues the sweep.

use thiserror::Error;

/// Failure while talking to a remote inference server.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o during {stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("short read during {stage}: got {got} of {expected} bytes")]
    ShortRead {
        stage: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("stream ended during {stage}: got {got} of {expected} bytes")]
    UnexpectedEof {
        stage: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("malformed {field} field: {text:?}")]
    MalformedField { field: &'static str, text: String },

    #[error("malformed payload line {line}: {text:?}")]
    MalformedLine { line: usize, text: String },
}

impl ProtocolError {
    pub(crate) fn io(stage: &'static str, source: std::io::Error) -> Self {
        Self::Io { stage, source }
    }
}

/// Failure of one classify call.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The remote exchange broke; the attempt is abandoned, no partial
    /// batch is returned.
    #[error("remote protocol failure: {0}")]
    Protocol(#[from] ProtocolError),

    /// The local inference collaborator returned no usable result.
    #[error("backend failure: {0}")]
    Backend(String),
}
