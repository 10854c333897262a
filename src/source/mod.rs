//! Frame acquisition layer.
//!
//! This module provides the byte-stream collaborators that produce raw
//! frames and the round-robin multiplexer that schedules reads across them:
//! - `stream`: blocking frame byte streams (decoder pipe, stub://)
//! - `multiplexer`: round-robin scheduling with bounded retry
//!
//! The acquisition layer is responsible for:
//! - Reading exactly `width*height*channels` bytes per frame
//! - Tracking per-source consecutive-failure counters
//! - Retiring a source once its failure threshold is reached
//!
//! It is NOT responsible for decoding media; a stream collaborator hands it
//! ready-made raw pixel bytes.

pub mod multiplexer;
pub mod stream;

pub use multiplexer::{RetryPolicy, SourceMultiplexer, SourceState, Sweep, MAX_SOURCES};
pub use stream::{open_stream, FrameStream, ReaderStream, StubStream};
