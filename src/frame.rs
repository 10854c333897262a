//! Raw frame container.
//!
//! A `Frame` is one fixed-size pixel buffer plus capture metadata. Frames are
//! produced by the source multiplexer, handed to a detection backend for
//! exactly one `classify` call, then discarded. Dimensions are fixed for the
//! lifetime of a run.

use serde::{Deserialize, Serialize};

/// Frame dimensions, fixed at startup for the whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDims {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl FrameDims {
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Exact byte length of one raw frame.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Wire form used by the remote protocol: `"height,width,channels"`.
    pub fn wire_triple(&self) -> String {
        format!("{},{},{}", self.height, self.width, self.channels)
    }
}

/// One captured frame. Owned by the run loop for the duration of a single
/// classify call.
pub struct Frame {
    /// Source slot that produced this frame (1..=MAX_SOURCES).
    pub source_id: u8,
    /// Per-source monotonically increasing sequence number.
    pub seq: u64,
    pub dims: FrameDims,
    pixels: Vec<u8>,
}

impl Frame {
    /// Normally called by the source layer. `pixels` must be exactly
    /// `dims.byte_len()` bytes.
    pub fn new(source_id: u8, seq: u64, dims: FrameDims, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), dims.byte_len());
        Self {
            source_id,
            seq,
            dims,
            pixels,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Logical name for this frame, used to identify it to backends and as
    /// the artifact stem: `cam_<source>_frame_<seq>`.
    pub fn name(&self) -> String {
        format!("cam_{}_frame_{:05}", self.source_id, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dims_byte_len_and_wire_triple() {
        let dims = FrameDims::new(640, 480, 3);
        assert_eq!(dims.byte_len(), 640 * 480 * 3);
        assert_eq!(dims.wire_triple(), "480,640,3");
    }

    #[test]
    fn frame_name_is_padded() {
        let dims = FrameDims::new(2, 2, 1);
        let frame = Frame::new(3, 7, dims, vec![0u8; 4]);
        assert_eq!(frame.name(), "cam_3_frame_00007");
    }
}
