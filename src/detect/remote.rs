//! Remote inference backend and its wire protocol.
//!
//! One classification exchange is strictly synchronous request/response over
//! a single pre-established, long-lived, full-duplex byte connection. There
//! is no pipelining: the next frame's exchange starts only after the current
//! one completes or fails.
//!
//! Exchange, in order:
//! 1. frame name as raw text bytes, answered by exactly one ACK byte;
//! 2. `"height,width,channels"` as raw text, answered by one ACK byte;
//! 3. exactly `height*width*channels` pixel bytes, with NO acknowledgment
//!    (asymmetry inherited from the deployed servers, preserved as-is);
//! 4. two fixed 10-byte ASCII decimal fields: box count, then payload size;
//! 5. a reliable-read loop accumulating exactly `payload size` bytes — the
//!    only multi-read accumulation point in the protocol;
//! 6. payload decode: newline-separated text, header line discarded, nine
//!    comma-separated fields per data line.
//!
//! Connection lifecycle (reconnect, pooling, timeouts) is a collaborator
//! concern; this layer abandons the frame on any protocol fault and leaves
//! the connection alone.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::detect::backend::DetectionBackend;
use crate::detect::error::{ClassifyError, ProtocolError};
use crate::detect::result::{Detection, DetectionBatch, StageTimings};
use crate::frame::{Frame, FrameDims};

/// Server acknowledgment length for steps 1 and 2.
const ACK_LEN: usize = 1;
/// Fixed-width ASCII decimal field carrying the detection count.
const COUNT_FIELD_LEN: usize = 10;
/// Fixed-width ASCII decimal field carrying the payload byte length.
const SIZE_FIELD_LEN: usize = 10;
/// Payload lines discarded unconditionally before decoding.
const HEADER_LINES: usize = 1;
/// Comma-separated fields per payload data line.
const FIELDS_PER_LINE: usize = 9;

/// Synchronous request/response client over a pre-established transport.
pub struct RemoteInferenceClient<T> {
    transport: T,
}

impl<T: Read + Write> RemoteInferenceClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Release the underlying transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Run one full classification exchange for a frame.
    ///
    /// Any short write, short single-shot read, or malformed field aborts
    /// the attempt; no partial result is returned.
    pub fn classify_frame(
        &mut self,
        name: &str,
        dims: FrameDims,
        pixels: &[u8],
    ) -> Result<Vec<Detection>, ProtocolError> {
        // 1. Identify the frame, wait for the acknowledgment byte.
        self.write_unit("frame name", name.as_bytes())?;
        self.read_ack("frame name ack")?;

        // 2. Describe dimensions, wait for the acknowledgment byte.
        self.write_unit("dimensions", dims.wire_triple().as_bytes())?;
        self.read_ack("dimensions ack")?;

        // 3. Transfer pixels. No acknowledgment follows this step.
        self.write_unit("pixels", pixels)?;

        // 4. Fixed-width count and payload-size fields.
        let box_count = self.read_decimal_field("box count", COUNT_FIELD_LEN)?;
        let payload_size = self.read_decimal_field("payload size", SIZE_FIELD_LEN)?;

        // 5. Accumulate the payload.
        let payload = self.read_payload(payload_size)?;

        // 6. Decode, then validate against the declared count.
        let mut detections = decode_payload(&payload)?;
        if detections.len() > box_count {
            log::warn!(
                "server declared {} boxes but payload decoded {}; truncating",
                box_count,
                detections.len()
            );
            detections.truncate(box_count);
        } else if detections.len() < box_count {
            log::warn!(
                "server declared {} boxes but payload decoded {}",
                box_count,
                detections.len()
            );
        }
        Ok(detections)
    }

    fn write_unit(&mut self, stage: &'static str, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.transport
            .write_all(bytes)
            .map_err(|e| ProtocolError::io(stage, e))?;
        self.transport
            .flush()
            .map_err(|e| ProtocolError::io(stage, e))
    }

    /// Single-shot read of exactly `expected` bytes. Fewer bytes delivered
    /// by the one read call is a hard failure for this frame.
    fn read_exact_once(
        &mut self,
        stage: &'static str,
        buf: &mut [u8],
    ) -> Result<(), ProtocolError> {
        let got = self
            .transport
            .read(buf)
            .map_err(|e| ProtocolError::io(stage, e))?;
        if got != buf.len() {
            return Err(ProtocolError::ShortRead {
                stage,
                expected: buf.len(),
                got,
            });
        }
        Ok(())
    }

    fn read_ack(&mut self, stage: &'static str) -> Result<(), ProtocolError> {
        let mut ack = [0u8; ACK_LEN];
        self.read_exact_once(stage, &mut ack)
    }

    fn read_decimal_field(
        &mut self,
        stage: &'static str,
        width: usize,
    ) -> Result<usize, ProtocolError> {
        let mut field = vec![0u8; width];
        self.read_exact_once(stage, &mut field)?;
        parse_decimal_field(stage, &field)
    }

    /// Reliable read: keep issuing reads until exactly `size` bytes have
    /// accumulated. A zero-byte read before completion is a hard failure.
    fn read_payload(&mut self, size: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            let got = self
                .transport
                .read(&mut payload[filled..])
                .map_err(|e| ProtocolError::io("payload", e))?;
            if got == 0 {
                return Err(ProtocolError::UnexpectedEof {
                    stage: "payload",
                    expected: size,
                    got: filled,
                });
            }
            filled += got;
        }
        Ok(payload)
    }
}

/// Parse a fixed-width ASCII decimal field: leading digits are the value,
/// trailing padding (NUL, space, or anything non-digit) is ignored. A field
/// with no leading digit is malformed.
fn parse_decimal_field(field: &'static str, bytes: &[u8]) -> Result<usize, ProtocolError> {
    let digits: &[u8] = match bytes.iter().position(|b| !b.is_ascii_digit()) {
        Some(end) => &bytes[..end],
        None => bytes,
    };
    let malformed = || ProtocolError::MalformedField {
        field,
        text: String::from_utf8_lossy(bytes).into_owned(),
    };
    if digits.is_empty() {
        return Err(malformed());
    }
    std::str::from_utf8(digits)
        .map_err(|_| malformed())?
        .parse::<usize>()
        .map_err(|_| malformed())
}

/// Decode the newline-separated result payload. The first line is a header
/// and is discarded unconditionally; each data line carries nine
/// comma-separated fields of which fields 2..=8 are meaningful:
/// `class_label, class_id, x_top_left, y_top_left, width, height,
/// confidence`. The first two fields (row index, image name) are ignored.
fn decode_payload(payload: &[u8]) -> Result<Vec<Detection>, ProtocolError> {
    let text = String::from_utf8_lossy(payload);
    let mut detections = Vec::new();

    for (line_no, line) in text.lines().enumerate().skip(HEADER_LINES) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != FIELDS_PER_LINE {
            return Err(ProtocolError::MalformedLine {
                line: line_no,
                text: line.to_string(),
            });
        }

        let malformed = || ProtocolError::MalformedLine {
            line: line_no,
            text: line.to_string(),
        };
        let parse_f32 = |s: &str| s.trim().parse::<f32>().map_err(|_| malformed());

        // The numeric id travels as a float; truncate it to an integer id.
        let class_id = fields[3]
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed())? as i64;

        detections.push(Detection {
            class_label: fields[2].trim().to_string(),
            class_id,
            x_top_left: parse_f32(fields[4])?,
            y_top_left: parse_f32(fields[5])?,
            width: parse_f32(fields[6])?,
            height: parse_f32(fields[7])?,
            confidence: parse_f32(fields[8])?,
        });
    }
    Ok(detections)
}

/// Detection backend speaking the wire protocol over TCP.
pub struct RemoteBackend {
    client: RemoteInferenceClient<TcpStream>,
}

impl RemoteBackend {
    /// Establish the long-lived connection at startup. A failure here is
    /// fatal to the run, not to a frame.
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .with_context(|| format!("cannot reach inference server at {}", addr))?;
        stream.set_nodelay(true).ok();
        Ok(Self {
            client: RemoteInferenceClient::new(stream),
        })
    }
}

impl DetectionBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn classify(&mut self, frame: &Frame) -> Result<DetectionBatch, ClassifyError> {
        let started = Instant::now();
        let detections =
            self.client
                .classify_frame(&frame.name(), frame.dims, frame.pixels())?;
        let timings = StageTimings {
            predict_s: started.elapsed().as_secs_f64(),
            ..StageTimings::default()
        };
        Ok(DetectionBatch::new(frame.source_id, detections, timings))
    }
}
