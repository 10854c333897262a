//! Frame byte streams.
//!
//! A `FrameStream` is the narrow interface to whatever turns a video source
//! into raw fixed-size pixel frames. Production deployments pipe a decoder
//! child process (ffmpeg) per source; tests and demo runs use the `stub://`
//! synthetic stream.

use std::io::Read;
use std::process::{Child, Command, Stdio};

use anyhow::{anyhow, Context, Result};

use crate::frame::FrameDims;

/// Decoder command template for RTSP endpoints. The decoder writes raw
/// rgb24 frames to stdout at a decimated rate; the stream layer only reads
/// bytes from the pipe.
const DECODER_CMD: &str = "ffmpeg -hide_banner -loglevel error -rtsp_transport tcp \
     -i {url} -filter:v fps=0.25 -f image2pipe -vcodec rawvideo -pix_fmt rgb24 -";

/// Blocking frame byte stream.
pub trait FrameStream: Send {
    /// Attempt to fill `buf` with the next frame's bytes.
    ///
    /// Blocks until the buffer is full, the stream ends, or an I/O error
    /// occurs. Returns the number of bytes read; anything less than
    /// `buf.len()` is a short read.
    fn read_frame(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// Open a stream for a configured endpoint.
///
/// `stub://<name>` produces a synthetic stream; anything else is treated as
/// a stream URL handed to the decoder pipeline.
pub fn open_stream(endpoint: &str, dims: FrameDims) -> Result<Box<dyn FrameStream>> {
    if endpoint.trim().is_empty() {
        return Err(anyhow!("source endpoint must not be empty"));
    }
    if endpoint.starts_with("stub://") {
        Ok(Box::new(StubStream::new(dims)))
    } else {
        Ok(Box::new(PipeStream::spawn(endpoint)?))
    }
}

/// fread-style fill: keep reading until `buf` is full or the reader reports
/// end of stream. A short return therefore means the stream ended mid-frame.
fn fill_from<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Adapts any blocking `Read` into a `FrameStream`.
pub struct ReaderStream<R: Read + Send> {
    reader: R,
}

impl<R: Read + Send> ReaderStream<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read + Send> FrameStream for ReaderStream<R> {
    fn read_frame(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        fill_from(&mut self.reader, buf)
    }
}

/// Stdout pipe of a decoder child process.
///
/// The child is killed and reaped on drop; the multiplexer never observes a
/// half-closed pipe as anything other than a short read.
struct PipeStream {
    child: Child,
}

impl PipeStream {
    fn spawn(url: &str) -> Result<Self> {
        let cmd = DECODER_CMD.replace("{url}", url);
        let child = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .stdout(Stdio::piped())
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn decoder for {}", url))?;
        log::info!("decoder spawned pid={} url={}", child.id(), url);
        Ok(Self { child })
    }
}

impl FrameStream for PipeStream {
    fn read_frame(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.child.stdout.as_mut() {
            Some(stdout) => fill_from(stdout, buf),
            None => Ok(0),
        }
    }
}

impl Drop for PipeStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// ----------------------------------------------------------------------------
// Synthetic stream (stub://) for tests and demo runs
// ----------------------------------------------------------------------------

/// Deterministic synthetic frame stream.
pub struct StubStream {
    dims: FrameDims,
    frame_count: u64,
    scene_state: u8,
}

impl StubStream {
    pub fn new(dims: FrameDims) -> Self {
        Self {
            dims,
            frame_count: 0,
            scene_state: 0,
        }
    }
}

impl FrameStream for StubStream {
    fn read_frame(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        debug_assert_eq!(buf.len(), self.dims.byte_len());
        self.frame_count += 1;
        // Shift the "scene" every 50 frames so hash-based stub detection
        // sees occasional change.
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        for (i, pixel) in buf.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        Ok(buf.len())
    }
}
