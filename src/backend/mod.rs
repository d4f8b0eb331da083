//! Media backend seam: decode, resize, and encode are behind traits so the
//! conversion loop can run against the ffmpeg backend in production and a
//! scripted backend in tests.

pub mod ffmpeg;

use std::path::Path;

use crate::geometry::FrameSize;

/// Why a backend handle could not be opened. The conversion task maps this
/// into its own terminal error taxonomy.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One decoded video frame as packed rgb24.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub size: FrameSize,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(size: FrameSize, data: Vec<u8>) -> Self {
        Self { size, data }
    }
}

/// Stream properties reported by an opened source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub fps: f64,
    pub size: FrameSize,
    pub total_frames: u64,
}

impl SourceInfo {
    /// False when any property is zero or unset. Guards the scale computation
    /// against division by zero and streams that cannot report a frame count.
    pub fn is_valid(&self) -> bool {
        self.fps > 0.0 && self.size.width > 0 && self.size.height > 0 && self.total_frames > 0
    }
}

/// Four-character codec identifier for the output writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    /// Motion-JPEG, the fixed preview output codec.
    pub const MJPG: FourCc = FourCc(*b"MJPG");
}

impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

/// Sequential frame decoder for one source stream.
pub trait FrameSource: Send {
    fn info(&self) -> SourceInfo;

    /// Decodes the next frame, or None once the source is exhausted.
    fn read_frame(&mut self) -> Option<Frame>;

    /// Number of frames decoded so far. Reported by the backend; not
    /// validated against `total_frames`.
    fn position(&self) -> u64;
}

/// Sequential frame encoder for one destination stream. Frames already
/// written stay in the output even if the sink is dropped mid-stream.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &Frame);
}

pub trait MediaBackend: Send + Sync {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, BackendError>;

    fn open_sink(
        &self,
        path: &Path,
        codec: FourCc,
        fps: f64,
        size: FrameSize,
    ) -> Result<Box<dyn FrameSink>, BackendError>;

    fn resize(&self, frame: &Frame, size: FrameSize) -> Frame {
        resize_nearest(frame, size)
    }
}

/// Nearest-neighbor rgb24 resize. Fast and artifact-tolerant, which is all a
/// downscaled preview needs.
pub fn resize_nearest(frame: &Frame, target: FrameSize) -> Frame {
    let src = frame.size;
    if src == target {
        return frame.clone();
    }
    let mut data = Vec::with_capacity(target.rgb24_len());
    for y in 0..target.height {
        let src_y = (y as u64 * src.height as u64 / target.height as u64) as u32;
        for x in 0..target.width {
            let src_x = (x as u64 * src.width as u64 / target.width as u64) as u32;
            let offset = (src_y as usize * src.width as usize + src_x as usize) * 3;
            data.extend_from_slice(&frame.data[offset..offset + 3]);
        }
    }
    Frame::new(target, data)
}
