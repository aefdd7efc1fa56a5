//! Core traits and types for frame sources.

use std::time::Duration;

use crate::yuv::{required_len, Rect, SubsampleRatio};

/// Pixel format representation (e.g., NV12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// NV12 pixel format (4:2:0, Y plane followed by interleaved UV).
    pub const NV12: Self = Self::new(b"NV12");
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per luma line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// NV12 format of the given size: one luma byte per pixel plus one UV
    /// pair per 2x2 block.
    #[must_use]
    pub fn nv12(width: u32, height: u32) -> Self {
        let size = required_len(Rect::from_size(width, height), SubsampleRatio::Nv12)
            .and_then(|len| u32::try_from(len).ok())
            .unwrap_or(u32::MAX);
        Self {
            width,
            height,
            fourcc: FourCC::NV12,
            stride: width,
            size,
        }
    }

    /// Pixel rectangle covered by a frame of this format.
    #[must_use]
    pub fn rect(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }
}

/// What a frame source is asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Frame layout.
    pub format: Format,
    /// Frames per second the source should run at.
    pub frame_rate: u32,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// A captured raw frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

/// Error type for capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Device with given index was not found.
    #[error("Device {0} not found")]
    DeviceNotFound(u32),
    /// Failed to open device.
    #[error("Failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// Requested format is not supported.
    #[error("Format not supported: {0:?}")]
    FormatNotSupported(Format),
    /// Source could not be set up (pipeline construction, initialization).
    #[error("Setup failed: {0}")]
    Setup(String),
    /// Error during streaming operation.
    #[error("Stream error: {0}")]
    StreamError(String),
    /// No frame arrived in time.
    #[error("Capture timeout: exceeded {0:?}")]
    Timeout(Duration),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Something that can be started to produce raw NV12 frames.
pub trait FrameSource {
    /// The stream type returned by `start`.
    type Stream<'a>: CaptureStream
    where
        Self: 'a;

    /// Configure the source and start streaming. Dropping the returned stream
    /// stops it.
    fn start(&mut self, request: &CaptureRequest) -> Result<Self::Stream<'_>>;
}

/// A running capture.
pub trait CaptureStream {
    /// Wait up to `timeout` for the next frame, failing with
    /// [`CaptureError::Timeout`] if none arrives.
    fn next_frame(&mut self, timeout: Duration) -> Result<Frame>;
}
