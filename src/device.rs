//! V4L2 frame source using the v4l crate.

use std::io;
use std::time::Duration;

use tracing::{debug, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::Device;

use crate::traits::{
    CaptureError, CaptureRequest, CaptureStream, Format, FourCC, Frame, FrameMetadata,
    FrameSource, Result,
};

/// Number of mmap buffers queued with the driver.
const BUFFER_COUNT: u32 = 4;

/// Longest wait for the first frame when streaming starts.
const START_TIMEOUT: Duration = Duration::from_secs(2);

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// V4L2 device delivering NV12 frames.
pub struct V4L2Device {
    device: Device,
    capabilities: DeviceCapabilities,
}

impl V4L2Device {
    /// Open a V4L2 device by index (e.g., 0 for /dev/video0).
    pub fn open(index: u32) -> Result<Self> {
        let device = Device::new(index as usize).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => CaptureError::DeviceNotFound(index),
            _ => CaptureError::DeviceOpenFailed(err.to_string()),
        })?;

        let caps = device
            .query_caps()
            .map_err(|err| CaptureError::DeviceOpenFailed(err.to_string()))?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };
        debug!(
            index,
            driver = %capabilities.driver,
            card = %capabilities.card,
            "Opened V4L2 device"
        );

        Ok(Self {
            device,
            capabilities,
        })
    }

    /// Device capabilities reported at open time.
    pub const fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Current format.
    pub fn format(&self) -> Result<Format> {
        let fmt = self
            .device
            .format()
            .map_err(|err| CaptureError::StreamError(err.to_string()))?;

        Ok(Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        })
    }

    /// Set capture format. Returns the actual format set by the driver.
    pub fn set_format(&mut self, format: &Format) -> Result<Format> {
        let mut fmt = self
            .device
            .format()
            .map_err(|err| CaptureError::StreamError(err.to_string()))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();

        let fmt = self
            .device
            .set_format(&fmt)
            .map_err(|err| CaptureError::StreamError(err.to_string()))?;

        Ok(Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        })
    }
}

impl FrameSource for V4L2Device {
    type Stream<'a> = V4L2Stream<'a>;

    fn start(&mut self, request: &CaptureRequest) -> Result<Self::Stream<'_>> {
        if !self.capabilities.can_capture || !self.capabilities.can_stream {
            return Err(CaptureError::Setup(format!(
                "{} cannot stream video capture",
                self.capabilities.card
            )));
        }

        let actual = self.set_format(&request.format)?;
        // A padded stride would break the tightly packed NV12 layout.
        if actual.fourcc != request.format.fourcc
            || actual.width != request.format.width
            || actual.height != request.format.height
            || actual.stride != request.format.width
        {
            return Err(CaptureError::FormatNotSupported(request.format.clone()));
        }

        if let Err(err) = self
            .device
            .set_params(&Parameters::with_fps(request.frame_rate))
        {
            warn!(fps = request.frame_rate, %err, "Driver rejected frame rate");
        }

        let mut stream = Stream::with_buffers(&self.device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|err| CaptureError::StreamError(err.to_string()))?;

        // Streaming only turns on with the first dequeue; do it now so the
        // sensor runs during the warm-up.
        stream.set_timeout(START_TIMEOUT);
        stream.next().map_err(|err| match err.kind() {
            io::ErrorKind::TimedOut => CaptureError::Timeout(START_TIMEOUT),
            _ => CaptureError::StreamError(err.to_string()),
        })?;
        debug!(fps = request.frame_rate, "V4L2 streaming started");

        Ok(V4L2Stream { stream })
    }
}

/// V4L2 capture stream wrapping mmap-based streaming.
pub struct V4L2Stream<'a> {
    stream: Stream<'a>,
}

impl CaptureStream for V4L2Stream<'_> {
    fn next_frame(&mut self, timeout: Duration) -> Result<Frame> {
        self.stream.set_timeout(timeout);
        let (buf, meta) = self.stream.next().map_err(|err| match err.kind() {
            io::ErrorKind::TimedOut => CaptureError::Timeout(timeout),
            _ => CaptureError::StreamError(err.to_string()),
        })?;

        // Safe conversions: V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        // Some drivers leave bytesused at zero for fixed-size formats.
        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        Ok(Frame {
            data: buf.get(..used).unwrap_or(buf).to_vec(),
            metadata: FrameMetadata {
                sequence: meta.sequence,
                timestamp: Duration::new(secs, nanos),
                bytes_used: meta.bytesused,
            },
        })
    }
}
