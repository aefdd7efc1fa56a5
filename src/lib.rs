//! Nanostill: still image and timelapse capture for NV12 camera pipelines.
//!
//! Frames come from a [`FrameSource`] (a V4L2 device, a GStreamer pipeline, or
//! a mock in tests), are wrapped without copying in a [`PlanarYuvImage`], and
//! are encoded to JPEG, GIF, BMP or PNG.

pub mod capture;
pub mod config;
pub mod device;
pub mod encode;
#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod output;
pub mod pipeline;
pub mod traits;
pub mod validation;
pub mod yuv;

#[cfg(test)]
pub mod mock;

pub use config::{Cli, Config, ConfigError};
pub use device::V4L2Device;
pub use encode::{encode, Encoding};
pub use traits::{CaptureError, CaptureStream, Format, FourCC, Frame, FrameMetadata, FrameSource};
pub use yuv::{PlanarYuvImage, Rect, SubsampleRatio, YuvColor, YuvError};

/// Any failure of a capture run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid options.
    #[error("Configure error: {0}")]
    Config(#[from] ConfigError),

    /// The frame source failed.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// A captured buffer does not match the requested format.
    #[error("Invalid frame: {0}")]
    Yuv(#[from] YuvError),

    /// Encoding or writing an image failed.
    #[error("Write image error: {0}")]
    Output(#[from] output::OutputError),
}
