//! Capture pipeline planning: camera mode selection, input frame rate and the
//! GStreamer pipeline description for each source.

use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::config::{Config, ConfigError};
use crate::traits::{CaptureRequest, Format};

/// Where frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// GStreamer `videotestsrc`.
    Test,
    /// Jetson CSI camera through `nvarguscamerasrc` and `nvvidconv`.
    NvArgusCamera,
    /// A V4L2 device driven directly.
    V4l2,
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(Self::Test),
            "nvarguscamera" => Ok(Self::NvArgusCamera),
            "v4l2" => Ok(Self::V4l2),
            other => Err(ConfigError::UnsupportedSource(other.to_owned())),
        }
    }
}

/// A sensor mode the camera can run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraMode {
    /// Sensor output width.
    pub width: u32,
    /// Sensor output height.
    pub height: u32,
    /// Highest frame rate in this mode.
    pub max_fps: u32,
}

/// Sensor modes, smallest first.
pub const CAMERA_MODES: [CameraMode; 4] = [
    CameraMode {
        width: 1280,
        height: 720,
        max_fps: 60,
    },
    CameraMode {
        width: 1920,
        height: 1080,
        max_fps: 30,
    },
    CameraMode {
        width: 3264,
        height: 1848,
        max_fps: 28,
    },
    CameraMode {
        width: 3264,
        height: 2464,
        max_fps: 21,
    },
];

/// Frames per second to request: 1 for a single shot, otherwise one frame per
/// timelapse interval, at least 1.
#[must_use]
pub fn input_frame_rate(timelapse: Option<Duration>) -> u32 {
    timelapse.map_or(1, |interval| {
        let ms = interval.as_millis().max(1);
        u32::try_from(1000 / ms).unwrap_or(u32::MAX).max(1)
    })
}

/// Pick the smallest sensor mode covering `width` x `height` and check it can
/// deliver `fps`.
pub fn select_mode(width: u32, height: u32, fps: u32) -> Result<CameraMode, ConfigError> {
    let mode = CAMERA_MODES
        .iter()
        .find(|mode| mode.width >= width && mode.height >= height)
        .copied()
        .ok_or(ConfigError::NoCameraMode { width, height })?;

    if fps > mode.max_fps {
        return Err(ConfigError::FrameRateTooHigh {
            fps,
            width,
            height,
            max_fps: mode.max_fps,
        });
    }
    Ok(mode)
}

/// Everything needed to start a source for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    /// Sensor mode the source runs in.
    pub mode: CameraMode,
    /// Requested frame rate and output layout.
    pub request: CaptureRequest,
    /// `gst-launch` style description, `None` for sources not driven through
    /// GStreamer.
    pub description: Option<String>,
}

/// Plan the capture pipeline for `config`.
pub fn build_pipeline(config: &Config) -> Result<Pipeline, ConfigError> {
    let frame_rate = input_frame_rate(config.timelapse);
    let mode = select_mode(config.width, config.height, frame_rate)?;
    debug!(
        fps = frame_rate,
        width = mode.width,
        height = mode.height,
        "Using input mode"
    );

    let description = match config.source {
        SourceKind::Test => Some(format!(
            "videotestsrc ! video/x-raw,format=(string)NV12,framerate=(fraction){frame_rate}/1,\
             width=(int){},height=(int){} ! appsink name=sink",
            config.width, config.height
        )),
        SourceKind::NvArgusCamera => Some(format!(
            "nvarguscamerasrc ! video/x-raw(memory:NVMM), width=(int){}, height=(int){}, \
             format=(string)NV12, framerate=(fraction){frame_rate}/1 ! nvvidconv flip-method={} ! \
             video/x-raw,width={},height={},format=NV12 ! appsink name=sink",
            mode.width, mode.height, config.flip_method, config.width, config.height
        )),
        SourceKind::V4l2 => None,
    };
    if let Some(description) = &description {
        debug!("GStreamer pipeline: gst-launch-1.0 {description}");
    }

    Ok(Pipeline {
        mode,
        request: CaptureRequest {
            format: Format::nv12(config.width, config.height),
            frame_rate,
        },
        description,
    })
}
