//! Single-shot and timelapse capture over an injected [`FrameSource`].

use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::output::ImageWriter;
use crate::pipeline::Pipeline;
use crate::traits::{CaptureError, CaptureStream, Format, Frame, FrameSource};
use crate::yuv::{PlanarYuvImage, Rect, SubsampleRatio};
use crate::Error;

/// Outcome of a timelapse run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelapseSummary {
    /// Frames encoded and written.
    pub written: u64,
    /// Iterations where no frame arrived in time.
    pub timeouts: u64,
    /// Iterations where a frame arrived but could not be written.
    pub failures: u64,
}

/// Per-run capture settings, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Delay between starting the source and a single-shot capture.
    pub warmup: Duration,
    /// Longest wait for one frame.
    pub capture_timeout: Duration,
    /// Timelapse interval; `None` for a single shot.
    pub interval: Option<Duration>,
    /// Timelapse frame limit.
    pub frames: Option<u64>,
    /// Pixel rectangle every frame is cropped to.
    pub crop: Option<Rect>,
}

impl CaptureSettings {
    /// Settings for the run described by `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            warmup: config.timeout,
            capture_timeout: config.capture_timeout,
            interval: config.timelapse,
            frames: config.frames,
            crop: config
                .roi
                .map(|roi| roi.to_rect(config.width, config.height)),
        }
    }
}

/// Turn a raw NV12 frame into a planar image, cropped to `crop` if given.
pub fn frame_to_image(
    frame: Frame,
    format: &Format,
    crop: Option<Rect>,
) -> Result<PlanarYuvImage, Error> {
    let image = PlanarYuvImage::from_buffer(format.rect(), SubsampleRatio::Nv12, frame.data)?;
    Ok(match crop {
        Some(rect) => image.sub_image(rect),
        None => image,
    })
}

/// Run a capture session: a single shot, or a timelapse when
/// `settings.interval` is set.
pub fn run<S: FrameSource>(
    source: &mut S,
    pipeline: &Pipeline,
    settings: &CaptureSettings,
    writer: &ImageWriter,
) -> Result<TimelapseSummary, Error> {
    match settings.interval {
        None => {
            capture_single(source, pipeline, settings, writer)?;
            Ok(TimelapseSummary {
                written: 1,
                ..TimelapseSummary::default()
            })
        }
        Some(interval) => run_timelapse(source, pipeline, settings, interval, writer),
    }
}

/// Start the source, wait out the warm-up, then capture and write frame 0.
///
/// A capture timeout is an error here.
pub fn capture_single<S: FrameSource>(
    source: &mut S,
    pipeline: &Pipeline,
    settings: &CaptureSettings,
    writer: &ImageWriter,
) -> Result<(), Error> {
    let mut stream = source.start(&pipeline.request)?;
    if !settings.warmup.is_zero() {
        debug!(warmup = ?settings.warmup, "Sleeping");
        thread::sleep(settings.warmup);
    }

    debug!("Capturing...");
    let frame = stream.next_frame(settings.capture_timeout)?;
    let image = frame_to_image(frame, &pipeline.request.format, settings.crop)?;
    writer.write(0, &image)?;
    Ok(())
}

/// Capture one frame every `interval` until `settings.frames` iterations have
/// run (or forever).
///
/// Timeouts and write failures are logged and skipped; only a failure to
/// start the source ends the run early.
pub fn run_timelapse<S: FrameSource>(
    source: &mut S,
    pipeline: &Pipeline,
    settings: &CaptureSettings,
    interval: Duration,
    writer: &ImageWriter,
) -> Result<TimelapseSummary, Error> {
    let mut stream = source.start(&pipeline.request)?;
    let mut summary = TimelapseSummary::default();
    let mut frame = 0u64;

    while settings.frames.map_or(true, |limit| frame < limit) {
        debug!(frame, "Capturing...");
        match stream.next_frame(settings.capture_timeout) {
            Ok(raw) => match write_frame(raw, frame, pipeline, settings, writer) {
                Ok(()) => summary.written += 1,
                Err(err) => {
                    error!(frame, %err, "Write image error");
                    summary.failures += 1;
                }
            },
            Err(CaptureError::Timeout(timeout)) => {
                warn!(frame, ?timeout, "Capture timeout");
                summary.timeouts += 1;
            }
            Err(err) => {
                error!(frame, %err, "Capture error");
                summary.failures += 1;
            }
        }
        frame += 1;
        if settings.frames.is_some_and(|limit| frame >= limit) {
            break;
        }
        thread::sleep(interval);
    }

    info!(
        written = summary.written,
        timeouts = summary.timeouts,
        failures = summary.failures,
        "Timelapse finished"
    );
    Ok(summary)
}

fn write_frame(
    raw: Frame,
    frame: u64,
    pipeline: &Pipeline,
    settings: &CaptureSettings,
    writer: &ImageWriter,
) -> Result<(), Error> {
    let image = frame_to_image(raw, &pipeline.request.format, settings.crop)?;
    writer.write(frame, &image)?;
    Ok(())
}
