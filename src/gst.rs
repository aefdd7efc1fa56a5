//! GStreamer frame source: runs a `gst-launch` style description ending in
//! `appsink name=sink` and pulls NV12 samples from it.

use std::time::Duration;

use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use tracing::{debug, info};

use crate::traits::{
    CaptureError, CaptureRequest, CaptureStream, Frame, FrameMetadata, FrameSource, Result,
};

/// Name of the appsink element frames are pulled from.
const SINK_NAME: &str = "sink";

/// Frame source backed by a parsed GStreamer pipeline.
pub struct GstSource {
    description: String,
}

impl GstSource {
    /// Source for a pipeline description ending in `appsink name=sink`.
    #[must_use]
    pub const fn new(description: String) -> Self {
        Self { description }
    }
}

impl FrameSource for GstSource {
    type Stream<'a> = GstStream;

    fn start(&mut self, request: &CaptureRequest) -> Result<Self::Stream<'_>> {
        gstreamer::init().map_err(|e| CaptureError::Setup(format!("GStreamer init failed: {e}")))?;

        let pipeline = gstreamer::parse::launch(&self.description)
            .map_err(|e| CaptureError::Setup(format!("Failed to create pipeline: {e}")))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| CaptureError::Setup("Failed to downcast to Pipeline".to_owned()))?;

        let appsink = pipeline
            .by_name(SINK_NAME)
            .ok_or_else(|| CaptureError::Setup(format!("No element named {SINK_NAME:?}")))?
            .downcast::<AppSink>()
            .map_err(|_| CaptureError::Setup(format!("{SINK_NAME:?} is not an appsink")))?;

        // Keep only the newest sample so a pull after the warm-up, or after a
        // slow timelapse iteration, returns a current frame.
        appsink.set_max_buffers(1);
        appsink.set_drop(true);

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CaptureError::Setup(format!("Failed to start pipeline: {e:?}")))?;
        info!(
            width = request.format.width,
            height = request.format.height,
            fps = request.frame_rate,
            "GStreamer pipeline playing"
        );

        Ok(GstStream {
            pipeline,
            appsink,
            sequence: 0,
        })
    }
}

/// A playing GStreamer pipeline. Dropping it stops the pipeline.
pub struct GstStream {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    sequence: u32,
}

impl CaptureStream for GstStream {
    fn next_frame(&mut self, timeout: Duration) -> Result<Frame> {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let sample = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_mseconds(millis))
            .ok_or(CaptureError::Timeout(timeout))?;

        let buffer = sample
            .buffer()
            .ok_or_else(|| CaptureError::StreamError("No buffer in sample".to_owned()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| CaptureError::StreamError("Failed to map buffer".to_owned()))?;
        let data = map.as_slice().to_vec();

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        debug!(sequence, bytes = data.len(), "Pulled sample");

        Ok(Frame {
            metadata: FrameMetadata {
                sequence,
                timestamp: buffer
                    .pts()
                    .map_or(Duration::ZERO, |pts| Duration::from_nanos(pts.nseconds())),
                bytes_used: u32::try_from(data.len()).unwrap_or(u32::MAX),
            },
            data,
        })
    }
}

impl Drop for GstStream {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Format;

    #[test]
    fn test_pull_after_delay_returns_recent_frame() {
        let mut source = GstSource::new(
            "videotestsrc ! video/x-raw,format=NV12,width=64,height=48,framerate=30/1 \
             ! appsink name=sink"
                .to_owned(),
        );
        let mut stream = source
            .start(&CaptureRequest {
                format: Format::nv12(64, 48),
                frame_rate: 30,
            })
            .expect("pipeline starts");

        std::thread::sleep(Duration::from_millis(600));
        let frame = stream
            .next_frame(Duration::from_secs(2))
            .expect("frame arrives");

        assert_eq!(frame.data.len(), 64 * 48 * 3 / 2);
        assert!(
            frame.metadata.timestamp >= Duration::from_millis(300),
            "stale frame from {:?}",
            frame.metadata.timestamp
        );
    }

    #[test]
    fn test_missing_sink_is_a_setup_error() {
        let mut source = GstSource::new("videotestsrc ! fakesink".to_owned());
        let err = source
            .start(&CaptureRequest {
                format: Format::nv12(64, 48),
                frame_rate: 30,
            })
            .err()
            .expect("no appsink named sink");
        assert!(matches!(err, CaptureError::Setup(_)));
    }
}
