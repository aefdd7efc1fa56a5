//! Mock frame source for testing without hardware.

use std::collections::VecDeque;
use std::time::Duration;

use crate::traits::{
    CaptureError, CaptureRequest, CaptureStream, Format, Frame, FrameMetadata, FrameSource, Result,
};

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// What the mock stream does on the next `next_frame` call.
#[derive(Debug, Clone, Copy)]
pub enum MockEvent {
    /// Deliver a frame with this pattern.
    Frame(TestPattern),
    /// Deliver a frame shorter than the requested format.
    Truncated,
    /// Time out.
    Timeout,
}

/// Mock source replaying a script of events, then color bars forever.
pub struct MockSource {
    script: VecDeque<MockEvent>,
    fail_start: bool,
    frame_count: u32,
    started: Vec<CaptureRequest>,
    timeouts_seen: Vec<Duration>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    /// Create a new mock source that always delivers color bars.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            fail_start: false,
            frame_count: 0,
            started: Vec::new(),
            timeouts_seen: Vec::new(),
        }
    }

    /// Replay `events` before falling back to color bars.
    #[must_use]
    pub fn with_script<I: IntoIterator<Item = MockEvent>>(mut self, events: I) -> Self {
        self.script = events.into_iter().collect();
        self
    }

    /// Fail `start` with a setup error.
    #[must_use]
    pub const fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Requests passed to `start`, in order.
    pub fn started(&self) -> &[CaptureRequest] {
        &self.started
    }

    /// Timeouts passed to `next_frame`, in order.
    pub fn timeouts_seen(&self) -> &[Duration] {
        &self.timeouts_seen
    }
}

impl FrameSource for MockSource {
    type Stream<'a> = MockStream<'a>;

    fn start(&mut self, request: &CaptureRequest) -> Result<Self::Stream<'_>> {
        if self.fail_start {
            return Err(CaptureError::Setup("mock source refused to start".to_owned()));
        }
        self.started.push(request.clone());
        Ok(MockStream {
            format: request.format.clone(),
            source: self,
        })
    }
}

/// Mock capture stream for testing.
pub struct MockStream<'a> {
    source: &'a mut MockSource,
    format: Format,
}

impl CaptureStream for MockStream<'_> {
    fn next_frame(&mut self, timeout: Duration) -> Result<Frame> {
        self.source.timeouts_seen.push(timeout);
        let event = self
            .source
            .script
            .pop_front()
            .unwrap_or(MockEvent::Frame(TestPattern::ColorBars));

        let mut data = match event {
            MockEvent::Timeout => return Err(CaptureError::Timeout(timeout)),
            MockEvent::Frame(pattern) => generate_test_frame(&self.format, pattern),
            MockEvent::Truncated => generate_test_frame(&self.format, TestPattern::Gradient),
        };
        if matches!(event, MockEvent::Truncated) {
            data.truncate(data.len() / 2);
        }

        let seq = self.source.frame_count;
        self.source.frame_count += 1;

        Ok(Frame {
            metadata: FrameMetadata {
                sequence: seq,
                timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
                bytes_used: u32::try_from(data.len()).unwrap_or(u32::MAX),
            },
            data,
        })
    }
}

/// Generate NV12 test frame data based on pattern.
pub fn generate_test_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    let mut data = vec![0u8; format.size as usize];
    let (width, height) = (format.width as usize, format.height as usize);

    match pattern {
        TestPattern::ColorBars => {
            let bar_width = (width / 8).max(1);
            fill(&mut data, width, height, |x| BARS[(x / bar_width).min(7)]);
        }
        TestPattern::Gradient => {
            #[allow(clippy::cast_possible_truncation)]
            fill(&mut data, width, height, |x| (((x * 255) / width) as u8, 128, 128));
        }
        TestPattern::Solid(y, u, v) => fill(&mut data, width, height, |_| (y, u, v)),
    }

    data
}

/// 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black.
const BARS: [(u8, u8, u8); 8] = [
    (235, 128, 128), // White
    (210, 16, 146),  // Yellow
    (170, 166, 16),  // Cyan
    (145, 54, 34),   // Green
    (106, 202, 222), // Magenta
    (81, 90, 240),   // Red
    (41, 240, 110),  // Blue
    (16, 128, 128),  // Black
];

/// Fill an NV12 buffer with a pattern that only varies along x.
fn fill<F: Fn(usize) -> (u8, u8, u8)>(data: &mut [u8], width: usize, height: usize, color: F) {
    let luma = width * height;
    let chroma_stride = width.div_ceil(2) * 2;

    for y in 0..height {
        for x in 0..width {
            let (y_val, u_val, v_val) = color(x);
            if let Some(px) = data.get_mut(y * width + x) {
                *px = y_val;
            }
            if x % 2 == 0 && y % 2 == 0 {
                let offset = luma + (y / 2) * chroma_stride + x;
                if let Some(pair) = data.get_mut(offset..offset + 2) {
                    pair.copy_from_slice(&[u_val, v_val]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(width: u32, height: u32) -> CaptureRequest {
        CaptureRequest {
            format: Format::nv12(width, height),
            frame_rate: 1,
        }
    }

    #[test]
    fn test_mock_stream_capture() {
        let mut source = MockSource::new();
        let mut stream = source.start(&request(64, 48)).expect("start should succeed");

        let frame1 = stream
            .next_frame(Duration::from_millis(10))
            .expect("next_frame should succeed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert_eq!(frame1.data.len(), 64 * 48 * 3 / 2);

        let frame2 = stream
            .next_frame(Duration::from_millis(10))
            .expect("next_frame should succeed");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn test_mock_script() {
        let mut source =
            MockSource::new().with_script([MockEvent::Timeout, MockEvent::Truncated]);
        {
            let mut stream = source.start(&request(8, 8)).expect("start should succeed");
            let err = stream
                .next_frame(Duration::from_millis(5))
                .expect_err("scripted timeout");
            assert!(matches!(err, CaptureError::Timeout(t) if t == Duration::from_millis(5)));
            let short = stream
                .next_frame(Duration::from_millis(5))
                .expect("truncated frame");
            assert_eq!(short.data.len(), 48);
        }
        assert_eq!(source.timeouts_seen().len(), 2);
        assert_eq!(source.started().len(), 1);
    }

    #[test]
    fn test_mock_failing_start() {
        let mut source = MockSource::new().failing_start();
        assert!(matches!(
            source.start(&request(8, 8)),
            Err(CaptureError::Setup(_))
        ));
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::nv12(64, 64);
        let data = generate_test_frame(&format, TestPattern::Solid(128, 64, 192));

        assert_eq!(data[0], 128);
        assert_eq!(data[64 * 64 - 1], 128);
        assert_eq!(data[64 * 64], 64);
        assert_eq!(data[64 * 64 + 1], 192);
        assert_eq!(data[data.len() - 2], 64);
        assert_eq!(data[data.len() - 1], 192);
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::nv12(640, 480);
        let data = generate_test_frame(&format, TestPattern::ColorBars);

        assert_eq!(data.len(), 640 * 480 * 3 / 2);
        // First bar is white, last is black
        assert_eq!(data[0], 235);
        assert_eq!(data[639], 16);
    }
}
