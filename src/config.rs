//! Command-line options and the validated capture configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::encode::{Encoding, DEFAULT_JPEG_QUALITY};
use crate::pipeline::SourceKind;
use crate::yuv::Rect;

const FLIP_METHOD_URL: &str =
    "https://gstreamer.freedesktop.org/documentation/videofilter/videoflip.html";

/// Configuration errors, reported before anything is captured or written.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// The `--encoding` value names no known image format.
    #[error("Invalid --encoding {0:?}, expected jpg, bmp, gif, or png")]
    UnsupportedEncoding(String),

    /// The `--source` value names no known frame source.
    #[error("Invalid --source {0:?}, expected test, nvarguscamera or v4l2")]
    UnsupportedSource(String),

    /// Flip method outside the videoflip range.
    #[error("Invalid --flip-method {0}, expected 0-8\n\tSee: {url}", url = FLIP_METHOD_URL)]
    InvalidFlipMethod(u8),

    /// JPEG quality above 100.
    #[error("Invalid --quality {0}, expected 0-100")]
    InvalidQuality(u8),

    /// Zero or unrepresentable image size.
    #[error("Invalid image size {width}x{height}")]
    InvalidSize {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Malformed region of interest, or one covering no pixels.
    #[error("Invalid --roi {0:?}, expected x,y,w,h normalised to 0.0-1.0")]
    InvalidRoi(String),

    /// No sensor mode is large enough for the requested size.
    #[error("Couldn't find input resolution supporting requested {width}x{height}")]
    NoCameraMode {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// The selected sensor mode cannot deliver the requested frame rate.
    #[error(
        "Couldn't support requested FPS={fps} at {width}x{height} (max FPS={max_fps}) - \
         consider reducing resolution or increasing --timelapse <msec>"
    )]
    FrameRateTooHigh {
        /// Requested frames per second.
        fps: u32,
        /// Width of the selected sensor mode.
        width: u32,
        /// Height of the selected sensor mode.
        height: u32,
        /// Highest rate the sensor mode supports.
        max_fps: u32,
    },
}

/// Raw command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "nanostill")]
#[command(about = "Still image and timelapse capture for NV12 cameras")]
#[command(version)]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Output filename (to write to stdout, use '-o -')
    #[arg(short, long)]
    pub output: String,

    /// Link latest complete image to filename
    #[arg(short, long)]
    pub latest: Option<PathBuf>,

    /// Time (in ms) before takes picture and shuts down
    #[arg(short, long, default_value_t = 5000)]
    pub timeout: u64,

    /// Encoding to use for output file (jpg, bmp, gif, png)
    #[arg(short, long, default_value = "jpg")]
    pub encoding: String,

    /// JPEG quality (0 to 100)
    #[arg(short, long, default_value_t = DEFAULT_JPEG_QUALITY)]
    pub quality: u8,

    /// Set image width
    #[arg(short, long, default_value_t = 3264)]
    pub width: u32,

    /// Set image height
    #[arg(short, long, default_value_t = 2464)]
    pub height: u32,

    /// Timelapse mode. Takes a picture every <msec>. %d == frame number (Try: -o img_%04d.jpg)
    #[arg(long, value_name = "MSEC")]
    pub timelapse: Option<u64>,

    /// Stop timelapse after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Video source (test, nvarguscamera, v4l2)
    #[arg(short, long, default_value = "nvarguscamera")]
    pub source: String,

    /// V4L2 device index for --source v4l2
    #[arg(long, default_value_t = 0)]
    pub device: u32,

    /// Camera image capture timeout (in ms)
    #[arg(long, default_value_t = 1000)]
    pub capture_timeout: u64,

    /// Image flip method (0-8)
    #[arg(long, default_value_t = 0)]
    pub flip_method: u8,

    /// Region of interest (x,y,w,h as normalised coordinates 0.0-1.0)
    #[arg(long)]
    pub roi: Option<String>,

    /// Enable debugging messages
    #[arg(short, long)]
    pub debug: bool,

    /// Show this screen
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

/// Normalised region of interest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    /// Left edge as a fraction of the frame width.
    pub x: f64,
    /// Top edge as a fraction of the frame height.
    pub y: f64,
    /// Width as a fraction of the frame width.
    pub w: f64,
    /// Height as a fraction of the frame height.
    pub h: f64,
}

impl Roi {
    /// Pixel rectangle of this region inside a `width` x `height` frame.
    #[must_use]
    pub fn to_rect(&self, width: u32, height: u32) -> Rect {
        let scale = |v: f64, size: u32| {
            #[allow(clippy::cast_possible_truncation)]
            {
                (v * f64::from(size)).round() as i32
            }
        };
        Rect::new(
            scale(self.x, width),
            scale(self.y, height),
            scale(self.x + self.w, width),
            scale(self.y + self.h, height),
        )
    }
}

impl FromStr for Roi {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRoi(s.to_owned());
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        let &[x, y, w, h] = parts.as_slice() else {
            return Err(invalid());
        };
        let unit = 0.0..=1.0;
        // NaN fails every comparison, so check finiteness up front.
        if ![x, y, w, h].iter().all(|v| v.is_finite())
            || !(unit.contains(&x) && unit.contains(&y))
            || w <= 0.0
            || h <= 0.0
            || x + w > 1.0
            || y + h > 1.0
        {
            return Err(invalid());
        }
        Ok(Self { x, y, w, h })
    }
}

/// Validated configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Output path pattern, `-` for stdout.
    pub output: String,
    /// Symlink updated to point at each written image.
    pub latest: Option<PathBuf>,
    /// Delay before a single-shot capture.
    pub timeout: Duration,
    /// Output image format.
    pub encoding: Encoding,
    /// JPEG quality, 0-100.
    pub quality: u8,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Interval between timelapse frames; `None` for a single shot.
    pub timelapse: Option<Duration>,
    /// Timelapse frame limit; `None` runs until interrupted.
    pub frames: Option<u64>,
    /// Where frames come from.
    pub source: SourceKind,
    /// V4L2 device index.
    pub device: u32,
    /// Longest wait for a single frame.
    pub capture_timeout: Duration,
    /// videoflip method, 0-8.
    pub flip_method: u8,
    /// Crop applied to every frame.
    pub roi: Option<Roi>,
    /// Debug logging.
    pub debug: bool,
}

impl Config {
    /// Default tracing filter directive for this run.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "warn"
        }
    }

    /// Whether frames go to stdout instead of files.
    #[must_use]
    pub fn writes_stdout(&self) -> bool {
        self.output == "-"
    }
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if cli.width == 0 || cli.height == 0 || i32::try_from(cli.width).is_err()
            || i32::try_from(cli.height).is_err()
        {
            return Err(ConfigError::InvalidSize {
                width: cli.width,
                height: cli.height,
            });
        }
        if cli.flip_method > 8 {
            return Err(ConfigError::InvalidFlipMethod(cli.flip_method));
        }
        if cli.quality > 100 {
            return Err(ConfigError::InvalidQuality(cli.quality));
        }

        let encoding = cli.encoding.parse::<Encoding>()?;
        let source = cli.source.parse::<SourceKind>()?;
        let roi = cli.roi.as_deref().map(str::parse::<Roi>).transpose()?;
        if let (Some(raw), Some(roi)) = (cli.roi.as_deref(), roi) {
            if roi.to_rect(cli.width, cli.height).is_empty() {
                return Err(ConfigError::InvalidRoi(raw.to_owned()));
            }
        }

        Ok(Self {
            output: cli.output,
            latest: cli.latest,
            timeout: Duration::from_millis(cli.timeout),
            encoding,
            quality: cli.quality,
            width: cli.width,
            height: cli.height,
            timelapse: cli
                .timelapse
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            frames: cli.frames,
            source,
            device: cli.device,
            capture_timeout: Duration::from_millis(cli.capture_timeout),
            flip_method: cli.flip_method,
            roi,
            debug: cli.debug,
        })
    }
}
