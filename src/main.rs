//! Nanostill binary: a limited raspistill clone.

use clap::Parser;
use nanostill::capture::{self, CaptureSettings};
use nanostill::output::ImageWriter;
use nanostill::pipeline::{build_pipeline, Pipeline, SourceKind};
use nanostill::{Cli, Config, V4L2Device};
use tracing_subscriber::EnvFilter;

fn main() {
    let config = match Config::try_from(Cli::parse()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configure error: {err}");
            std::process::exit(1);
        }
    };

    // Logs go to stderr, stdout may carry image data.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(&config) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), nanostill::Error> {
    let pipeline = build_pipeline(config)?;
    let settings = CaptureSettings::from_config(config);
    let writer = ImageWriter::from_config(config);

    match config.source {
        SourceKind::V4l2 => {
            let mut device = V4L2Device::open(config.device)?;
            capture::run(&mut device, &pipeline, &settings, &writer)?;
        }
        SourceKind::Test | SourceKind::NvArgusCamera => {
            run_gstreamer(&pipeline, &settings, &writer)?;
        }
    }
    Ok(())
}

#[cfg(feature = "gstreamer")]
fn run_gstreamer(
    pipeline: &Pipeline,
    settings: &CaptureSettings,
    writer: &ImageWriter,
) -> Result<(), nanostill::Error> {
    let description = pipeline.description.clone().unwrap_or_default();
    let mut source = nanostill::gst::GstSource::new(description);
    capture::run(&mut source, pipeline, settings, writer)?;
    Ok(())
}

#[cfg(not(feature = "gstreamer"))]
fn run_gstreamer(
    _pipeline: &Pipeline,
    _settings: &CaptureSettings,
    _writer: &ImageWriter,
) -> Result<(), nanostill::Error> {
    Err(nanostill::CaptureError::Setup(
        "built without GStreamer support; rebuild with --features gstreamer or use --source v4l2"
            .to_owned(),
    )
    .into())
}
