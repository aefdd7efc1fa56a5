//! Frame validation utilities for test pattern verification.
//!
//! This module provides functions to validate that captured NV12 frames contain
//! expected test patterns. Useful for integration testing with virtual cameras.

use image::Rgb;

use crate::traits::{CaptureError, Format, Frame, Result};
use crate::yuv::{PlanarYuvImage, SubsampleRatio};

/// Expected RGB values for SMPTE color bars (8 bars).
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
const SMPTE_COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235), // White
    (235, 235, 11),  // Yellow
    (12, 236, 237),  // Cyan
    (13, 237, 13),   // Green
    (237, 13, 237),  // Magenta
    (238, 14, 13),   // Red
    (15, 15, 239),   // Blue
    (16, 16, 16),    // Black
];

/// Tolerance for RGB color matching (accounts for YUV->RGB conversion errors).
const COLOR_TOLERANCE: i32 = 15;

fn frame_image(frame: &Frame, format: &Format) -> Result<PlanarYuvImage> {
    PlanarYuvImage::from_buffer(format.rect(), SubsampleRatio::Nv12, frame.data.as_slice())
        .map_err(|err| CaptureError::StreamError(err.to_string()))
}

fn sample(image: &PlanarYuvImage, x: u32, y: u32) -> Result<(u8, u8, u8)> {
    let (Ok(xi), Ok(yi)) = (i32::try_from(x), i32::try_from(y)) else {
        return Err(CaptureError::StreamError(format!(
            "Failed to get pixel at ({x}, {y})"
        )));
    };
    if !image.rect().contains(xi, yi) {
        return Err(CaptureError::StreamError(format!(
            "Failed to get pixel at ({x}, {y})"
        )));
    }
    let Rgb([r, g, b]) = image.rgb_at(xi, yi);
    Ok((r, g, b))
}

/// Validates that a frame contains the SMPTE color bar pattern.
///
/// Checks 8 vertical stripes at their center positions, with a tolerance for
/// YUV-to-RGB conversion inaccuracies.
///
/// # Errors
///
/// Returns `StreamError` if:
/// - The frame is too short for the format
/// - Any color bar doesn't match the expected color within tolerance
pub fn validate_color_bars(frame: &Frame, format: &Format) -> Result<()> {
    let image = frame_image(frame, format)?;
    let bar_width = format.width / 8;
    let center_y = format.height / 2;

    for (bar_idx, expected_rgb) in SMPTE_COLOR_BARS.iter().enumerate() {
        // Sample the center of each bar
        #[allow(clippy::cast_possible_truncation)]
        let sample_x = (bar_idx as u32 * bar_width) + (bar_width / 2);

        let actual_rgb = sample(&image, sample_x, center_y)?;

        if !colors_match(actual_rgb, *expected_rgb, COLOR_TOLERANCE) {
            return Err(CaptureError::StreamError(format!(
                "Color bar {bar_idx} mismatch at ({sample_x}, {center_y}): \
                 expected RGB{expected_rgb:?}, got RGB{actual_rgb:?}"
            )));
        }
    }

    Ok(())
}

/// Validates that a frame contains a horizontal gradient pattern.
///
/// Samples a horizontal line at the center of the frame and verifies that the
/// luminance increases monotonically from left to right, with a significant
/// overall change.
///
/// # Errors
///
/// Returns `StreamError` if:
/// - The frame is too short for the format
/// - The luminance doesn't increase monotonically
/// - The total luminance change is too small (solid color)
pub fn validate_gradient(frame: &Frame, format: &Format) -> Result<()> {
    let image = frame_image(frame, format)?;
    let center_y = format.height / 2;

    let mut first_luminance: Option<f32> = None;
    let mut prev_luminance: Option<f32> = None;
    let mut last_luminance: Option<f32> = None;

    for x in (0..format.width).step_by(10) {
        let (r, g, b) = sample(&image, x, center_y)?;

        // Calculate luminance (Y' in Rec. 601)
        let luminance = 0.114f32.mul_add(
            f32::from(b),
            0.587f32.mul_add(f32::from(g), 0.299 * f32::from(r)),
        );

        if first_luminance.is_none() {
            first_luminance = Some(luminance);
        }

        if let Some(prev) = prev_luminance {
            if luminance < prev - 1.0 {
                return Err(CaptureError::StreamError(format!(
                    "Gradient not monotonically increasing at x={x}: \
                     luminance {luminance} < previous {prev}"
                )));
            }
        }

        prev_luminance = Some(luminance);
        last_luminance = Some(luminance);
    }

    if let (Some(first), Some(last)) = (first_luminance, last_luminance) {
        let luminance_change = last - first;
        if luminance_change < 50.0 {
            return Err(CaptureError::StreamError(format!(
                "Insufficient luminance change for gradient: {luminance_change} \
                 (expected at least 50.0)"
            )));
        }
    }

    Ok(())
}

/// Validates that a sequence of frames has incrementing sequence numbers.
///
/// # Errors
///
/// Returns `StreamError` if:
/// - The frames slice is empty
/// - Any sequence number doesn't increment by exactly 1 from the previous
pub fn validate_frame_sequence(frames: &[Frame]) -> Result<()> {
    if frames.is_empty() {
        return Err(CaptureError::StreamError(
            "Cannot validate empty frame sequence".to_owned(),
        ));
    }

    for (i, pair) in frames.windows(2).enumerate() {
        let [prev_frame, curr_frame] = pair else {
            continue;
        };
        let prev_seq = prev_frame.metadata.sequence;
        let curr_seq = curr_frame.metadata.sequence;

        if curr_seq != prev_seq.wrapping_add(1) {
            return Err(CaptureError::StreamError(format!(
                "Frame sequence gap at index {}: expected {}, got {curr_seq}",
                i + 1,
                prev_seq.wrapping_add(1)
            )));
        }
    }

    Ok(())
}

/// Check if two RGB colors match within a per-channel tolerance.
fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: i32) -> bool {
    let (ar, ag, ab) = actual;
    let (er, eg, eb) = expected;

    let r_diff = i32::from(ar).abs_diff(i32::from(er));
    let g_diff = i32::from(ag).abs_diff(i32::from(eg));
    let b_diff = i32::from(ab).abs_diff(i32::from(eb));

    #[allow(clippy::cast_sign_loss)]
    let tol = tolerance as u32;

    r_diff <= tol && g_diff <= tol && b_diff <= tol
}
