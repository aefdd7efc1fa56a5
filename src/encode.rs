//! Encoding of planar frames to standard image formats.
//!
//! JPEG reads the frame pixel by pixel through its [`GenericImageView`]
//! implementation. The other codecs want a packed buffer and get one from
//! [`PlanarYuvImage::to_rgb_image`].

use std::io::Write;
use std::str::FromStr;

use image::codecs::bmp::BmpEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder};
use tracing::debug;

use crate::config::ConfigError;
use crate::yuv::PlanarYuvImage;

/// Default JPEG quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Output encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    /// Baseline JPEG (lossy).
    #[default]
    Jpeg,
    /// GIF (palette, lossless up to quantization).
    Gif,
    /// Uncompressed 24-bit BMP.
    Bmp,
    /// PNG (lossless).
    Png,
}

impl Encoding {
    /// Name used on the command line and as file extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Png => "png",
        }
    }
}

impl FromStr for Encoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpg" => Ok(Self::Jpeg),
            "gif" => Ok(Self::Gif),
            "bmp" => Ok(Self::Bmp),
            "png" => Ok(Self::Png),
            other => Err(ConfigError::UnsupportedEncoding(other.to_owned())),
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Errors while encoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The image covers no pixels.
    #[error("cannot encode an empty image")]
    EmptyImage,

    /// The codec rejected the image.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Writing encoded bytes failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Encode `image` as `encoding` into `writer`. `quality` only affects JPEG.
pub fn encode<W: Write>(
    image: &PlanarYuvImage,
    encoding: Encoding,
    quality: u8,
    writer: &mut W,
) -> Result<(), EncodeError> {
    if image.rect().is_empty() {
        return Err(EncodeError::EmptyImage);
    }

    let (width, height) = image.dimensions();
    debug!(%encoding, width, height, "Encoding frame");

    match encoding {
        // Reads pixels straight from the planar image.
        Encoding::Jpeg => {
            JpegEncoder::new_with_quality(&mut *writer, quality).encode_image(image)?;
        }
        Encoding::Gif => {
            let rgba = DynamicImage::ImageRgb8(image.to_rgb_image()).into_rgba8();
            let mut encoder = GifEncoder::new(&mut *writer);
            encoder.encode_frame(image::Frame::new(rgba))?;
        }
        Encoding::Bmp => write_packed(BmpEncoder::new(&mut *writer), image)?,
        Encoding::Png => write_packed(PngEncoder::new(&mut *writer), image)?,
    }

    writer.flush()?;
    Ok(())
}

/// Hand a packed RGB copy of `image` to a buffer-based encoder.
fn write_packed<E: ImageEncoder>(encoder: E, image: &PlanarYuvImage) -> Result<(), EncodeError> {
    let rgb = image.to_rgb_image();
    let (width, height) = rgb.dimensions();
    encoder.write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yuv::{Rect, SubsampleRatio};

    fn gray_frame() -> PlanarYuvImage {
        PlanarYuvImage::from_buffer(
            Rect::from_size(8, 8),
            SubsampleRatio::Nv12,
            vec![128u8; 96],
        )
        .expect("buffer is large enough")
    }

    #[test]
    fn test_parse_encodings() {
        for name in ["jpg", "gif", "bmp", "png"] {
            let encoding: Encoding = name.parse().expect("known encoding");
            assert_eq!(encoding.extension(), name);
        }
    }

    #[test]
    fn test_parse_unsupported_encoding() {
        let err = "tiff".parse::<Encoding>().expect_err("tiff is not supported");
        assert!(matches!(err, ConfigError::UnsupportedEncoding(name) if name == "tiff"));
    }

    #[test]
    fn test_encoders_emit_signatures() {
        let image = gray_frame();
        let cases: [(Encoding, &[u8]); 4] = [
            (Encoding::Jpeg, &[0xFF, 0xD8]),
            (Encoding::Gif, b"GIF8"),
            (Encoding::Bmp, b"BM"),
            (Encoding::Png, &[0x89, b'P', b'N', b'G']),
        ];
        for (encoding, magic) in cases {
            let mut out = Vec::new();
            encode(&image, encoding, DEFAULT_JPEG_QUALITY, &mut out).expect("encode succeeds");
            assert!(out.starts_with(magic), "{encoding} output starts with {magic:?}");
        }
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let image = gray_frame().sub_image(Rect::new(20, 20, 30, 30));
        let mut out = Vec::new();
        let err = encode(&image, Encoding::Png, DEFAULT_JPEG_QUALITY, &mut out)
            .expect_err("empty image cannot be encoded");
        assert!(matches!(err, EncodeError::EmptyImage));
        assert!(out.is_empty());
    }

    #[test]
    fn test_png_decodes_to_frame_colors() {
        let image = gray_frame();
        let mut out = Vec::new();
        encode(&image, Encoding::Png, DEFAULT_JPEG_QUALITY, &mut out).expect("encode succeeds");
        let decoded = image::load_from_memory(&out)
            .expect("png decodes")
            .into_rgb8();
        assert_eq!(decoded.dimensions(), (8, 8));
        assert!(decoded.pixels().all(|p| p.0 == [128, 128, 128]));
    }

    #[test]
    fn test_jpeg_of_cropped_view() {
        let image = gray_frame().sub_image(Rect::new(1, 2, 6, 5));
        let mut out = Vec::new();
        encode(&image, Encoding::Jpeg, 90, &mut out).expect("encode succeeds");
        let decoded = image::load_from_memory(&out)
            .expect("jpeg decodes")
            .into_rgb8();
        assert_eq!(decoded.dimensions(), (5, 3));
        assert!(decoded
            .pixels()
            .all(|p| p.0.iter().all(|c| c.abs_diff(128) <= 2)));
    }
}
