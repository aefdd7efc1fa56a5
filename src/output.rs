//! Writing encoded frames: file name templating, stdout output and the
//! "latest" symlink.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;
use crate::encode::{encode, EncodeError, Encoding};
use crate::yuv::PlanarYuvImage;

/// Errors while writing a frame.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// The output file could not be created.
    #[error("failed to create {path}: {source}")]
    Create {
        /// File that was being created.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The latest-image symlink could not be replaced.
    #[error("failed to link {latest} -> {target}: {source}")]
    Link {
        /// Symlink path.
        latest: PathBuf,
        /// Image the symlink should point at.
        target: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Encoding the image failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Resolve the output file name for `frame`.
///
/// The first `%d`-style placeholder (`%d`, `%4d`, `%04d`, ...) is replaced by
/// the frame number; a leading `0` in the width pads with zeros. Patterns
/// without a placeholder are returned unchanged.
#[must_use]
pub fn resolve_file_name(pattern: &str, frame: u64) -> String {
    let Some((start, end)) = find_placeholder(pattern) else {
        return pattern.to_owned();
    };
    let spec = pattern.get(start + 1..end - 1).unwrap_or_default();
    let width = spec.parse::<usize>().unwrap_or(0);
    let number = if spec.starts_with('0') {
        format!("{frame:0width$}")
    } else {
        format!("{frame:width$}")
    };

    let mut name = String::with_capacity(pattern.len() + number.len());
    name.push_str(pattern.get(..start).unwrap_or_default());
    name.push_str(&number);
    name.push_str(pattern.get(end..).unwrap_or_default());
    name
}

/// Byte range of the leftmost `%<digits>d` in `pattern`.
fn find_placeholder(pattern: &str) -> Option<(usize, usize)> {
    let bytes = pattern.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'%')
        .find_map(|(start, _)| {
            let digits = bytes
                .iter()
                .skip(start + 1)
                .take_while(|b| b.is_ascii_digit())
                .count();
            let end = start + 1 + digits;
            (digits < 100 && bytes.get(end) == Some(&b'd')).then_some((start, end + 1))
        })
}

/// Replace `latest` with a symlink pointing at `target`.
pub fn link_latest(latest: &Path, target: &Path) -> Result<(), OutputError> {
    let _ = fs::remove_file(latest);
    std::os::unix::fs::symlink(target, latest).map_err(|source| OutputError::Link {
        latest: latest.to_path_buf(),
        target: target.to_path_buf(),
        source,
    })?;
    debug!(latest = %latest.display(), target = %target.display(), "Linked latest image");
    Ok(())
}

/// Where and how frames are written.
#[derive(Debug, Clone)]
pub struct ImageWriter {
    output: String,
    latest: Option<PathBuf>,
    encoding: Encoding,
    quality: u8,
}

impl ImageWriter {
    /// Create a writer. An `output` of `-` writes to stdout.
    #[must_use]
    pub const fn new(
        output: String,
        latest: Option<PathBuf>,
        encoding: Encoding,
        quality: u8,
    ) -> Self {
        Self {
            output,
            latest,
            encoding,
            quality,
        }
    }

    /// Writer for the output settings in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.output.clone(),
            config.latest.clone(),
            config.encoding,
            config.quality,
        )
    }

    /// Encode and write `image` as frame number `frame`.
    ///
    /// Returns the file written, or `None` for stdout.
    pub fn write(&self, frame: u64, image: &PlanarYuvImage) -> Result<Option<PathBuf>, OutputError> {
        if self.output == "-" {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            encode(image, self.encoding, self.quality, &mut out)?;
            return Ok(None);
        }

        let path = PathBuf::from(resolve_file_name(&self.output, frame));
        let file = File::create(&path).map_err(|source| OutputError::Create {
            path: path.clone(),
            source,
        })?;
        let mut out = BufWriter::new(file);
        encode(image, self.encoding, self.quality, &mut out)?;
        debug!(encoding = %self.encoding, path = %path.display(), "Wrote image");

        if let Some(latest) = &self.latest {
            link_latest(latest, &path)?;
        }
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yuv::{Rect, SubsampleRatio};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nanostill-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    fn frame() -> PlanarYuvImage {
        PlanarYuvImage::from_buffer(Rect::from_size(4, 4), SubsampleRatio::Nv12, vec![90u8; 24])
            .expect("buffer is large enough")
    }

    #[test]
    fn test_resolve_zero_padded() {
        assert_eq!(resolve_file_name("img_%04d.jpg", 7), "img_0007.jpg");
    }

    #[test]
    fn test_resolve_without_placeholder() {
        assert_eq!(resolve_file_name("still.jpg", 7), "still.jpg");
    }

    #[test]
    fn test_resolve_variants() {
        assert_eq!(resolve_file_name("img_%d.png", 42), "img_42.png");
        assert_eq!(resolve_file_name("img_%4d.png", 42), "img_  42.png");
        assert_eq!(resolve_file_name("img_%02d.png", 1234), "img_1234.png");
        assert_eq!(resolve_file_name("50%_%03d.png", 5), "50%_005.png");
        assert_eq!(resolve_file_name("%d_%d.png", 3), "3_%d.png");
        assert_eq!(resolve_file_name("img_%x.png", 3), "img_%x.png");
    }

    #[test]
    fn test_write_file_and_link_latest() {
        let dir = scratch_dir("link");
        let pattern = dir.join("img_%03d.png");
        let latest = dir.join("latest.png");
        let writer = ImageWriter::new(
            pattern.to_string_lossy().into_owned(),
            Some(latest.clone()),
            Encoding::Png,
            75,
        );

        let first = writer.write(1, &frame()).expect("write succeeds");
        assert_eq!(first, Some(dir.join("img_001.png")));
        let second = writer.write(2, &frame()).expect("write succeeds");
        assert_eq!(second, Some(dir.join("img_002.png")));

        assert_eq!(fs::read_link(&latest).expect("latest is a symlink"), dir.join("img_002.png"));
        let bytes = fs::read(dir.join("img_001.png")).expect("image exists");
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = scratch_dir("missing");
        let writer = ImageWriter::new(
            dir.join("nope").join("a.jpg").to_string_lossy().into_owned(),
            None,
            Encoding::Jpeg,
            75,
        );
        let err = writer.write(0, &frame()).expect_err("parent does not exist");
        assert!(matches!(err, OutputError::Create { .. }));
        let _ = fs::remove_dir_all(&dir);
    }
}
