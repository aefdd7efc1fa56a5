//! Planar YUV image backed by a single captured buffer.
//!
//! A [`PlanarYuvImage`] exposes a luma view and two chroma views over one
//! reference-counted byte buffer. With [`SubsampleRatio::Nv12`] the chroma
//! samples are interleaved `U V U V ...` pairs following the luma plane, so the
//! U view starts right after luma and the V view one byte later, and chroma
//! offsets advance two bytes per 2x2 pixel block. With
//! [`SubsampleRatio::Yuv444`] the U and V planes are full resolution and stored
//! one after the other.
//!
//! Encoders consume the image through [`image::GenericImageView`], which walks
//! pixels via [`PlanarYuvImage::color_at`].

use std::ops::Range;
use std::sync::Arc;

use image::{GenericImageView, ImageBuffer, Rgb, RgbImage};

/// Everything that can go wrong when wrapping a raw buffer.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum YuvError {
    /// The buffer is shorter than the planes the rectangle needs.
    #[error("buffer too small: expected at least {expected} bytes, got {actual}")]
    BufferTooSmall {
        /// Bytes the layout needs.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
}

/// Axis-aligned rectangle, `min` inclusive and `max` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    /// Left edge (inclusive).
    pub min_x: i32,
    /// Top edge (inclusive).
    pub min_y: i32,
    /// Right edge (exclusive).
    pub max_x: i32,
    /// Bottom edge (exclusive).
    pub max_y: i32,
}

impl Rect {
    /// Create a rectangle from two corners, swapping them if needed.
    #[must_use]
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        let (min_x, max_x) = if x0 > x1 { (x1, x0) } else { (x0, x1) };
        let (min_y, max_y) = if y0 > y1 { (y1, y0) } else { (y0, y1) };
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Rectangle anchored at the origin.
    #[must_use]
    pub fn from_size(width: u32, height: u32) -> Self {
        let width = i32::try_from(width).unwrap_or(i32::MAX);
        let height = i32::try_from(height).unwrap_or(i32::MAX);
        Self::new(0, 0, width, height)
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.max_x.saturating_sub(self.min_x)
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.max_y.saturating_sub(self.min_y)
    }

    /// Whether the rectangle contains no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }

    /// Whether `(x, y)` lies inside the rectangle.
    #[must_use]
    pub const fn contains(&self, x: i32, y: i32) -> bool {
        self.min_x <= x && x < self.max_x && self.min_y <= y && y < self.max_y
    }

    /// Largest rectangle contained in both. Empty intersections collapse to
    /// the zero rectangle.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let r = Self {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        if r.is_empty() {
            Self::default()
        } else {
            r
        }
    }
}

/// Chroma subsampling of a [`PlanarYuvImage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubsampleRatio {
    /// 4:2:0 with interleaved UV pairs.
    #[default]
    Nv12,
    /// 4:4:4, full resolution chroma planes.
    Yuv444,
}

/// One luma/chroma sample triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YuvColor {
    /// Luma.
    pub y: u8,
    /// Blue-difference chroma.
    pub cb: u8,
    /// Red-difference chroma.
    pub cr: u8,
}

impl YuvColor {
    /// Color from its three samples.
    #[must_use]
    pub const fn new(y: u8, cb: u8, cr: u8) -> Self {
        Self { y, cb, cr }
    }

    /// Convert to RGB with the full-range ITU-R BT.601 (JFIF) matrix.
    #[must_use]
    pub fn to_rgb(self) -> Rgb<u8> {
        let y = f32::from(self.y);
        let cb = f32::from(self.cb) - 128.0;
        let cr = f32::from(self.cr) - 128.0;

        let r = 1.402f32.mul_add(cr, y);
        let g = 0.714_14f32.mul_add(-cr, 0.344_14f32.mul_add(-cb, y));
        let b = 1.772f32.mul_add(cb, y);

        Rgb([clamp(r), clamp(g), clamp(b)])
    }
}

fn clamp(val: f32) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        val.round().clamp(0.0, 255.0) as u8
    }
}

/// Plane dimensions `(w, h, cw, ch)` for a rectangle.
///
/// For 4:2:0 the chroma size is derived from the absolute rectangle edges, so a
/// rectangle starting on an odd coordinate still covers every 2x2 block it
/// touches.
#[must_use]
pub fn plane_dimensions(rect: Rect, ratio: SubsampleRatio) -> (usize, usize, usize, usize) {
    let (min_x, min_y) = (i64::from(rect.min_x), i64::from(rect.min_y));
    let (max_x, max_y) = (i64::from(rect.max_x), i64::from(rect.max_y));
    let w = to_usize(max_x - min_x);
    let h = to_usize(max_y - min_y);
    match ratio {
        SubsampleRatio::Nv12 => {
            let cw = (max_x + 1).div_euclid(2) - min_x.div_euclid(2);
            let ch = (max_y + 1).div_euclid(2) - min_y.div_euclid(2);
            (w, h, to_usize(cw), to_usize(ch))
        }
        SubsampleRatio::Yuv444 => (w, h, w, h),
    }
}

/// Number of bytes a buffer needs to back an image of this shape, or `None`
/// if that does not fit in `usize`.
#[must_use]
pub fn required_len(rect: Rect, ratio: SubsampleRatio) -> Option<usize> {
    let (w, h, cw, ch) = plane_dimensions(rect, ratio);
    let chroma = cw.checked_mul(ch)?.checked_mul(2)?;
    w.checked_mul(h)?.checked_add(chroma)
}

fn to_usize(v: i64) -> usize {
    usize::try_from(v).unwrap_or(0)
}

/// A YUV frame stored as three views into one shared buffer.
///
/// Cloning or calling [`PlanarYuvImage::sub_image`] never copies pixel data.
#[derive(Debug, Clone)]
pub struct PlanarYuvImage {
    data: Arc<[u8]>,
    y: Range<usize>,
    u: Range<usize>,
    v: Range<usize>,
    y_stride: usize,
    c_stride: usize,
    ratio: SubsampleRatio,
    rect: Rect,
}

impl PlanarYuvImage {
    /// Allocate a zeroed image covering `rect`.
    ///
    /// A rectangle too large to address gets an empty buffer and reads as the
    /// zero color everywhere.
    #[must_use]
    pub fn new(rect: Rect, ratio: SubsampleRatio) -> Self {
        let data: Arc<[u8]> = vec![0u8; required_len(rect, ratio).unwrap_or(0)].into();
        Self::layout(rect, ratio, data)
    }

    /// Wrap a raw capture buffer.
    ///
    /// An `Arc<[u8]>` is taken as is; a `Vec<u8>` or slice is moved into a
    /// fresh reference-counted allocation once, after which views and
    /// [`PlanarYuvImage::sub_image`] share it.
    ///
    /// The first `w * h` bytes are luma, the rest chroma. Buffers shorter than
    /// [`required_len`] are rejected; longer buffers (driver padding) are fine.
    pub fn from_buffer<B>(rect: Rect, ratio: SubsampleRatio, buffer: B) -> Result<Self, YuvError>
    where
        B: Into<Arc<[u8]>>,
    {
        let data = buffer.into();
        let expected = required_len(rect, ratio).unwrap_or(usize::MAX);
        if data.len() < expected {
            return Err(YuvError::BufferTooSmall {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self::layout(rect, ratio, data))
    }

    fn layout(rect: Rect, ratio: SubsampleRatio, data: Arc<[u8]>) -> Self {
        let (w, h, cw, ch) = plane_dimensions(rect, ratio);
        let end = data.len();
        let luma = w.saturating_mul(h).min(end);
        let (u, v) = match ratio {
            SubsampleRatio::Nv12 => (luma..end, (luma + 1).min(end)..end),
            SubsampleRatio::Yuv444 => {
                let plane = cw.saturating_mul(ch);
                let split = luma.saturating_add(plane).min(end);
                (luma..split, split..split.saturating_add(plane).min(end))
            }
        };
        Self {
            data,
            y: 0..luma,
            u,
            v,
            y_stride: w,
            c_stride: cw,
            ratio,
            rect,
        }
    }

    fn empty(ratio: SubsampleRatio) -> Self {
        Self {
            data: Arc::from(Vec::new()),
            y: 0..0,
            u: 0..0,
            v: 0..0,
            y_stride: 0,
            c_stride: 0,
            ratio,
            rect: Rect::default(),
        }
    }

    /// Pixel rectangle covered by the image.
    #[must_use]
    pub const fn rect(&self) -> Rect {
        self.rect
    }

    /// Chroma subsampling.
    #[must_use]
    pub const fn ratio(&self) -> SubsampleRatio {
        self.ratio
    }

    /// Bytes between vertically adjacent luma samples.
    #[must_use]
    pub const fn y_stride(&self) -> usize {
        self.y_stride
    }

    /// Chroma samples per chroma row.
    #[must_use]
    pub const fn c_stride(&self) -> usize {
        self.c_stride
    }

    /// Chroma plane size `(cw, ch)` for this image's rectangle.
    #[must_use]
    pub fn chroma_dimensions(&self) -> (usize, usize) {
        let (_, _, cw, ch) = plane_dimensions(self.rect, self.ratio);
        (cw, ch)
    }

    /// Luma view, starting at the top-left pixel.
    #[must_use]
    pub fn y_plane(&self) -> &[u8] {
        self.view(&self.y)
    }

    /// Cb view.
    #[must_use]
    pub fn u_plane(&self) -> &[u8] {
        self.view(&self.u)
    }

    /// Cr view. For NV12 this is the Cb view shifted by one byte.
    #[must_use]
    pub fn v_plane(&self) -> &[u8] {
        self.view(&self.v)
    }

    fn view(&self, range: &Range<usize>) -> &[u8] {
        self.data.get(range.clone()).unwrap_or_default()
    }

    /// Index into the luma view for `(x, y)`, `None` above or left of the
    /// rectangle.
    #[must_use]
    pub fn y_offset(&self, x: i32, y: i32) -> Option<usize> {
        let row = usize::try_from(i64::from(y) - i64::from(self.rect.min_y)).ok()?;
        let col = usize::try_from(i64::from(x) - i64::from(self.rect.min_x)).ok()?;
        Some(row * self.y_stride + col)
    }

    /// Index into the chroma views for `(x, y)`.
    ///
    /// For NV12 this is twice the block index, since U and V samples
    /// alternate.
    #[must_use]
    pub fn c_offset(&self, x: i32, y: i32) -> Option<usize> {
        match self.ratio {
            SubsampleRatio::Nv12 => {
                let row = usize::try_from(y.div_euclid(2) - self.rect.min_y.div_euclid(2)).ok()?;
                let col = usize::try_from(x.div_euclid(2) - self.rect.min_x.div_euclid(2)).ok()?;
                Some(2 * (row * self.c_stride + col))
            }
            SubsampleRatio::Yuv444 => {
                let row = usize::try_from(i64::from(y) - i64::from(self.rect.min_y)).ok()?;
                let col = usize::try_from(i64::from(x) - i64::from(self.rect.min_x)).ok()?;
                Some(row * self.c_stride + col)
            }
        }
    }

    /// Samples at `(x, y)`, or the zero color outside the rectangle.
    #[must_use]
    pub fn color_at(&self, x: i32, y: i32) -> YuvColor {
        if !self.rect.contains(x, y) {
            return YuvColor::default();
        }
        self.lookup(x, y).unwrap_or_default()
    }

    fn lookup(&self, x: i32, y: i32) -> Option<YuvColor> {
        let yi = self.y_offset(x, y)?;
        let ci = self.c_offset(x, y)?;
        Some(YuvColor {
            y: *self.y_plane().get(yi)?,
            cb: *self.u_plane().get(ci)?,
            cr: *self.v_plane().get(ci)?,
        })
    }

    /// RGB value at `(x, y)`.
    #[must_use]
    pub fn rgb_at(&self, x: i32, y: i32) -> Rgb<u8> {
        self.color_at(x, y).to_rgb()
    }

    /// View of the part of this image visible through `r`.
    ///
    /// The result shares the backing buffer and keeps the parent's strides, so
    /// its rows are only meaningful up to its own width. A disjoint `r` yields
    /// a zero-sized image.
    #[must_use]
    pub fn sub_image(&self, r: Rect) -> Self {
        let r = r.intersect(&self.rect);
        if r.is_empty() {
            return Self::empty(self.ratio);
        }
        let (Some(yi), Some(ci)) = (
            self.y_offset(r.min_x, r.min_y),
            self.c_offset(r.min_x, r.min_y),
        ) else {
            return Self::empty(self.ratio);
        };
        Self {
            data: Arc::clone(&self.data),
            y: advance(&self.y, yi),
            u: advance(&self.u, ci),
            v: advance(&self.v, ci),
            y_stride: self.y_stride,
            c_stride: self.c_stride,
            ratio: self.ratio,
            rect: r,
        }
    }

    /// Materialize the image as packed RGB by walking every pixel.
    #[must_use]
    pub fn to_rgb_image(&self) -> RgbImage {
        let (width, height) = self.dimensions();
        ImageBuffer::from_fn(width, height, |x, y| self.get_pixel(x, y))
    }
}

fn advance(range: &Range<usize>, by: usize) -> Range<usize> {
    (range.start + by).min(range.end)..range.end
}

impl GenericImageView for PlanarYuvImage {
    type Pixel = Rgb<u8>;

    fn dimensions(&self) -> (u32, u32) {
        let w = u32::try_from(self.rect.width()).unwrap_or(0);
        let h = u32::try_from(self.rect.height()).unwrap_or(0);
        (w, h)
    }

    fn get_pixel(&self, x: u32, y: u32) -> Rgb<u8> {
        let x = i32::try_from(x).map_or(i32::MAX, |x| x.saturating_add(self.rect.min_x));
        let y = i32::try_from(y).map_or(i32::MAX, |y| y.saturating_add(self.rect.min_y));
        self.rgb_at(x, y)
    }
}
