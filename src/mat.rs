// mat.rs — Host-resident, type-erased image container.
//
// `Mat` is what crosses the host/device boundary: a contiguous row-major
// byte buffer tagged with its element type (depth × channel count). Kernels
// that work on one channel at a time convert to the typed `Image<T>` plane;
// multi-channel kernels read elements through `at` / `set`.
//
// Memory layout (rows = 2, cols = 3, U8C3):
//
//   byte:   0 1 2 | 3 4 5 | 6 7 8 | 9 10 11 | 12 13 14 | 15 16 17
//   pixel:  (0,0) | (0,1) | (0,2) | (1,0)   | (1,1)    | (1,2)
//
// There is no row padding: the stride is always `cols * elem_size`. Padding
// is a device concern (see `device::gpu`) and never leaks into `Mat`.

use std::fmt;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Depth / MatType
// ---------------------------------------------------------------------------

/// Per-channel element depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Depth {
    U8,
    S8,
    U16,
    S16,
    S32,
    F32,
    F64,
}

impl Depth {
    /// Size of one channel value in bytes.
    pub const fn size(self) -> usize {
        match self {
            Depth::U8 | Depth::S8 => 1,
            Depth::U16 | Depth::S16 => 2,
            Depth::S32 | Depth::F32 => 4,
            Depth::F64 => 8,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Depth::U8 => "U8",
            Depth::S8 => "S8",
            Depth::U16 => "U16",
            Depth::S16 => "S16",
            Depth::S32 => "S32",
            Depth::F32 => "F32",
            Depth::F64 => "F64",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element type: a depth and a channel count in `1..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatType {
    depth: Depth,
    channels: usize,
}

impl MatType {
    pub const U8C1: MatType = MatType::new(Depth::U8, 1);
    pub const U8C3: MatType = MatType::new(Depth::U8, 3);
    pub const U8C4: MatType = MatType::new(Depth::U8, 4);
    pub const S16C2: MatType = MatType::new(Depth::S16, 2);
    pub const S32C1: MatType = MatType::new(Depth::S32, 1);
    pub const S32C4: MatType = MatType::new(Depth::S32, 4);
    pub const F32C1: MatType = MatType::new(Depth::F32, 1);
    pub const F32C2: MatType = MatType::new(Depth::F32, 2);
    pub const F32C3: MatType = MatType::new(Depth::F32, 3);
    pub const F32C4: MatType = MatType::new(Depth::F32, 4);

    /// # Panics
    /// Panics if `channels` is not in `1..=4`.
    pub const fn new(depth: Depth, channels: usize) -> Self {
        assert!(channels >= 1 && channels <= 4, "channel count must be in 1..=4");
        MatType { depth, channels }
    }

    #[inline]
    pub const fn depth(self) -> Depth {
        self.depth
    }

    #[inline]
    pub const fn channels(self) -> usize {
        self.channels
    }

    /// Size of one pixel (all channels) in bytes.
    #[inline]
    pub const fn elem_size(self) -> usize {
        self.depth.size() * self.channels
    }
}

impl fmt::Display for MatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}C{}", self.depth, self.channels)
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

/// A plain-old-data channel value that can live inside a `Mat`.
///
/// `from_f64` saturates and rounds for integer depths, so kernels can do all
/// arithmetic in floating point and convert once on store.
pub trait Element: bytemuck::Pod + Default + PartialOrd + Send + Sync + 'static {
    const DEPTH: Depth;

    fn to_f64(self) -> f64;

    fn from_f64(v: f64) -> Self;
}

macro_rules! int_element {
    ($t:ty, $depth:expr) => {
        impl Element for $t {
            const DEPTH: Depth = $depth;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                if v.is_nan() {
                    return 0;
                }
                v.round().clamp(<$t>::MIN as f64, <$t>::MAX as f64) as $t
            }
        }
    };
}

int_element!(u8, Depth::U8);
int_element!(i8, Depth::S8);
int_element!(u16, Depth::U16);
int_element!(i16, Depth::S16);
int_element!(i32, Depth::S32);

impl Element for f32 {
    const DEPTH: Depth = Depth::F32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl Element for f64 {
    const DEPTH: Depth = Depth::F64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
}

// ---------------------------------------------------------------------------
// Mat
// ---------------------------------------------------------------------------

/// A host image: `rows × cols` pixels of type `MatType`, stored contiguously.
#[derive(Clone, PartialEq)]
pub struct Mat {
    rows: usize,
    cols: usize,
    ty: MatType,
    data: Vec<u8>,
}

impl Default for Mat {
    fn default() -> Self {
        Mat::empty()
    }
}

impl Mat {
    /// A 0×0 `U8C1` image.
    pub fn empty() -> Self {
        Mat {
            rows: 0,
            cols: 0,
            ty: MatType::U8C1,
            data: Vec::new(),
        }
    }

    /// A zero-filled image.
    pub fn zeros(rows: usize, cols: usize, ty: MatType) -> Self {
        Mat {
            rows,
            cols,
            ty,
            data: vec![0u8; rows * cols * ty.elem_size()],
        }
    }

    /// Wrap raw bytes. `data.len()` must equal `rows * cols * elem_size`.
    pub fn from_bytes(rows: usize, cols: usize, ty: MatType, data: Vec<u8>) -> Result<Self> {
        let expected = rows * cols * ty.elem_size();
        if data.len() != expected {
            return Err(Error::shape(
                "Mat::from_bytes",
                format!("{expected} bytes"),
                format!("{} bytes", data.len()),
            ));
        }
        Ok(Mat { rows, cols, ty, data })
    }

    /// Build an image from typed, interleaved channel values.
    pub fn from_slice<T: Element>(rows: usize, cols: usize, channels: usize, data: &[T]) -> Result<Self> {
        if !(1..=4).contains(&channels) {
            return Err(Error::invalid("channels", format!("{channels} is not in 1..=4")));
        }
        let ty = MatType::new(T::DEPTH, channels);
        if data.len() != rows * cols * channels {
            return Err(Error::shape(
                "Mat::from_slice",
                format!("{} values", rows * cols * channels),
                format!("{} values", data.len()),
            ));
        }
        Ok(Mat {
            rows,
            cols,
            ty,
            data: bytemuck::cast_slice::<T, u8>(data).to_vec(),
        })
    }

    /// An image with every channel of every pixel set to `value`.
    pub fn filled<T: Element>(rows: usize, cols: usize, channels: usize, value: T) -> Result<Self> {
        Mat::from_slice(rows, cols, channels, &vec![value; rows * cols * channels])
    }

    // --- Accessors ---

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn mat_type(&self) -> MatType {
        self.ty
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.ty.channels()
    }

    #[inline]
    pub fn depth(&self) -> Depth {
        self.ty.depth()
    }

    /// Number of pixels.
    #[inline]
    pub fn total(&self) -> usize {
        self.rows * self.cols
    }

    /// True when either dimension is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Human-readable layout, e.g. `"480x640 U8C1"`.
    pub fn layout(&self) -> String {
        format!("{}x{} {}", self.rows, self.cols, self.ty)
    }

    // --- Element access ---

    #[inline]
    fn offset<T: Element>(&self, row: usize, col: usize, ch: usize) -> usize {
        assert_eq!(
            T::DEPTH,
            self.ty.depth(),
            "element type {} does not match Mat depth {}",
            T::DEPTH,
            self.ty.depth()
        );
        assert!(
            row < self.rows && col < self.cols && ch < self.ty.channels(),
            "element ({row},{col},{ch}) out of bounds for {}",
            self.layout()
        );
        ((row * self.cols + col) * self.ty.channels() + ch) * T::DEPTH.size()
    }

    /// Read channel `ch` of pixel (`row`, `col`).
    ///
    /// # Panics
    /// Panics if out of bounds or if `T` does not match the depth.
    #[inline]
    pub fn at<T: Element>(&self, row: usize, col: usize, ch: usize) -> T {
        let off = self.offset::<T>(row, col, ch);
        bytemuck::pod_read_unaligned(&self.data[off..off + T::DEPTH.size()])
    }

    /// Write channel `ch` of pixel (`row`, `col`).
    #[inline]
    pub fn set<T: Element>(&mut self, row: usize, col: usize, ch: usize, value: T) {
        let off = self.offset::<T>(row, col, ch);
        self.data[off..off + T::DEPTH.size()].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Every channel value converted to `f64`, interleaved, row-major.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let size = self.ty.depth().size();
        self.data
            .chunks_exact(size)
            .map(|b| match self.ty.depth() {
                Depth::U8 => b[0] as f64,
                Depth::S8 => b[0] as i8 as f64,
                Depth::U16 => bytemuck::pod_read_unaligned::<u16>(b) as f64,
                Depth::S16 => bytemuck::pod_read_unaligned::<i16>(b) as f64,
                Depth::S32 => bytemuck::pod_read_unaligned::<i32>(b) as f64,
                Depth::F32 => bytemuck::pod_read_unaligned::<f32>(b) as f64,
                Depth::F64 => bytemuck::pod_read_unaligned::<f64>(b),
            })
            .collect()
    }

    /// Build an image of type `ty` from interleaved `f64` values, saturating
    /// into the target depth.
    pub fn from_f64_slice(rows: usize, cols: usize, ty: MatType, values: &[f64]) -> Result<Self> {
        fn pack<T: Element>(values: &[f64]) -> Vec<u8> {
            let typed: Vec<T> = values.iter().map(|&v| T::from_f64(v)).collect();
            bytemuck::cast_slice::<T, u8>(&typed).to_vec()
        }
        if values.len() != rows * cols * ty.channels() {
            return Err(Error::shape(
                "Mat::from_f64_slice",
                format!("{} values", rows * cols * ty.channels()),
                format!("{} values", values.len()),
            ));
        }
        let data = match ty.depth() {
            Depth::U8 => pack::<u8>(values),
            Depth::S8 => pack::<i8>(values),
            Depth::U16 => pack::<u16>(values),
            Depth::S16 => pack::<i16>(values),
            Depth::S32 => pack::<i32>(values),
            Depth::F32 => pack::<f32>(values),
            Depth::F64 => pack::<f64>(values),
        };
        Ok(Mat { rows, cols, ty, data })
    }

    /// All values as `T`, interleaved, row-major.
    ///
    /// # Panics
    /// Panics if `T` does not match the depth.
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        assert_eq!(T::DEPTH, self.ty.depth(), "element type does not match Mat depth");
        self.data
            .chunks_exact(T::DEPTH.size())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// Reinterpret the elements with a new channel count and row count.
    ///
    /// `channels == 0` keeps the channel count, `rows == 0` keeps the row
    /// count. The total number of channel values must be preserved.
    pub fn reshape(&self, channels: usize, rows: usize) -> Result<Mat> {
        let channels = if channels == 0 { self.ty.channels() } else { channels };
        if !(1..=4).contains(&channels) {
            return Err(Error::invalid("channels", format!("{channels} is not in 1..=4")));
        }
        let values = self.total() * self.ty.channels();
        if values % channels != 0 {
            return Err(Error::shape("reshape", format!("multiple of {channels} values"), values));
        }
        let pixels = values / channels;
        let rows = if rows == 0 { self.rows } else { rows };
        if rows == 0 {
            return Ok(Mat::zeros(0, 0, MatType::new(self.ty.depth(), channels)));
        }
        if pixels % rows != 0 {
            return Err(Error::shape("reshape", format!("multiple of {rows} pixels"), pixels));
        }
        Ok(Mat {
            rows,
            cols: pixels / rows,
            ty: MatType::new(self.ty.depth(), channels),
            data: self.data.clone(),
        })
    }

    /// Global minimum and maximum of a single-channel image with their
    /// (x, y) locations. Ties keep the first occurrence in raster order.
    pub fn min_max_loc(&self) -> Result<MinMaxLoc> {
        if self.is_empty() {
            return Err(Error::EmptyInput { op: "min_max_loc" });
        }
        if self.ty.channels() != 1 {
            return Err(Error::type_mismatch("min_max_loc", "single channel", self.ty));
        }
        let values = self.to_f64_vec();
        let mut out = MinMaxLoc {
            min_val: values[0],
            max_val: values[0],
            min_loc: (0, 0),
            max_loc: (0, 0),
        };
        for (i, &v) in values.iter().enumerate() {
            let loc = (i % self.cols, i / self.cols);
            if v < out.min_val {
                out.min_val = v;
                out.min_loc = loc;
            }
            if v > out.max_val {
                out.max_val = v;
                out.max_loc = loc;
            }
        }
        Ok(out)
    }
}

/// Result of [`Mat::min_max_loc`]. Locations are `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxLoc {
    pub min_val: f64,
    pub max_val: f64,
    pub min_loc: (usize, usize),
    pub max_loc: (usize, usize),
}

impl fmt::Debug for Mat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mat {{ {} }}", self.layout())?;
        let values = self.to_f64_vec();
        let per_row = self.cols * self.ty.channels();
        for y in 0..self.rows.min(8) {
            write!(f, "  row {y}: [")?;
            for (i, v) in values[y * per_row..(y + 1) * per_row].iter().take(16).enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{v}")?;
            }
            if per_row > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.rows > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// `image` crate interop
// ---------------------------------------------------------------------------
// Channel order is preserved as-is: an `RgbImage` becomes an RGB-ordered
// U8C3 `Mat`. Swapping to BGR is the caller's business.

impl From<&image::GrayImage> for Mat {
    fn from(img: &image::GrayImage) -> Self {
        Mat {
            rows: img.height() as usize,
            cols: img.width() as usize,
            ty: MatType::U8C1,
            data: img.as_raw().clone(),
        }
    }
}

impl From<&image::RgbImage> for Mat {
    fn from(img: &image::RgbImage) -> Self {
        Mat {
            rows: img.height() as usize,
            cols: img.width() as usize,
            ty: MatType::U8C3,
            data: img.as_raw().clone(),
        }
    }
}

impl From<&image::RgbaImage> for Mat {
    fn from(img: &image::RgbaImage) -> Self {
        Mat {
            rows: img.height() as usize,
            cols: img.width() as usize,
            ty: MatType::U8C4,
            data: img.as_raw().clone(),
        }
    }
}

impl Mat {
    /// Convert a `U8C1` image into an `image::GrayImage`.
    pub fn to_gray_image(&self) -> Result<image::GrayImage> {
        if self.ty != MatType::U8C1 {
            return Err(Error::type_mismatch("to_gray_image", "U8C1", self.ty));
        }
        image::GrayImage::from_raw(self.cols as u32, self.rows as u32, self.data.clone())
            .ok_or_else(|| Error::shape("to_gray_image", self.total(), self.data.len()))
    }
}
