// image.rs — Typed single-channel plane used inside kernels.
//
// `Mat` is type-erased so it can cross the device boundary; kernels want
// `Image<T>` so the inner loops index typed values without per-element
// depth dispatch. Conversion happens once at kernel entry/exit:
//
//   Mat (U8C1) ──Image::from_mat──▶ Image<u8> ──kernel──▶ Image<f32> ──into_mat──▶ Mat (F32C1)
//
// Row-major, contiguous, stride == width.

use std::fmt;

use crate::error::{Error, Result};
use crate::mat::{Element, Mat, MatType};

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Channel types a kernel plane can hold.
pub trait Pixel: Element {
    /// Raw conversion (u8 42 → 42.0, not normalised).
    fn to_f32(self) -> f32;

    /// Clamp and round into the pixel type.
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.clamp(0.0, 255.0).round() as u8
    }
}

impl Pixel for i16 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.clamp(i16::MIN as f32, i16::MAX as f32).round() as i16
    }
}

impl Pixel for i32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.round() as i32
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A 2D single-channel plane with runtime dimensions.
#[derive(Clone, PartialEq)]
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Pixel> Image<T> {
    /// Zero-initialised plane.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            data: vec![T::default(); width * height],
            width,
            height,
        }
    }

    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image { data, width, height }
    }

    /// Borrow a single-channel `Mat` of matching depth as a typed plane.
    pub fn from_mat(mat: &Mat) -> Result<Self> {
        let expected = MatType::new(T::DEPTH, 1);
        if mat.mat_type() != expected {
            return Err(Error::type_mismatch("Image::from_mat", expected.to_string(), mat.mat_type()));
        }
        Ok(Image {
            data: mat.to_vec::<T>(),
            width: mat.cols(),
            height: mat.rows(),
        })
    }

    /// Convert back into a single-channel `Mat`.
    pub fn into_mat(self) -> Mat {
        let (rows, cols) = (self.height, self.width);
        // Length is width * height by construction.
        Mat::from_slice(rows, cols, 1, &self.data).unwrap_or_else(|_| Mat::empty())
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.width + x]
    }

    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height,
            "get_unchecked({x},{y}) out of bounds for {}x{}", self.width, self.height);
        *self.data.get_unchecked(y * self.width + x)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.bounds_check(x, y);
        self.data[y * self.width + x] = value;
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Iterate over all pixels as `(x, y, value)`.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.width + x]))
        })
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

impl<T: Pixel> std::ops::Index<(usize, usize)> for Image<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &T {
        self.bounds_check(x, y);
        &self.data[y * self.width + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_mat_round_trip() {
        let mat = Mat::from_slice(2, 3, 1, &[1u8, 2, 3, 4, 5, 6]).unwrap();
        let img = Image::<u8>::from_mat(&mat).unwrap();
        assert_eq!(img.width(), 3);
        assert_eq!(img.height(), 2);
        assert_eq!(img.get(2, 1), 6);
        assert_eq!(img[(0, 1)], 4);
        assert_eq!(img.into_mat(), mat);
    }

    #[test]
    fn test_from_mat_rejects_wrong_type() {
        let mat = Mat::zeros(2, 2, MatType::U8C3);
        assert!(Image::<u8>::from_mat(&mat).is_err());
        let mat = Mat::zeros(2, 2, MatType::F32C1);
        assert!(Image::<u8>::from_mat(&mat).is_err());
        assert!(Image::<f32>::from_mat(&mat).is_ok());
    }

    #[test]
    fn test_pixel_clamping() {
        assert_eq!(u8::from_f32(-3.0), 0);
        assert_eq!(u8::from_f32(254.6), 255);
        assert_eq!(i16::from_f32(40000.0), i16::MAX);
    }

    #[test]
    fn test_pixels_iterates_row_major() {
        let img = Image::from_vec(2, 2, vec![1u8, 2, 3, 4]);
        let v: Vec<_> = img.pixels().collect();
        assert_eq!(v, vec![(0, 0, 1), (1, 0, 2), (0, 1, 3), (1, 1, 4)]);
        assert_eq!(img.row(1), &[3, 4]);
    }
}
