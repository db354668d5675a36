// canny.rs — Canny edge detection.
//
// Pipeline:
//   1. Sobel gradients (aperture 3/5/7, replicated border).
//   2. Magnitude: |dx| + |dy| (L1) or sqrt(dx² + dy²) (L2).
//   3. Non-maximum suppression along one of four quantised directions.
//   4. Double threshold + hysteresis (8-connected).
//
// DIRECTION QUANTISATION (no atan2):
//
//   |dy| < |dx|·tan22.5            → horizontal gradient, compare W / E
//   |dy| > |dx|·tan67.5            → vertical gradient,   compare N / S
//   otherwise                      → diagonal; sign(dx·dy) picks NW/SE or NE/SW
//
// The comparison is asymmetric (`>` on one side, `>=` on the other) so a
// two-pixel-wide plateau keeps exactly one pixel.

use crate::border::BorderMode;
use crate::error::{Error, Result};
use crate::gpu_mat::GpuMat;
use crate::gradient::{sobel_kernels, sobel_xy};
use crate::image::Image;
use crate::imgproc::{require_finite, require_non_empty, require_type, run_unary};
use crate::mat::{Mat, MatType};
use crate::stream::Stream;

const TAN_22_5: f32 = 0.414_213_57;

/// Canny edge detector with fixed thresholds.
///
/// Input `U8C1`; output `U8C1` of the same size with edges set to 255.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannyEdgeDetector {
    low: f32,
    high: f32,
    aperture: usize,
    l2_gradient: bool,
}

impl CannyEdgeDetector {
    /// Aperture 3, L1 gradient.
    pub fn new(low_thresh: f64, high_thresh: f64) -> Result<Self> {
        Self::with_params(low_thresh, high_thresh, 3, false)
    }

    /// # Errors
    /// `InvalidParameter` for negative or non-finite thresholds and for an
    /// aperture other than 3, 5 or 7. `low > high` is accepted and swapped.
    pub fn with_params(low_thresh: f64, high_thresh: f64, aperture: usize, l2_gradient: bool) -> Result<Self> {
        require_finite("low_thresh", low_thresh)?;
        require_finite("high_thresh", high_thresh)?;
        if low_thresh < 0.0 || high_thresh < 0.0 {
            return Err(Error::invalid("threshold", "thresholds must be non-negative"));
        }
        if sobel_kernels(aperture).is_none() {
            return Err(Error::invalid("aperture", format!("{aperture} is not one of 3, 5, 7")));
        }
        let (low, high) = if low_thresh > high_thresh {
            (high_thresh, low_thresh)
        } else {
            (low_thresh, high_thresh)
        };
        Ok(CannyEdgeDetector {
            low: low as f32,
            high: high as f32,
            aperture,
            l2_gradient,
        })
    }

    pub fn low_threshold(&self) -> f64 {
        self.low as f64
    }

    pub fn high_threshold(&self) -> f64 {
        self.high as f64
    }

    pub fn aperture(&self) -> usize {
        self.aperture
    }

    pub fn l2_gradient(&self) -> bool {
        self.l2_gradient
    }

    /// Detect edges synchronously.
    pub fn detect(&self, src: &GpuMat, dst: &mut GpuMat) -> Result<()> {
        self.launch(src, dst, None)
    }

    /// Enqueue edge detection on `stream`.
    pub fn detect_async(&self, src: &GpuMat, dst: &mut GpuMat, stream: &Stream) -> Result<()> {
        self.launch(src, dst, Some(stream))
    }

    fn launch(&self, src: &GpuMat, dst: &mut GpuMat, stream: Option<&Stream>) -> Result<()> {
        let detector = *self;
        run_unary(src, dst, stream, move |src| detector.apply(src))
    }

    /// Host kernel.
    pub(crate) fn apply(&self, src: &Mat) -> Result<Mat> {
        require_non_empty("canny", src)?;
        require_type("canny", src, MatType::U8C1)?;
        let img = Image::<u8>::from_mat(src)?;
        Ok(canny(&img, self.low, self.high, self.aperture, self.l2_gradient).into_mat())
    }
}

/// Edge map of `img` (255 = edge).
fn canny(img: &Image<u8>, low: f32, high: f32, aperture: usize, l2: bool) -> Image<u8> {
    let (w, h) = (img.width(), img.height());
    let (dx, dy) = sobel_xy(img, aperture, BorderMode::Replicate);

    let mut mag = Image::<f32>::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let (gx, gy) = (dx.get(x, y), dy.get(x, y));
            let m = if l2 { (gx * gx + gy * gy).sqrt() } else { gx.abs() + gy.abs() };
            mag.set(x, y, m);
        }
    }

    // Out-of-image neighbours count as zero magnitude.
    let at = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            mag.get(x as usize, y as usize)
        }
    };

    // 0 = suppressed, 1 = weak candidate, 2 = strong edge.
    let mut state = vec![0u8; w * h];
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let m = mag.get(x, y);
            if m <= low {
                continue;
            }
            let (gx, gy) = (dx.get(x, y), dy.get(x, y));
            let (ax, ay) = (gx.abs(), gy.abs());
            let (xi, yi) = (x as isize, y as isize);
            let tg22 = ax * TAN_22_5;

            let is_max = if ay < tg22 {
                m > at(xi - 1, yi) && m >= at(xi + 1, yi)
            } else if ay > tg22 + 2.0 * ax {
                m > at(xi, yi - 1) && m >= at(xi, yi + 1)
            } else {
                let s: isize = if (gx < 0.0) != (gy < 0.0) { -1 } else { 1 };
                m > at(xi - s, yi - 1) && m > at(xi + s, yi + 1)
            };
            if !is_max {
                continue;
            }
            if m > high {
                state[y * w + x] = 2;
                stack.push((x, y));
            } else {
                state[y * w + x] = 1;
            }
        }
    }

    // Hysteresis: grow strong edges through 8-connected weak candidates.
    while let Some((x, y)) = stack.pop() {
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let idx = ny * w + nx;
                if state[idx] == 1 {
                    state[idx] = 2;
                    stack.push((nx, ny));
                }
            }
        }
    }

    let data = state.into_iter().map(|s| if s == 2 { 255 } else { 0 }).collect();
    Image::from_vec(w, h, data)
}
