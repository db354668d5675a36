// hough.rs — Hough transforms on binary edge maps.
//
// STANDARD (HoughLinesDetector):
//   Every non-zero pixel (x, y) votes for all (rho, theta) with
//     rho = x·cos θ + y·sin θ
//   in an accumulator of numangle × numrho cells, padded by one cell on each
//   side so that the 4-neighbour peak test needs no bounds checks:
//
//     votes > threshold  &&  votes >  left  &&  votes >= right
//                        &&  votes >  up    &&  votes >= down
//
//   Peaks are optionally sorted by votes (ties: lower angle, then lower rho).
//
// PROBABILISTIC (HoughSegmentDetector):
//   Progressive probabilistic Hough, visiting edge pixels in raster order so
//   that the result is deterministic. Each pixel votes; once some angle
//   reaches the threshold the line through the pixel is walked in both
//   directions (fixed-point stepping, stopping after `max_line_gap`
//   consecutive misses). The walked pixels are removed from the edge map and
//   their votes withdrawn.
//
// Both accumulators hold at least 2·ceil((w + h) / rho) + 1 rho bins, so every
// |rho| a pixel can produce lands inside, however coarse `rho` is.

use std::f64::consts::PI;

use crate::error::{Error, Result};
use crate::gpu_mat::GpuMat;
use crate::image::Image;
use crate::imgproc::{require_finite, require_non_empty, require_type, run_unary};
use crate::mat::{Mat, MatType};
use crate::stream::Stream;

const DEFAULT_MAX_LINES: usize = 4096;
/// Finest angular resolution accepted: pi / theta angle bins.
const MAX_NUMANGLE: f64 = 65536.0;
/// Upper bound on accumulator cells (numangle × numrho).
const MAX_ACCUM_CELLS: usize = 1 << 28;

/// Accumulator geometry shared by both transforms.
struct HoughSpace {
    numangle: usize,
    numrho: usize,
    /// cos θ / rho and sin θ / rho per angle index.
    tab_cos: Vec<f32>,
    tab_sin: Vec<f32>,
}

impl HoughSpace {
    fn new(width: usize, height: usize, rho: f32, theta: f32) -> Result<Self> {
        let numangle = ((PI / theta as f64).round() as usize).max(1);
        let reach = ((width + height) as f64 / rho as f64).ceil();
        let cells = (2.0 * reach + 1.0) * numangle as f64;
        if cells > MAX_ACCUM_CELLS as f64 {
            return Err(Error::invalid(
                "rho",
                format!("{rho} is too fine for a {width}x{height} image ({cells} accumulator cells)"),
            ));
        }
        let numrho = ((((width + height) * 2 + 1) as f64 / rho as f64).round() as usize)
            .max(2 * reach as usize + 1);
        let irho = 1.0 / rho;
        let (tab_cos, tab_sin) = (0..numangle)
            .map(|n| {
                let ang = n as f32 * theta;
                (ang.cos() * irho, ang.sin() * irho)
            })
            .unzip();
        Ok(HoughSpace {
            numangle,
            numrho,
            tab_cos,
            tab_sin,
        })
    }

    /// Rho bin of pixel (x, y) at angle index `n`.
    #[inline]
    fn rho_bin(&self, n: usize, x: usize, y: usize) -> usize {
        let r = (x as f32 * self.tab_cos[n] + y as f32 * self.tab_sin[n]).round() as isize;
        (r + (self.numrho as isize - 1) / 2).clamp(0, self.numrho as isize - 1) as usize
    }
}

fn edge_points(img: &Image<u8>) -> Vec<(usize, usize)> {
    img.pixels().filter(|&(_, _, v)| v != 0).map(|(x, y, _)| (x, y)).collect()
}

fn validate_resolution(rho: f32, theta: f32) -> Result<()> {
    require_finite("rho", rho as f64)?;
    require_finite("theta", theta as f64)?;
    if rho <= 0.0 {
        return Err(Error::invalid("rho", "must be positive"));
    }
    if theta <= 0.0 || theta as f64 > PI {
        return Err(Error::invalid("theta", "must be in (0, pi]"));
    }
    if PI / theta as f64 > MAX_NUMANGLE {
        return Err(Error::invalid("theta", format!("{theta} gives more than {MAX_NUMANGLE} angle bins")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Standard Hough lines
// ---------------------------------------------------------------------------

/// Standard Hough transform.
///
/// Input: `U8C1` edge map. Output: `1 × N` `F32C2` of `(rho, theta)`, or an
/// empty buffer when no line reaches the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughLinesDetector {
    rho: f32,
    theta: f32,
    threshold: i32,
    do_sort: bool,
    max_lines: usize,
}

impl HoughLinesDetector {
    /// Sorted output, at most 4096 lines.
    pub fn new(rho: f32, theta: f32, threshold: i32) -> Result<Self> {
        Self::with_params(rho, theta, threshold, true, DEFAULT_MAX_LINES)
    }

    pub fn with_params(rho: f32, theta: f32, threshold: i32, do_sort: bool, max_lines: usize) -> Result<Self> {
        validate_resolution(rho, theta)?;
        if threshold <= 0 {
            return Err(Error::invalid("threshold", format!("{threshold} must be positive")));
        }
        if max_lines == 0 {
            return Err(Error::invalid("max_lines", "must be positive"));
        }
        Ok(HoughLinesDetector {
            rho,
            theta,
            threshold,
            do_sort,
            max_lines,
        })
    }

    pub fn detect(&self, src: &GpuMat, dst: &mut GpuMat) -> Result<()> {
        self.launch(src, dst, None)
    }

    pub fn detect_async(&self, src: &GpuMat, dst: &mut GpuMat, stream: &Stream) -> Result<()> {
        self.launch(src, dst, Some(stream))
    }

    fn launch(&self, src: &GpuMat, dst: &mut GpuMat, stream: Option<&Stream>) -> Result<()> {
        let detector = *self;
        run_unary(src, dst, stream, move |src| detector.apply(src))
    }

    pub(crate) fn apply(&self, src: &Mat) -> Result<Mat> {
        require_non_empty("hough_lines", src)?;
        require_type("hough_lines", src, MatType::U8C1)?;
        let img = Image::<u8>::from_mat(src)?;
        let lines = self.lines(&img)?;
        if lines.is_empty() {
            return Ok(Mat::zeros(0, 0, MatType::F32C2));
        }
        let flat: Vec<f32> = lines.iter().flat_map(|&(r, t)| [r, t]).collect();
        Mat::from_slice(1, lines.len(), 2, &flat)
    }

    fn lines(&self, img: &Image<u8>) -> Result<Vec<(f32, f32)>> {
        let space = HoughSpace::new(img.width(), img.height(), self.rho, self.theta)?;
        let (numangle, numrho) = (space.numangle, space.numrho);
        let stride = numrho + 2;
        let mut accum = vec![0i32; (numangle + 2) * stride];

        for (x, y) in edge_points(img) {
            for n in 0..numangle {
                let r = space.rho_bin(n, x, y);
                accum[(n + 1) * stride + r + 1] += 1;
            }
        }

        let mut peaks: Vec<usize> = Vec::new();
        for n in 0..numangle {
            for r in 0..numrho {
                let base = (n + 1) * stride + r + 1;
                let v = accum[base];
                if v > self.threshold
                    && v > accum[base - 1]
                    && v >= accum[base + 1]
                    && v > accum[base - stride]
                    && v >= accum[base + stride]
                {
                    peaks.push(base);
                }
            }
        }

        if self.do_sort {
            // Stable: equal votes keep raster (angle, rho) order.
            peaks.sort_by(|&a, &b| accum[b].cmp(&accum[a]));
        }

        Ok(peaks
            .into_iter()
            .take(self.max_lines)
            .map(|base| {
                let n = base / stride - 1;
                let r = base - (n + 1) * stride - 1;
                let rho = (r as f32 - (numrho as f32 - 1.0) * 0.5) * self.rho;
                (rho, n as f32 * self.theta)
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Probabilistic Hough segments
// ---------------------------------------------------------------------------

const SHIFT: i32 = 16;

/// Progressive probabilistic Hough transform.
///
/// Input: `U8C1` edge map. Output: `1 × N` `S32C4` of `(x1, y1, x2, y2)`,
/// or an empty buffer when no segment qualifies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughSegmentDetector {
    rho: f32,
    theta: f32,
    min_line_length: i32,
    max_line_gap: i32,
    max_lines: usize,
    threshold: i32,
}

impl HoughSegmentDetector {
    /// At most 4096 segments; vote threshold `max(1, min_line_length / 2)`.
    pub fn new(rho: f32, theta: f32, min_line_length: i32, max_line_gap: i32) -> Result<Self> {
        Self::with_params(
            rho,
            theta,
            min_line_length,
            max_line_gap,
            DEFAULT_MAX_LINES,
            (min_line_length / 2).max(1),
        )
    }

    pub fn with_params(
        rho: f32,
        theta: f32,
        min_line_length: i32,
        max_line_gap: i32,
        max_lines: usize,
        threshold: i32,
    ) -> Result<Self> {
        validate_resolution(rho, theta)?;
        if min_line_length < 0 {
            return Err(Error::invalid("min_line_length", "must be non-negative"));
        }
        if max_line_gap < 0 {
            return Err(Error::invalid("max_line_gap", "must be non-negative"));
        }
        if max_lines == 0 {
            return Err(Error::invalid("max_lines", "must be positive"));
        }
        if threshold <= 0 {
            return Err(Error::invalid("threshold", format!("{threshold} must be positive")));
        }
        Ok(HoughSegmentDetector {
            rho,
            theta,
            min_line_length,
            max_line_gap,
            max_lines,
            threshold,
        })
    }

    pub fn detect(&self, src: &GpuMat, dst: &mut GpuMat) -> Result<()> {
        self.launch(src, dst, None)
    }

    pub fn detect_async(&self, src: &GpuMat, dst: &mut GpuMat, stream: &Stream) -> Result<()> {
        self.launch(src, dst, Some(stream))
    }

    fn launch(&self, src: &GpuMat, dst: &mut GpuMat, stream: Option<&Stream>) -> Result<()> {
        let detector = *self;
        run_unary(src, dst, stream, move |src| detector.apply(src))
    }

    pub(crate) fn apply(&self, src: &Mat) -> Result<Mat> {
        require_non_empty("hough_segments", src)?;
        require_type("hough_segments", src, MatType::U8C1)?;
        let img = Image::<u8>::from_mat(src)?;
        let segments = self.segments(&img)?;
        if segments.is_empty() {
            return Ok(Mat::zeros(0, 0, MatType::S32C4));
        }
        let flat: Vec<i32> = segments.into_iter().flatten().collect();
        Mat::from_slice(1, flat.len() / 4, 4, &flat)
    }

    fn segments(&self, img: &Image<u8>) -> Result<Vec<[i32; 4]>> {
        let (w, h) = (img.width(), img.height());
        let space = HoughSpace::new(w, h, self.rho, self.theta)?;
        let numrho = space.numrho;
        let mut accum = vec![0i32; space.numangle * numrho];
        let mut mask: Vec<bool> = img.as_slice().iter().map(|&v| v != 0).collect();
        let mut voted = vec![false; w * h];
        let mut lines = Vec::new();

        let unvote = |accum: &mut [i32], x: usize, y: usize| {
            for n in 0..space.numangle {
                accum[n * numrho + space.rho_bin(n, x, y)] -= 1;
            }
        };

        for (x, y) in edge_points(img) {
            if !mask[y * w + x] {
                continue;
            }

            let mut max_val = self.threshold - 1;
            let mut max_n = 0;
            for n in 0..space.numangle {
                let cell = &mut accum[n * numrho + space.rho_bin(n, x, y)];
                *cell += 1;
                if *cell > max_val {
                    max_val = *cell;
                    max_n = n;
                }
            }
            voted[y * w + x] = true;

            if max_val < self.threshold {
                continue;
            }

            // Direction of the line: (a, b) = (-sin θ, cos θ). Step one pixel
            // along the major axis and a fixed-point fraction along the other.
            let a = -space.tab_sin[max_n];
            let b = space.tab_cos[max_n];
            let x_major = a.abs() > b.abs();
            let (x0, y0, dx0, dy0) = if x_major {
                (
                    x as i32,
                    ((y as i32) << SHIFT) + (1 << (SHIFT - 1)),
                    if a > 0.0 { 1 } else { -1 },
                    (b * (1 << SHIFT) as f32 / a.abs()).round() as i32,
                )
            } else {
                (
                    ((x as i32) << SHIFT) + (1 << (SHIFT - 1)),
                    y as i32,
                    (a * (1 << SHIFT) as f32 / b.abs()).round() as i32,
                    if b > 0.0 { 1 } else { -1 },
                )
            };
            let to_pixel = |px: i32, py: i32| -> (i32, i32) {
                if x_major {
                    (px, py >> SHIFT)
                } else {
                    (px >> SHIFT, py)
                }
            };
            let inside = |j: i32, i: i32| j >= 0 && i >= 0 && j < w as i32 && i < h as i32;

            // Find both ends.
            let mut line_end = [(x as i32, y as i32); 2];
            for (k, end) in line_end.iter_mut().enumerate() {
                let (dx, dy) = if k == 0 { (dx0, dy0) } else { (-dx0, -dy0) };
                let (mut px, mut py) = (x0, y0);
                let mut gap = 0;
                loop {
                    let (j, i) = to_pixel(px, py);
                    if !inside(j, i) {
                        break;
                    }
                    if mask[i as usize * w + j as usize] {
                        gap = 0;
                        *end = (j, i);
                    } else {
                        gap += 1;
                        if gap > self.max_line_gap {
                            break;
                        }
                    }
                    px += dx;
                    py += dy;
                }
            }

            let good_line = (line_end[1].0 - line_end[0].0).abs() >= self.min_line_length
                || (line_end[1].1 - line_end[0].1).abs() >= self.min_line_length;

            // Remove the walked pixels; withdraw their votes if the line is kept.
            for (k, &end) in line_end.iter().enumerate() {
                let (dx, dy) = if k == 0 { (dx0, dy0) } else { (-dx0, -dy0) };
                let (mut px, mut py) = (x0, y0);
                loop {
                    let (j, i) = to_pixel(px, py);
                    let idx = i as usize * w + j as usize;
                    if mask[idx] {
                        if good_line && voted[idx] {
                            unvote(&mut accum, j as usize, i as usize);
                            voted[idx] = false;
                        }
                        mask[idx] = false;
                    }
                    if (j, i) == end {
                        break;
                    }
                    px += dx;
                    py += dy;
                }
            }

            if good_line {
                lines.push([line_end[0].0, line_end[0].1, line_end[1].0, line_end[1].1]);
                if lines.len() >= self.max_lines {
                    break;
                }
            }
        }
        Ok(lines)
    }
}
