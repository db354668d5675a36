// filter.rs — Edge-preserving filters: bilateral and the mean-shift family.
//
// BILATERAL
//
// Each output pixel is a normalised weighted mean over a circular window of
// radius r:
//
//   w(q) = Gs(dx) · Gs(dy) · exp(−‖Ip − Iq‖₁² / (2σc²))
//
// Gs is the 1D spatial Gaussian of σs; ‖·‖₁ sums absolute channel
// differences. Out-of-image samples come from the border mode; a Constant
// border contributes zero-valued samples.
//
// MEAN SHIFT (U8C4, colour in the first three channels)
//
// Starting at (x0, y0) with colour c, repeat up to max_iter times:
//
//   1. window = [x0 − sp, x0 + sp] × [y0 − sp, y0 + sp], clamped to the image
//   2. mean position and colour of window pixels with ‖I(q) − c‖² ≤ sr²
//   3. stop if the position did not move, or if
//      |Δx| + |Δy| + ‖Δc‖² ≤ eps
//
// Means are truncated to integers. mean_shift_proc also reports the
// converged position; mean_shift_segmentation merges neighbouring pixels
// whose converged colours and positions are close, then absorbs components
// smaller than `min_size` into a neighbour.

use crate::border::BorderMode;
use crate::convolution::gaussian_kernel_1d;
use crate::error::{Error, Result};
use crate::gpu_mat::GpuMat;
use crate::imgproc::{require_finite, require_non_empty, require_type, run_unary};
use crate::mat::{Depth, Mat, MatType};
use crate::stream::{launch, Stream};

// ============================================================
// Termination criteria
// ============================================================

/// Iteration limits for the mean-shift filters.
///
/// A missing count means 5 iterations, a missing epsilon means 1.0. The
/// count is clamped to `1..=100` and epsilon to `≥ 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermCriteria {
    max_count: Option<i32>,
    epsilon: Option<f64>,
}

impl TermCriteria {
    pub fn new(max_count: i32, epsilon: f64) -> Self {
        TermCriteria { max_count: Some(max_count), epsilon: Some(epsilon) }
    }

    /// Stop after `max_count` iterations only.
    pub fn count(max_count: i32) -> Self {
        TermCriteria { max_count: Some(max_count), epsilon: None }
    }

    /// Stop on convergence only.
    pub fn eps(epsilon: f64) -> Self {
        TermCriteria { max_count: None, epsilon: Some(epsilon) }
    }

    pub fn max_iter(&self) -> usize {
        self.max_count.map_or(5, |n| n.clamp(1, 100)) as usize
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon.map_or(1.0, |e| e.max(0.0))
    }
}

impl Default for TermCriteria {
    fn default() -> Self {
        TermCriteria::new(5, 1.0)
    }
}

// ============================================================
// Bilateral filter
// ============================================================

/// Bilateral filter for U8 or F32 images with 1, 3 or 4 channels.
///
/// `kernel_size` is the window diameter; `kernel_size ≤ 0` derives it from
/// `sigma_spatial` as `max(round(1.5·σs), 1)`. The radius is half the
/// diameter either way.
pub fn bilateral_filter(
    src: &GpuMat,
    dst: &mut GpuMat,
    kernel_size: i32,
    sigma_color: f32,
    sigma_spatial: f32,
    border: BorderMode,
    stream: Option<&Stream>,
) -> Result<()> {
    require_finite("sigma_color", sigma_color as f64)?;
    require_finite("sigma_spatial", sigma_spatial as f64)?;
    if sigma_color <= 0.0 {
        return Err(Error::invalid("sigma_color", format!("{sigma_color} is not positive")));
    }
    if sigma_spatial <= 0.0 {
        return Err(Error::invalid("sigma_spatial", format!("{sigma_spatial} is not positive")));
    }
    let radius = window_radius(kernel_size, sigma_spatial);
    run_unary(src, dst, stream, move |src| bilateral(src, radius, sigma_color, sigma_spatial, border))
}

fn window_radius(kernel_size: i32, sigma_spatial: f32) -> usize {
    let diameter = if kernel_size > 0 {
        kernel_size as usize
    } else {
        (1.5 * sigma_spatial).round().max(1.0) as usize
    };
    diameter / 2
}

fn bilateral(src: &Mat, radius: usize, sigma_color: f32, sigma_spatial: f32, border: BorderMode) -> Result<Mat> {
    require_non_empty("bilateral_filter", src)?;
    let ty = src.mat_type();
    if !matches!(ty.depth(), Depth::U8 | Depth::F32) || ty.channels() == 2 {
        return Err(Error::type_mismatch("bilateral_filter", "U8 or F32 with 1, 3 or 4 channels", ty));
    }

    let (h, w, cn) = (src.rows(), src.cols(), src.channels());
    let values = src.to_f64_vec();
    let spatial = gaussian_kernel_1d(radius, sigma_spatial);
    let color_coeff = -0.5 / (sigma_color as f64 * sigma_color as f64);
    let r = radius as isize;
    let zero = [0.0f64; 4];

    let mut out = vec![0.0; values.len()];
    for y in 0..h {
        for x in 0..w {
            let centre = &values[(y * w + x) * cn..(y * w + x + 1) * cn];
            let mut acc = [0.0f64; 4];
            let mut norm = 0.0;
            for dy in -r..=r {
                for dx in -r..=r {
                    if dx * dx + dy * dy > r * r {
                        continue;
                    }
                    let sample = match (
                        border.interpolate(y as isize + dy, h),
                        border.interpolate(x as isize + dx, w),
                    ) {
                        (Some(sy), Some(sx)) => &values[(sy * w + sx) * cn..(sy * w + sx + 1) * cn],
                        _ => &zero[..cn],
                    };
                    let dist: f64 = centre.iter().zip(sample).map(|(a, b)| (a - b).abs()).sum();
                    let weight = spatial[(dy + r) as usize] as f64
                        * spatial[(dx + r) as usize] as f64
                        * (dist * dist * color_coeff).exp();
                    for c in 0..cn {
                        acc[c] += weight * sample[c];
                    }
                    norm += weight;
                }
            }
            let o = &mut out[(y * w + x) * cn..(y * w + x + 1) * cn];
            for c in 0..cn {
                // The centre sample always has positive weight.
                o[c] = acc[c] / norm;
            }
        }
    }
    Mat::from_f64_slice(h, w, ty, &out)
}

// ============================================================
// Mean shift
// ============================================================

/// Mean-shift filtering of a U8C4 image: every pixel takes the colour its
/// mean-shift procedure converges to (alpha 0).
pub fn mean_shift_filtering(
    src: &GpuMat,
    dst: &mut GpuMat,
    sp: i32,
    sr: i32,
    criteria: TermCriteria,
    stream: Option<&Stream>,
) -> Result<()> {
    check_radii(sp, sr)?;
    run_unary(src, dst, stream, move |src| {
        let (colors, _) = mean_shift(src, sp as usize, sr as i64, criteria)?;
        Ok(colors)
    })
}

/// Mean-shift procedure: converged colours into `dstr` (U8C4) and
/// converged positions into `dstsp` (S16C2, (x, y)).
pub fn mean_shift_proc(
    src: &GpuMat,
    dstr: &mut GpuMat,
    dstsp: &mut GpuMat,
    sp: i32,
    sr: i32,
    criteria: TermCriteria,
    stream: Option<&Stream>,
) -> Result<()> {
    check_radii(sp, sr)?;
    let input = src.handle();
    let colors_out = dstr.output_handle();
    let positions_out = dstsp.output_handle();
    launch(stream, move || {
        let (colors, positions) = mean_shift(&input.read()?, sp as usize, sr as i64, criteria)?;
        colors_out.write(&colors)?;
        positions_out.write(&positions)
    })
}

/// Mean-shift segmentation: each segment is painted with the mean source
/// colour of its pixels (alpha 0). Segments smaller than `min_size` pixels
/// are merged into a neighbour.
pub fn mean_shift_segmentation(
    src: &GpuMat,
    dst: &mut GpuMat,
    sp: i32,
    sr: i32,
    min_size: i32,
    criteria: TermCriteria,
    stream: Option<&Stream>,
) -> Result<()> {
    check_radii(sp, sr)?;
    if min_size < 0 {
        return Err(Error::invalid("min_size", format!("{min_size} is negative")));
    }
    run_unary(src, dst, stream, move |src| segment(src, sp, sr, min_size as usize, criteria))
}

fn check_radii(sp: i32, sr: i32) -> Result<()> {
    if sp < 1 {
        return Err(Error::invalid("sp", format!("{sp} is below 1")));
    }
    if sr < 1 {
        return Err(Error::invalid("sr", format!("{sr} is below 1")));
    }
    Ok(())
}

fn color_dist2(a: [i64; 3], b: [i64; 3]) -> i64 {
    (0..3).map(|c| (a[c] - b[c]) * (a[c] - b[c])).sum()
}

/// Run the procedure for every pixel. Returns (colours U8C4, positions S16C2).
fn mean_shift(src: &Mat, sp: usize, sr: i64, criteria: TermCriteria) -> Result<(Mat, Mat)> {
    require_non_empty("mean_shift", src)?;
    require_type("mean_shift", src, MatType::U8C4)?;
    let (h, w) = (src.rows(), src.cols());
    let px = src.as_bytes();
    let color_at = |x: usize, y: usize| -> [i64; 3] {
        let i = (y * w + x) * 4;
        [px[i] as i64, px[i + 1] as i64, px[i + 2] as i64]
    };
    let max_iter = criteria.max_iter();
    let eps = criteria.epsilon();
    let sr2 = sr * sr;

    let mut colors = Mat::zeros(h, w, MatType::U8C4);
    let mut positions = Mat::zeros(h, w, MatType::S16C2);
    for y in 0..h {
        for x in 0..w {
            let (mut x0, mut y0) = (x, y);
            let mut c = color_at(x, y);
            for _ in 0..max_iter {
                let (minx, maxx) = (x0.saturating_sub(sp), (x0 + sp).min(w - 1));
                let (miny, maxy) = (y0.saturating_sub(sp), (y0 + sp).min(h - 1));
                let mut sum = [0i64; 3];
                let (mut sx, mut sy, mut count) = (0i64, 0i64, 0i64);
                for qy in miny..=maxy {
                    for qx in minx..=maxx {
                        let t = color_at(qx, qy);
                        if color_dist2(t, c) <= sr2 {
                            for k in 0..3 {
                                sum[k] += t[k];
                            }
                            sx += qx as i64;
                            sy += qy as i64;
                            count += 1;
                        }
                    }
                }
                if count == 0 {
                    break;
                }
                let (x1, y1) = ((sx / count) as usize, (sy / count) as usize);
                let c1 = sum.map(|s| s / count);
                let moved = (x1 as i64 - x0 as i64).abs() + (y1 as i64 - y0 as i64).abs();
                let stop = (x1 == x0 && y1 == y0) || (moved + color_dist2(c1, c)) as f64 <= eps;
                x0 = x1;
                y0 = y1;
                c = c1;
                if stop {
                    break;
                }
            }
            for k in 0..3 {
                colors.set(y, x, k, c[k] as u8);
            }
            positions.set(y, x, 0, x0 as i16);
            positions.set(y, x, 1, y0 as i16);
        }
    }
    Ok((colors, positions))
}

/// Union–find with component sizes.
struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        DisjointSets { parent: (0..n).collect(), size: vec![1; n] }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn merge(&mut self, a: usize, b: usize) {
        let (mut a, mut b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        if self.size[a] < self.size[b] {
            std::mem::swap(&mut a, &mut b);
        }
        self.parent[b] = a;
        self.size[a] += self.size[b];
    }
}

fn segment(src: &Mat, sp: i32, sr: i32, min_size: usize, criteria: TermCriteria) -> Result<Mat> {
    let (colors, positions) = mean_shift(src, sp as usize, sr as i64, criteria)?;
    let (h, w) = (src.rows(), src.cols());
    let color = |i: usize| -> [i64; 3] {
        let (y, x) = (i / w, i % w);
        [0, 1, 2].map(|k| colors.at::<u8>(y, x, k) as i64)
    };
    let pos = |i: usize| -> (i64, i64) {
        let (y, x) = (i / w, i % w);
        (positions.at::<i16>(y, x, 0) as i64, positions.at::<i16>(y, x, 1) as i64)
    };

    // Right and bottom neighbour links, weighted by converged colour and
    // position distance.
    struct Link {
        a: usize,
        b: usize,
        dr: i64,
        dsp: i64,
    }
    let mut links = Vec::with_capacity(2 * h * w);
    for y in 0..h {
        for x in 0..w {
            let a = y * w + x;
            let neighbours = [(x + 1 < w).then(|| a + 1), (y + 1 < h).then(|| a + w)];
            for b in neighbours.into_iter().flatten() {
                let ((ax, ay), (bx, by)) = (pos(a), pos(b));
                links.push(Link {
                    a,
                    b,
                    dr: color_dist2(color(a), color(b)),
                    dsp: (ax - bx) * (ax - bx) + (ay - by) * (ay - by),
                });
            }
        }
    }
    links.sort_by_key(|l| l.dr);

    let (sr2, sp2) = (sr as i64 * sr as i64, sp as i64 * sp as i64);
    let mut sets = DisjointSets::new(h * w);
    for l in &links {
        if l.dr < sr2 && l.dsp < sp2 {
            sets.merge(l.a, l.b);
        }
    }
    for l in &links {
        let (ra, rb) = (sets.find(l.a), sets.find(l.b));
        if ra != rb && (sets.size[ra] < min_size || sets.size[rb] < min_size) {
            sets.merge(ra, rb);
        }
    }

    let px = src.as_bytes();
    let mut sums = vec![[0usize; 3]; h * w];
    for i in 0..h * w {
        let root = sets.find(i);
        for k in 0..3 {
            sums[root][k] += px[i * 4 + k] as usize;
        }
    }
    let mut out = Mat::zeros(h, w, MatType::U8C4);
    for i in 0..h * w {
        let root = sets.find(i);
        let n = sets.size[root];
        for k in 0..3 {
            out.set(i / w, i % w, k, (sums[root][k] / n) as u8);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tone(w: usize, h: usize, split: usize) -> Mat {
        let mut m = Mat::zeros(h, w, MatType::U8C4);
        for y in 0..h {
            for x in 0..w {
                let v = if x < split { 20u8 } else { 220 };
                for c in 0..3 {
                    m.set(y, x, c, v);
                }
                m.set(y, x, 3, 255u8);
            }
        }
        m
    }

    #[test]
    fn test_term_criteria_defaults_and_clamps() {
        assert_eq!(TermCriteria::eps(0.5).max_iter(), 5);
        assert_eq!(TermCriteria::count(3).epsilon(), 1.0);
        assert_eq!(TermCriteria::count(1000).max_iter(), 100);
        assert_eq!(TermCriteria::count(-4).max_iter(), 1);
        assert_eq!(TermCriteria::new(5, -2.0).epsilon(), 0.0);
    }

    #[test]
    fn test_window_radius_halves_derived_size() {
        assert_eq!(window_radius(5, 100.0), 2);
        assert_eq!(window_radius(1, 3.0), 0);
        // Derived diameter: round(1.5 · 2) = 3, round(1.5 · 4) = 6.
        assert_eq!(window_radius(0, 2.0), 1);
        assert_eq!(window_radius(-1, 4.0), 3);
        assert_eq!(window_radius(0, 0.1), 0);
    }

    #[test]
    fn test_bilateral_flat_image_unchanged() {
        let src = Mat::filled(6, 6, 3, 90u8).unwrap();
        let out = bilateral(&src, 2, 20.0, 3.0, BorderMode::Reflect101).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn test_bilateral_preserves_strong_edge() {
        let mut src = Mat::zeros(5, 10, MatType::U8C1);
        for y in 0..5 {
            for x in 5..10 {
                src.set(y, x, 0, 200u8);
            }
        }
        let out = bilateral(&src, 2, 10.0, 5.0, BorderMode::Replicate).unwrap();
        assert_eq!(out, src, "weights across a 200-level step are negligible");
    }

    #[test]
    fn test_bilateral_constant_border_darkens_edges() {
        let src = Mat::filled(5, 5, 1, 10.0f32).unwrap();
        let out = bilateral(&src, 1, 100.0, 1.0, BorderMode::Constant).unwrap();
        assert!(out.at::<f32>(0, 0, 0) < 10.0);
        assert!((out.at::<f32>(2, 2, 0) - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_bilateral_rejects_two_channels() {
        let src = Mat::zeros(3, 3, MatType::F32C2);
        assert!(matches!(
            bilateral(&src, 1, 1.0, 1.0, BorderMode::Reflect101),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_mean_shift_keeps_regions_apart() {
        let src = two_tone(8, 4, 4);
        let (colors, positions) = mean_shift(&src, 2, 30, TermCriteria::default()).unwrap();
        assert_eq!(positions.mat_type(), MatType::S16C2);
        for y in 0..4 {
            for x in 0..8 {
                let expected = if x < 4 { 20u8 } else { 220 };
                assert_eq!(colors.at::<u8>(y, x, 0), expected);
                assert_eq!(colors.at::<u8>(y, x, 3), 0);
                let px = positions.at::<i16>(y, x, 0) as usize;
                assert_eq!(px < 4, x < 4, "position stays on its own side");
            }
        }
    }

    #[test]
    fn test_segmentation_absorbs_small_components() {
        // A single odd pixel inside a uniform region is merged away. The
        // spatial window covers the whole image, so every pixel converges to
        // the same position.
        let mut src = two_tone(6, 6, 6);
        for c in 0..3 {
            src.set(2, 2, c, 200u8);
        }
        let out = segment(&src, 10, 5, 4, TermCriteria::default()).unwrap();
        let first = out.at::<u8>(0, 0, 0);
        for y in 0..6 {
            for x in 0..6 {
                assert_eq!(out.at::<u8>(y, x, 0), first);
            }
        }
        // Mean of 35 pixels at 20 and one at 200.
        assert_eq!(first, ((35 * 20 + 200) / 36) as u8);
    }

    #[test]
    fn test_radii_validation() {
        assert!(check_radii(0, 5).is_err());
        assert!(check_radii(5, 0).is_err());
        assert!(check_radii(1, 1).is_ok());
    }
}
