// histogram.rs — Histograms and global histogram equalization.
//
// All inputs are U8C1; all histograms and level tables are S32C1 rows:
//
//   calc_hist          256 bins, one per intensity
//   calc_hist_masked   same, counting only pixels whose mask value != 0
//   hist_even          `hist_size` equal-width bins over [lower, upper)
//   hist_range         bins [levels[i], levels[i+1]) for caller-given levels
//   even_levels        the `n_levels` bin edges hist_even would use
//
// Equalization builds a CDF from the 256-bin histogram and remaps through a
// lookup table:
//
//   lut[i] = round((cdf[i] − cdf_min) / (N − cdf_min) · 255)
//
// where cdf_min is the first non-zero CDF value. A constant image has
// N == cdf_min and maps to all zeros.

use crate::error::{Error, Result};
use crate::gpu_mat::GpuMat;
use crate::imgproc::{require_non_empty, require_same_size, require_type, run_binary, run_unary};
use crate::mat::{Mat, MatType};
use crate::stream::{launch, Stream};

// ============================================================
// Public operations
// ============================================================

/// 256-bin histogram of a U8C1 image into a 1×256 S32C1 buffer.
pub fn calc_hist(src: &GpuMat, hist: &mut GpuMat, stream: Option<&Stream>) -> Result<()> {
    run_unary(src, hist, stream, |src| {
        check_u8("calc_hist", src)?;
        histogram_mat(&histogram_256(src.as_bytes(), None))
    })
}

/// [`calc_hist`] restricted to pixels where `mask` (U8C1, same size) is
/// non-zero.
pub fn calc_hist_masked(src: &GpuMat, mask: &GpuMat, hist: &mut GpuMat, stream: Option<&Stream>) -> Result<()> {
    run_binary(src, mask, hist, stream, |src, mask| {
        check_u8("calc_hist_masked", src)?;
        check_u8("calc_hist_masked", mask)?;
        require_same_size("calc_hist_masked", src, mask)?;
        histogram_mat(&histogram_256(src.as_bytes(), Some(mask.as_bytes())))
    })
}

/// Global histogram equalization of a U8C1 image.
pub fn equalize_hist(src: &GpuMat, dst: &mut GpuMat, stream: Option<&Stream>) -> Result<()> {
    run_unary(src, dst, stream, |src| {
        check_u8("equalize_hist", src)?;
        let hist = histogram_256(src.as_bytes(), None);
        let lut = build_lut(&hist, src.total());
        let remapped: Vec<u8> = src.as_bytes().iter().map(|&v| lut[v as usize]).collect();
        Mat::from_bytes(src.rows(), src.cols(), MatType::U8C1, remapped)
    })
}

/// Fill `levels` with `n_levels` evenly spaced bin edges from `lower` to
/// `upper` (inclusive), as a 1×n S32C1 row.
///
/// `levels[i] = lower + i · (upper − lower) / (n_levels − 1)` with integer
/// division.
pub fn even_levels(
    levels: &mut GpuMat,
    n_levels: i32,
    lower: i32,
    upper: i32,
    stream: Option<&Stream>,
) -> Result<()> {
    if n_levels < 2 {
        return Err(Error::invalid("n_levels", format!("{n_levels} is below 2")));
    }
    check_bounds(lower, upper)?;
    let edges = level_edges(n_levels, lower, upper);
    let output = levels.output_handle();
    launch(stream, move || output.write(&Mat::from_slice(1, edges.len(), 1, &edges)?))
}

/// Histogram with `hist_size` equal-width bins over `[lower, upper)`.
/// Values outside the range are not counted.
pub fn hist_even(
    src: &GpuMat,
    hist: &mut GpuMat,
    hist_size: i32,
    lower: i32,
    upper: i32,
    stream: Option<&Stream>,
) -> Result<()> {
    if hist_size < 1 {
        return Err(Error::invalid("hist_size", format!("{hist_size} is below 1")));
    }
    check_bounds(lower, upper)?;
    run_unary(src, hist, stream, move |src| {
        check_u8("hist_even", src)?;
        let span = (upper - lower) as i64;
        let mut bins = vec![0i32; hist_size as usize];
        for &v in src.as_bytes() {
            let v = v as i32;
            if v < lower || v >= upper {
                continue;
            }
            let bin = ((v - lower) as i64 * hist_size as i64 / span) as usize;
            bins[bin] += 1;
        }
        histogram_mat(&bins)
    })
}

/// Histogram over the bins `[levels[i], levels[i+1])`; `levels` is a
/// non-decreasing S32C1 row of at least two edges, giving `levels − 1` bins.
pub fn hist_range(src: &GpuMat, hist: &mut GpuMat, levels: &GpuMat, stream: Option<&Stream>) -> Result<()> {
    run_binary(src, levels, hist, stream, |src, levels| {
        check_u8("hist_range", src)?;
        require_type("hist_range", levels, MatType::S32C1)?;
        let edges = levels.to_vec::<i32>();
        if edges.len() < 2 {
            return Err(Error::invalid("levels", "at least two edges are required"));
        }
        if edges.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::invalid("levels", "edges must be non-decreasing"));
        }
        let mut bins = vec![0i32; edges.len() - 1];
        for &v in src.as_bytes() {
            let v = v as i32;
            // First edge strictly above v; the bin is the one before it.
            let upper = edges.partition_point(|&e| e <= v);
            if upper == 0 || upper == edges.len() {
                continue;
            }
            bins[upper - 1] += 1;
        }
        histogram_mat(&bins)
    })
}

// ============================================================
// Kernels
// ============================================================

fn check_u8(op: &'static str, mat: &Mat) -> Result<()> {
    require_non_empty(op, mat)?;
    require_type(op, mat, MatType::U8C1)
}

fn check_bounds(lower: i32, upper: i32) -> Result<()> {
    if lower >= upper {
        return Err(Error::invalid("upper", format!("{upper} is not above lower bound {lower}")));
    }
    Ok(())
}

fn histogram_256(pixels: &[u8], mask: Option<&[u8]>) -> [i32; 256] {
    let mut hist = [0i32; 256];
    match mask {
        Some(mask) => {
            for (&v, &m) in pixels.iter().zip(mask) {
                if m != 0 {
                    hist[v as usize] += 1;
                }
            }
        }
        None => {
            for &v in pixels {
                hist[v as usize] += 1;
            }
        }
    }
    hist
}

fn histogram_mat(bins: &[i32]) -> Result<Mat> {
    Mat::from_slice(1, bins.len(), 1, bins)
}

fn level_edges(n_levels: i32, lower: i32, upper: i32) -> Vec<i32> {
    let span = (upper - lower) as i64;
    (0..n_levels as i64)
        .map(|i| (lower as i64 + i * span / (n_levels as i64 - 1)) as i32)
        .collect()
}

/// Build a 256-entry lookup table from a histogram and total pixel count.
fn build_lut(hist: &[i32; 256], total: usize) -> [u8; 256] {
    let mut cdf = [0i64; 256];
    cdf[0] = hist[0] as i64;
    for i in 1..256 {
        cdf[i] = cdf[i - 1] + hist[i] as i64;
    }

    // First non-zero CDF value (skip empty low bins).
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);

    let mut lut = [0u8; 256];
    let denom = total as f64 - cdf_min as f64;
    if denom <= 0.0 {
        return lut;
    }

    for i in 0..256 {
        let val = (cdf[i] as f64 - cdf_min as f64) / denom * 255.0;
        lut[i] = val.round().clamp(0.0, 255.0) as u8;
    }
    lut
}
