// imgproc/mod.rs — Image-processing operations on device buffers.
//
// Every operation is a pure host kernel `&Mat -> Result<Mat>` wrapped by a
// launcher that either runs it inline (no stream) or enqueues it. Both paths
// execute the same kernel, so synchronous and stream results are
// bit-identical.
//
//   dispatcher.detect(src, dst)            ─┐
//   dispatcher.detect_async(src, dst, &s)  ─┴─▶ launch(stream, job)
//                                                 job: read inputs → kernel → write dst
//
// Parameter validation happens when a dispatcher is constructed (or when a
// free function is called); input validation (EmptyInput, TypeMismatch)
// happens inside the job, since inputs may not be populated until earlier
// stream work has run.

pub mod canny;
pub mod color;
pub mod demosaic;
pub mod filter;
pub mod histogram;
pub mod hough;
pub mod template;

pub use canny::CannyEdgeDetector;
pub use color::{alpha_comp, blend_linear, gamma_correction, swap_channels, AlphaCompOp};
pub use demosaic::{demosaicing, demosaicing_async, BayerPattern, DemosaicCode, DemosaicOutput};
pub use filter::{
    bilateral_filter, mean_shift_filtering, mean_shift_proc, mean_shift_segmentation, TermCriteria,
};
pub use histogram::{calc_hist, calc_hist_masked, equalize_hist, even_levels, hist_even, hist_range};
pub use hough::{HoughLinesDetector, HoughSegmentDetector};
pub use template::{TemplateMatching, TemplateMethod};

use crate::error::{Error, Result};
use crate::gpu_mat::GpuMat;
use crate::mat::{Mat, MatType};
use crate::stream::{launch, Stream};

// ---------------------------------------------------------------------------
// Launchers
// ---------------------------------------------------------------------------

/// Run a one-input kernel into `dst`.
pub(crate) fn run_unary<K>(src: &GpuMat, dst: &mut GpuMat, stream: Option<&Stream>, kernel: K) -> Result<()>
where
    K: FnOnce(&Mat) -> Result<Mat> + Send + 'static,
{
    let input = src.handle();
    let output = dst.output_handle();
    launch(stream, move || {
        let src = input.read()?;
        let result = kernel(&src)?;
        output.write(&result)
    })
}

/// Run a two-input kernel into `dst`.
pub(crate) fn run_binary<K>(
    a: &GpuMat,
    b: &GpuMat,
    dst: &mut GpuMat,
    stream: Option<&Stream>,
    kernel: K,
) -> Result<()>
where
    K: FnOnce(&Mat, &Mat) -> Result<Mat> + Send + 'static,
{
    let first = a.handle();
    let second = b.handle();
    let output = dst.output_handle();
    launch(stream, move || {
        let a = first.read()?;
        let b = second.read()?;
        let result = kernel(&a, &b)?;
        output.write(&result)
    })
}

// ---------------------------------------------------------------------------
// Input checks
// ---------------------------------------------------------------------------

pub(crate) fn require_non_empty(op: &'static str, mat: &Mat) -> Result<()> {
    if mat.is_empty() {
        return Err(Error::EmptyInput { op });
    }
    Ok(())
}

pub(crate) fn require_type(op: &'static str, mat: &Mat, expected: MatType) -> Result<()> {
    if mat.mat_type() != expected {
        return Err(Error::type_mismatch(op, expected.to_string(), mat.mat_type()));
    }
    Ok(())
}

pub(crate) fn require_same_size(op: &'static str, a: &Mat, b: &Mat) -> Result<()> {
    if (a.rows(), a.cols()) != (b.rows(), b.cols()) {
        return Err(Error::shape(
            op,
            format!("{}x{}", a.rows(), a.cols()),
            format!("{}x{}", b.rows(), b.cols()),
        ));
    }
    Ok(())
}

pub(crate) fn require_finite(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::invalid(name, format!("{value} is not finite")));
    }
    Ok(())
}
