// color.rs — Per-pixel colour operations.
//
// ALPHA COMPOSITION (Porter–Duff)
//
// With alphas normalised to [0, 1], every operator is a pair of blend factors
// (Fa, Fb) applied to the two sources:
//
//   op     Fa        Fb
//   Over   1         1 − αa
//   In     αb        0
//   Out    1 − αb    0
//   Atop   αb        1 − αa
//   Xor    1 − αb    1 − αa
//   Plus   1         1
//
//   colour = Ca·αa·Fa + Cb·αb·Fb     (straight alpha)
//   colour = Ca·Fa    + Cb·Fb        (premultiplied variants)
//   alpha  = αa·Fa    + αb·Fb
//
// U8 images use 255 as full alpha and saturate on store; F32 images use 1.0.
//
// GAMMA (BT.709 transfer function), applied through a 256-entry table:
//
//   forward:  v < 0.018 ? 4.5·v : 1.099·v^0.45 − 0.099
//   inverse:  v < 0.081 ? v / 4.5 : ((v + 0.099) / 1.099)^(1/0.45)

use crate::error::{Error, Result};
use crate::gpu_mat::GpuMat;
use crate::imgproc::{require_non_empty, require_same_size, require_type, run_binary, run_unary};
use crate::mat::{Depth, Mat, MatType};
use crate::stream::{launch, Stream};

// ============================================================
// Alpha composition
// ============================================================

/// Porter–Duff compositing operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaCompOp {
    Over,
    In,
    Out,
    Atop,
    Xor,
    Plus,
    OverPremul,
    InPremul,
    OutPremul,
    AtopPremul,
    XorPremul,
    PlusPremul,
}

impl AlphaCompOp {
    fn premultiplied(self) -> bool {
        matches!(
            self,
            AlphaCompOp::OverPremul
                | AlphaCompOp::InPremul
                | AlphaCompOp::OutPremul
                | AlphaCompOp::AtopPremul
                | AlphaCompOp::XorPremul
                | AlphaCompOp::PlusPremul
        )
    }

    /// Blend factors (Fa, Fb) for normalised alphas.
    fn factors(self, aa: f64, ab: f64) -> (f64, f64) {
        match self {
            AlphaCompOp::Over | AlphaCompOp::OverPremul => (1.0, 1.0 - aa),
            AlphaCompOp::In | AlphaCompOp::InPremul => (ab, 0.0),
            AlphaCompOp::Out | AlphaCompOp::OutPremul => (1.0 - ab, 0.0),
            AlphaCompOp::Atop | AlphaCompOp::AtopPremul => (ab, 1.0 - aa),
            AlphaCompOp::Xor | AlphaCompOp::XorPremul => (1.0 - ab, 1.0 - aa),
            AlphaCompOp::Plus | AlphaCompOp::PlusPremul => (1.0, 1.0),
        }
    }
}

/// Composite two 4-channel images (U8C4 or F32C4, alpha in channel 3).
pub fn alpha_comp(
    img1: &GpuMat,
    img2: &GpuMat,
    dst: &mut GpuMat,
    op: AlphaCompOp,
    stream: Option<&Stream>,
) -> Result<()> {
    run_binary(img1, img2, dst, stream, move |a, b| composite(a, b, op))
}

fn composite(a: &Mat, b: &Mat, op: AlphaCompOp) -> Result<Mat> {
    require_non_empty("alpha_comp", a)?;
    require_non_empty("alpha_comp", b)?;
    if !matches!(a.mat_type(), MatType::U8C4 | MatType::F32C4) {
        return Err(Error::type_mismatch("alpha_comp", "U8C4 or F32C4", a.mat_type()));
    }
    require_type("alpha_comp", b, a.mat_type())?;
    require_same_size("alpha_comp", a, b)?;

    let full = if a.depth() == Depth::U8 { 255.0 } else { 1.0 };
    let pa = a.to_f64_vec();
    let pb = b.to_f64_vec();
    let mut out = vec![0.0; pa.len()];
    for ((o, ca), cb) in out.chunks_exact_mut(4).zip(pa.chunks_exact(4)).zip(pb.chunks_exact(4)) {
        let (aa, ab) = (ca[3] / full, cb[3] / full);
        let (fa, fb) = op.factors(aa, ab);
        let (wa, wb) = if op.premultiplied() { (fa, fb) } else { (aa * fa, ab * fb) };
        for c in 0..3 {
            o[c] = ca[c] * wa + cb[c] * wb;
        }
        o[3] = (aa * fa + ab * fb) * full;
    }
    Mat::from_f64_slice(a.rows(), a.cols(), a.mat_type(), &out)
}

// ============================================================
// Gamma correction
// ============================================================

/// Apply the BT.709 transfer function (`forward`) or its inverse to a U8C3
/// or U8C4 image. The alpha channel of a U8C4 image is copied unchanged.
pub fn gamma_correction(src: &GpuMat, dst: &mut GpuMat, forward: bool, stream: Option<&Stream>) -> Result<()> {
    run_unary(src, dst, stream, move |src| {
        require_non_empty("gamma_correction", src)?;
        if !matches!(src.mat_type(), MatType::U8C3 | MatType::U8C4) {
            return Err(Error::type_mismatch("gamma_correction", "U8C3 or U8C4", src.mat_type()));
        }
        let lut = gamma_lut(forward);
        let cn = src.channels();
        let mut out = src.clone();
        for (i, v) in out.as_bytes_mut().iter_mut().enumerate() {
            if i % cn < 3 {
                *v = lut[*v as usize];
            }
        }
        Ok(out)
    })
}

fn gamma_lut(forward: bool) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let v = i as f64 / 255.0;
        let mapped = if forward {
            if v < 0.018 {
                4.5 * v
            } else {
                1.099 * v.powf(0.45) - 0.099
            }
        } else if v < 0.081 {
            v / 4.5
        } else {
            ((v + 0.099) / 1.099).powf(1.0 / 0.45)
        };
        *entry = (mapped * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

// ============================================================
// Channel swap
// ============================================================

/// Permute the channels of a U8C4 image in place:
/// `out[c] = in[order[c]]`, with every `order[c]` in `0..=3`.
pub fn swap_channels(image: &mut GpuMat, order: [i32; 4], stream: Option<&Stream>) -> Result<()> {
    if let Some(bad) = order.iter().find(|&&o| !(0..=3).contains(&o)) {
        return Err(Error::invalid("order", format!("channel index {bad} is not in 0..=3")));
    }
    let order = order.map(|o| o as usize);
    let target = image.in_place_handle();
    launch(stream, move || {
        target.update(|mat| {
            require_non_empty("swap_channels", mat)?;
            require_type("swap_channels", mat, MatType::U8C4)?;
            for px in mat.as_bytes_mut().chunks_exact_mut(4) {
                let src = [px[0], px[1], px[2], px[3]];
                for c in 0..4 {
                    px[c] = src[order[c]];
                }
            }
            Ok(())
        })
    })
}

// ============================================================
// Linear blend
// ============================================================

/// Per-pixel weighted blend:
/// `result = (w1·img1 + w2·img2) / (w1 + w2 + 1e-5)`.
///
/// Images are U8 or F32 with 1–4 channels and share one type; weights are
/// F32C1 of the same size.
pub fn blend_linear(
    img1: &GpuMat,
    img2: &GpuMat,
    weights1: &GpuMat,
    weights2: &GpuMat,
    result: &mut GpuMat,
    stream: Option<&Stream>,
) -> Result<()> {
    let inputs = [img1.handle(), img2.handle(), weights1.handle(), weights2.handle()];
    let output = result.output_handle();
    launch(stream, move || {
        let [a, b, wa, wb] = &inputs;
        let blended = blend(&a.read()?, &b.read()?, &wa.read()?, &wb.read()?)?;
        output.write(&blended)
    })
}

fn blend(a: &Mat, b: &Mat, wa: &Mat, wb: &Mat) -> Result<Mat> {
    for m in [a, b, wa, wb] {
        require_non_empty("blend_linear", m)?;
    }
    if !matches!(a.depth(), Depth::U8 | Depth::F32) {
        return Err(Error::type_mismatch("blend_linear", "U8 or F32 image", a.mat_type()));
    }
    require_type("blend_linear", b, a.mat_type())?;
    require_type("blend_linear", wa, MatType::F32C1)?;
    require_type("blend_linear", wb, MatType::F32C1)?;
    for m in [b, wa, wb] {
        require_same_size("blend_linear", a, m)?;
    }

    let cn = a.channels();
    let (pa, pb) = (a.to_f64_vec(), b.to_f64_vec());
    let (w1, w2) = (wa.to_vec::<f32>(), wb.to_vec::<f32>());
    let out: Vec<f64> = pa
        .iter()
        .zip(&pb)
        .enumerate()
        .map(|(i, (&x1, &x2))| {
            let (k1, k2) = (w1[i / cn] as f64, w2[i / cn] as f64);
            (k1 * x1 + k2 * x2) / (k1 + k2 + 1e-5)
        })
        .collect();
    Mat::from_f64_slice(a.rows(), a.cols(), a.mat_type(), &out)
}
