// template.rs — Template matching.
//
// For every placement (x, y) of the template T (w × h) over the image I, with
// I' / T' the mean-subtracted window and template:
//
//   SqDiff        Σ (T − I)²
//   SqDiffNormed  Σ (T − I)² / sqrt(Σ T² · Σ I²)
//   CCorr         Σ T · I
//   CCorrNormed   Σ T · I / sqrt(Σ T² · Σ I²)
//   CCoeff        Σ T' · I'
//   CCoeffNormed  Σ T' · I' / sqrt(Σ T'² · Σ I'²)
//
// Sums are accumulated in f64 and stored as f32. A normalised score whose
// denominator is (numerically) zero resolves to ±1 when the numerator is
// within 12.5% of it, else to 0 (1 for SqDiffNormed).

use crate::error::{Error, Result};
use crate::gpu_mat::GpuMat;
use crate::imgproc::{require_non_empty, run_binary};
use crate::mat::{Depth, Mat, MatType};
use crate::stream::Stream;

/// Match score definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateMethod {
    SqDiff,
    SqDiffNormed,
    CCorr,
    CCorrNormed,
    CCoeff,
    CCoeffNormed,
}

/// Template matcher for one element depth and method.
///
/// Image and template must be single-channel of the configured depth
/// (`U8` or `F32`). Output: `F32C1` of size `(H − h + 1) × (W − w + 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatching {
    depth: Depth,
    method: TemplateMethod,
}

impl TemplateMatching {
    pub fn new(depth: Depth, method: TemplateMethod) -> Result<Self> {
        if !matches!(depth, Depth::U8 | Depth::F32) {
            return Err(Error::invalid("depth", format!("{depth} is not supported (U8 or F32)")));
        }
        Ok(TemplateMatching { depth, method })
    }

    pub fn method(&self) -> TemplateMethod {
        self.method
    }

    pub fn match_template(&self, image: &GpuMat, templ: &GpuMat, result: &mut GpuMat) -> Result<()> {
        self.launch(image, templ, result, None)
    }

    pub fn match_template_async(
        &self,
        image: &GpuMat,
        templ: &GpuMat,
        result: &mut GpuMat,
        stream: &Stream,
    ) -> Result<()> {
        self.launch(image, templ, result, Some(stream))
    }

    fn launch(&self, image: &GpuMat, templ: &GpuMat, result: &mut GpuMat, stream: Option<&Stream>) -> Result<()> {
        let matcher = *self;
        run_binary(image, templ, result, stream, move |image, templ| matcher.apply(image, templ))
    }

    pub(crate) fn apply(&self, image: &Mat, templ: &Mat) -> Result<Mat> {
        require_non_empty("match_template", image)?;
        require_non_empty("match_template", templ)?;
        let expected = MatType::new(self.depth, 1);
        for m in [image, templ] {
            if m.mat_type() != expected {
                return Err(Error::type_mismatch("match_template", expected.to_string(), m.mat_type()));
            }
        }
        if templ.rows() > image.rows() || templ.cols() > image.cols() {
            return Err(Error::shape(
                "match_template",
                format!("template no larger than {}x{}", image.rows(), image.cols()),
                format!("{}x{}", templ.rows(), templ.cols()),
            ));
        }

        let (ih, iw) = (image.rows(), image.cols());
        let (th, tw) = (templ.rows(), templ.cols());
        let img = image.to_f64_vec();
        let tpl = templ.to_f64_vec();
        let n = (th * tw) as f64;

        let t_sum: f64 = tpl.iter().sum();
        let t_mean = t_sum / n;
        let t_sq: f64 = tpl.iter().map(|v| v * v).sum();
        let t_var = (t_sq - t_sum * t_mean).max(0.0);
        let centred: Vec<f64> = tpl.iter().map(|v| v - t_mean).collect();

        let (rh, rw) = (ih - th + 1, iw - tw + 1);
        let mut out = Vec::with_capacity(rh * rw);
        for y in 0..rh {
            for x in 0..rw {
                let mut cross = 0.0;
                let mut cross_centred = 0.0;
                let mut w_sum = 0.0;
                let mut w_sq = 0.0;
                for ty in 0..th {
                    let row = (y + ty) * iw + x;
                    for tx in 0..tw {
                        let iv = img[row + tx];
                        cross += tpl[ty * tw + tx] * iv;
                        cross_centred += centred[ty * tw + tx] * iv;
                        w_sum += iv;
                        w_sq += iv * iv;
                    }
                }
                let score = match self.method {
                    TemplateMethod::SqDiff => t_sq - 2.0 * cross + w_sq,
                    TemplateMethod::SqDiffNormed => {
                        normalise(t_sq - 2.0 * cross + w_sq, (t_sq * w_sq).sqrt(), true)
                    }
                    TemplateMethod::CCorr => cross,
                    TemplateMethod::CCorrNormed => normalise(cross, (t_sq * w_sq).sqrt(), false),
                    TemplateMethod::CCoeff => cross_centred,
                    TemplateMethod::CCoeffNormed => {
                        let w_var = (w_sq - w_sum * w_sum / n).max(0.0);
                        normalise(cross_centred, (t_var * w_var).sqrt(), false)
                    }
                };
                out.push(score.max(if self.is_sqdiff() { 0.0 } else { f64::MIN }) as f32);
            }
        }
        Mat::from_slice(rh, rw, 1, &out)
    }

    fn is_sqdiff(&self) -> bool {
        matches!(self.method, TemplateMethod::SqDiff | TemplateMethod::SqDiffNormed)
    }
}

fn normalise(num: f64, denom: f64, sqdiff: bool) -> f64 {
    if num.abs() < denom {
        num / denom
    } else if num.abs() < denom * 1.125 {
        if num > 0.0 {
            1.0
        } else {
            -1.0
        }
    } else if sqdiff {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(rows: usize, cols: usize) -> Mat {
        let data: Vec<u8> = (0..rows * cols).map(|i| ((i * 37) % 251) as u8).collect();
        Mat::from_slice(rows, cols, 1, &data).unwrap()
    }

    fn crop(m: &Mat, y0: usize, x0: usize, h: usize, w: usize) -> Mat {
        let mut out = Mat::zeros(h, w, m.mat_type());
        for y in 0..h {
            for x in 0..w {
                out.set(y, x, 0, m.at::<u8>(y0 + y, x0 + x, 0));
            }
        }
        out
    }

    #[test]
    fn test_rejects_unsupported_depth() {
        assert!(TemplateMatching::new(Depth::S16, TemplateMethod::CCorr).is_err());
    }

    #[test]
    fn test_output_size() {
        let tm = TemplateMatching::new(Depth::U8, TemplateMethod::SqDiff).unwrap();
        let out = tm.apply(&ramp(20, 30), &ramp(5, 7)).unwrap();
        assert_eq!((out.rows(), out.cols(), out.mat_type()), (16, 24, MatType::F32C1));
    }

    #[test]
    fn test_sqdiff_zero_at_match() {
        let img = ramp(20, 20);
        let tpl = crop(&img, 6, 9, 5, 5);
        let tm = TemplateMatching::new(Depth::U8, TemplateMethod::SqDiff).unwrap();
        let out = tm.apply(&img, &tpl).unwrap();
        let mm = out.min_max_loc().unwrap();
        assert_eq!(mm.min_val, 0.0);
        assert_eq!(mm.min_loc, (9, 6));
    }

    #[test]
    fn test_ccoeff_normed_peak() {
        let img = ramp(24, 24);
        let tpl = crop(&img, 3, 11, 6, 6);
        let tm = TemplateMatching::new(Depth::U8, TemplateMethod::CCoeffNormed).unwrap();
        let out = tm.apply(&img, &tpl).unwrap();
        let mm = out.min_max_loc().unwrap();
        assert!(mm.max_val > 0.999, "max {}", mm.max_val);
        assert_eq!(mm.max_loc, (11, 3));
    }

    #[test]
    fn test_flat_window_normalisation() {
        // Constant image and template: CCoeffNormed has 0/0 everywhere.
        let img = Mat::filled(5, 5, 1, 9u8).unwrap();
        let tpl = Mat::filled(2, 2, 1, 9u8).unwrap();
        let tm = TemplateMatching::new(Depth::U8, TemplateMethod::CCoeffNormed).unwrap();
        let out = tm.apply(&img, &tpl).unwrap();
        assert!(out.to_vec::<f32>().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_type_and_shape_errors() {
        let tm = TemplateMatching::new(Depth::U8, TemplateMethod::CCorr).unwrap();
        let f32_img = Mat::zeros(5, 5, MatType::F32C1);
        assert!(matches!(tm.apply(&f32_img, &ramp(2, 2)), Err(Error::TypeMismatch { .. })));
        assert!(matches!(tm.apply(&ramp(3, 3), &ramp(4, 2)), Err(Error::ShapeMismatch { .. })));
        assert!(matches!(tm.apply(&Mat::empty(), &ramp(2, 2)), Err(Error::EmptyInput { .. })));
    }
}
