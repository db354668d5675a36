// demosaic.rs — Bayer demosaicing (bilinear).
//
// A Bayer sensor records one colour per photosite in a repeating 2×2 tile.
// The pattern names the tile, and each pattern is a fixed table indexed by
// (y % 2, x % 2) holding the BGR channel index recorded there:
//
//   Bg:  R G      Gb:  G R      Rg:  B G      Gr:  G B
//        G B           B G           G R           R G
//
// Bilinear reconstruction: a pixel keeps its own recorded colour; each
// missing colour is the rounded mean of the same-colour samples in its 3×3
// neighbourhood (Reflect101 border, which preserves the tile parity):
//
//   value = (Σ samples + count/2) / count
//
// Gray output uses the fixed-point BT.601 luma of the reconstructed pixel:
//
//   Y = (R·4899 + G·9617 + B·1868 + 2¹³) >> 14

use crate::border::BorderMode;
use crate::error::{Error, Result};
use crate::gpu_mat::GpuMat;
use crate::imgproc::{require_non_empty, require_type, run_unary};
use crate::mat::{Mat, MatType};
use crate::stream::Stream;

const B: usize = 0;
const G: usize = 1;
const R: usize = 2;

/// Colour filter array layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BayerPattern {
    Bg,
    Gb,
    Rg,
    Gr,
}

impl BayerPattern {
    pub const ALL: [BayerPattern; 4] = [BayerPattern::Bg, BayerPattern::Gb, BayerPattern::Rg, BayerPattern::Gr];

    /// BGR channel index recorded at each position of the 2×2 tile.
    const fn table(self) -> [[usize; 2]; 2] {
        match self {
            BayerPattern::Bg => [[R, G], [G, B]],
            BayerPattern::Gb => [[G, R], [B, G]],
            BayerPattern::Rg => [[B, G], [G, R]],
            BayerPattern::Gr => [[G, B], [R, G]],
        }
    }

    /// BGR channel index recorded at pixel (x, y).
    #[inline]
    pub fn channel_at(self, x: usize, y: usize) -> usize {
        self.table()[y % 2][x % 2]
    }

    /// Sample a U8C3 BGR image through this pattern, producing the U8C1 raw
    /// image a sensor with this filter layout would record.
    pub fn mosaic(self, bgr: &Mat) -> Result<Mat> {
        require_non_empty("mosaic", bgr)?;
        require_type("mosaic", bgr, MatType::U8C3)?;
        let mut raw = Mat::zeros(bgr.rows(), bgr.cols(), MatType::U8C1);
        for y in 0..bgr.rows() {
            for x in 0..bgr.cols() {
                raw.set(y, x, 0, bgr.at::<u8>(y, x, self.channel_at(x, y)));
            }
        }
        Ok(raw)
    }
}

/// Layout of the reconstructed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemosaicOutput {
    Bgr,
    Rgb,
    Bgra,
    Rgba,
    Gray,
}

impl DemosaicOutput {
    pub fn mat_type(self) -> MatType {
        match self {
            DemosaicOutput::Bgr | DemosaicOutput::Rgb => MatType::U8C3,
            DemosaicOutput::Bgra | DemosaicOutput::Rgba => MatType::U8C4,
            DemosaicOutput::Gray => MatType::U8C1,
        }
    }
}

/// Input pattern plus output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DemosaicCode {
    pub pattern: BayerPattern,
    pub output: DemosaicOutput,
}

impl DemosaicCode {
    pub const fn new(pattern: BayerPattern, output: DemosaicOutput) -> Self {
        DemosaicCode { pattern, output }
    }
}

/// Demosaic a U8C1 Bayer image synchronously.
pub fn demosaicing(src: &GpuMat, dst: &mut GpuMat, code: DemosaicCode) -> Result<()> {
    run_unary(src, dst, None, move |src| demosaic(src, code))
}

/// Enqueue [`demosaicing`] on `stream`.
pub fn demosaicing_async(src: &GpuMat, dst: &mut GpuMat, code: DemosaicCode, stream: &Stream) -> Result<()> {
    run_unary(src, dst, Some(stream), move |src| demosaic(src, code))
}

pub(crate) fn demosaic(src: &Mat, code: DemosaicCode) -> Result<Mat> {
    require_non_empty("demosaicing", src)?;
    require_type("demosaicing", src, MatType::U8C1)?;
    if src.rows() < 2 || src.cols() < 2 {
        return Err(Error::shape("demosaicing", "at least 2x2", src.layout()));
    }

    let (h, w) = (src.rows(), src.cols());
    let raw = src.as_bytes();
    let border = BorderMode::Reflect101;
    let out_ty = code.output.mat_type();
    let mut out = Mat::zeros(h, w, out_ty);

    for y in 0..h {
        for x in 0..w {
            let own = code.pattern.channel_at(x, y);
            let mut sum = [0u32; 3];
            let mut count = [0u32; 3];
            for dy in -1isize..=1 {
                // Reflect101 never fails for len >= 2.
                let Some(sy) = border.interpolate(y as isize + dy, h) else { continue };
                for dx in -1isize..=1 {
                    let Some(sx) = border.interpolate(x as isize + dx, w) else { continue };
                    let c = code.pattern.channel_at(sx, sy);
                    sum[c] += raw[sy * w + sx] as u32;
                    count[c] += 1;
                }
            }

            let mut bgr = [0u32; 3];
            for c in [B, G, R] {
                bgr[c] = if c == own {
                    raw[y * w + x] as u32
                } else if count[c] > 0 {
                    (sum[c] + count[c] / 2) / count[c]
                } else {
                    0
                };
            }

            match code.output {
                DemosaicOutput::Bgr | DemosaicOutput::Bgra => {
                    for c in 0..3 {
                        out.set(y, x, c, bgr[c] as u8);
                    }
                }
                DemosaicOutput::Rgb | DemosaicOutput::Rgba => {
                    for c in 0..3 {
                        out.set(y, x, c, bgr[2 - c] as u8);
                    }
                }
                DemosaicOutput::Gray => {
                    let luma = (bgr[R] * 4899 + bgr[G] * 9617 + bgr[B] * 1868 + 8192) >> 14;
                    out.set(y, x, 0, luma.min(255) as u8);
                }
            }
            if out_ty.channels() == 4 {
                out.set(y, x, 3, 255u8);
            }
        }
    }
    Ok(out)
}
