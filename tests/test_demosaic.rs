// tests/test_demosaic.rs — Integration tests for Bayer demosaicing.

use gpu_imgproc::imgproc::{demosaicing, demosaicing_async};
use gpu_imgproc::{BayerPattern, DemosaicCode, DemosaicOutput, Error, GpuMat, Mat, MatType, Stream};

/// BGR image with slowly varying channels.
fn smooth_bgr(rows: usize, cols: usize) -> Mat {
    let mut m = Mat::zeros(rows, cols, MatType::U8C3);
    for y in 0..rows {
        for x in 0..cols {
            m.set(y, x, 0, (40 + 2 * x) as u8);
            m.set(y, x, 1, (100 + y) as u8);
            m.set(y, x, 2, (200 - x - y) as u8);
        }
    }
    m
}

#[test]
fn output_layouts_follow_the_code() {
    let raw = GpuMat::from_mat(&BayerPattern::Rg.mosaic(&smooth_bgr(8, 10)).unwrap()).unwrap();
    let cases = [
        (DemosaicOutput::Bgr, MatType::U8C3),
        (DemosaicOutput::Rgb, MatType::U8C3),
        (DemosaicOutput::Bgra, MatType::U8C4),
        (DemosaicOutput::Rgba, MatType::U8C4),
        (DemosaicOutput::Gray, MatType::U8C1),
    ];
    for (output, ty) in cases {
        let mut dst = GpuMat::new();
        demosaicing(&raw, &mut dst, DemosaicCode::new(BayerPattern::Rg, output)).unwrap();
        assert_eq!((dst.rows(), dst.cols(), dst.mat_type()), (8, 10, ty), "{output:?}");
    }
}

#[test]
fn interior_of_linear_ramp_is_reconstructed() {
    // Bilinear interpolation is exact on linear ramps away from the border,
    // up to rounding.
    let bgr = smooth_bgr(12, 12);
    for pattern in BayerPattern::ALL {
        let raw = GpuMat::from_mat(&pattern.mosaic(&bgr).unwrap()).unwrap();
        let mut dst = GpuMat::new();
        demosaicing(&raw, &mut dst, DemosaicCode::new(pattern, DemosaicOutput::Bgr)).unwrap();
        let out = dst.to_mat().unwrap();
        for y in 1..11 {
            for x in 1..11 {
                for c in 0..3 {
                    let diff = out.at::<u8>(y, x, c) as i32 - bgr.at::<u8>(y, x, c) as i32;
                    assert!(diff.abs() <= 1, "{pattern:?} ({x},{y}) ch{c}: diff {diff}");
                }
            }
        }
    }
}

#[test]
fn rgb_is_bgr_reversed() {
    let raw = GpuMat::from_mat(&BayerPattern::Gb.mosaic(&smooth_bgr(6, 6)).unwrap()).unwrap();
    let mut bgr = GpuMat::new();
    let mut rgb = GpuMat::new();
    demosaicing(&raw, &mut bgr, DemosaicCode::new(BayerPattern::Gb, DemosaicOutput::Bgr)).unwrap();
    demosaicing(&raw, &mut rgb, DemosaicCode::new(BayerPattern::Gb, DemosaicOutput::Rgb)).unwrap();
    let (bgr, rgb) = (bgr.to_mat().unwrap(), rgb.to_mat().unwrap());
    for (a, b) in bgr.as_bytes().chunks_exact(3).zip(rgb.as_bytes().chunks_exact(3)) {
        assert_eq!([a[2], a[1], a[0]], [b[0], b[1], b[2]]);
    }
}

#[test]
fn async_demosaic_matches_sync() {
    let raw = GpuMat::from_mat(&BayerPattern::Bg.mosaic(&smooth_bgr(16, 16)).unwrap()).unwrap();
    let code = DemosaicCode::new(BayerPattern::Bg, DemosaicOutput::Bgra);
    let mut sync_out = GpuMat::new();
    demosaicing(&raw, &mut sync_out, code).unwrap();

    let stream = Stream::new().unwrap();
    let mut async_out = GpuMat::new();
    demosaicing_async(&raw, &mut async_out, code, &stream).unwrap();
    stream.wait_for_completion().unwrap();
    assert_eq!(sync_out.to_mat().unwrap(), async_out.to_mat().unwrap());
}

#[test]
fn colour_input_is_rejected() {
    let src = GpuMat::from_mat(&smooth_bgr(4, 4)).unwrap();
    let mut dst = GpuMat::new();
    let err = demosaicing(&src, &mut dst, DemosaicCode::new(BayerPattern::Gr, DemosaicOutput::Bgr)).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}
