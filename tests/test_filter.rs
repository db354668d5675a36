// tests/test_filter.rs — Integration tests for the bilateral and mean-shift filters.

use gpu_imgproc::imgproc::{bilateral_filter, mean_shift_filtering, mean_shift_proc, mean_shift_segmentation};
use gpu_imgproc::{BorderMode, Error, GpuMat, Mat, MatType, Stream, TermCriteria};

/// Four flat quadrants with slight noise, U8C4.
fn quadrants(size: usize) -> Mat {
    let tones = [[30u8, 30, 30], [200, 60, 60], [60, 200, 60], [60, 60, 200]];
    let mut m = Mat::zeros(size, size, MatType::U8C4);
    for y in 0..size {
        for x in 0..size {
            let q = (y >= size / 2) as usize * 2 + (x >= size / 2) as usize;
            let jitter = ((x * 7 + y * 3) % 3) as u8;
            for c in 0..3 {
                m.set(y, x, c, tones[q][c] + jitter);
            }
            m.set(y, x, 3, 255u8);
        }
    }
    m
}

// ===== Bilateral =====

#[test]
fn bilateral_smooths_noise_but_keeps_edges() {
    let src_mat = quadrants(16);
    // Bilateral needs 1, 3 or 4 channels; use the image as-is.
    let src = GpuMat::from_mat(&src_mat).unwrap();
    let mut dst = GpuMat::new();
    bilateral_filter(&src, &mut dst, 5, 20.0, 3.0, BorderMode::Reflect101, None).unwrap();
    let out = dst.to_mat().unwrap();
    assert_eq!(out.mat_type(), MatType::U8C4);

    // Quadrant colours survive within the jitter range.
    assert!((out.at::<u8>(2, 2, 0) as i32 - 31).abs() <= 1);
    assert!((out.at::<u8>(2, 13, 0) as i32 - 201).abs() <= 1);
    assert!((out.at::<u8>(13, 13, 2) as i32 - 201).abs() <= 1);
}

#[test]
fn bilateral_parameter_validation() {
    let src = GpuMat::from_mat(&quadrants(4)).unwrap();
    let mut dst = GpuMat::new();
    assert!(matches!(
        bilateral_filter(&src, &mut dst, 3, 0.0, 1.0, BorderMode::Reflect101, None),
        Err(Error::InvalidParameter { .. })
    ));
    assert!(matches!(
        bilateral_filter(&src, &mut dst, 3, 1.0, f32::NAN, BorderMode::Reflect101, None),
        Err(Error::InvalidParameter { .. })
    ));
}

// ===== Mean shift =====

#[test]
fn mean_shift_filtering_flattens_quadrants() {
    let src = GpuMat::from_mat(&quadrants(12)).unwrap();
    let mut dst = GpuMat::new();
    mean_shift_filtering(&src, &mut dst, 3, 20, TermCriteria::default(), None).unwrap();
    let out = dst.to_mat().unwrap();
    assert_eq!(out.mat_type(), MatType::U8C4);
    for y in 0..12 {
        for x in 0..12 {
            let expected = if x >= 6 && y < 6 { 200 } else if x < 6 && y < 6 { 30 } else { 60 };
            let b = out.at::<u8>(y, x, 0) as i32;
            assert!((b - expected).abs() <= 2, "({x},{y}): {b} vs {expected}");
        }
    }
}

#[test]
fn mean_shift_proc_reports_positions() {
    let src = GpuMat::from_mat(&quadrants(10)).unwrap();
    let mut colors = GpuMat::new();
    let mut positions = GpuMat::new();
    let stream = Stream::new().unwrap();
    mean_shift_proc(&src, &mut colors, &mut positions, 2, 20, TermCriteria::count(10), Some(&stream)).unwrap();
    stream.wait_for_completion().unwrap();

    assert_eq!(colors.mat_type(), MatType::U8C4);
    let pos = positions.to_mat().unwrap();
    assert_eq!((pos.rows(), pos.cols(), pos.mat_type()), (10, 10, MatType::S16C2));
    // Positions stay inside the pixel's own quadrant.
    for y in 0..10 {
        for x in 0..10 {
            let (px, py) = (pos.at::<i16>(y, x, 0) as usize, pos.at::<i16>(y, x, 1) as usize);
            assert_eq!((px >= 5, py >= 5), (x >= 5, y >= 5), "({x},{y}) → ({px},{py})");
        }
    }
}

#[test]
fn segmentation_yields_four_regions() {
    let src = GpuMat::from_mat(&quadrants(12)).unwrap();
    let mut dst = GpuMat::new();
    mean_shift_segmentation(&src, &mut dst, 12, 20, 4, TermCriteria::default(), None).unwrap();
    let out = dst.to_mat().unwrap();
    let mut colours: Vec<[u8; 3]> = out
        .as_bytes()
        .chunks_exact(4)
        .map(|p| [p[0], p[1], p[2]])
        .collect();
    colours.sort();
    colours.dedup();
    assert_eq!(colours.len(), 4, "{colours:?}");
}

#[test]
fn mean_shift_requires_four_channels() {
    let src = GpuMat::from_mat(&Mat::zeros(4, 4, MatType::U8C3)).unwrap();
    let mut dst = GpuMat::new();
    assert!(matches!(
        mean_shift_filtering(&src, &mut dst, 2, 10, TermCriteria::default(), None),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(
        mean_shift_filtering(&src, &mut dst, 0, 10, TermCriteria::default(), None),
        Err(Error::InvalidParameter { .. })
    ));
}
