// tests/test_color.rs — Integration tests for colour operations.

use gpu_imgproc::imgproc::{alpha_comp, blend_linear, gamma_correction, swap_channels};
use gpu_imgproc::{AlphaCompOp, Error, GpuMat, Mat, MatType, Stream};

fn bgra(rows: usize, cols: usize, px: [u8; 4]) -> Mat {
    let data: Vec<u8> = (0..rows * cols).flat_map(|_| px).collect();
    Mat::from_slice(rows, cols, 4, &data).unwrap()
}

// ===== Alpha composition =====

#[test]
fn over_with_half_transparent_source() {
    let a = GpuMat::from_mat(&bgra(2, 2, [200, 0, 0, 128])).unwrap();
    let b = GpuMat::from_mat(&bgra(2, 2, [0, 0, 200, 255])).unwrap();
    let mut dst = GpuMat::new();
    alpha_comp(&a, &b, &mut dst, AlphaCompOp::Over, None).unwrap();
    let out = dst.to_mat().unwrap();
    // 200·(128/255) = 100.4; 200·1·(1 − 128/255) = 99.6
    assert_eq!(&out.as_bytes()[..4], &[100, 0, 100, 255]);
}

#[test]
fn xor_of_two_opaque_images_is_empty() {
    let a = GpuMat::from_mat(&bgra(1, 3, [10, 20, 30, 255])).unwrap();
    let b = GpuMat::from_mat(&bgra(1, 3, [40, 50, 60, 255])).unwrap();
    let mut dst = GpuMat::new();
    alpha_comp(&a, &b, &mut dst, AlphaCompOp::Xor, None).unwrap();
    assert!(dst.to_mat().unwrap().as_bytes().iter().all(|&v| v == 0));
}

#[test]
fn alpha_comp_requires_matching_inputs() {
    let a = GpuMat::from_mat(&bgra(2, 2, [0; 4])).unwrap();
    let b = GpuMat::from_mat(&bgra(2, 3, [0; 4])).unwrap();
    let mut dst = GpuMat::new();
    assert!(matches!(
        alpha_comp(&a, &b, &mut dst, AlphaCompOp::Atop, None),
        Err(Error::ShapeMismatch { .. })
    ));
}

// ===== Gamma =====

#[test]
fn gamma_round_trip_is_close() {
    let src_mat = bgra(4, 4, [30, 90, 180, 77]);
    let src = GpuMat::from_mat(&src_mat).unwrap();
    let mut encoded = GpuMat::new();
    let mut decoded = GpuMat::new();
    gamma_correction(&src, &mut encoded, true, None).unwrap();
    gamma_correction(&encoded, &mut decoded, false, None).unwrap();
    let out = decoded.to_mat().unwrap();
    for (o, i) in out.as_bytes().chunks_exact(4).zip(src_mat.as_bytes().chunks_exact(4)) {
        for c in 0..3 {
            assert!((o[c] as i32 - i[c] as i32).abs() <= 2, "{o:?} vs {i:?}");
        }
        assert_eq!(o[3], 77, "alpha is untouched");
    }
}

#[test]
fn gamma_rejects_single_channel() {
    let src = GpuMat::from_mat(&Mat::zeros(2, 2, MatType::U8C1)).unwrap();
    let mut dst = GpuMat::new();
    assert!(matches!(gamma_correction(&src, &mut dst, true, None), Err(Error::TypeMismatch { .. })));
}

// ===== Channel swap =====

#[test]
fn swap_channels_in_place() {
    let mut img = GpuMat::from_mat(&bgra(3, 3, [1, 2, 3, 4])).unwrap();
    swap_channels(&mut img, [2, 1, 0, 3], None).unwrap();
    assert_eq!(&img.to_mat().unwrap().as_bytes()[..4], &[3, 2, 1, 4]);

    let stream = Stream::new().unwrap();
    swap_channels(&mut img, [3, 3, 3, 3], Some(&stream)).unwrap();
    stream.wait_for_completion().unwrap();
    assert_eq!(&img.to_mat().unwrap().as_bytes()[..4], &[4, 4, 4, 4]);
}

#[test]
fn swap_channels_validates_order() {
    let mut img = GpuMat::from_mat(&bgra(1, 1, [0; 4])).unwrap();
    assert!(matches!(swap_channels(&mut img, [0, 1, 2, 4], None), Err(Error::InvalidParameter { .. })));
    assert!(matches!(swap_channels(&mut img, [-1, 1, 2, 3], None), Err(Error::InvalidParameter { .. })));
}

// ===== Linear blend =====

#[test]
fn blend_with_equal_weights_averages() {
    let a = GpuMat::from_mat(&Mat::filled(4, 4, 3, 40u8).unwrap()).unwrap();
    let b = GpuMat::from_mat(&Mat::filled(4, 4, 3, 120u8).unwrap()).unwrap();
    let w = GpuMat::from_mat(&Mat::filled(4, 4, 1, 0.5f32).unwrap()).unwrap();
    let mut dst = GpuMat::new();
    blend_linear(&a, &b, &w, &w, &mut dst, None).unwrap();
    let out = dst.to_mat().unwrap();
    assert_eq!(out.mat_type(), MatType::U8C3);
    assert!(out.as_bytes().iter().all(|&v| v == 80));
}

#[test]
fn blend_rejects_wrong_weight_type() {
    let a = GpuMat::from_mat(&Mat::filled(2, 2, 1, 1u8).unwrap()).unwrap();
    let w = GpuMat::from_mat(&Mat::filled(2, 2, 1, 1u8).unwrap()).unwrap();
    let mut dst = GpuMat::new();
    assert!(matches!(
        blend_linear(&a, &a, &w, &w, &mut dst, None),
        Err(Error::TypeMismatch { .. })
    ));
}
