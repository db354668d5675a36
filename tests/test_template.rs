// tests/test_template.rs — Integration tests for template matching.

use gpu_imgproc::{Depth, Error, GpuMat, Mat, MatType, Stream, TemplateMatching, TemplateMethod};

/// Smooth but non-repeating texture.
fn texture(rows: usize, cols: usize) -> Mat {
    let data: Vec<u8> = (0..rows * cols)
        .map(|i| {
            let (x, y) = ((i % cols) as f32, (i / cols) as f32);
            (127.0 + 60.0 * (x * 0.37).sin() + 50.0 * (y * 0.23 + x * 0.05).cos()) as u8
        })
        .collect();
    Mat::from_slice(rows, cols, 1, &data).unwrap()
}

fn crop(m: &Mat, x0: usize, y0: usize, w: usize, h: usize) -> Mat {
    let mut out = Mat::zeros(h, w, m.mat_type());
    for y in 0..h {
        for x in 0..w {
            out.set(y, x, 0, m.at::<u8>(y0 + y, x0 + x, 0));
        }
    }
    out
}

#[test]
fn exact_copy_scores_at_least_095() {
    let image = texture(60, 80);
    let templ = crop(&image, 31, 17, 12, 10);

    let img_buf = GpuMat::from_mat(&image).unwrap();
    let tpl_buf = GpuMat::from_mat(&templ).unwrap();
    let mut result = GpuMat::new();
    TemplateMatching::new(Depth::U8, TemplateMethod::CCoeffNormed)
        .unwrap()
        .match_template(&img_buf, &tpl_buf, &mut result)
        .unwrap();

    let scores = result.to_mat().unwrap();
    assert_eq!((scores.rows(), scores.cols(), scores.mat_type()), (51, 69, MatType::F32C1));
    let mm = scores.min_max_loc().unwrap();
    assert!(mm.max_val >= 0.95, "best score {}", mm.max_val);
    assert_eq!(mm.max_loc, (31, 17));
}

#[test]
fn every_method_locates_the_copy() {
    let image = texture(40, 40);
    let templ = crop(&image, 9, 22, 8, 8);
    let img_buf = GpuMat::from_mat(&image).unwrap();
    let tpl_buf = GpuMat::from_mat(&templ).unwrap();

    for method in [TemplateMethod::SqDiff, TemplateMethod::SqDiffNormed, TemplateMethod::CCoeffNormed] {
        let mut result = GpuMat::new();
        TemplateMatching::new(Depth::U8, method)
            .unwrap()
            .match_template(&img_buf, &tpl_buf, &mut result)
            .unwrap();
        let mm = result.to_mat().unwrap().min_max_loc().unwrap();
        let best = match method {
            TemplateMethod::SqDiff | TemplateMethod::SqDiffNormed => mm.min_loc,
            _ => mm.max_loc,
        };
        assert_eq!(best, (9, 22), "{method:?}");
    }
}

#[test]
fn float_images_are_supported() {
    let image = Mat::from_f64_slice(
        20,
        20,
        MatType::F32C1,
        &texture(20, 20).to_f64_vec().iter().map(|v| v / 255.0).collect::<Vec<_>>(),
    )
    .unwrap();
    let mut templ = Mat::zeros(5, 5, MatType::F32C1);
    for y in 0..5 {
        for x in 0..5 {
            templ.set(y, x, 0, image.at::<f32>(y + 3, x + 4, 0));
        }
    }
    let stream = Stream::new().unwrap();
    let mut result = GpuMat::new();
    TemplateMatching::new(Depth::F32, TemplateMethod::CCorrNormed)
        .unwrap()
        .match_template_async(
            &GpuMat::from_mat(&image).unwrap(),
            &GpuMat::from_mat(&templ).unwrap(),
            &mut result,
            &stream,
        )
        .unwrap();
    stream.wait_for_completion().unwrap();
    let mm = result.to_mat().unwrap().min_max_loc().unwrap();
    assert!(mm.max_val > 0.999);
}

#[test]
fn mismatched_depth_and_oversized_template_fail() {
    let matcher = TemplateMatching::new(Depth::U8, TemplateMethod::CCorr).unwrap();
    let mut result = GpuMat::new();

    let f32_img = GpuMat::from_mat(&Mat::zeros(10, 10, MatType::F32C1)).unwrap();
    let u8_tpl = GpuMat::from_mat(&Mat::zeros(3, 3, MatType::U8C1)).unwrap();
    assert!(matches!(
        matcher.match_template(&f32_img, &u8_tpl, &mut result),
        Err(Error::TypeMismatch { .. })
    ));

    let small = GpuMat::from_mat(&Mat::zeros(4, 4, MatType::U8C1)).unwrap();
    let big = GpuMat::from_mat(&Mat::zeros(5, 3, MatType::U8C1)).unwrap();
    assert!(matches!(
        matcher.match_template(&small, &big, &mut result),
        Err(Error::ShapeMismatch { .. })
    ));
}
