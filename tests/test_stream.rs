// tests/test_stream.rs — Integration tests for the stream execution contract.

use gpu_imgproc::imgproc::{calc_hist, equalize_hist};
use gpu_imgproc::{CannyEdgeDetector, Device, Error, GpuMat, Mat, MatType, Stream};

fn noise(rows: usize, cols: usize, seed: u32) -> Mat {
    let mut state = seed;
    let data: Vec<u8> = (0..rows * cols)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect();
    Mat::from_slice(rows, cols, 1, &data).unwrap()
}

// ===== Draining =====

#[test]
fn draining_an_idle_stream_returns_immediately() {
    let stream = Stream::new().unwrap();
    assert!(stream.query());
    stream.wait_for_completion().unwrap();
    stream.wait_for_completion().unwrap();
}

#[test]
fn wait_covers_all_enqueued_work() {
    let stream = Stream::new().unwrap();
    let src = GpuMat::from_mat(&noise(64, 64, 1)).unwrap();
    let mut outputs: Vec<GpuMat> = (0..10).map(|_| GpuMat::new()).collect();
    for out in &mut outputs {
        equalize_hist(&src, out, Some(&stream)).unwrap();
    }
    stream.wait_for_completion().unwrap();
    assert!(stream.query());
    for out in &outputs {
        assert_eq!((out.rows(), out.cols()), (64, 64));
    }
}

#[test]
fn dependent_operations_run_in_order() {
    // Each step reads the previous step's output buffer.
    let stream = Stream::new().unwrap();
    let mut src = GpuMat::new();
    let mut equalized = GpuMat::new();
    let mut hist = GpuMat::new();
    src.upload_async(&noise(32, 32, 7), &stream).unwrap();
    equalize_hist(&src, &mut equalized, Some(&stream)).unwrap();
    calc_hist(&equalized, &mut hist, Some(&stream)).unwrap();
    let pending = hist.download_async(&stream);
    stream.wait_for_completion().unwrap();

    let counts = pending.wait().unwrap();
    assert_eq!((counts.rows(), counts.cols(), counts.mat_type()), (1, 256, MatType::S32C1));
    assert_eq!(counts.to_vec::<i32>().iter().sum::<i32>(), 32 * 32);
}

// ===== Errors =====

#[test]
fn stream_errors_surface_at_wait() {
    let stream = Stream::new().unwrap();
    let wrong_type = GpuMat::from_mat(&Mat::zeros(8, 8, MatType::F32C1)).unwrap();
    let mut edges = GpuMat::new();
    let canny = CannyEdgeDetector::new(10.0, 30.0).unwrap();

    // Enqueue succeeds; the failure is reported by the drain.
    canny.detect_async(&wrong_type, &mut edges, &stream).unwrap();
    assert!(matches!(stream.wait_for_completion(), Err(Error::TypeMismatch { .. })));

    // The stream is usable again afterwards.
    let good = GpuMat::from_mat(&noise(8, 8, 3)).unwrap();
    canny.detect_async(&good, &mut edges, &stream).unwrap();
    stream.wait_for_completion().unwrap();
    assert_eq!((edges.rows(), edges.cols()), (8, 8));
}

#[test]
fn synchronous_errors_surface_at_the_call() {
    let canny = CannyEdgeDetector::new(10.0, 30.0).unwrap();
    let mut edges = GpuMat::new();
    assert!(matches!(canny.detect(&GpuMat::new(), &mut edges), Err(Error::EmptyInput { .. })));
}

#[test]
fn download_after_failure_reports_an_error() {
    let stream = Stream::new().unwrap();
    let empty = GpuMat::new();
    let mut out = GpuMat::new();
    equalize_hist(&empty, &mut out, Some(&stream)).unwrap();
    let pending = out.download_async(&stream);
    assert!(stream.wait_for_completion().is_err());
    assert!(matches!(pending.wait(), Err(Error::Stream(_))));
}

#[test]
fn allocation_failure_inside_a_stream_job() {
    let device = Device::host(100);
    let stream = Stream::on(&device).unwrap();
    let mut buf = GpuMat::on(&device);
    buf.upload_async(&noise(20, 20, 5), &stream).unwrap();
    assert!(matches!(
        stream.wait_for_completion(),
        Err(Error::Allocation { requested: 400, available: 100 })
    ));
}

// ===== Concurrency =====

#[test]
fn independent_streams_run_concurrently() {
    let streams: Vec<Stream> = (0..4).map(|_| Stream::new().unwrap()).collect();
    let src = GpuMat::from_mat(&noise(128, 128, 11)).unwrap();
    let mut outputs: Vec<GpuMat> = (0..4).map(|_| GpuMat::new()).collect();
    for (stream, out) in streams.iter().zip(outputs.iter_mut()) {
        equalize_hist(&src, out, Some(stream)).unwrap();
    }
    for stream in &streams {
        stream.wait_for_completion().unwrap();
    }
    let first = outputs[0].to_mat().unwrap();
    for out in &outputs[1..] {
        assert_eq!(out.to_mat().unwrap(), first);
    }
}

#[test]
fn dropping_a_stream_finishes_its_work() {
    let src = GpuMat::from_mat(&noise(16, 16, 2)).unwrap();
    let mut out = GpuMat::new();
    {
        let stream = Stream::new().unwrap();
        equalize_hist(&src, &mut out, Some(&stream)).unwrap();
    }
    assert_eq!((out.rows(), out.cols()), (16, 16));
}

#[test]
fn pending_download_becomes_ready() {
    let stream = Stream::new().unwrap();
    let buf = GpuMat::from_mat(&noise(4, 4, 9)).unwrap();
    let pending = buf.download_async(&stream);
    stream.wait_for_completion().unwrap();
    // The result is handed over before the job counts as finished.
    assert!(pending.is_ready());
    assert_eq!(pending.wait().unwrap(), noise(4, 4, 9));
}
