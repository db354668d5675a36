// gradient.rs — Image gradients via Sobel operators.
//
// Sobel kernels are separable:
//   Sobel_x: derivative along rows, smoothing along columns
//   Sobel_y: smoothing along rows, derivative along columns
//
// Apertures 3, 5 and 7 are supported (the set Canny accepts). Larger
// apertures are the binomial smoothing kernel convolved with [-1, 0, 1].

use crate::border::BorderMode;
use crate::convolution::convolve_separable;
use crate::image::{Image, Pixel};

const DERIV_3: [f32; 3] = [-1.0, 0.0, 1.0];
const SMOOTH_3: [f32; 3] = [1.0, 2.0, 1.0];
const DERIV_5: [f32; 5] = [-1.0, -2.0, 0.0, 2.0, 1.0];
const SMOOTH_5: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
const DERIV_7: [f32; 7] = [-1.0, -4.0, -5.0, 0.0, 5.0, 4.0, 1.0];
const SMOOTH_7: [f32; 7] = [1.0, 6.0, 15.0, 20.0, 15.0, 6.0, 1.0];

/// Sobel kernel pair `(derivative, smoothing)` for an aperture, or `None`
/// for unsupported apertures.
pub fn sobel_kernels(aperture: usize) -> Option<(&'static [f32], &'static [f32])> {
    match aperture {
        3 => Some((&DERIV_3, &SMOOTH_3)),
        5 => Some((&DERIV_5, &SMOOTH_5)),
        7 => Some((&DERIV_7, &SMOOTH_7)),
        _ => None,
    }
}

/// Both Sobel gradients `(Ix, Iy)`, unnormalised.
///
/// Positive Ix means intensity increases to the right, positive Iy means it
/// increases downward.
///
/// # Panics
/// Panics if `aperture` is not 3, 5 or 7.
pub fn sobel_xy<T: Pixel>(src: &Image<T>, aperture: usize, border: BorderMode) -> (Image<f32>, Image<f32>) {
    let (deriv, smooth) = sobel_kernels(aperture)
        .unwrap_or_else(|| panic!("unsupported Sobel aperture {aperture}"));
    (
        convolve_separable(src, deriv, smooth, border),
        convolve_separable(src, smooth, deriv, border),
    )
}
