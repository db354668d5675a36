// border.rs — Out-of-range coordinate handling for neighbourhood kernels.
//
//   Replicate:   aaaaaa|abcdefgh|hhhhhhh
//   Reflect:     fedcba|abcdefgh|hgfedcb
//   Reflect101:  gfedcb|abcdefgh|gfedcba   (the default)
//   Wrap:        cdefgh|abcdefgh|abcdefg
//   Constant:    iiiiii|abcdefgh|iiiiiii   (caller supplies i)

/// Border extrapolation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderMode {
    Constant,
    Replicate,
    Reflect,
    Wrap,
    #[default]
    Reflect101,
}

impl BorderMode {
    /// Map coordinate `p` onto `0..len`.
    ///
    /// Returns `None` for `Constant` when `p` is outside the image; the caller
    /// substitutes its border value. `len` must be non-zero.
    pub fn interpolate(self, p: isize, len: usize) -> Option<usize> {
        debug_assert!(len > 0);
        let n = len as isize;
        if (0..n).contains(&p) {
            return Some(p as usize);
        }
        let mapped = match self {
            BorderMode::Constant => return None,
            BorderMode::Replicate => p.clamp(0, n - 1),
            BorderMode::Wrap => p.rem_euclid(n),
            BorderMode::Reflect | BorderMode::Reflect101 if n == 1 => 0,
            BorderMode::Reflect => {
                let mut p = p;
                while !(0..n).contains(&p) {
                    p = if p < 0 { -p - 1 } else { 2 * n - p - 1 };
                }
                p
            }
            BorderMode::Reflect101 => {
                let mut p = p;
                while !(0..n).contains(&p) {
                    p = if p < 0 { -p } else { 2 * n - p - 2 };
                }
                p
            }
        };
        Some(mapped as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(mode: BorderMode, range: std::ops::Range<isize>, len: usize) -> Vec<Option<usize>> {
        range.map(|p| mode.interpolate(p, len)).collect()
    }

    #[test]
    fn test_modes_left_of_zero() {
        let some = |v: &[usize]| v.iter().map(|&x| Some(x)).collect::<Vec<_>>();
        assert_eq!(map(BorderMode::Replicate, -3..0, 8), some(&[0, 0, 0]));
        assert_eq!(map(BorderMode::Reflect, -3..0, 8), some(&[2, 1, 0]));
        assert_eq!(map(BorderMode::Reflect101, -3..0, 8), some(&[3, 2, 1]));
        assert_eq!(map(BorderMode::Wrap, -3..0, 8), some(&[5, 6, 7]));
        assert_eq!(map(BorderMode::Constant, -3..0, 8), vec![None; 3]);
    }

    #[test]
    fn test_modes_right_of_end() {
        assert_eq!(BorderMode::Reflect.interpolate(8, 8), Some(7));
        assert_eq!(BorderMode::Reflect101.interpolate(8, 8), Some(6));
        assert_eq!(BorderMode::Wrap.interpolate(9, 8), Some(1));
        assert_eq!(BorderMode::Replicate.interpolate(100, 8), Some(7));
    }

    #[test]
    fn test_single_pixel_axis() {
        for mode in [BorderMode::Reflect, BorderMode::Reflect101, BorderMode::Replicate, BorderMode::Wrap] {
            assert_eq!(mode.interpolate(-2, 1), Some(0));
            assert_eq!(mode.interpolate(3, 1), Some(0));
        }
    }

    #[test]
    fn test_reflect101_preserves_parity() {
        // Bayer demosaicing relies on this: the mirrored sample has the same
        // colour as the missing one.
        for p in -4isize..0 {
            let m = BorderMode::Reflect101.interpolate(p, 10).unwrap() as isize;
            assert_eq!(p.rem_euclid(2), m % 2);
        }
    }
}
