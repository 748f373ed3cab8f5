pub(crate) struct Interpolator;

impl Interpolator {
    /// Rises from 0 to 1 over the first half of `x` in [0, 1] and falls back
    /// to 0 over the second half, with cubic ease at both ends and the peak.
    #[inline]
    pub(crate) fn ease_in_out_bell(x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        if x < 0.25 {
            4.0 * (2.0 * x).powi(3)
        } else if x < 0.5 {
            1.0 - (-4.0f32).mul_add(x, 2.0).powi(3) / 2.0
        } else if x < 0.75 {
            1.0 - 4.0f32.mul_add(x, -2.0).powi(3) / 2.0
        } else {
            -4.0 * 2.0f32.mul_add(x, -2.0).powi(3)
        }
    }

    /// Labelmap emphasis: `baseline` at both ends, `peak` at the midpoint.
    #[inline]
    pub(crate) fn bell(x: f32, baseline: f32, peak: f32) -> f32 {
        Self::lerp(baseline, peak, Self::ease_in_out_bell(x))
    }

    /// Contour emphasis: dips from `baseline` by a factor of `depth` at the
    /// midpoint.
    #[inline]
    pub(crate) fn reverse_bell(x: f32, baseline: f32, depth: f32) -> f32 {
        baseline * (-depth).mul_add(Self::ease_in_out_bell(x), 1.0)
    }

    #[inline]
    pub(crate) fn lerp(from: f32, to: f32, t: f32) -> f32 {
        (to - from).mul_add(t, from)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn bell_is_zero_at_ends_and_one_at_midpoint() {
        assert_relative_eq!(Interpolator::ease_in_out_bell(0.0), 0.0);
        assert_relative_eq!(Interpolator::ease_in_out_bell(0.5), 1.0);
        assert_relative_eq!(Interpolator::ease_in_out_bell(1.0), 0.0);
        assert_relative_eq!(Interpolator::ease_in_out_bell(0.25), 0.5);
        assert_relative_eq!(Interpolator::ease_in_out_bell(0.75), 0.5);
    }

    #[test]
    fn bell_is_symmetric() {
        for step in 0..=20 {
            let x = step as f32 / 20.0;
            assert_relative_eq!(
                Interpolator::ease_in_out_bell(x),
                Interpolator::ease_in_out_bell(1.0 - x),
                epsilon = 1e-5
            );
        }
    }

    #[test]
    fn labelmap_bell_reaches_peak_and_contour_bell_dips() {
        assert_relative_eq!(Interpolator::bell(0.5, 0.5, 0.9), 0.9);
        assert_relative_eq!(Interpolator::bell(0.0, 0.5, 0.9), 0.5);
        assert_relative_eq!(Interpolator::reverse_bell(0.5, 1.0, 0.9), 0.1, epsilon = 1e-6);
        assert_relative_eq!(Interpolator::reverse_bell(1.0, 1.0, 0.9), 1.0);
    }

    #[test]
    fn out_of_range_progress_is_clamped() {
        assert_relative_eq!(Interpolator::ease_in_out_bell(-1.0), 0.0);
        assert_relative_eq!(Interpolator::ease_in_out_bell(2.0), 0.0);
    }
}
