use itertools::Itertools;

/// `ln(sqrt(2 pi))`
pub(crate) const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Log density of a normal distribution.
///
/// Returns `-inf` for non-positive or non-finite `sd`, so that callers can
/// treat invalid scale parameters as zero density.
#[inline]
pub(crate) fn normal_logpdf(x: f64, mean: f64, sd: f64) -> f64 {
    if !(sd > 0.) || !sd.is_finite() {
        return f64::NEG_INFINITY;
    }
    let z = (x - mean) / sd;
    -LN_SQRT_2PI - sd.ln() - 0.5 * z * z
}

#[inline]
pub(crate) fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|x| x.is_finite())
}

/// Mean and unbiased sample variance. The variance is NaN for fewer than two values.
pub(crate) fn mean_var(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|x| (x - mean) * (x - mean)).sum();
    (mean, ss / (n - 1.))
}

/// Quantile of already sorted values with linear interpolation between
/// order statistics (Hyndman & Fan type 7).
pub(crate) fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * p.clamp(0., 1.);
            let lo = h.floor() as usize;
            let hi = h.ceil() as usize;
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

pub(crate) fn sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    values.into_iter().sorted_by(f64::total_cmp).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn check_quantile_bounds(
            values in prop::collection::vec(-100f64..100f64, 1..50),
            p in 0f64..1f64,
            q in 0f64..1f64,
        ) {
            let values = sorted(values);
            let lo = quantile_sorted(&values, p.min(q));
            let hi = quantile_sorted(&values, p.max(q));
            prop_assert!(lo <= hi);
            prop_assert!(values[0] <= lo);
            prop_assert!(hi <= values[values.len() - 1]);
        }

        #[test]
        fn check_normal_logpdf(x in -10f64..10f64, mean in -5f64..5f64, sd in 0.5f64..10f64) {
            // |z| <= 30 keeps the density itself representable.
            let direct = (-(x - mean).powi(2) / (2. * sd * sd)).exp()
                / (sd * (2. * std::f64::consts::PI).sqrt());
            prop_assert!((normal_logpdf(x, mean, sd) - direct.ln()).abs() < 1e-8);
        }
    }

    #[test]
    fn check_quantile_interpolation() {
        let values = [1., 2., 3., 4.];
        assert_eq!(quantile_sorted(&values, 0.), 1.);
        assert_eq!(quantile_sorted(&values, 1.), 4.);
        assert_abs_diff_eq!(quantile_sorted(&values, 0.5), 2.5);
        assert!(quantile_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn check_far_tail() {
        // The density underflows here, its log does not.
        let z: f64 = 2.65 / 0.01;
        let expected = -LN_SQRT_2PI - 0.01f64.ln() - 0.5 * z * z;
        assert_abs_diff_eq!(normal_logpdf(0., -2.65, 0.01), expected, epsilon = 1e-6);
        assert!(normal_logpdf(0., -2.65, 0.01).is_finite());
    }

    #[test]
    fn check_invalid_sd() {
        assert_eq!(normal_logpdf(0., 0., 0.), f64::NEG_INFINITY);
        assert_eq!(normal_logpdf(0., 0., -1.), f64::NEG_INFINITY);
        assert_eq!(normal_logpdf(0., 0., f64::NAN), f64::NEG_INFINITY);
    }

    #[test]
    fn check_mean_var() {
        let (mean, var) = mean_var(&[1., 2., 3., 4.]);
        assert_abs_diff_eq!(mean, 2.5);
        assert_abs_diff_eq!(var, 5. / 3., epsilon = 1e-12);
    }
}
