use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::math::{normal_logpdf, LN_SQRT_2PI};

/// Prior distribution of a free parameter.
///
/// The support of the prior is also the admissible range of the parameter:
/// values outside of it get a log density of `-inf`, which makes the sampler
/// reject them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prior {
    Uniform { lower: f64, upper: f64 },
    Normal { mean: f64, sd: f64 },
    LogNormal { meanlog: f64, sdlog: f64 },
}

impl Prior {
    /// Log density at `value`, `-inf` outside the support.
    pub fn log_density(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return f64::NEG_INFINITY;
        }
        match *self {
            Prior::Uniform { lower, upper } => {
                if (lower..=upper).contains(&value) {
                    -(upper - lower).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            Prior::Normal { mean, sd } => normal_logpdf(value, mean, sd),
            Prior::LogNormal { meanlog, sdlog } => {
                if value <= 0. {
                    return f64::NEG_INFINITY;
                }
                let log_value = value.ln();
                let z = (log_value - meanlog) / sdlog;
                -LN_SQRT_2PI - sdlog.ln() - log_value - 0.5 * z * z
            }
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.log_density(value) > f64::NEG_INFINITY
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Prior::Uniform { lower, upper } => lower + (upper - lower) * rng.random::<f64>(),
            Prior::Normal { mean, sd } => {
                let z: f64 = StandardNormal.sample(rng);
                mean + sd * z
            }
            Prior::LogNormal { meanlog, sdlog } => {
                let z: f64 = StandardNormal.sample(rng);
                (meanlog + sdlog * z).exp()
            }
        }
    }

    pub fn mean(&self) -> f64 {
        match *self {
            Prior::Uniform { lower, upper } => 0.5 * (lower + upper),
            Prior::Normal { mean, .. } => mean,
            Prior::LogNormal { meanlog, sdlog } => (meanlog + 0.5 * sdlog * sdlog).exp(),
        }
    }

    pub fn sd(&self) -> f64 {
        match *self {
            Prior::Uniform { lower, upper } => (upper - lower) / 12f64.sqrt(),
            Prior::Normal { sd, .. } => sd,
            Prior::LogNormal { meanlog, sdlog } => {
                let s2 = sdlog * sdlog;
                ((s2.exp() - 1.) * (2. * meanlog + s2).exp()).sqrt()
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match *self {
            Prior::Uniform { lower, upper } => {
                if !(lower.is_finite() && upper.is_finite()) {
                    return Err("uniform bounds must be finite".into());
                }
                if lower >= upper {
                    return Err(format!(
                        "uniform lower bound {} is not below upper bound {}",
                        lower, upper
                    ));
                }
            }
            Prior::Normal { mean, sd } => {
                if !mean.is_finite() || !(sd > 0.) || !sd.is_finite() {
                    return Err(format!("normal(mean = {}, sd = {}) is invalid", mean, sd));
                }
            }
            Prior::LogNormal { meanlog, sdlog } => {
                if !meanlog.is_finite() || !(sdlog > 0.) || !sdlog.is_finite() {
                    return Err(format!(
                        "log-normal(meanlog = {}, sdlog = {}) is invalid",
                        meanlog, sdlog
                    ));
                }
            }
        }
        Ok(())
    }
}
