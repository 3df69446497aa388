use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::math::normal_logpdf;

/// Random-walk proposal kernel of one free parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Proposal {
    /// Gaussian step with standard deviation `sd`. Symmetric.
    RandomWalk { sd: f64 },
    /// Uniform step on `[-half_width, half_width]`. Symmetric.
    UniformWalk { half_width: f64 },
    /// Multiplicative uniform step for positive parameters.
    ///
    /// The current value is multiplied by a factor drawn uniformly from
    /// `[lower / upper, upper / lower]`. The range of the factor is closed
    /// under inversion, so every move can be reversed, but the kernel is not
    /// symmetric: `q(x' | x) = 1 / (|x| w)` with `w` the width of the factor
    /// range. The Hastings correction is therefore `ln|x| - ln|x'|`.
    /// Proposals never change the sign of the parameter.
    ScaledUniform { lower: f64, upper: f64 },
}

/// A proposed value and the log Hastings correction
/// `log q(current | proposed) - log q(proposed | current)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub value: f64,
    pub log_correction: f64,
}

impl Proposal {
    pub fn is_symmetric(&self) -> bool {
        !matches!(self, Proposal::ScaledUniform { .. })
    }

    pub fn propose<R: Rng + ?Sized>(&self, current: f64, rng: &mut R) -> Step {
        let value = match *self {
            Proposal::RandomWalk { sd } => {
                let z: f64 = StandardNormal.sample(rng);
                current + sd * z
            }
            Proposal::UniformWalk { half_width } => {
                current + half_width * (2. * rng.random::<f64>() - 1.)
            }
            Proposal::ScaledUniform { lower, upper } => {
                let (lo, hi) = (lower / upper, upper / lower);
                current * (lo + (hi - lo) * rng.random::<f64>())
            }
        };
        Step {
            value,
            log_correction: self.log_correction(current, value),
        }
    }

    /// `log q(current | proposed) - log q(proposed | current)`
    pub fn log_correction(&self, current: f64, proposed: f64) -> f64 {
        match self {
            Proposal::RandomWalk { .. } | Proposal::UniformWalk { .. } => 0.,
            Proposal::ScaledUniform { .. } => current.abs().ln() - proposed.abs().ln(),
        }
    }

    /// Log density of moving from `from` to `to`.
    pub fn log_transition_density(&self, from: f64, to: f64) -> f64 {
        match *self {
            Proposal::RandomWalk { sd } => normal_logpdf(to, from, sd),
            Proposal::UniformWalk { half_width } => {
                if (to - from).abs() <= half_width {
                    -(2. * half_width).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            Proposal::ScaledUniform { lower, upper } => {
                if from == 0. {
                    return f64::NEG_INFINITY;
                }
                let (lo, hi) = (lower / upper, upper / lower);
                let factor = to / from;
                if (lo..=hi).contains(&factor) {
                    -(from.abs() * (hi - lo)).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match *self {
            Proposal::RandomWalk { sd } => {
                if !(sd > 0.) || !sd.is_finite() {
                    return Err(format!("random walk sd {} must be positive", sd));
                }
            }
            Proposal::UniformWalk { half_width } => {
                if !(half_width > 0.) || !half_width.is_finite() {
                    return Err(format!(
                        "uniform walk half width {} must be positive",
                        half_width
                    ));
                }
            }
            Proposal::ScaledUniform { lower, upper } => {
                if !(lower > 0.) || !upper.is_finite() || lower >= upper {
                    return Err(format!(
                        "scaled uniform kernel needs 0 < lower < upper, got ({}, {})",
                        lower, upper
                    ));
                }
            }
        }
        Ok(())
    }
}
