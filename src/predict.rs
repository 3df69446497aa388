//! Posterior trajectory ensembles.
//!
//! Retained draws of a trace are re-simulated on an arbitrary time grid and
//! summarised per time point.

use rayon::prelude::*;
use tracing::warn;

use crate::math::{mean_var, quantile_sorted, sorted};
use crate::model::ForwardModel;
use crate::ode::Trajectory;
use crate::parameter::ConfigError;
use crate::posterior::Posterior;
use crate::trace::{Draw, SampleTrace, Trace};

/// One re-simulated draw.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub iteration: u64,
    pub states: Trajectory,
    pub observables: Trajectory,
}

/// Simulated trajectories of retained posterior draws.
///
/// The spread of the ensemble reflects parameter uncertainty only. It
/// describes the expected trajectory and does not include observation noise,
/// so bands derived from it are narrower than prediction intervals for new
/// observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    times: Vec<f64>,
    state_names: Vec<String>,
    observable_names: Vec<String>,
    members: Vec<Member>,
    dropped: usize,
}

/// Per-time summary of an ensemble quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct CredibleBand {
    pub times: Vec<f64>,
    pub mean: Vec<f64>,
    pub median: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Re-simulate the retained draws of one chain on `times`.
///
/// Draws are simulated in parallel; members keep the order of the draws.
/// Draws whose simulation is not finite are dropped and counted.
pub fn predict<F: ForwardModel>(
    trace: &SampleTrace,
    burnin: usize,
    thin: usize,
    posterior: &Posterior<F>,
    times: &[f64],
) -> Result<Ensemble, ConfigError> {
    check_args(thin, times)?;
    Ok(simulate_draws(
        trace.retained(burnin, thin).collect(),
        posterior,
        times,
    ))
}

/// Like [`predict`], pooling the retained draws of every chain.
pub fn predict_chains<F: ForwardModel>(
    trace: &Trace,
    burnin: usize,
    thin: usize,
    posterior: &Posterior<F>,
    times: &[f64],
) -> Result<Ensemble, ConfigError> {
    check_args(thin, times)?;
    Ok(simulate_draws(
        trace.retained(burnin, thin).collect(),
        posterior,
        times,
    ))
}

fn check_args(thin: usize, times: &[f64]) -> Result<(), ConfigError> {
    if thin == 0 {
        return Err(ConfigError::InvalidSettings("thin must be positive".into()));
    }
    let valid = times.iter().all(|t| t.is_finite() && *t >= 0.)
        && times.windows(2).all(|w| w[0] < w[1]);
    if !valid {
        return Err(ConfigError::InvalidSettings(
            "prediction times must be non-negative and strictly increasing".into(),
        ));
    }
    Ok(())
}

fn simulate_draws<F: ForwardModel>(
    draws: Vec<&Draw>,
    posterior: &Posterior<F>,
    times: &[f64],
) -> Ensemble {
    let model = posterior.model();
    let retained = draws.len();
    let members: Vec<Option<Member>> = draws
        .par_iter()
        .map(|draw| {
            let parameters = posterior.full_parameters(&draw.position);
            let states = model.simulate(&parameters, times);
            if !states.is_finite() {
                return None;
            }
            let observables = model.observables(&parameters, &states);
            if !observables.is_finite() {
                return None;
            }
            Some(Member {
                iteration: draw.iteration,
                states,
                observables,
            })
        })
        .collect();
    let members: Vec<Member> = members.into_iter().flatten().collect();
    let dropped = retained - members.len();
    if dropped > 0 {
        warn!(dropped, retained, "dropped non-finite ensemble members");
    }

    Ensemble {
        times: times.to_vec(),
        state_names: model.state_names().iter().map(|s| s.to_string()).collect(),
        observable_names: model
            .observable_names()
            .iter()
            .map(|s| s.to_string())
            .collect(),
        members,
        dropped,
    }
}

impl Ensemble {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of retained draws whose simulation was not finite.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Band of an observable between the `lower` and `upper` quantiles.
    ///
    /// Returns `None` for unknown names and empty ensembles.
    pub fn observable_band(&self, name: &str, lower: f64, upper: f64) -> Option<CredibleBand> {
        let idx = self.observable_names.iter().position(|n| n == name)?;
        self.band(|member| &member.observables, idx, lower, upper)
    }

    /// Band of a state variable between the `lower` and `upper` quantiles.
    pub fn state_band(&self, name: &str, lower: f64, upper: f64) -> Option<CredibleBand> {
        let idx = self.state_names.iter().position(|n| n == name)?;
        self.band(|member| &member.states, idx, lower, upper)
    }

    fn band(
        &self,
        select: impl Fn(&Member) -> &Trajectory,
        var: usize,
        lower_q: f64,
        upper_q: f64,
    ) -> Option<CredibleBand> {
        if self.members.is_empty() {
            return None;
        }
        let n_times = self.times.len();
        let mut band = CredibleBand {
            times: self.times.clone(),
            mean: Vec::with_capacity(n_times),
            median: Vec::with_capacity(n_times),
            lower: Vec::with_capacity(n_times),
            upper: Vec::with_capacity(n_times),
        };
        for row in 0..n_times {
            let values: Vec<f64> = self
                .members
                .iter()
                .map(|member| select(member).state(row)[var])
                .collect();
            let (mean, _) = mean_var(&values);
            let values = sorted(values);
            band.mean.push(mean);
            band.median.push(quantile_sorted(&values, 0.5));
            band.lower.push(quantile_sorted(&values, lower_q));
            band.upper.push(quantile_sorted(&values, upper_q));
        }
        Some(band)
    }
}
