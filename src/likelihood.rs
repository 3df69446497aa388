use crate::data::Observations;
use crate::math::normal_logpdf;
use crate::model::ForwardModel;
use crate::ode::Trajectory;
use crate::parameter::{ConfigError, ParameterSet, Role};

/// Distribution of an observation around the simulated value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoiseModel {
    /// `y ~ Normal(prediction, sd)`
    Normal,
    /// `ln(y + offset) ~ Normal(ln(prediction + offset), sd)`.
    ///
    /// A positive offset allows zero observations, e.g. offspring counts
    /// before the onset of reproduction.
    LogNormal { offset: f64 },
}

impl NoiseModel {
    /// Log density of `observed`, `-inf` where the model cannot produce it.
    pub fn log_density(&self, observed: f64, predicted: f64, sd: f64) -> f64 {
        match *self {
            NoiseModel::Normal => normal_logpdf(observed, predicted, sd),
            NoiseModel::LogNormal { offset } => {
                let y = observed + offset;
                let mu = predicted + offset;
                if !(y > 0.) || !(mu > 0.) {
                    return f64::NEG_INFINITY;
                }
                let log_y = y.ln();
                normal_logpdf(log_y, mu.ln(), sd) - log_y
            }
        }
    }
}

/// Declaration of one observed channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    /// Name of the forward-model observable, also the observation column.
    pub observable: String,
    pub noise: NoiseModel,
    /// Name of the observation-role parameter holding the noise scale.
    pub sd_parameter: String,
}

impl ChannelSpec {
    pub fn new(observable: impl Into<String>, noise: NoiseModel, sd_parameter: impl Into<String>) -> Self {
        Self {
            observable: observable.into(),
            noise,
            sd_parameter: sd_parameter.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Channel {
    observable: usize,
    column: usize,
    sd: usize,
    noise: NoiseModel,
}

/// Observation model mapping simulated observables to a log-likelihood.
///
/// Keeps its own copy of the observations the channels were resolved against.
#[derive(Debug, Clone)]
pub struct Likelihood {
    channels: Vec<Channel>,
    n_observables: usize,
    observations: Observations,
}

impl Likelihood {
    pub fn new<F: ForwardModel + ?Sized>(
        parameters: &ParameterSet,
        model: &F,
        observations: &Observations,
        channels: Vec<ChannelSpec>,
    ) -> Result<Self, ConfigError> {
        let observable_names = model.observable_names();
        let channels = channels
            .into_iter()
            .map(|spec| {
                let observable = observable_names
                    .iter()
                    .position(|&name| name == spec.observable)
                    .ok_or_else(|| ConfigError::UnknownObservable(spec.observable.clone()))?;
                let column = observations
                    .channel_index(&spec.observable)
                    .ok_or_else(|| ConfigError::MissingObservations(spec.observable.clone()))?;
                let sd = parameters.require(&spec.sd_parameter, Role::Observation)?;

                if let NoiseModel::LogNormal { offset } = spec.noise {
                    if !(offset >= 0.) || !offset.is_finite() {
                        return Err(ConfigError::InvalidSettings(format!(
                            "log-normal offset {} of channel `{}` must be non-negative",
                            offset, spec.observable
                        )));
                    }
                    if offset == 0. && observations.column(column).any(|v| v == Some(0.)) {
                        return Err(ConfigError::ZeroObservation(spec.observable));
                    }
                }

                Ok(Channel {
                    observable,
                    column,
                    sd,
                    noise: spec.noise,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            channels,
            n_observables: observable_names.len(),
            observations: observations.clone(),
        })
    }

    pub fn observations(&self) -> &Observations {
        &self.observations
    }

    /// Log-likelihood of the observations given a trajectory simulated at
    /// their times.
    ///
    /// Returns `-inf` for non-finite trajectories and non-positive noise
    /// scales. Missing observations are skipped.
    pub fn log_likelihood<F: ForwardModel + ?Sized>(
        &self,
        model: &F,
        trajectory: &Trajectory,
        parameters: &[f64],
    ) -> f64 {
        let observations = &self.observations;
        assert_eq!(trajectory.len(), observations.len());
        if !trajectory.is_finite() {
            return f64::NEG_INFINITY;
        }
        if self
            .channels
            .iter()
            .any(|c| !(parameters[c.sd] > 0.) || !parameters[c.sd].is_finite())
        {
            return f64::NEG_INFINITY;
        }

        let mut predicted = vec![0f64; self.n_observables];
        let mut total = 0f64;
        for (row, (_, state)) in trajectory.rows().enumerate() {
            model.observe(parameters, state, &mut predicted);
            for channel in self.channels.iter() {
                let Some(observed) = observations.value(row, channel.column) else {
                    continue;
                };
                let sd = parameters[channel.sd];
                total += channel
                    .noise
                    .log_density(observed, predicted[channel.observable], sd);
            }
            if !total.is_finite() {
                return f64::NEG_INFINITY;
            }
        }
        total
    }
}
