//! Posterior density of a forward model given observations.

use anyhow::{bail, Result};
use rand::Rng;

use crate::data::Observations;
use crate::likelihood::Likelihood;
use crate::model::{Density, ForwardModel, LogDensity, Model};
use crate::ode::Trajectory;
use crate::parameter::ParameterSet;
use crate::proposal::Proposal;
use crate::sampler::InitPoint;

/// Unnormalized posterior over the free parameters of a [`ParameterSet`].
///
/// Positions are vectors of free-parameter values in registry order. Fixed
/// parameters are merged in before every simulation.
#[derive(Debug, Clone)]
pub struct Posterior<F: ForwardModel> {
    parameters: ParameterSet,
    model: F,
    likelihood: Likelihood,
}

impl<F: ForwardModel> Posterior<F> {
    pub fn new(parameters: ParameterSet, model: F, likelihood: Likelihood) -> Self {
        Self {
            parameters,
            model,
            likelihood,
        }
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn model(&self) -> &F {
        &self.model
    }

    pub fn likelihood(&self) -> &Likelihood {
        &self.likelihood
    }

    pub fn observations(&self) -> &Observations {
        self.likelihood.observations()
    }

    /// Full parameter vector for a position.
    pub fn full_parameters(&self, position: &[f64]) -> Vec<f64> {
        self.parameters.merge(position)
    }

    /// Simulate the state trajectory of a position at arbitrary times.
    pub fn simulate(&self, position: &[f64], times: &[f64]) -> Trajectory {
        self.model.simulate(&self.full_parameters(position), times)
    }
}

impl<F: ForwardModel> LogDensity for Posterior<F> {
    fn dim(&self) -> usize {
        self.parameters.dim()
    }

    fn evaluate(&self, position: &[f64]) -> Density {
        let log_prior = self.parameters.log_prior(position);
        if log_prior == f64::NEG_INFINITY || log_prior.is_nan() {
            // Outside the support, don't bother simulating.
            return Density::ZERO;
        }
        let full = self.full_parameters(position);
        let trajectory = self.model.simulate(&full, self.observations().times());
        let log_likelihood = self.likelihood.log_likelihood(&self.model, &trajectory, &full);
        Density {
            log_prior,
            log_likelihood,
        }
    }
}

impl<F: ForwardModel> Model for Posterior<F> {
    fn parameter_names(&self) -> Vec<String> {
        self.parameters.free_names()
    }

    fn proposals(&self) -> Vec<Proposal> {
        self.parameters.proposals()
    }

    fn init_position<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        init: InitPoint,
        position: &mut [f64],
    ) -> Result<()> {
        if position.len() != self.parameters.dim() {
            bail!(
                "position has length {}, expected {}",
                position.len(),
                self.parameters.dim()
            );
        }
        match init {
            InitPoint::Declared => {
                position.copy_from_slice(&self.parameters.initial_position());
            }
            InitPoint::PriorDraw => {
                for (value, parameter) in position.iter_mut().zip(self.parameters.free_parameters()) {
                    let Some(prior) = parameter.prior() else {
                        bail!("free parameter `{}` has no prior", parameter.name());
                    };
                    *value = prior.sample(rng);
                }
            }
        }
        Ok(())
    }
}
