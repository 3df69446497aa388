//! Core abstractions for forward models and posterior densities.
//!
//! A [`ForwardModel`] turns a full parameter vector into state trajectories
//! and maps states onto observable quantities. A [`LogDensity`] is anything
//! the Metropolis-Hastings driver can sample from; [`Model`] adds what a
//! multi-chain run needs on top of that (names, kernels, starting points).

use anyhow::Result;
use rand::Rng;

use crate::ode::Trajectory;
use crate::proposal::Proposal;
use crate::sampler::InitPoint;

/// Deterministic simulator of a dynamic system.
///
/// Implementations hold no mutable state, so they can be shared between
/// chains and threads.
pub trait ForwardModel: Send + Sync {
    /// Names of the state variables, in state-vector order.
    fn state_names(&self) -> &[&'static str];

    /// Names of the observable quantities, in the order written by `observe`.
    fn observable_names(&self) -> &[&'static str];

    /// Simulate from time zero and record the state at each of `times`.
    ///
    /// `parameters` is the full parameter vector in registry order. Invalid
    /// parameters must not panic; they may produce a non-finite trajectory.
    fn simulate(&self, parameters: &[f64], times: &[f64]) -> Trajectory;

    /// Project one state vector onto the observables.
    fn observe(&self, parameters: &[f64], state: &[f64], out: &mut [f64]);

    /// Observable values along a trajectory.
    fn observables(&self, parameters: &[f64], trajectory: &Trajectory) -> Trajectory {
        let dim = self.observable_names().len();
        let mut values = vec![0f64; trajectory.len() * dim];
        for (state, out) in trajectory
            .rows()
            .map(|(_, state)| state)
            .zip(values.chunks_exact_mut(dim))
        {
            self.observe(parameters, state, out);
        }
        Trajectory::new(trajectory.times().to_vec(), values, dim)
    }
}

/// Log prior and log likelihood of one position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Density {
    pub log_prior: f64,
    pub log_likelihood: f64,
}

impl Density {
    /// Zero density, used for positions outside the support.
    pub const ZERO: Density = Density {
        log_prior: f64::NEG_INFINITY,
        log_likelihood: f64::NEG_INFINITY,
    };

    /// Unnormalized log posterior. Anything that is not finite counts as
    /// zero density.
    pub fn log_posterior(&self) -> f64 {
        let lp = self.log_prior + self.log_likelihood;
        if lp.is_finite() {
            lp
        } else {
            f64::NEG_INFINITY
        }
    }

    pub fn is_finite(&self) -> bool {
        self.log_posterior().is_finite()
    }
}

/// Unnormalized target density of the sampler.
pub trait LogDensity: Send + Sync {
    /// Number of sampled parameters.
    fn dim(&self) -> usize;

    /// Evaluate the density at `position`. Must not panic for positions
    /// outside the support; return [`Density::ZERO`] instead.
    fn evaluate(&self, position: &[f64]) -> Density;
}

impl<T: LogDensity + ?Sized> LogDensity for &T {
    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn evaluate(&self, position: &[f64]) -> Density {
        (**self).evaluate(position)
    }
}

/// A target density together with everything needed to start chains on it.
pub trait Model: LogDensity {
    fn parameter_names(&self) -> Vec<String>;

    /// One proposal kernel per sampled parameter.
    fn proposals(&self) -> Vec<Proposal>;

    /// Initializes the starting position of a chain.
    ///
    /// The position is not checked here; the chain rejects starting points
    /// with zero density.
    fn init_position<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        init: InitPoint,
        position: &mut [f64],
    ) -> Result<()>;
}
