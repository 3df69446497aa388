use rand::Rng;
use thiserror::Error;

use crate::{
    model::{Density, LogDensity},
    proposal::Proposal,
    sampler::{Progress, UpdateScheme},
    trace::Draw,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum McmcError {
    #[error("initial position has zero posterior density (log prior {log_prior}, log likelihood {log_likelihood})")]
    Initialization { log_prior: f64, log_likelihood: f64 },
    #[error("the chain has no starting position, call set_position first")]
    NotInitialized,
    #[error("expected {expected} values, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Draw samples from a posterior distribution using Metropolis-Hastings.
pub trait Chain {
    /// Initialize the sampler to a position. This should be called
    /// before calling draw.
    ///
    /// This fails if the position has zero posterior density.
    fn set_position(&mut self, position: &[f64]) -> Result<(), McmcError>;

    /// Perform one iteration and return the resulting state.
    fn draw(&mut self) -> Result<(Draw, Progress), McmcError>;

    /// The number of sampled parameters.
    fn dim(&self) -> usize;
}

/// Current state of a Metropolis-Hastings chain.
#[derive(Debug, Clone, PartialEq)]
pub struct McmcState {
    pub position: Vec<f64>,
    pub density: Density,
    /// Completed iterations.
    pub iteration: u64,
    /// Accepted moves since the start.
    pub accepted: u64,
}

pub struct MetropolisChain<D, R>
where
    D: LogDensity,
    R: Rng,
{
    density: D,
    kernels: Vec<Proposal>,
    scheme: UpdateScheme,
    rng: R,
    state: Option<McmcState>,
    accepted: Vec<u64>,
    proposed: Vec<u64>,
    chain: u64,
    // scratch buffer for proposals
    candidate: Vec<f64>,
}

impl<D, R> MetropolisChain<D, R>
where
    D: LogDensity,
    R: Rng,
{
    pub fn new(
        density: D,
        kernels: Vec<Proposal>,
        scheme: UpdateScheme,
        rng: R,
        chain: u64,
    ) -> Result<Self, McmcError> {
        let dim = density.dim();
        if kernels.len() != dim {
            return Err(McmcError::DimensionMismatch {
                expected: dim,
                found: kernels.len(),
            });
        }
        Ok(MetropolisChain {
            density,
            kernels,
            scheme,
            rng,
            state: None,
            accepted: vec![0; dim],
            proposed: vec![0; dim],
            chain,
            candidate: vec![0f64; dim],
        })
    }

    pub fn state(&self) -> Option<&McmcState> {
        self.state.as_ref()
    }

    /// Accepted moves per parameter.
    pub fn accepted(&self) -> &[u64] {
        &self.accepted
    }

    /// Proposed moves per parameter.
    pub fn proposed(&self) -> &[u64] {
        &self.proposed
    }

    pub fn chain_id(&self) -> u64 {
        self.chain
    }
}

/// Evaluate a candidate and decide on it. Returns the density of the
/// candidate if it is accepted.
fn metropolis_step<D: LogDensity + ?Sized, R: Rng + ?Sized>(
    density: &D,
    current: f64,
    candidate: &[f64],
    log_correction: f64,
    rng: &mut R,
) -> Option<Density> {
    let proposed = density.evaluate(candidate);
    let log_posterior = proposed.log_posterior();
    if !log_posterior.is_finite() {
        return None;
    }
    let log_alpha = log_posterior - current + log_correction;
    if log_alpha.is_nan() {
        return None;
    }
    if log_alpha >= 0. || rng.random::<f64>().ln() < log_alpha {
        Some(proposed)
    } else {
        None
    }
}

impl<D, R> Chain for MetropolisChain<D, R>
where
    D: LogDensity,
    R: Rng,
{
    fn set_position(&mut self, position: &[f64]) -> Result<(), McmcError> {
        if position.len() != self.dim() {
            return Err(McmcError::DimensionMismatch {
                expected: self.dim(),
                found: position.len(),
            });
        }
        let density = self.density.evaluate(position);
        if !density.is_finite() {
            return Err(McmcError::Initialization {
                log_prior: density.log_prior,
                log_likelihood: density.log_likelihood,
            });
        }
        self.state = Some(McmcState {
            position: position.to_vec(),
            density,
            iteration: 0,
            accepted: 0,
        });
        Ok(())
    }

    fn draw(&mut self) -> Result<(Draw, Progress), McmcError> {
        let Some(state) = self.state.as_mut() else {
            return Err(McmcError::NotInitialized);
        };
        let mut accepted = 0;

        match self.scheme {
            UpdateScheme::Componentwise => {
                for (idx, kernel) in self.kernels.iter().enumerate() {
                    self.candidate.copy_from_slice(&state.position);
                    let step = kernel.propose(state.position[idx], &mut self.rng);
                    self.candidate[idx] = step.value;
                    self.proposed[idx] += 1;
                    if let Some(density) = metropolis_step(
                        &self.density,
                        state.density.log_posterior(),
                        &self.candidate,
                        step.log_correction,
                        &mut self.rng,
                    ) {
                        state.position[idx] = step.value;
                        state.density = density;
                        self.accepted[idx] += 1;
                        accepted += 1;
                    }
                }
            }
            UpdateScheme::Joint => {
                let mut log_correction = 0.;
                for ((candidate, &current), kernel) in self
                    .candidate
                    .iter_mut()
                    .zip(state.position.iter())
                    .zip(self.kernels.iter())
                {
                    let step = kernel.propose(current, &mut self.rng);
                    *candidate = step.value;
                    log_correction += step.log_correction;
                }
                self.proposed.iter_mut().for_each(|count| *count += 1);
                if let Some(density) = metropolis_step(
                    &self.density,
                    state.density.log_posterior(),
                    &self.candidate,
                    log_correction,
                    &mut self.rng,
                ) {
                    state.position.copy_from_slice(&self.candidate);
                    state.density = density;
                    self.accepted.iter_mut().for_each(|count| *count += 1);
                    accepted = self.kernels.len() as u64;
                }
            }
        }

        let draw = Draw {
            iteration: state.iteration,
            position: state.position.clone().into(),
            log_prior: state.density.log_prior,
            log_likelihood: state.density.log_likelihood,
            accepted,
        };
        let progress = Progress {
            draw: state.iteration,
            chain: self.chain,
            accepted,
            log_posterior: state.density.log_posterior(),
        };

        state.iteration += 1;
        state.accepted += accepted;
        Ok((draw, progress))
    }

    fn dim(&self) -> usize {
        self.kernels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{mean_var, normal_logpdf};
    use crate::prior::Prior;
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Density built from plain functions of the position.
    struct Target {
        dim: usize,
        log_prior: fn(&[f64]) -> f64,
        log_likelihood: fn(&[f64]) -> f64,
    }

    impl LogDensity for Target {
        fn dim(&self) -> usize {
            self.dim
        }

        fn evaluate(&self, position: &[f64]) -> Density {
            let log_prior = (self.log_prior)(position);
            if log_prior == f64::NEG_INFINITY {
                return Density::ZERO;
            }
            Density {
                log_prior,
                log_likelihood: (self.log_likelihood)(position),
            }
        }
    }

    fn flat(_: &[f64]) -> f64 {
        0.
    }

    fn gaussian() -> Target {
        Target {
            dim: 1,
            log_prior: flat,
            log_likelihood: |x| normal_logpdf(x[0], 1., 2.),
        }
    }

    fn run<D: LogDensity>(
        density: D,
        kernels: Vec<Proposal>,
        scheme: UpdateScheme,
        start: &[f64],
        draws: usize,
        seed: u64,
    ) -> Vec<Draw> {
        let rng = ChaCha8Rng::seed_from_u64(seed);
        let mut chain = MetropolisChain::new(density, kernels, scheme, rng, 0).unwrap();
        chain.set_position(start).unwrap();
        (0..draws).map(|_| chain.draw().unwrap().0).collect()
    }

    #[test]
    fn gaussian_moments() {
        let draws = run(
            gaussian(),
            vec![Proposal::RandomWalk { sd: 2. }],
            UpdateScheme::Componentwise,
            &[0.],
            50_000,
            42,
        );
        let values: Vec<_> = draws.iter().map(|d| d.position[0]).collect();
        let (mean, var) = mean_var(&values);
        assert_abs_diff_eq!(mean, 1., epsilon = 0.15);
        assert_abs_diff_eq!(var, 4., epsilon = 0.4);
    }

    #[test]
    fn uniform_walk_moments() {
        let draws = run(
            gaussian(),
            vec![Proposal::UniformWalk { half_width: 3. }],
            UpdateScheme::Componentwise,
            &[0.],
            50_000,
            7,
        );
        let values: Vec<_> = draws.iter().map(|d| d.position[0]).collect();
        let (mean, var) = mean_var(&values);
        assert_abs_diff_eq!(mean, 1., epsilon = 0.15);
        assert_abs_diff_eq!(var, 4., epsilon = 0.4);
    }

    #[test]
    fn scaled_uniform_reaches_lognormal_target() {
        let target = Target {
            dim: 1,
            log_prior: |x| {
                Prior::LogNormal {
                    meanlog: 0.,
                    sdlog: 0.5,
                }
                .log_density(x[0])
            },
            log_likelihood: flat,
        };
        let draws = run(
            target,
            vec![Proposal::ScaledUniform {
                lower: 0.5,
                upper: 1.,
            }],
            UpdateScheme::Componentwise,
            &[1.],
            50_000,
            3,
        );
        let values: Vec<_> = draws.iter().map(|d| d.position[0]).collect();
        let (mean, _) = mean_var(&values);
        assert_abs_diff_eq!(mean, 0.125f64.exp(), epsilon = 0.05);
        assert!(values.iter().all(|&x| x > 0.));
    }

    #[test]
    fn bounded_support_is_respected() {
        let target = Target {
            dim: 1,
            log_prior: |x| {
                Prior::Uniform {
                    lower: 0.,
                    upper: 1.,
                }
                .log_density(x[0])
            },
            log_likelihood: flat,
        };
        let draws = run(
            target,
            vec![Proposal::RandomWalk { sd: 5. }],
            UpdateScheme::Componentwise,
            &[0.5],
            5_000,
            1,
        );
        assert!(draws.iter().all(|d| (0.0..=1.0).contains(&d.position[0])));
        assert!(draws.iter().all(|d| d.log_posterior().is_finite()));
        // Most proposals land outside the support.
        let accepted: u64 = draws.iter().map(|d| d.accepted).sum();
        assert!(accepted > 0 && accepted < 2_500);
    }

    #[test]
    fn joint_and_componentwise_agree_on_moments() {
        let target = || Target {
            dim: 2,
            log_prior: flat,
            log_likelihood: |x| normal_logpdf(x[0], -1., 1.) + normal_logpdf(x[1], 2., 0.5),
        };
        let kernels = vec![
            Proposal::RandomWalk { sd: 1.5 },
            Proposal::RandomWalk { sd: 0.7 },
        ];
        for scheme in [UpdateScheme::Componentwise, UpdateScheme::Joint] {
            let draws = run(target(), kernels.clone(), scheme, &[0., 0.], 40_000, 11);
            let x: Vec<_> = draws.iter().map(|d| d.position[0]).collect();
            let y: Vec<_> = draws.iter().map(|d| d.position[1]).collect();
            assert_abs_diff_eq!(mean_var(&x).0, -1., epsilon = 0.1);
            assert_abs_diff_eq!(mean_var(&y).0, 2., epsilon = 0.05);
        }
    }

    #[test]
    fn joint_scaled_uniform_sums_corrections() {
        let target = Target {
            dim: 2,
            log_prior: |x| {
                let prior = Prior::LogNormal {
                    meanlog: 0.,
                    sdlog: 0.5,
                };
                prior.log_density(x[0]) + prior.log_density(x[1])
            },
            log_likelihood: flat,
        };
        let kernel = Proposal::ScaledUniform {
            lower: 0.5,
            upper: 1.,
        };
        let draws = run(
            target,
            vec![kernel; 2],
            UpdateScheme::Joint,
            &[1., 1.],
            60_000,
            23,
        );
        // Without the correction both means drift to about 1.45.
        for idx in 0..2 {
            let values: Vec<_> = draws.iter().map(|d| d.position[idx]).collect();
            assert!(values.iter().all(|&x| x > 0.));
            assert_abs_diff_eq!(mean_var(&values).0, 0.125f64.exp(), epsilon = 0.06);
        }
    }

    #[test]
    fn same_seed_same_draws() {
        let kernels = vec![Proposal::RandomWalk { sd: 1. }];
        let a = run(gaussian(), kernels.clone(), UpdateScheme::Componentwise, &[0.], 500, 9);
        let b = run(gaussian(), kernels.clone(), UpdateScheme::Componentwise, &[0.], 500, 9);
        let c = run(gaussian(), kernels, UpdateScheme::Componentwise, &[0.], 500, 10);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn counters() {
        let rng = ChaCha8Rng::seed_from_u64(0);
        let mut chain = MetropolisChain::new(
            gaussian(),
            vec![Proposal::RandomWalk { sd: 1. }],
            UpdateScheme::Componentwise,
            rng,
            4,
        )
        .unwrap();
        chain.set_position(&[1.]).unwrap();
        let mut total = 0;
        for i in 0..100 {
            let (draw, progress) = chain.draw().unwrap();
            assert_eq!(draw.iteration, i);
            assert_eq!(progress.chain, 4);
            total += draw.accepted;
        }
        let state = chain.state().unwrap();
        assert_eq!(state.iteration, 100);
        assert_eq!(state.accepted, total);
        assert_eq!(chain.accepted(), &[total]);
        assert_eq!(chain.proposed(), &[100]);
    }

    #[test]
    fn initialization_errors() {
        let target = Target {
            dim: 1,
            log_prior: |x| {
                Prior::Uniform {
                    lower: 0.,
                    upper: 1.,
                }
                .log_density(x[0])
            },
            log_likelihood: flat,
        };
        let rng = ChaCha8Rng::seed_from_u64(0);
        let mut chain = MetropolisChain::new(
            target,
            vec![Proposal::RandomWalk { sd: 1. }],
            UpdateScheme::Componentwise,
            rng,
            0,
        )
        .unwrap();
        assert_eq!(chain.draw().unwrap_err(), McmcError::NotInitialized);
        assert!(matches!(
            chain.set_position(&[2.]),
            Err(McmcError::Initialization { .. })
        ));
        assert_eq!(
            chain.set_position(&[0.5, 0.5]),
            Err(McmcError::DimensionMismatch {
                expected: 1,
                found: 2
            })
        );

        let rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            MetropolisChain::new(gaussian(), vec![], UpdateScheme::Joint, rng, 0),
            Err(McmcError::DimensionMismatch { .. })
        ));
    }
}
