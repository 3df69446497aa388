use anyhow::{Context, Result};
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::sync::mpsc::channel;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    chain::{Chain, McmcError, MetropolisChain},
    model::{LogDensity, Model},
    ode::SolverSettings,
    parameter::ConfigError,
    proposal::Proposal,
    trace::{Draw, SampleTrace, Trace},
};

/// How the free parameters are moved within one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateScheme {
    /// Propose and accept or reject one parameter at a time.
    #[default]
    Componentwise,
    /// Propose all parameters at once and accept or reject the whole move.
    Joint,
}

/// Where a chain starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitPoint {
    /// The declared values of the free parameters.
    #[default]
    Declared,
    /// A draw from the prior of each free parameter.
    PriorDraw,
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Progress {
    pub draw: u64,
    pub chain: u64,
    /// Moves accepted during this draw.
    pub accepted: u64,
    pub log_posterior: f64,
}

/// Settings for an inference run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceSettings {
    /// The number of iterations of each chain, including burn-in.
    pub num_draws: u64,
    pub num_chains: usize,
    pub seed: u64,
    pub scheme: UpdateScheme,
    pub init: InitPoint,
    /// Starting points tried per chain before giving up. Only prior draws
    /// are retried.
    pub max_init_tries: usize,
    /// Draws discarded at the start of each chain by summaries and predictions.
    pub burnin: usize,
    /// Keep every `thin`-th draw after burn-in.
    pub thin: usize,
    /// End of the time grid for posterior predictions.
    pub time_horizon: f64,
    /// Spacing of the time grid for posterior predictions.
    pub output_step: f64,
    pub solver: SolverSettings,
    /// Emit a progress event every `log_every` draws. Zero disables them.
    pub log_every: u64,
}

/// Upper bound on the length of [`InferenceSettings::prediction_times`].
pub const MAX_PREDICTION_POINTS: usize = 1_000_000;

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            num_draws: 2000,
            num_chains: 4,
            seed: 0,
            scheme: UpdateScheme::default(),
            init: InitPoint::default(),
            max_init_tries: 100,
            burnin: 1000,
            thin: 1,
            time_horizon: 100.,
            output_step: 1.,
            solver: SolverSettings::default(),
            log_every: 500,
        }
    }
}

impl InferenceSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidSettings(msg));
        if self.num_draws == 0 {
            return invalid("num_draws must be positive".into());
        }
        if self.num_chains == 0 {
            return invalid("num_chains must be positive".into());
        }
        if self.max_init_tries == 0 {
            return invalid("max_init_tries must be positive".into());
        }
        if self.thin == 0 {
            return invalid("thin must be positive".into());
        }
        if self.burnin as u64 >= self.num_draws {
            return invalid(format!(
                "burnin {} leaves no draws out of {}",
                self.burnin, self.num_draws
            ));
        }
        if !(self.time_horizon > 0.) || !self.time_horizon.is_finite() {
            return invalid(format!("time_horizon {} must be positive", self.time_horizon));
        }
        if !(self.output_step > 0.) || self.output_step > self.time_horizon {
            return invalid(format!(
                "output_step {} must be positive and at most time_horizon",
                self.output_step
            ));
        }
        let points = self.time_horizon / self.output_step;
        if points > MAX_PREDICTION_POINTS as f64 {
            return invalid(format!(
                "output_step {} gives {:.0} prediction times, at most {} are supported",
                self.output_step, points, MAX_PREDICTION_POINTS
            ));
        }
        if !(self.solver.max_step > 0.) || !self.solver.max_step.is_finite() {
            return invalid(format!(
                "solver max_step {} must be positive",
                self.solver.max_step
            ));
        }
        Ok(())
    }

    /// Output grid `0, output_step, ...` up to and including `time_horizon`.
    pub fn prediction_times(&self) -> Vec<f64> {
        let steps = (self.time_horizon / self.output_step + 1e-9).floor() as usize;
        let mut times = (0..=steps)
            .map(|i| i as f64 * self.output_step)
            .filter(|&t| t <= self.time_horizon)
            .collect_vec();
        if times
            .last()
            .is_some_and(|&last| self.time_horizon - last > 1e-9 * self.time_horizon)
        {
            times.push(self.time_horizon);
        }
        times
    }
}

/// Run a single chain from `start`, yielding draws lazily.
pub fn sample_sequentially<'a, D: LogDensity + 'a, R: Rng + 'a>(
    density: D,
    kernels: Vec<Proposal>,
    scheme: UpdateScheme,
    start: &[f64],
    draws: u64,
    chain: u64,
    rng: R,
) -> Result<impl Iterator<Item = Result<(Draw, Progress), McmcError>> + 'a, McmcError> {
    let mut sampler = MetropolisChain::new(density, kernels, scheme, rng, chain)?;
    sampler.set_position(start)?;
    Ok((0..draws).map(move |_| sampler.draw()))
}

/// Run one complete chain of a multi-chain run.
///
/// Chain `chain_id` draws from the ChaCha8 stream `chain_id` of the run seed,
/// so its result does not depend on which thread runs it.
pub fn run_chain<M: Model>(
    model: &M,
    settings: &InferenceSettings,
    chain_id: u64,
) -> Result<SampleTrace> {
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
    rng.set_stream(chain_id);

    let dim = model.dim();
    let chain_rng = ChaCha8Rng::from_rng(&mut rng);
    let mut sampler =
        MetropolisChain::new(model, model.proposals(), settings.scheme, chain_rng, chain_id)
            .context("Failed to create chain")?;

    let mut initval = vec![0f64; dim];
    let tries = match settings.init {
        InitPoint::Declared => 1,
        InitPoint::PriorDraw => settings.max_init_tries,
    };
    let mut error = None;
    for attempt in 0..tries {
        model
            .init_position(&mut rng, settings.init, &mut initval)
            .context("Failed to generate a new initial position")?;
        if let Err(err) = sampler.set_position(&initval) {
            warn!(chain = chain_id, attempt, position = ?initval, %err, "rejected initial point");
            error = Some(err);
            continue;
        }
        error = None;
        break;
    }
    if let Some(error) = error {
        return Err(anyhow::Error::new(error).context("All initialization points failed"));
    }

    info!(chain = chain_id, dim, draws = settings.num_draws, "starting chain");
    let start = Instant::now();
    let mut trace = SampleTrace::new(chain_id, model.parameter_names());
    for _ in 0..settings.num_draws {
        let (draw, progress) = sampler.draw()?;
        if settings.log_every > 0 && (progress.draw + 1) % settings.log_every == 0 {
            debug!(
                chain = progress.chain,
                draw = progress.draw + 1,
                log_posterior = progress.log_posterior,
                "sampling"
            );
        }
        trace.push(draw);
    }
    trace.set_counts(sampler.accepted(), sampler.proposed());

    info!(
        chain = chain_id,
        acceptance_rate = trace.acceptance_rate(),
        elapsed = ?start.elapsed(),
        "finished chain"
    );
    Ok(trace)
}

/// Run `settings.num_chains` chains on a thread pool with `num_cores` threads.
pub fn sample_parallel<M: Model>(
    model: &M,
    settings: &InferenceSettings,
    num_cores: usize,
) -> Result<Trace> {
    settings.validate().context("Invalid inference settings")?;

    let pool = ThreadPoolBuilder::new()
        .num_threads(num_cores.max(1))
        .thread_name(|i| format!("debkiss-worker-{}", i))
        .build()
        .context("Could not start thread pool")?;

    let (results_tx, results_rx) = channel();
    pool.install(|| {
        (0..settings.num_chains as u64)
            .into_par_iter()
            .for_each_with(results_tx, |results, chain_id| {
                let result = run_chain(model, settings, chain_id)
                    .with_context(|| format!("Chain {} failed", chain_id));
                // The receiver lives until all chains are done.
                let _ = results.send(result);
            });
    });

    let chains = results_rx.into_iter().collect::<Result<Vec<_>>>()?;
    Ok(Trace::from(chains.into_iter()))
}
