//! Bayesian calibration of DEBkiss energy budget models.
//!
//! The crate simulates the DEBkiss growth and reproduction model, defines a
//! posterior over a chosen subset of its parameters given observed time
//! series, and samples from that posterior with a Metropolis-Hastings driver.
//! Finished chains can be summarised, checked for convergence and turned into
//! ensembles of posterior trajectories.
//!
//! ```ignore
//! let parameters = ParameterSet::from_specs(specs)?;
//! let model = DebKiss::new(&parameters, settings.solver)?;
//! let likelihood = Likelihood::new(&parameters, &model, &observations, channels)?;
//! let posterior = Posterior::new(parameters, model, likelihood);
//! let trace = sample_parallel(&posterior, &settings, 4)?;
//! ```

pub(crate) mod chain;
pub(crate) mod data;
pub(crate) mod debkiss;
pub(crate) mod diagnostics;
pub(crate) mod likelihood;
pub(crate) mod math;
pub(crate) mod model;
pub(crate) mod ode;
pub(crate) mod parameter;
pub(crate) mod posterior;
pub(crate) mod predict;
pub(crate) mod prior;
pub(crate) mod proposal;
pub(crate) mod sampler;
pub(crate) mod trace;

pub use chain::{Chain, McmcError, McmcState, MetropolisChain};
pub use data::{DataError, Observations};
pub use debkiss::{DebKiss, DebKissRates, Fluxes, OBSERVABLE_NAMES, STATE_NAMES};
pub use diagnostics::{potential_scale_reduction, summarize, ParameterSummary};
pub use likelihood::{ChannelSpec, Likelihood, NoiseModel};
pub use model::{Density, ForwardModel, LogDensity, Model};
pub use ode::{integrate, OdeSystem, SolverMethod, SolverSettings, Trajectory};
pub use parameter::{
    log_prior, ConfigError, Estimation, Parameter, ParameterSet, ParameterSpec, Role,
};
pub use posterior::Posterior;
pub use predict::{predict, predict_chains, CredibleBand, Ensemble, Member};
pub use prior::Prior;
pub use proposal::{Proposal, Step};
pub use sampler::{
    run_chain, sample_parallel, sample_sequentially, InferenceSettings, InitPoint, Progress,
    UpdateScheme, MAX_PREDICTION_POINTS,
};
pub use trace::{Draw, SampleTrace, Trace};
