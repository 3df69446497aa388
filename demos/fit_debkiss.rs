//! Fit kappa and the assimilation rate of the DEBkiss model to growth and
//! reproduction data.
//!
//! Usage: `cargo run --release --example fit_debkiss [observations.csv]`
//!
//! The table needs the columns `day`, `length` and `reproduction`. Without
//! a file, noisy synthetic observations of the reference organism are used.

use anyhow::{Context, Result};
use debkiss_rs::{
    potential_scale_reduction, predict_chains, sample_parallel, summarize, ChannelSpec, DebKiss,
    ForwardModel, InferenceSettings, InitPoint, Likelihood, NoiseModel, Observations,
    ParameterSet, ParameterSpec, Posterior, Prior, Proposal, Role,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::info;

fn synthetic_observations(settings: &InferenceSettings) -> Result<Observations> {
    let set = ParameterSet::from_specs(DebKiss::reference_parameters())?;
    let model = DebKiss::new(&set, settings.solver)?;
    let values = set.values();
    let times: Vec<f64> = (1..=12).map(|week| 7. * week as f64).collect();
    let observables = model.observables(&values, &model.simulate(&values, &times));

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut noisy = |value: f64, sd: f64, offset: f64| {
        let z: f64 = StandardNormal.sample(&mut rng);
        ((value + offset).ln() + sd * z).exp() - offset
    };
    let length = observables
        .column(0)
        .map(|l| Some(noisy(l, 0.05, 0.)))
        .collect::<Vec<_>>();
    let reproduction = observables
        .column(1)
        .map(|r| Some(noisy(r, 0.2, 1.).max(0.).round()))
        .collect::<Vec<_>>();
    Ok(Observations::new(
        times,
        vec![
            ("length".to_string(), length),
            ("reproduction".to_string(), reproduction),
        ],
    )?)
}

fn parameters() -> Result<ParameterSet> {
    let specs = DebKiss::reference_parameters()
        .into_iter()
        .map(|spec| match spec.name.clone().as_str() {
            "kappa" => ParameterSpec::free(
                "kappa",
                Role::Dynamical,
                0.7,
                Prior::Uniform {
                    lower: 0.,
                    upper: 1.,
                },
                Proposal::RandomWalk { sd: 0.02 },
            ),
            "log_j_am" => ParameterSpec::free(
                "log_j_am",
                Role::Dynamical,
                spec.value,
                Prior::Normal {
                    mean: spec.value,
                    sd: 0.5,
                },
                Proposal::RandomWalk { sd: 0.02 },
            ),
            "sd_length" => ParameterSpec::free(
                "sd_length",
                Role::Observation,
                0.1,
                Prior::LogNormal {
                    meanlog: -2.,
                    sdlog: 1.,
                },
                Proposal::ScaledUniform {
                    lower: 0.8,
                    upper: 1.,
                },
            ),
            _ => spec,
        });
    Ok(ParameterSet::from_specs(specs)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let settings = InferenceSettings {
        num_draws: 4000,
        num_chains: 4,
        burnin: 2000,
        thin: 10,
        seed: 42,
        init: InitPoint::PriorDraw,
        time_horizon: 120.,
        output_step: 5.,
        ..Default::default()
    };
    settings.validate()?;

    let observations = match std::env::args().nth(1) {
        Some(path) => Observations::from_csv_path(&path, "day", &["length", "reproduction"])
            .with_context(|| format!("Could not load observations from {}", path))?,
        None => synthetic_observations(&settings)?,
    };
    info!(rows = observations.len(), "loaded observations");

    let parameters = parameters()?;
    let model = DebKiss::new(&parameters, settings.solver)?;
    let likelihood = Likelihood::new(
        &parameters,
        &model,
        &observations,
        vec![
            ChannelSpec::new(
                "length",
                NoiseModel::LogNormal { offset: 0. },
                "sd_length",
            ),
            ChannelSpec::new(
                "reproduction",
                NoiseModel::LogNormal { offset: 1. },
                "sd_reproduction",
            ),
        ],
    )?;
    let posterior = Posterior::new(parameters, model, likelihood);

    let num_cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let trace = sample_parallel(&posterior, &settings, num_cores)?;

    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8} {:>8}",
        "parameter", "mean", "sd", "2.5%", "median", "97.5%", "accept", "rhat"
    );
    for (idx, summary) in summarize(&trace.chains, settings.burnin, settings.thin)?
        .iter()
        .enumerate()
    {
        let rhat = potential_scale_reduction(&trace.chains, idx, settings.burnin);
        println!(
            "{:<12} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>8.3} {:>8}",
            summary.name,
            summary.mean,
            summary.sd,
            summary.lower,
            summary.median,
            summary.upper,
            summary.acceptance_rate,
            rhat.map_or("-".to_string(), |r| format!("{:.3}", r)),
        );
    }

    let ensemble = predict_chains(
        &trace,
        settings.burnin,
        settings.thin,
        &posterior,
        &settings.prediction_times(),
    )?;
    for name in ["length", "reproduction"] {
        let Some(band) = ensemble.observable_band(name, 0.025, 0.975) else {
            continue;
        };
        println!("\n{} (95% band of the mean trajectory)", name);
        for i in (0..band.times.len()).step_by(4) {
            println!(
                "  t = {:>6.1}  {:>10.3}  [{:>10.3}, {:>10.3}]",
                band.times[i], band.median[i], band.lower[i], band.upper[i]
            );
        }
    }
    Ok(())
}
