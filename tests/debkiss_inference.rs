use arrow::array::{Array, Float64Array};
use debkiss_rs::{
    potential_scale_reduction, predict, sample_parallel, summarize, ChannelSpec, DebKiss,
    ForwardModel, InferenceSettings, Likelihood, NoiseModel, Observations, ParameterSet,
    ParameterSpec, Posterior, Prior, Proposal, Role, SolverSettings,
};
use itertools::Itertools;
use pretty_assertions::assert_eq;

const TIMES: [f64; 5] = [10., 30., 50., 70., 90.];
const KAPPA_PRIOR_SD: f64 = 0.288_675_134_594_812_9; // 1 / sqrt(12)
const LOG_J_AM_PRIOR_SD: f64 = 0.5;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Noise-free observations of the reference organism, as a delimited table.
fn synthetic_table() -> String {
    let set = ParameterSet::from_specs(DebKiss::reference_parameters()).unwrap();
    let model = DebKiss::new(&set, SolverSettings::default()).unwrap();
    let values = set.values();
    let observables = model.observables(&values, &model.simulate(&values, &TIMES));

    let mut table = String::from("day,length,reproduction\n");
    for (time, row) in observables.rows() {
        table += &format!("{},{},{}\n", time, row[0], row[1]);
    }
    table
}

fn true_value(name: &str) -> f64 {
    DebKiss::reference_parameters()
        .into_iter()
        .find(|spec| spec.name == name)
        .unwrap()
        .value
}

fn posterior() -> Posterior<DebKiss> {
    let observations =
        Observations::from_csv_reader(synthetic_table().as_bytes(), "day", &["length", "reproduction"])
            .unwrap();

    let log_j_am = true_value("log_j_am");
    let specs = DebKiss::reference_parameters()
        .into_iter()
        .map(|spec| match spec.name.clone().as_str() {
            "kappa" => ParameterSpec::free(
                "kappa",
                Role::Dynamical,
                0.75,
                Prior::Uniform {
                    lower: 0.,
                    upper: 1.,
                },
                Proposal::RandomWalk { sd: 0.01 },
            ),
            "log_j_am" => ParameterSpec::free(
                "log_j_am",
                Role::Dynamical,
                log_j_am - 0.05,
                Prior::Normal {
                    mean: log_j_am,
                    sd: LOG_J_AM_PRIOR_SD,
                },
                Proposal::RandomWalk { sd: 0.01 },
            ),
            "sd_length" => ParameterSpec::fixed("sd_length", Role::Observation, 0.5),
            "sd_reproduction" => ParameterSpec::fixed("sd_reproduction", Role::Observation, 0.3),
            _ => spec,
        })
        .collect_vec();

    let parameters = ParameterSet::from_specs(specs).unwrap();
    let model = DebKiss::new(&parameters, SolverSettings::default()).unwrap();
    let likelihood = Likelihood::new(
        &parameters,
        &model,
        &observations,
        vec![
            ChannelSpec::new("length", NoiseModel::Normal, "sd_length"),
            ChannelSpec::new(
                "reproduction",
                NoiseModel::LogNormal { offset: 1. },
                "sd_reproduction",
            ),
        ],
    )
    .unwrap();
    Posterior::new(parameters, model, likelihood)
}

fn settings() -> InferenceSettings {
    InferenceSettings {
        num_draws: 1000,
        num_chains: 2,
        seed: 2024,
        burnin: 500,
        log_every: 250,
        ..Default::default()
    }
}

#[test]
fn recovers_generating_parameters() {
    init_logging();
    let posterior = posterior();
    let settings = settings();
    let trace = sample_parallel(&posterior, &settings, 2).unwrap();
    assert_eq!(trace.num_chains(), 2);

    let kappa_idx = trace.chains[0].parameter_index("kappa").unwrap();
    let log_j_am_idx = trace.chains[0].parameter_index("log_j_am").unwrap();
    for chain in trace.chains.iter() {
        assert_eq!(chain.len(), 1000);
        let rate = chain.acceptance_rate();
        assert!(rate > 0. && rate < 1., "acceptance rate {rate}");
        assert!(chain.draws().iter().all(|d| d.log_posterior().is_finite()));
        assert!(chain
            .column(kappa_idx)
            .all(|kappa| (0.0..=1.0).contains(&kappa)));
    }

    let summary = summarize(&trace.chains, settings.burnin, settings.thin).unwrap();
    let find = |name: &str| summary.iter().find(|s| s.name == name).unwrap();
    let kappa = find("kappa");
    let log_j_am = find("log_j_am");
    assert!((kappa.mean - true_value("kappa")).abs() < 3. * KAPPA_PRIOR_SD);
    assert!((log_j_am.mean - true_value("log_j_am")).abs() < 3. * LOG_J_AM_PRIOR_SD);
    assert!(kappa.lower <= kappa.median && kappa.median <= kappa.upper);

    for idx in [kappa_idx, log_j_am_idx] {
        let rhat = potential_scale_reduction(&trace.chains, idx, settings.burnin).unwrap();
        assert!(rhat.is_finite() && rhat >= 0.);
    }
}

#[test]
fn runs_are_reproducible() {
    let posterior = posterior();
    let settings = InferenceSettings {
        num_draws: 200,
        burnin: 100,
        ..settings()
    };
    let a = sample_parallel(&posterior, &settings, 2).unwrap();
    let b = sample_parallel(&posterior, &settings, 1).unwrap();
    assert_eq!(a, b);

    let other = sample_parallel(
        &posterior,
        &InferenceSettings {
            seed: 7,
            ..settings
        },
        2,
    )
    .unwrap();
    assert_ne!(a, other);
}

#[test]
fn posterior_predictions_follow_the_data() {
    let posterior = posterior();
    let settings = settings();
    let trace = sample_parallel(&posterior, &settings, 2).unwrap();

    let times = InferenceSettings {
        time_horizon: 90.,
        output_step: 10.,
        ..settings
    }
    .prediction_times();
    assert_eq!(times.len(), 10);

    let ensemble = predict(&trace.chains[0], settings.burnin, 5, &posterior, &times).unwrap();
    assert_eq!(ensemble.len() + ensemble.dropped(), 100);

    let band = ensemble.observable_band("length", 0.025, 0.975).unwrap();
    let observed: Vec<f64> = posterior
        .observations()
        .column(0)
        .map(|v| v.unwrap())
        .collect();
    // Observation times are every second grid point from day 10 on.
    for (i, &length) in observed.iter().enumerate() {
        let median = band.median[2 * i + 1];
        assert!((median - length).abs() < 0.1 * length, "{median} vs {length}");
    }
    for i in 1..times.len() {
        assert!(band.lower[i] <= band.upper[i]);
    }
}

#[test]
fn trace_exports_to_arrow() {
    let posterior = posterior();
    let settings = InferenceSettings {
        num_draws: 50,
        num_chains: 1,
        burnin: 0,
        ..settings()
    };
    let trace = sample_parallel(&posterior, &settings, 1).unwrap();
    let array = trace.chains[0].to_arrow().unwrap();
    assert_eq!(array.len(), 50);

    let names = array.fields().iter().map(|f| f.name().as_str()).collect_vec();
    assert_eq!(
        names,
        vec![
            "draw",
            "log_prior",
            "log_likelihood",
            "log_posterior",
            "accepted",
            "kappa",
            "log_j_am"
        ]
    );

    let kappa = array
        .column_by_name("kappa")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    let kappa_idx = trace.chains[0].parameter_index("kappa").unwrap();
    assert_eq!(
        kappa.values().to_vec(),
        trace.chains[0].column(kappa_idx).collect_vec()
    );
}

#[test]
fn invalid_settings_are_reported() {
    let posterior = posterior();
    let settings = InferenceSettings {
        thin: 0,
        ..settings()
    };
    let err = sample_parallel(&posterior, &settings, 1).unwrap_err();
    assert!(format!("{err:#}").contains("thin"));
}
