//! Summaries of finished traces.

use crate::math::{mean_var, quantile_sorted, sorted};
use crate::parameter::ConfigError;
use crate::trace::SampleTrace;

/// Marginal posterior summary of one parameter, pooled over chains.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub median: f64,
    /// 2.5% quantile
    pub lower: f64,
    /// 97.5% quantile
    pub upper: f64,
    pub num_draws: usize,
    pub acceptance_rate: f64,
}

/// Summaries of every parameter over the retained draws of `chains`.
///
/// All chains must sample the same parameters and `thin` must be positive.
pub fn summarize(
    chains: &[SampleTrace],
    burnin: usize,
    thin: usize,
) -> Result<Vec<ParameterSummary>, ConfigError> {
    if thin == 0 {
        return Err(ConfigError::InvalidSettings("thin must be positive".into()));
    }
    let Some(first) = chains.first() else {
        return Ok(Vec::new());
    };
    if let Some(other) = chains.iter().find(|c| c.names() != first.names()) {
        return Err(ConfigError::InvalidSettings(format!(
            "chain {} samples {:?}, chain {} samples {:?}",
            first.chain_id(),
            first.names(),
            other.chain_id(),
            other.names()
        )));
    }

    let summaries = first
        .names()
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let values: Vec<f64> = chains
                .iter()
                .flat_map(|chain| chain.retained(burnin, thin).map(move |d| d.position[idx]))
                .collect();
            let (mean, var) = mean_var(&values);
            let num_draws = values.len();
            let values = sorted(values);
            let (accepted, proposed) = chains
                .iter()
                .map(|c| c.parameter_counts(idx))
                .fold((0, 0), |(a, p), (ca, cp)| (a + ca, p + cp));
            ParameterSummary {
                name: name.clone(),
                mean,
                sd: var.sqrt(),
                median: quantile_sorted(&values, 0.5),
                lower: quantile_sorted(&values, 0.025),
                upper: quantile_sorted(&values, 0.975),
                num_draws,
                acceptance_rate: if proposed > 0 {
                    accepted as f64 / proposed as f64
                } else {
                    0.
                },
            }
        })
        .collect();
    Ok(summaries)
}

/// Gelman-Rubin potential scale reduction factor of one parameter.
///
/// Uses the first `n` draws after `burnin` of every chain, where `n` is the
/// length of the shortest chain. Returns `None` with fewer than two chains,
/// fewer than two draws per chain, or zero within-chain variance.
pub fn potential_scale_reduction(chains: &[SampleTrace], param: usize, burnin: usize) -> Option<f64> {
    let m = chains.len();
    if m < 2 {
        return None;
    }
    let n = chains
        .iter()
        .map(|c| c.len().saturating_sub(burnin))
        .min()?;
    if n < 2 {
        return None;
    }

    let moments: Vec<(f64, f64)> = chains
        .iter()
        .map(|chain| {
            let values: Vec<f64> = chain.column(param).skip(burnin).take(n).collect();
            mean_var(&values)
        })
        .collect();

    let n = n as f64;
    let means: Vec<f64> = moments.iter().map(|&(mean, _)| mean).collect();
    let (_, var_of_means) = mean_var(&means);
    let between = n * var_of_means;
    let within = moments.iter().map(|&(_, var)| var).sum::<f64>() / m as f64;
    if !(within > 0.) {
        return None;
    }
    let pooled = (n - 1.) / n * within + between / n;
    Some((pooled / within).sqrt())
}
