use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StructArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Fields};
use arrow::error::ArrowError;
use itertools::Itertools;

use crate::model::Density;

/// State of a chain after one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub iteration: u64,
    pub position: Box<[f64]>,
    pub log_prior: f64,
    pub log_likelihood: f64,
    /// Number of moves accepted during this iteration.
    pub accepted: u64,
}

impl Draw {
    pub fn density(&self) -> Density {
        Density {
            log_prior: self.log_prior,
            log_likelihood: self.log_likelihood,
        }
    }

    pub fn log_posterior(&self) -> f64 {
        self.density().log_posterior()
    }
}

/// Append-only record of one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTrace {
    chain_id: u64,
    names: Vec<String>,
    draws: Vec<Draw>,
    accepted: Vec<u64>,
    proposed: Vec<u64>,
}

impl SampleTrace {
    pub fn new(chain_id: u64, names: Vec<String>) -> Self {
        let dim = names.len();
        Self {
            chain_id,
            names,
            draws: Vec::new(),
            accepted: vec![0; dim],
            proposed: vec![0; dim],
        }
    }

    pub(crate) fn push(&mut self, draw: Draw) {
        assert_eq!(draw.position.len(), self.names.len());
        self.draws.push(draw);
    }

    pub(crate) fn set_counts(&mut self, accepted: &[u64], proposed: &[u64]) {
        self.accepted.copy_from_slice(accepted);
        self.proposed.copy_from_slice(proposed);
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dim(&self) -> usize {
        self.names.len()
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Fraction of accepted moves over the whole chain.
    pub fn acceptance_rate(&self) -> f64 {
        let proposed: u64 = self.proposed.iter().sum();
        if proposed == 0 {
            return 0.;
        }
        self.accepted.iter().sum::<u64>() as f64 / proposed as f64
    }

    /// Accepted and proposed moves of one parameter.
    pub fn parameter_counts(&self, idx: usize) -> (u64, u64) {
        (self.accepted[idx], self.proposed[idx])
    }

    /// Values of one parameter in draw order.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = f64> + '_ {
        self.draws.iter().map(move |draw| draw.position[idx])
    }

    /// Draws after discarding the first `burnin` and keeping every `thin`-th.
    ///
    /// # Panics
    ///
    /// If `thin` is zero. [`summarize`](crate::summarize) and
    /// [`predict`](crate::predict) check this and return an error instead.
    pub fn retained(&self, burnin: usize, thin: usize) -> impl Iterator<Item = &Draw> + '_ {
        assert!(thin > 0, "thinning interval must be positive");
        self.draws.iter().skip(burnin).step_by(thin)
    }

    /// Export as an Arrow struct array with one row per draw.
    pub fn to_arrow(&self) -> Result<StructArray, ArrowError> {
        let mut fields = vec![
            Field::new("draw", DataType::UInt64, false),
            Field::new("log_prior", DataType::Float64, false),
            Field::new("log_likelihood", DataType::Float64, false),
            Field::new("log_posterior", DataType::Float64, false),
            Field::new("accepted", DataType::UInt64, false),
        ];
        let mut arrays: Vec<ArrayRef> = vec![
            Arc::new(UInt64Array::from_iter_values(
                self.draws.iter().map(|d| d.iteration),
            )),
            Arc::new(Float64Array::from_iter_values(
                self.draws.iter().map(|d| d.log_prior),
            )),
            Arc::new(Float64Array::from_iter_values(
                self.draws.iter().map(|d| d.log_likelihood),
            )),
            Arc::new(Float64Array::from_iter_values(
                self.draws.iter().map(|d| d.log_posterior()),
            )),
            Arc::new(UInt64Array::from_iter_values(
                self.draws.iter().map(|d| d.accepted),
            )),
        ];
        for (idx, name) in self.names.iter().enumerate() {
            fields.push(Field::new(name, DataType::Float64, false));
            arrays.push(Arc::new(Float64Array::from_iter_values(self.column(idx))));
        }
        StructArray::try_new(Fields::from(fields), arrays, None)
    }
}

/// Finished traces of a multi-chain run, ordered by chain id.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub chains: Vec<SampleTrace>,
}

impl<I: Iterator<Item = SampleTrace>> From<I> for Trace {
    fn from(value: I) -> Self {
        let mut chains = value.into_iter().collect_vec();
        chains.sort_unstable_by_key(|x| x.chain_id);
        Trace { chains }
    }
}

impl Trace {
    pub fn num_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn names(&self) -> &[String] {
        self.chains.first().map(|c| c.names()).unwrap_or(&[])
    }

    /// Retained draws of all chains, chain by chain.
    pub fn retained(&self, burnin: usize, thin: usize) -> impl Iterator<Item = &Draw> + '_ {
        self.chains
            .iter()
            .flat_map(move |chain| chain.retained(burnin, thin))
    }
}
