//! Declaration and bookkeeping of model parameters.
//!
//! Parameters are declared as [`ParameterSpec`]s and validated when they are
//! registered into a [`ParameterSet`]. The set is built once before inference
//! and is immutable afterwards; the sampler only ever moves the free
//! parameters and merges them back into a full vector in registry order.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::prior::Prior;
use crate::proposal::Proposal;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("parameter `{0}` is registered twice")]
    DuplicateParameter(String),
    #[error("parameter `{name}` has non-finite value {value}")]
    NonFiniteValue { name: String, value: f64 },
    #[error("free parameter `{0}` has no prior")]
    MissingPrior(String),
    #[error("free parameter `{0}` has no proposal kernel")]
    MissingProposal(String),
    #[error("fixed parameter `{0}` must not declare a prior or a proposal kernel")]
    FixedWithEstimation(String),
    #[error("invalid prior for `{name}`: {reason}")]
    InvalidPrior { name: String, reason: String },
    #[error("invalid proposal kernel for `{name}`: {reason}")]
    InvalidProposal { name: String, reason: String },
    #[error("parameter `{0}` is required but not registered")]
    MissingParameter(String),
    #[error("only one of `{0}` and `{1}` may be registered")]
    ConflictingParameters(String, String),
    #[error("parameter `{name}` must have role {expected}, found {found}")]
    WrongRole {
        name: String,
        expected: Role,
        found: Role,
    },
    #[error("initial-condition parameter `{0}` does not match any state variable")]
    UnusedInitialCondition(String),
    #[error("the forward model has no observable `{0}`")]
    UnknownObservable(String),
    #[error("the observations have no column `{0}`")]
    MissingObservations(String),
    #[error("channel `{0}` contains a zero observation, which a log-normal noise model without offset cannot describe")]
    ZeroObservation(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// What a parameter controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Rate constants and yields of the differential equations.
    Dynamical,
    /// Noise scales of the observation model.
    Observation,
    /// Value of a state variable at time zero.
    InitialCondition,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Dynamical => write!(f, "dynamical"),
            Role::Observation => write!(f, "observation"),
            Role::InitialCondition => write!(f, "initial condition"),
        }
    }
}

/// Whether a parameter is held constant or estimated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Estimation {
    Fixed,
    Free { prior: Prior, proposal: Proposal },
}

/// Declaration of a parameter before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub role: Role,
    pub value: f64,
    pub free: bool,
    pub prior: Option<Prior>,
    pub proposal: Option<Proposal>,
}

impl ParameterSpec {
    pub fn fixed(name: impl Into<String>, role: Role, value: f64) -> Self {
        Self {
            name: name.into(),
            role,
            value,
            free: false,
            prior: None,
            proposal: None,
        }
    }

    pub fn free(
        name: impl Into<String>,
        role: Role,
        value: f64,
        prior: Prior,
        proposal: Proposal,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            value,
            free: true,
            prior: Some(prior),
            proposal: Some(proposal),
        }
    }
}

/// A validated parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    role: Role,
    value: f64,
    estimation: Estimation,
}

impl Parameter {
    fn from_spec(spec: ParameterSpec) -> Result<Self, ConfigError> {
        let ParameterSpec {
            name,
            role,
            value,
            free,
            prior,
            proposal,
        } = spec;

        if !value.is_finite() {
            return Err(ConfigError::NonFiniteValue { name, value });
        }

        let estimation = if free {
            let Some(prior) = prior else {
                return Err(ConfigError::MissingPrior(name));
            };
            let Some(proposal) = proposal else {
                return Err(ConfigError::MissingProposal(name));
            };
            if let Err(reason) = prior.validate() {
                return Err(ConfigError::InvalidPrior { name, reason });
            }
            if let Err(reason) = proposal.validate() {
                return Err(ConfigError::InvalidProposal { name, reason });
            }
            Estimation::Free { prior, proposal }
        } else {
            if prior.is_some() || proposal.is_some() {
                return Err(ConfigError::FixedWithEstimation(name));
            }
            Estimation::Fixed
        };

        Ok(Self {
            name,
            role,
            value,
            estimation,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The declared value: the starting point of a free parameter or the
    /// constant of a fixed one.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn estimation(&self) -> &Estimation {
        &self.estimation
    }

    pub fn is_free(&self) -> bool {
        matches!(self.estimation, Estimation::Free { .. })
    }

    pub fn prior(&self) -> Option<&Prior> {
        match &self.estimation {
            Estimation::Free { prior, .. } => Some(prior),
            Estimation::Fixed => None,
        }
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        match &self.estimation {
            Estimation::Free { proposal, .. } => Some(proposal),
            Estimation::Fixed => None,
        }
    }
}

/// Log prior density of `value` under the prior of `parameter`.
///
/// Fixed parameters contribute nothing.
pub fn log_prior(value: f64, parameter: &Parameter) -> f64 {
    match parameter.prior() {
        Some(prior) => prior.log_density(value),
        None => 0.,
    }
}

/// Registry of all parameters of an inference problem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
    index: HashMap<String, usize>,
    free: Vec<usize>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of declarations.
    pub fn from_specs(specs: impl IntoIterator<Item = ParameterSpec>) -> Result<Self, ConfigError> {
        let mut set = Self::new();
        for spec in specs {
            set.register(spec)?;
        }
        Ok(set)
    }

    /// Validate a declaration and append it to the registry.
    pub fn register(&mut self, spec: ParameterSpec) -> Result<&mut Self, ConfigError> {
        if self.index.contains_key(&spec.name) {
            return Err(ConfigError::DuplicateParameter(spec.name));
        }
        let parameter = Parameter::from_spec(spec)?;
        let idx = self.parameters.len();
        if parameter.is_free() {
            self.free.push(idx);
        }
        self.index.insert(parameter.name.clone(), idx);
        self.parameters.push(parameter);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Number of free parameters.
    pub fn dim(&self) -> usize {
        self.free.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> + '_ {
        self.parameters.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.index.get(name).map(|&idx| &self.parameters[idx])
    }

    /// Position of `name` in the full parameter vector.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Position of a required parameter, checking its role.
    pub fn require(&self, name: &str, role: Role) -> Result<usize, ConfigError> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| ConfigError::MissingParameter(name.to_string()))?;
        let found = self.parameters[idx].role;
        if found != role {
            return Err(ConfigError::WrongRole {
                name: name.to_string(),
                expected: role,
                found,
            });
        }
        Ok(idx)
    }

    /// Partition into estimated and constant parameters, both in registry order.
    pub fn split(&self) -> (Vec<&Parameter>, Vec<&Parameter>) {
        self.parameters.iter().partition(|p| p.is_free())
    }

    pub fn free_parameters(&self) -> impl Iterator<Item = &Parameter> + '_ {
        self.free.iter().map(|&idx| &self.parameters[idx])
    }

    pub fn free_names(&self) -> Vec<String> {
        self.free_parameters().map(|p| p.name.clone()).collect()
    }

    pub fn proposals(&self) -> Vec<Proposal> {
        self.free_parameters()
            .filter_map(|p| p.proposal().copied())
            .collect()
    }

    /// Declared values of the free parameters.
    pub fn initial_position(&self) -> Vec<f64> {
        self.free_parameters().map(|p| p.value).collect()
    }

    /// Declared values of all parameters.
    pub fn values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value).collect()
    }

    /// Full parameter vector with the free values replaced by `free_values`.
    pub fn merge(&self, free_values: &[f64]) -> Vec<f64> {
        let mut full = self.values();
        self.merge_into(free_values, &mut full);
        full
    }

    pub fn merge_into(&self, free_values: &[f64], full: &mut [f64]) {
        assert_eq!(free_values.len(), self.free.len());
        assert_eq!(full.len(), self.parameters.len());
        for (&idx, &value) in self.free.iter().zip(free_values) {
            full[idx] = value;
        }
    }

    /// Sum of the log prior densities of the free parameters.
    pub fn log_prior(&self, free_values: &[f64]) -> f64 {
        assert_eq!(free_values.len(), self.free.len());
        let mut total = 0.;
        for (parameter, &value) in self.free_parameters().zip(free_values) {
            let lp = log_prior(value, parameter);
            if lp == f64::NEG_INFINITY {
                return lp;
            }
            total += lp;
        }
        total
    }
}
