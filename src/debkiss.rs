//! The DEBkiss energy budget model.
//!
//! States are the structural mass `W_V` and the cumulative reproduction
//! buffer `W_R` (both in mg dry weight). Assimilation scales with surface area
//! (`L^2`), maintenance with structural volume (`L^3`). Maintenance is paid
//! first from the kappa flux, then from the reproduction flux and finally by
//! burning structure. The reproduction flux is only invested once the
//! structural mass exceeds the puberty threshold `W_Vp`.

use crate::model::ForwardModel;
use crate::ode::{integrate, OdeSystem, SolverSettings, Trajectory};
use crate::parameter::{ConfigError, ParameterSet, ParameterSpec, Role};

pub const STATE_NAMES: [&str; 2] = ["w_v", "w_r"];
pub const OBSERVABLE_NAMES: [&str; 2] = ["length", "reproduction"];

/// Rate constants, yields and conversion factors of one DEBkiss simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebKissRates {
    /// Scaled functional response (food level), between 0 and 1.
    pub f: f64,
    /// Maximum area-specific assimilation rate (mg mm^-2 d^-1).
    pub j_am: f64,
    /// Volume-specific maintenance rate (mg mm^-3 d^-1).
    pub j_mv: f64,
    /// Fraction of assimilates allocated to maintenance and growth.
    pub kappa: f64,
    /// Yield of structure on assimilates.
    pub y_va: f64,
    /// Yield of assimilates on structure, used when structure is burnt.
    pub y_av: f64,
    /// Yield of egg buffer on assimilates.
    pub y_ba: f64,
    /// Dry-weight density of structure (mg mm^-3).
    pub d_v: f64,
    /// Structural mass at puberty (mg).
    pub w_vp: f64,
    /// Dry weight of a freshly laid egg (mg).
    pub w_b0: f64,
    /// Shape correction between volumetric and physical length.
    pub delta_m: f64,
}

/// Energy fluxes at one state, in mg d^-1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fluxes {
    pub assimilation: f64,
    pub maintenance: f64,
    pub growth: f64,
    pub reproduction: f64,
}

impl DebKissRates {
    /// Volumetric length of a structure of mass `w_v`.
    pub fn length(&self, w_v: f64) -> f64 {
        (w_v.max(0.) / self.d_v).cbrt()
    }

    pub fn fluxes(&self, w_v: f64) -> Fluxes {
        let l = self.length(w_v);
        let assimilation = self.f * self.j_am * l * l;
        let maintenance = self.j_mv * l * l * l;

        let (growth, available) = if self.kappa * assimilation >= maintenance {
            (
                self.y_va * (self.kappa * assimilation - maintenance),
                (1. - self.kappa) * assimilation,
            )
        } else if assimilation >= maintenance {
            (0., assimilation - maintenance)
        } else {
            (-(maintenance - assimilation) / self.y_av, 0.)
        };

        let reproduction = if w_v >= self.w_vp { available } else { 0. };

        Fluxes {
            assimilation,
            maintenance,
            growth,
            reproduction,
        }
    }

    /// Physical length of a structure of mass `w_v`.
    pub fn physical_length(&self, w_v: f64) -> f64 {
        self.length(w_v) / self.delta_m
    }

    /// Cumulative number of offspring produced from a reproduction buffer `w_r`.
    pub fn offspring(&self, w_r: f64) -> f64 {
        self.y_ba * w_r / self.w_b0
    }
}

impl OdeSystem for DebKissRates {
    fn dim(&self) -> usize {
        2
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        let fluxes = self.fluxes(y[0]);
        dydt[0] = fluxes.growth;
        dydt[1] = fluxes.reproduction;
    }
}

#[derive(Debug, Clone, Copy)]
enum Assimilation {
    Linear(usize),
    Log(usize),
}

#[derive(Debug, Clone, Copy)]
struct Indices {
    f: usize,
    assimilation: Assimilation,
    j_mv: usize,
    kappa: usize,
    y_va: usize,
    y_av: usize,
    y_ba: usize,
    d_v: usize,
    w_vp: usize,
    w_b0: usize,
    delta_m: usize,
    w_v0: usize,
    w_r0: usize,
}

/// DEBkiss forward model bound to the layout of a [`ParameterSet`].
///
/// The maximum assimilation rate is read either from `j_am` or, when
/// estimated on the log scale, from `log_j_am`.
#[derive(Debug, Clone)]
pub struct DebKiss {
    idx: Indices,
    solver: SolverSettings,
}

impl DebKiss {
    pub fn new(parameters: &ParameterSet, solver: SolverSettings) -> Result<Self, ConfigError> {
        if !(solver.max_step > 0.) || !solver.max_step.is_finite() {
            return Err(ConfigError::InvalidSettings(format!(
                "solver step {} must be positive",
                solver.max_step
            )));
        }

        let dynamical = |name: &str| parameters.require(name, Role::Dynamical);

        let assimilation = match (
            parameters.index_of("j_am").is_some(),
            parameters.index_of("log_j_am").is_some(),
        ) {
            (true, false) => Assimilation::Linear(dynamical("j_am")?),
            (false, true) => Assimilation::Log(dynamical("log_j_am")?),
            (true, true) => {
                return Err(ConfigError::ConflictingParameters(
                    "j_am".into(),
                    "log_j_am".into(),
                ))
            }
            (false, false) => return Err(ConfigError::MissingParameter("j_am".into())),
        };

        let idx = Indices {
            f: dynamical("f")?,
            assimilation,
            j_mv: dynamical("j_mv")?,
            kappa: dynamical("kappa")?,
            y_va: dynamical("y_va")?,
            y_av: dynamical("y_av")?,
            y_ba: dynamical("y_ba")?,
            d_v: dynamical("d_v")?,
            w_vp: dynamical("w_vp")?,
            w_b0: dynamical("w_b0")?,
            delta_m: dynamical("delta_m")?,
            w_v0: parameters.require("w_v0", Role::InitialCondition)?,
            w_r0: parameters.require("w_r0", Role::InitialCondition)?,
        };

        if let Some(extra) = parameters
            .iter()
            .filter(|p| p.role() == Role::InitialCondition)
            .find(|p| !matches!(p.name(), "w_v0" | "w_r0"))
        {
            return Err(ConfigError::UnusedInitialCondition(extra.name().to_string()));
        }

        Ok(Self { idx, solver })
    }

    pub fn solver(&self) -> &SolverSettings {
        &self.solver
    }

    pub fn rates(&self, parameters: &[f64]) -> DebKissRates {
        let idx = &self.idx;
        let j_am = match idx.assimilation {
            Assimilation::Linear(i) => parameters[i],
            Assimilation::Log(i) => parameters[i].exp(),
        };
        DebKissRates {
            f: parameters[idx.f],
            j_am,
            j_mv: parameters[idx.j_mv],
            kappa: parameters[idx.kappa],
            y_va: parameters[idx.y_va],
            y_av: parameters[idx.y_av],
            y_ba: parameters[idx.y_ba],
            d_v: parameters[idx.d_v],
            w_vp: parameters[idx.w_vp],
            w_b0: parameters[idx.w_b0],
            delta_m: parameters[idx.delta_m],
        }
    }

    pub fn initial_state(&self, parameters: &[f64]) -> [f64; 2] {
        [parameters[self.idx.w_v0], parameters[self.idx.w_r0]]
    }

    /// Integrate the DEBkiss equations from time zero.
    pub fn simulate_from(
        &self,
        rates: &DebKissRates,
        initial_state: &[f64],
        times: &[f64],
    ) -> Trajectory {
        integrate(rates, 0., initial_state, times, &self.solver)
    }

    /// Parameter values for a pond-snail-like organism with every parameter
    /// fixed. Free the ones to be estimated before registering them.
    pub fn reference_parameters() -> Vec<ParameterSpec> {
        use Role::*;
        vec![
            ParameterSpec::fixed("f", Dynamical, 1.),
            ParameterSpec::fixed("kappa", Dynamical, 0.8),
            ParameterSpec::fixed("log_j_am", Dynamical, 0.1f64.ln()),
            ParameterSpec::fixed("j_mv", Dynamical, 0.005),
            ParameterSpec::fixed("y_va", Dynamical, 0.8),
            ParameterSpec::fixed("y_av", Dynamical, 0.8),
            ParameterSpec::fixed("y_ba", Dynamical, 0.95),
            ParameterSpec::fixed("d_v", Dynamical, 0.1),
            ParameterSpec::fixed("w_vp", Dynamical, 30.),
            ParameterSpec::fixed("w_b0", Dynamical, 0.05),
            ParameterSpec::fixed("delta_m", Dynamical, 0.4),
            ParameterSpec::fixed("w_v0", InitialCondition, 0.1),
            ParameterSpec::fixed("w_r0", InitialCondition, 0.),
            ParameterSpec::fixed("sd_length", Observation, 0.05),
            ParameterSpec::fixed("sd_reproduction", Observation, 0.2),
        ]
    }
}

impl ForwardModel for DebKiss {
    fn state_names(&self) -> &[&'static str] {
        &STATE_NAMES
    }

    fn observable_names(&self) -> &[&'static str] {
        &OBSERVABLE_NAMES
    }

    fn simulate(&self, parameters: &[f64], times: &[f64]) -> Trajectory {
        let rates = self.rates(parameters);
        let init = self.initial_state(parameters);
        self.simulate_from(&rates, &init, times)
    }

    fn observe(&self, parameters: &[f64], state: &[f64], out: &mut [f64]) {
        let rates = self.rates(parameters);
        out[0] = rates.physical_length(state[0]);
        out[1] = rates.offspring(state[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn reference() -> (ParameterSet, DebKiss) {
        let set = ParameterSet::from_specs(DebKiss::reference_parameters()).unwrap();
        let model = DebKiss::new(&set, SolverSettings::default()).unwrap();
        (set, model)
    }

    fn with_value(set: &ParameterSet, name: &str, value: f64) -> Vec<f64> {
        let mut values = set.values();
        values[set.index_of(name).unwrap()] = value;
        values
    }

    fn grid() -> Vec<f64> {
        (0..=60).map(|i| i as f64 * 2.5).collect()
    }

    #[test]
    fn deterministic() {
        let (set, model) = reference();
        let a = model.simulate(&set.values(), &grid());
        let b = model.simulate(&set.values(), &grid());
        assert_eq!(a, b);
        assert!(a.is_finite());
    }

    #[test]
    fn starvation_never_grows() {
        let (set, model) = reference();
        let values = with_value(&set, "f", 0.);
        let traj = model.simulate(&values, &grid());
        let obs = model.observables(&values, &traj);
        let lengths: Vec<f64> = obs.column(0).collect();
        assert!(lengths.windows(2).all(|w| w[1] <= w[0]));
        assert!(lengths[lengths.len() - 1] < lengths[0]);
        assert!(obs.column(1).all(|r| r == 0.));
    }

    #[test]
    fn growth_approaches_maximum_length() {
        let (set, model) = reference();
        let values = set.values();
        let rates = model.rates(&values);
        let l_max = rates.kappa * rates.f * rates.j_am / rates.j_mv;

        let traj = model.simulate(&values, &[2000.]);
        assert_relative_eq!(rates.length(traj.state(0)[0]), l_max, max_relative = 1e-3);

        // von Bertalanffy growth in volumetric length
        let r_b = rates.y_va * rates.j_mv / (3. * rates.d_v);
        let l0 = rates.length(values[set.index_of("w_v0").unwrap()]);
        let t = 20.;
        let expected = l_max - (l_max - l0) * (-r_b * t).exp();
        let traj = model.simulate(&values, &[t]);
        assert_relative_eq!(rates.length(traj.state(0)[0]), expected, max_relative = 1e-6);
    }

    #[test]
    fn no_reproduction_before_puberty() {
        let (set, model) = reference();
        let values = set.values();
        let rates = model.rates(&values);
        let traj = model.simulate(&values, &grid());
        for (_, state) in traj.rows() {
            if state[0] < 0.99 * rates.w_vp {
                assert_eq!(state[1], 0.);
            }
        }
        let buffer: Vec<f64> = traj.column(1).collect();
        assert!(buffer[buffer.len() - 1] > 0.);
        assert!(buffer.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn log_assimilation_matches_linear() {
        let (set, model) = reference();
        let mut specs = DebKiss::reference_parameters();
        for spec in specs.iter_mut() {
            if spec.name == "log_j_am" {
                spec.name = "j_am".into();
                spec.value = spec.value.exp();
            }
        }
        let linear_set = ParameterSet::from_specs(specs).unwrap();
        let linear = DebKiss::new(&linear_set, SolverSettings::default()).unwrap();

        let a = model.simulate(&set.values(), &grid());
        let b = linear.simulate(&linear_set.values(), &grid());
        for (x, y) in a.rows().zip(b.rows()) {
            assert_relative_eq!(x.1[0], y.1[0], max_relative = 1e-12);
            assert_relative_eq!(x.1[1], y.1[1], max_relative = 1e-12);
        }
    }

    #[test]
    fn invalid_parameters_do_not_panic() {
        let (set, model) = reference();
        let values = with_value(&set, "d_v", 0.);
        let traj = model.simulate(&values, &grid());
        assert_eq!(traj.len(), grid().len());
    }

    #[test]
    fn configuration_errors() {
        let specs: Vec<_> = DebKiss::reference_parameters()
            .into_iter()
            .filter(|s| s.name != "j_mv")
            .collect();
        let set = ParameterSet::from_specs(specs).unwrap();
        assert_eq!(
            DebKiss::new(&set, SolverSettings::default()).unwrap_err(),
            ConfigError::MissingParameter("j_mv".into())
        );

        let mut specs = DebKiss::reference_parameters();
        specs.push(ParameterSpec::fixed("j_am", Role::Dynamical, 0.1));
        let set = ParameterSet::from_specs(specs).unwrap();
        assert!(matches!(
            DebKiss::new(&set, SolverSettings::default()),
            Err(ConfigError::ConflictingParameters(..))
        ));

        let mut specs = DebKiss::reference_parameters();
        specs.push(ParameterSpec::fixed("w_b_init", Role::InitialCondition, 0.1));
        let set = ParameterSet::from_specs(specs).unwrap();
        assert_eq!(
            DebKiss::new(&set, SolverSettings::default()).unwrap_err(),
            ConfigError::UnusedInitialCondition("w_b_init".into())
        );
    }
}
