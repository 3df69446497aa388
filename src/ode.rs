//! Fixed-step explicit integrators for small ODE systems.
//!
//! The forward models in this crate are cheap, smooth and evaluated many
//! thousands of times during sampling, so a fixed-step scheme with a bounded
//! internal step is preferred over adaptive error control: it makes every
//! simulation a deterministic function of its inputs.

use crate::math::all_finite;

/// Right-hand side `dy/dt = f(t, y)` of an ODE system.
pub trait OdeSystem {
    /// Number of state variables.
    fn dim(&self) -> usize;

    /// Write the derivative at `(t, y)` into `dydt`.
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

/// Integration scheme used between output times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverMethod {
    Euler,
    Midpoint,
    #[default]
    Rk4,
}

/// Settings for the fixed-step integrators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub method: SolverMethod,
    /// Upper bound on the internal step. Each interval between two output
    /// times is split into the smallest number of equal steps not exceeding it.
    pub max_step: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            method: SolverMethod::Rk4,
            max_step: 0.1,
        }
    }
}

/// States of one simulation at the requested output times.
///
/// A simulation that produced non-finite values stops there and fills all
/// remaining rows with NaN, so `is_finite` is the sentinel for a diverged run.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    times: Vec<f64>,
    states: Vec<f64>,
    dim: usize,
}

impl Trajectory {
    pub fn new(times: Vec<f64>, states: Vec<f64>, dim: usize) -> Self {
        assert_eq!(times.len() * dim, states.len());
        Self { times, states, dim }
    }

    /// Number of state variables per row.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// State vector at the `idx`-th output time.
    pub fn state(&self, idx: usize) -> &[f64] {
        &self.states[idx * self.dim..(idx + 1) * self.dim]
    }

    pub fn rows(&self) -> impl Iterator<Item = (f64, &[f64])> + '_ {
        self.times.iter().copied().zip(self.states.chunks_exact(self.dim.max(1)))
    }

    /// Values of one state variable over time.
    pub fn column(&self, var: usize) -> impl Iterator<Item = f64> + '_ {
        assert!(var < self.dim);
        self.states.iter().skip(var).step_by(self.dim).copied()
    }

    pub fn is_finite(&self) -> bool {
        all_finite(&self.states)
    }
}

/// Work buffers of the integrator, allocated once per simulation.
struct Workspace {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    tmp: Vec<f64>,
}

impl Workspace {
    fn new(dim: usize) -> Self {
        Self {
            k1: vec![0.; dim],
            k2: vec![0.; dim],
            k3: vec![0.; dim],
            k4: vec![0.; dim],
            tmp: vec![0.; dim],
        }
    }
}

fn step<S: OdeSystem + ?Sized>(
    system: &S,
    method: SolverMethod,
    t: f64,
    h: f64,
    y: &mut [f64],
    ws: &mut Workspace,
) {
    let Workspace {
        k1,
        k2,
        k3,
        k4,
        tmp,
    } = ws;
    match method {
        SolverMethod::Euler => {
            system.rhs(t, y, k1);
            y.iter_mut().zip(k1.iter()).for_each(|(y, k)| *y += h * k);
        }
        SolverMethod::Midpoint => {
            system.rhs(t, y, k1);
            for (out, (y, k)) in tmp.iter_mut().zip(y.iter().zip(k1.iter())) {
                *out = y + 0.5 * h * k;
            }
            system.rhs(t + 0.5 * h, tmp, k2);
            y.iter_mut().zip(k2.iter()).for_each(|(y, k)| *y += h * k);
        }
        SolverMethod::Rk4 => {
            system.rhs(t, y, k1);
            for (out, (y, k)) in tmp.iter_mut().zip(y.iter().zip(k1.iter())) {
                *out = y + 0.5 * h * k;
            }
            system.rhs(t + 0.5 * h, tmp, k2);
            for (out, (y, k)) in tmp.iter_mut().zip(y.iter().zip(k2.iter())) {
                *out = y + 0.5 * h * k;
            }
            system.rhs(t + 0.5 * h, tmp, k3);
            for (out, (y, k)) in tmp.iter_mut().zip(y.iter().zip(k3.iter())) {
                *out = y + h * k;
            }
            system.rhs(t + h, tmp, k4);
            for (i, y) in y.iter_mut().enumerate() {
                *y += h / 6. * (k1[i] + 2. * k2[i] + 2. * k3[i] + k4[i]);
            }
        }
    }
}

/// Integrate `system` from `(t0, y0)` and record the state at each of `times`.
///
/// `times` must be strictly increasing and not smaller than `t0`.
pub fn integrate<S: OdeSystem + ?Sized>(
    system: &S,
    t0: f64,
    y0: &[f64],
    times: &[f64],
    settings: &SolverSettings,
) -> Trajectory {
    let dim = system.dim();
    assert_eq!(y0.len(), dim);
    debug_assert!(times.windows(2).all(|w| w[0] < w[1]));

    let mut states = Vec::with_capacity(times.len() * dim);
    let mut y = y0.to_vec();
    let mut ws = Workspace::new(dim);
    let mut t = t0;

    for (idx, &target) in times.iter().enumerate() {
        let span = target - t;
        if span > 0. {
            let n_steps = (span / settings.max_step).ceil().max(1.);
            let h = span / n_steps;
            for i in 0..n_steps as u64 {
                step(system, settings.method, t + i as f64 * h, h, &mut y, &mut ws);
            }
            t = target;
        }
        if !all_finite(&y) {
            states.resize(times.len() * dim, f64::NAN);
            debug_assert_eq!(states.len(), times.len() * dim);
            return Trajectory::new(times.to_vec(), states, dim);
        }
        debug_assert_eq!(states.len(), idx * dim);
        states.extend_from_slice(&y);
    }

    Trajectory::new(times.to_vec(), states, dim)
}
