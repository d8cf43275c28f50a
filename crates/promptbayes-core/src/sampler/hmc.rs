//! Hamiltonian Monte Carlo chains with warmup adaptation.
//!
//! Each chain runs `tune` warmup transitions followed by `draws` retained
//! transitions of fixed-length leapfrog trajectories:
//!
//! ```text
//! p ~ N(0, M)
//! H(θ, p) = -log π(θ) + ½ pᵀ M⁻¹ p
//! accept with probability min(1, exp(H₀ - H₁))
//! ```
//!
//! During warmup the step size is tuned by dual averaging towards the target
//! acceptance statistic, and a diagonal mass matrix is estimated from the
//! middle window of warmup draws. Retained transitions jitter the step size
//! by ±10% to avoid periodic trajectories.

use nalgebra::DVector;
use rand::prelude::*;
use rand::SeedableRng;
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::constants::DIVERGENCE_ENERGY_THRESHOLD;
use crate::math;
use crate::model::{Draw, HierarchicalModel};

use super::SamplerConfig;

/// Dual-averaging shrinkage γ.
const DA_GAMMA: f64 = 0.05;

/// Dual-averaging iteration offset t₀.
const DA_T0: f64 = 10.0;

/// Dual-averaging decay exponent κ.
const DA_KAPPA: f64 = 0.75;

/// Fraction of warmup after which the mass-matrix window opens.
const MASS_WINDOW_START: f64 = 0.15;

/// Fraction of warmup at which the mass-matrix window closes.
const MASS_WINDOW_END: f64 = 0.75;

/// Warmup shorter than this keeps the identity mass matrix.
const MIN_TUNE_FOR_MASS: usize = 20;

/// Maximum doublings/halvings when searching for an initial step size.
const MAX_STEP_SIZE_SEARCH: usize = 100;

/// Half-width of the uniform jitter applied to initial coordinates.
const INIT_JITTER: f64 = 0.5;

/// Per-chain sampler statistics over retained transitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    /// Chain id.
    pub chain: usize,
    /// Divergent retained transitions.
    pub divergences: usize,
    /// Mean acceptance statistic.
    pub mean_accept_stat: f64,
    /// Step size after adaptation.
    pub step_size: f64,
}

/// Retained draws of one chain.
pub(crate) struct ChainOutput {
    pub draws: Vec<Draw>,
    pub stats: ChainStats,
}

/// Deterministic per-chain seed derived from the base seed.
///
/// SplitMix64 finaliser over (seed, chain), so neighbouring chains get
/// unrelated streams.
pub(crate) fn chain_seed(seed: u64, chain: usize) -> u64 {
    let mut z = seed.wrapping_add((chain as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Run one chain to completion.
pub(crate) fn run_chain(
    model: &HierarchicalModel,
    config: &SamplerConfig,
    chain: usize,
) -> ChainOutput {
    let dim = model.layout().dim();
    let mut hmc = Hmc {
        model,
        inv_mass: DVector::from_element(dim, 1.0),
        rng: Xoshiro256PlusPlus::seed_from_u64(chain_seed(config.seed, chain)),
    };
    let n_steps = config.leapfrog_steps;

    let mut state = hmc.initial_state();
    let mut step_size = hmc.find_reasonable_step_size(&state);
    let mut adapt = DualAveraging::new(step_size, config.target_accept);

    let window = mass_window(config.tune);
    let mut variance = RunningVariance::new(dim);

    for iteration in 0..config.tune {
        let (next, transition) = hmc.transition(&state, step_size, n_steps);
        state = next;
        step_size = adapt.update(transition.accept_stat);

        if let Some((start, end)) = window {
            if (start..end).contains(&iteration) {
                variance.push(&state.theta);
            }
            if iteration + 1 == end {
                hmc.inv_mass = variance.regularized();
                step_size = hmc.find_reasonable_step_size(&state);
                adapt = DualAveraging::new(step_size, config.target_accept);
            }
        }
    }
    if config.tune > 0 {
        step_size = adapt.final_step_size();
    }

    let mut draws = Vec::with_capacity(config.draws);
    let mut divergences = 0;
    let mut accept_sum = 0.0;
    for _ in 0..config.draws {
        let jittered = step_size * hmc.rng.random_range(0.9..1.1);
        let (next, transition) = hmc.transition(&state, jittered, n_steps);
        state = next;
        divergences += usize::from(transition.divergent);
        accept_sum += transition.accept_stat;
        draws.push(model.constrain(&state.theta));
    }

    let mean_accept_stat = if config.draws > 0 {
        accept_sum / config.draws as f64
    } else {
        0.0
    };

    tracing::debug!(
        chain,
        step_size,
        divergences,
        mean_accept_stat,
        "chain finished"
    );

    ChainOutput {
        draws,
        stats: ChainStats {
            chain,
            divergences,
            mean_accept_stat,
            step_size,
        },
    }
}

/// Iteration range `[start, end)` used to estimate the mass matrix.
fn mass_window(tune: usize) -> Option<(usize, usize)> {
    if tune < MIN_TUNE_FOR_MASS {
        return None;
    }
    let start = (tune as f64 * MASS_WINDOW_START) as usize;
    let end = (tune as f64 * MASS_WINDOW_END) as usize;
    (end > start + 1).then_some((start, end))
}

/// Position, gradient and log density at one point.
#[derive(Debug, Clone)]
struct State {
    theta: DVector<f64>,
    grad: DVector<f64>,
    log_density: f64,
}

impl State {
    fn at(model: &HierarchicalModel, theta: DVector<f64>) -> Self {
        let mut grad = DVector::zeros(theta.len());
        let log_density = model.log_density_and_gradient(&theta, &mut grad);
        Self {
            theta,
            grad,
            log_density,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    accept_stat: f64,
    divergent: bool,
}

struct Hmc<'a> {
    model: &'a HierarchicalModel,
    inv_mass: DVector<f64>,
    rng: Xoshiro256PlusPlus,
}

impl Hmc<'_> {
    /// Jittered starting point, falling back to the unjittered one if the
    /// jitter lands somewhere the density is not finite.
    fn initial_state(&mut self) -> State {
        let base = self.model.initial_point();
        let jittered = base.map(|x| x + self.rng.random_range(-INIT_JITTER..INIT_JITTER));
        let state = State::at(self.model, jittered);
        if state.log_density.is_finite() && state.grad.iter().all(|g| g.is_finite()) {
            state
        } else {
            State::at(self.model, base)
        }
    }

    fn sample_momentum(&mut self) -> DVector<f64> {
        let dim = self.inv_mass.len();
        DVector::from_iterator(
            dim,
            (0..dim).map(|i| {
                let z: f64 = self.rng.sample(StandardNormal);
                z / math::sqrt(self.inv_mass[i])
            }),
        )
    }

    fn kinetic(&self, momentum: &DVector<f64>) -> f64 {
        0.5 * momentum
            .iter()
            .zip(self.inv_mass.iter())
            .map(|(p, m)| m * p * p)
            .sum::<f64>()
    }

    /// Integrate `n_steps` leapfrog steps. `None` if the trajectory reaches
    /// a non-finite density.
    fn leapfrog(
        &self,
        start: &State,
        momentum: &mut DVector<f64>,
        step_size: f64,
        n_steps: usize,
    ) -> Option<State> {
        let mut theta = start.theta.clone();
        let mut grad = start.grad.clone();
        let mut log_density = start.log_density;

        for _ in 0..n_steps {
            momentum.axpy(0.5 * step_size, &grad, 1.0);
            theta += self.inv_mass.component_mul(&*momentum) * step_size;
            log_density = self.model.log_density_and_gradient(&theta, &mut grad);
            if !log_density.is_finite() {
                return None;
            }
            momentum.axpy(0.5 * step_size, &grad, 1.0);
        }

        Some(State {
            theta,
            grad,
            log_density,
        })
    }

    fn transition(&mut self, state: &State, step_size: f64, n_steps: usize) -> (State, Transition) {
        let mut momentum = self.sample_momentum();
        let h0 = -state.log_density + self.kinetic(&momentum);

        let divergent = Transition {
            accept_stat: 0.0,
            divergent: true,
        };
        let Some(proposal) = self.leapfrog(state, &mut momentum, step_size, n_steps) else {
            return (state.clone(), divergent);
        };

        let h1 = -proposal.log_density + self.kinetic(&momentum);
        let energy_error = h1 - h0;
        if !energy_error.is_finite() || energy_error > DIVERGENCE_ENERGY_THRESHOLD {
            return (state.clone(), divergent);
        }

        let accept_stat = math::exp(-energy_error).min(1.0);
        let u: f64 = self.rng.random();
        let next = if u < accept_stat {
            proposal
        } else {
            state.clone()
        };
        (
            next,
            Transition {
                accept_stat,
                divergent: false,
            },
        )
    }

    /// Acceptance probability of a single leapfrog step, unclamped.
    fn single_step_acceptance(&mut self, state: &State, step_size: f64) -> f64 {
        let mut momentum = self.sample_momentum();
        let h0 = -state.log_density + self.kinetic(&momentum);
        match self.leapfrog(state, &mut momentum, step_size, 1) {
            Some(next) => {
                let h1 = -next.log_density + self.kinetic(&momentum);
                let a = math::exp(h0 - h1);
                if a.is_finite() {
                    a
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    /// Double or halve the step size until a single leapfrog step crosses
    /// acceptance 0.5.
    fn find_reasonable_step_size(&mut self, state: &State) -> f64 {
        let mut step_size = 1.0;
        let mut accept = self.single_step_acceptance(state, step_size);
        let grow = accept > 0.5;

        for _ in 0..MAX_STEP_SIZE_SEARCH {
            let keep_going = if grow { accept > 0.5 } else { accept < 0.5 };
            if !keep_going {
                break;
            }
            step_size = if grow { step_size * 2.0 } else { step_size * 0.5 };
            accept = self.single_step_acceptance(state, step_size);
        }

        step_size.clamp(1e-8, 1e3)
    }
}

/// Nesterov dual averaging of log step size.
#[derive(Debug, Clone)]
struct DualAveraging {
    mu: f64,
    target: f64,
    h_bar: f64,
    log_step: f64,
    log_step_bar: f64,
    count: f64,
}

impl DualAveraging {
    fn new(initial_step_size: f64, target: f64) -> Self {
        Self {
            mu: math::ln(10.0 * initial_step_size),
            target,
            h_bar: 0.0,
            log_step: math::ln(initial_step_size),
            log_step_bar: 0.0,
            count: 0.0,
        }
    }

    /// Feed one acceptance statistic; returns the next step size.
    fn update(&mut self, accept_stat: f64) -> f64 {
        self.count += 1.0;
        let m = self.count;
        let w = 1.0 / (m + DA_T0);
        self.h_bar = (1.0 - w) * self.h_bar + w * (self.target - accept_stat);
        self.log_step = self.mu - math::sqrt(m) / DA_GAMMA * self.h_bar;
        let eta = libm::pow(m, -DA_KAPPA);
        self.log_step_bar = eta * self.log_step + (1.0 - eta) * self.log_step_bar;
        math::exp(self.log_step)
    }

    fn final_step_size(&self) -> f64 {
        if self.count == 0.0 {
            math::exp(self.log_step)
        } else {
            math::exp(self.log_step_bar)
        }
    }
}

/// Welford accumulator for per-coordinate variances.
#[derive(Debug, Clone)]
struct RunningVariance {
    n: usize,
    mean: DVector<f64>,
    m2: DVector<f64>,
}

impl RunningVariance {
    fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: DVector::zeros(dim),
            m2: DVector::zeros(dim),
        }
    }

    fn push(&mut self, x: &DVector<f64>) {
        self.n += 1;
        let delta = x - &self.mean;
        self.mean += &delta / self.n as f64;
        let delta2 = x - &self.mean;
        self.m2 += delta.component_mul(&delta2);
    }

    /// Variance shrunk towards 1e-3, the way Stan regularises its
    /// diagonal metric.
    fn regularized(&self) -> DVector<f64> {
        if self.n < 2 {
            return DVector::from_element(self.mean.len(), 1.0);
        }
        let n = self.n as f64;
        let weight = n / (n + 5.0);
        self.m2
            .map(|m2| weight * (m2 / (n - 1.0)) + 1e-3 * (5.0 / (n + 5.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriorSpec;
    use crate::observations::ObservationTable;
    use crate::types::{Configuration, TrialRecord};
    use std::collections::BTreeSet;

    fn tiny_model() -> HierarchicalModel {
        let c = |i| Configuration::new(i).unwrap();
        let trials = vec![
            TrialRecord::for_configuration(c(0), [1, 2]),
            TrialRecord::for_configuration(c(0), [1]),
            TrialRecord::for_configuration(c(1), [2, 3]),
            TrialRecord::for_configuration(c(1), [1, 2, 3]),
        ];
        let table = ObservationTable::extract(&trials, &BTreeSet::from([1, 2])).unwrap();
        HierarchicalModel::build(&table, PriorSpec::default())
    }

    fn tiny_config() -> SamplerConfig {
        SamplerConfig::default()
            .with_draws(50)
            .with_tune(50)
            .with_chains(1)
            .with_leapfrog_steps(8)
            .with_seed(42)
    }

    #[test]
    fn test_chain_is_deterministic() {
        let model = tiny_model();
        let config = tiny_config();
        let a = run_chain(&model, &config, 0);
        let b = run_chain(&model, &config, 0);
        assert_eq!(a.draws, b.draws);
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn test_chains_use_different_streams() {
        let model = tiny_model();
        let config = tiny_config();
        let a = run_chain(&model, &config, 0);
        let b = run_chain(&model, &config, 1);
        assert_ne!(a.draws, b.draws);
        assert_ne!(chain_seed(1, 0), chain_seed(1, 1));
    }

    #[test]
    fn test_chain_output_shape() {
        let model = tiny_model();
        let out = run_chain(&model, &tiny_config(), 0);
        assert_eq!(out.draws.len(), 50);
        assert!(out.draws.iter().all(|d| d.u_loc.len() == 3));
        assert!(out.draws.iter().all(|d| d.sigma_loc > 0.0 && d.sigma_sys > 0.0));
        assert!((0.0..=1.0).contains(&out.stats.mean_accept_stat));
        assert!(out.stats.step_size > 0.0);
    }

    #[test]
    fn test_dual_averaging_moves_towards_target() {
        // Acceptance always above target: step size should grow
        let mut da = DualAveraging::new(0.1, 0.8);
        for _ in 0..200 {
            da.update(1.0);
        }
        assert!(da.final_step_size() > 0.1);

        // Acceptance always below target: step size should shrink
        let mut da = DualAveraging::new(0.1, 0.8);
        for _ in 0..200 {
            da.update(0.0);
        }
        assert!(da.final_step_size() < 0.1);
    }

    #[test]
    fn test_running_variance() {
        let mut v = RunningVariance::new(2);
        for x in [[1.0, 10.0], [2.0, 10.0], [3.0, 10.0], [4.0, 10.0]] {
            v.push(&DVector::from_row_slice(&x));
        }
        let reg = v.regularized();
        // Sample variance of 1..4 is 5/3; constant coordinate has none
        let expected = (4.0 / 9.0) * (5.0 / 3.0) + 1e-3 * (5.0 / 9.0);
        assert!((reg[0] - expected).abs() < 1e-12);
        assert!((reg[1] - 1e-3 * (5.0 / 9.0)).abs() < 1e-12);
    }

    #[test]
    fn test_mass_window() {
        assert_eq!(mass_window(10), None);
        assert_eq!(mass_window(1000), Some((150, 750)));
    }
}
