//! Hierarchical logistic model over detection outcomes.
//!
//! ```text
//! logit(p_i) = α + u_loc[ℓ(i)] + Σ_k f(i)_k · u_factor[k]
//! y_i ~ Bernoulli(p_i)
//!
//! α          ~ N(0, 5)
//! u_loc[ℓ]   ~ N(0, σ_loc)      i.i.d. over locations
//! u_factor[k] ~ N(0, σ_sys)     i.i.d. over the 7 factors
//! σ_loc, σ_sys ~ Exponential(5)
//! ```
//!
//! Location effects capture how detectable a line is regardless of prompt;
//! factor effects capture each prompting trick's marginal contribution,
//! additively on the logit scale. No factor interactions are modelled.
//!
//! The sampler works on an unconstrained, non-centred parameterisation:
//!
//! ```text
//! θ = [α, s_loc, s_sys, z_loc[0..L], z_factor[0..7]]
//! σ = exp(s),  u = σ · z,  z ~ N(0, 1)
//! ```
//!
//! which removes the funnel between the scales and the effects.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_FACTOR_SCALE_RATE, DEFAULT_INTERCEPT_SD, DEFAULT_LOCATION_SCALE_RATE, N_FACTORS,
};
use crate::math;
use crate::observations::{Cell, ObservationTable};
use crate::types::{Configuration, FactorVector};

/// Prior hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorSpec {
    /// Standard deviation of the Normal prior on α.
    pub intercept_sd: f64,
    /// Rate of the Exponential prior on σ_loc.
    pub location_scale_rate: f64,
    /// Rate of the Exponential prior on σ_sys.
    pub factor_scale_rate: f64,
}

impl Default for PriorSpec {
    fn default() -> Self {
        Self {
            intercept_sd: DEFAULT_INTERCEPT_SD,
            location_scale_rate: DEFAULT_LOCATION_SCALE_RATE,
            factor_scale_rate: DEFAULT_FACTOR_SCALE_RATE,
        }
    }
}

/// Linear predictor for one location under one factor vector.
///
/// This is the single definition of the additive-logit structure; the model,
/// the prior check and the scorer all go through it.
#[inline]
pub fn linear_predictor(
    alpha: f64,
    u_loc: f64,
    u_factor: &[f64; N_FACTORS],
    factors: &FactorVector,
) -> f64 {
    alpha + u_loc + factor_shift(u_factor, factors)
}

/// Σ_k f_k · u_factor[k].
#[inline]
pub fn factor_shift(u_factor: &[f64; N_FACTORS], factors: &FactorVector) -> f64 {
    factors
        .weights()
        .iter()
        .zip(u_factor)
        .map(|(w, u)| w * u)
        .sum()
}

/// Index layout of the unconstrained parameter vector θ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterLayout {
    n_locations: usize,
}

impl ParameterLayout {
    /// Position of α.
    pub const ALPHA: usize = 0;
    /// Position of s_loc = ln σ_loc.
    pub const LOG_SIGMA_LOC: usize = 1;
    /// Position of s_sys = ln σ_sys.
    pub const LOG_SIGMA_SYS: usize = 2;

    /// Layout for `n_locations` location effects.
    pub fn new(n_locations: usize) -> Self {
        Self { n_locations }
    }

    /// Number of location effects.
    pub fn n_locations(&self) -> usize {
        self.n_locations
    }

    /// Position of z_loc[ℓ].
    pub fn z_loc(&self, location: usize) -> usize {
        3 + location
    }

    /// Position of z_factor[k].
    pub fn z_factor(&self, k: usize) -> usize {
        3 + self.n_locations + k
    }

    /// Total dimension of θ.
    pub fn dim(&self) -> usize {
        3 + self.n_locations + N_FACTORS
    }

    /// Name of each coordinate of θ, for diagnostics.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.dim());
        names.push("α".to_string());
        names.push("log_σ_loc".to_string());
        names.push("log_σ_sys".to_string());
        for l in 0..self.n_locations {
            names.push(format!("z_loc[{}]", l));
        }
        for f in crate::types::Factor::ALL {
            names.push(format!("z_{}", f.parameter_name()));
        }
        names
    }
}

/// One joint draw of the constrained model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draw {
    /// Global intercept α.
    pub alpha: f64,
    /// Location effect scale σ_loc.
    pub sigma_loc: f64,
    /// Factor effect scale σ_sys.
    pub sigma_sys: f64,
    /// Location effects u_loc, one per location.
    pub u_loc: Vec<f64>,
    /// Factor effects u_factor in factor order.
    pub u_factor: [f64; N_FACTORS],
}

impl Draw {
    /// Detection probability of `location` under `factors`.
    pub fn detection_probability(&self, location: usize, factors: &FactorVector) -> f64 {
        math::invlogit(linear_predictor(
            self.alpha,
            self.u_loc[location],
            &self.u_factor,
            factors,
        ))
    }
}

/// The model bound to an observation table.
///
/// Building it is deterministic and cheap: the table is aggregated into
/// cells and the distinct trialed configurations are indexed. No parameter
/// values exist until the sampler runs.
#[derive(Debug, Clone)]
pub struct HierarchicalModel {
    prior: PriorSpec,
    layout: ParameterLayout,
    cells: Vec<BoundCell>,
    configurations: Vec<Configuration>,
    n_observations: usize,
}

/// Cell with its configuration replaced by a slot into `configurations`.
#[derive(Debug, Clone, Copy)]
struct BoundCell {
    slot: usize,
    location: usize,
    detected: f64,
    trials: f64,
}

impl HierarchicalModel {
    /// Bind `prior` and the Bernoulli likelihood to `table`.
    pub fn build(table: &ObservationTable, prior: PriorSpec) -> Self {
        let cells = table.cells();
        let configurations: Vec<Configuration> =
            table.observed_configurations().into_iter().collect();
        let bound = bind_cells(&cells, &configurations);

        tracing::debug!(
            locations = table.n_locations(),
            cells = bound.len(),
            configurations = configurations.len(),
            "built hierarchical model"
        );

        Self {
            prior,
            layout: ParameterLayout::new(table.n_locations()),
            cells: bound,
            configurations,
            n_observations: table.observations().len(),
        }
    }

    /// Prior hyperparameters.
    pub fn prior(&self) -> &PriorSpec {
        &self.prior
    }

    /// Layout of θ.
    pub fn layout(&self) -> ParameterLayout {
        self.layout
    }

    /// Number of locations.
    pub fn n_locations(&self) -> usize {
        self.layout.n_locations()
    }

    /// Number of Bernoulli observations the likelihood covers.
    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    /// Number of aggregated (configuration, location) cells.
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Configurations that appear in the data.
    pub fn observed_configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    /// Unconstrained starting point: α = 0, σ at the prior means, z = 0.
    pub fn initial_point(&self) -> DVector<f64> {
        let mut theta = DVector::zeros(self.layout.dim());
        theta[ParameterLayout::LOG_SIGMA_LOC] = math::ln(1.0 / self.prior.location_scale_rate);
        theta[ParameterLayout::LOG_SIGMA_SYS] = math::ln(1.0 / self.prior.factor_scale_rate);
        theta
    }

    /// Map θ to model parameters.
    pub fn constrain(&self, theta: &DVector<f64>) -> Draw {
        let sigma_loc = math::exp(theta[ParameterLayout::LOG_SIGMA_LOC]);
        let sigma_sys = math::exp(theta[ParameterLayout::LOG_SIGMA_SYS]);
        let u_loc = (0..self.n_locations())
            .map(|l| sigma_loc * theta[self.layout.z_loc(l)])
            .collect();
        let u_factor = core::array::from_fn(|k| sigma_sys * theta[self.layout.z_factor(k)]);
        Draw {
            alpha: theta[ParameterLayout::ALPHA],
            sigma_loc,
            sigma_sys,
            u_loc,
            u_factor,
        }
    }

    /// Log posterior density of θ (up to a constant), including the
    /// log-Jacobian of σ = exp(s).
    pub fn log_density(&self, theta: &DVector<f64>) -> f64 {
        let draw = self.constrain(theta);
        let mut lp = self.log_prior(theta, &draw);
        let shifts = self.config_shifts(&draw.u_factor);
        for cell in &self.cells {
            let eta = draw.alpha + draw.u_loc[cell.location] + shifts[cell.slot];
            lp += cell.detected * eta - cell.trials * math::softplus(eta);
        }
        lp
    }

    /// Log posterior density and its gradient with respect to θ.
    ///
    /// `grad` must have length `layout().dim()`; it is overwritten.
    pub fn log_density_and_gradient(&self, theta: &DVector<f64>, grad: &mut DVector<f64>) -> f64 {
        let layout = self.layout;
        let draw = self.constrain(theta);
        let mut lp = self.log_prior(theta, &draw);
        let shifts = self.config_shifts(&draw.u_factor);

        // Gradients with respect to the constrained effects first
        let mut g_alpha = 0.0;
        let mut g_u_loc = vec![0.0; self.n_locations()];
        let mut g_slot = vec![0.0; self.configurations.len()];

        for cell in &self.cells {
            let eta = draw.alpha + draw.u_loc[cell.location] + shifts[cell.slot];
            lp += cell.detected * eta - cell.trials * math::softplus(eta);
            let residual = cell.detected - cell.trials * math::invlogit(eta);
            g_alpha += residual;
            g_u_loc[cell.location] += residual;
            g_slot[cell.slot] += residual;
        }

        let mut g_u_factor = [0.0; N_FACTORS];
        for (slot, configuration) in self.configurations.iter().enumerate() {
            let weights = configuration.factors().weights();
            for k in 0..N_FACTORS {
                g_u_factor[k] += weights[k] * g_slot[slot];
            }
        }

        // Chain rule into the non-centred coordinates, plus prior terms
        grad.fill(0.0);
        grad[ParameterLayout::ALPHA] = g_alpha - draw.alpha / math::sq(self.prior.intercept_sd);

        let mut g_s_loc = 0.0;
        for l in 0..self.n_locations() {
            let z = theta[layout.z_loc(l)];
            grad[layout.z_loc(l)] = draw.sigma_loc * g_u_loc[l] - z;
            g_s_loc += g_u_loc[l] * draw.u_loc[l];
        }
        grad[ParameterLayout::LOG_SIGMA_LOC] =
            g_s_loc + 1.0 - self.prior.location_scale_rate * draw.sigma_loc;

        let mut g_s_sys = 0.0;
        for k in 0..N_FACTORS {
            let z = theta[layout.z_factor(k)];
            grad[layout.z_factor(k)] = draw.sigma_sys * g_u_factor[k] - z;
            g_s_sys += g_u_factor[k] * draw.u_factor[k];
        }
        grad[ParameterLayout::LOG_SIGMA_SYS] =
            g_s_sys + 1.0 - self.prior.factor_scale_rate * draw.sigma_sys;

        lp
    }

    fn log_prior(&self, theta: &DVector<f64>, draw: &Draw) -> f64 {
        let layout = self.layout;
        let mut lp = -0.5 * math::sq(draw.alpha / self.prior.intercept_sd);

        // Exponential(rate) on σ with the log-Jacobian of σ = exp(s)
        lp += math::ln(self.prior.location_scale_rate)
            - self.prior.location_scale_rate * draw.sigma_loc
            + theta[ParameterLayout::LOG_SIGMA_LOC];
        lp += math::ln(self.prior.factor_scale_rate) - self.prior.factor_scale_rate * draw.sigma_sys
            + theta[ParameterLayout::LOG_SIGMA_SYS];

        for l in 0..self.n_locations() {
            lp -= 0.5 * math::sq(theta[layout.z_loc(l)]);
        }
        for k in 0..N_FACTORS {
            lp -= 0.5 * math::sq(theta[layout.z_factor(k)]);
        }
        lp
    }

    fn config_shifts(&self, u_factor: &[f64; N_FACTORS]) -> Vec<f64> {
        self.configurations
            .iter()
            .map(|c| factor_shift(u_factor, &c.factors()))
            .collect()
    }
}

fn bind_cells(cells: &[Cell], configurations: &[Configuration]) -> Vec<BoundCell> {
    cells
        .iter()
        .filter_map(|cell| {
            let slot = configurations.binary_search(&cell.configuration).ok()?;
            Some(BoundCell {
                slot,
                location: cell.location,
                detected: f64::from(cell.detected),
                trials: f64::from(cell.trials),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrialRecord;
    use std::collections::BTreeSet;

    fn small_table() -> ObservationTable {
        let c = |i| Configuration::new(i).unwrap();
        let trials = vec![
            TrialRecord::for_configuration(c(0), [3, 8]),
            TrialRecord::for_configuration(c(0), [3]),
            TrialRecord::for_configuration(c(5), [8, 12]),
            TrialRecord::for_configuration(c(96), [3, 12]),
        ];
        ObservationTable::extract(&trials, &BTreeSet::from([3, 12])).unwrap()
    }

    fn test_point(model: &HierarchicalModel) -> DVector<f64> {
        let dim = model.layout().dim();
        DVector::from_iterator(dim, (0..dim).map(|i| 0.3 * ((i as f64) * 1.7).sin()))
    }

    /// Row-wise Bernoulli log-likelihood, as a reference for the cell form.
    fn rowwise_log_likelihood(table: &ObservationTable, draw: &Draw) -> f64 {
        table
            .observations()
            .iter()
            .map(|o| {
                let p = draw.detection_probability(o.location, &o.factors());
                if o.detected {
                    p.ln()
                } else {
                    (1.0 - p).ln()
                }
            })
            .sum()
    }

    #[test]
    fn test_layout_dimensions() {
        let layout = ParameterLayout::new(4);
        assert_eq!(layout.dim(), 3 + 4 + 7);
        assert_eq!(layout.z_loc(0), 3);
        assert_eq!(layout.z_factor(0), 7);
        assert_eq!(layout.names().len(), layout.dim());
    }

    #[test]
    fn test_build_is_deterministic() {
        let table = small_table();
        let a = HierarchicalModel::build(&table, PriorSpec::default());
        let b = HierarchicalModel::build(&table, PriorSpec::default());
        let theta = test_point(&a);
        assert_eq!(a.log_density(&theta), b.log_density(&theta));
        assert_eq!(a.n_observations(), 12);
        assert_eq!(a.observed_configurations().len(), 3);
    }

    #[test]
    fn test_cell_likelihood_matches_rowwise() {
        let table = small_table();
        let model = HierarchicalModel::build(&table, PriorSpec::default());
        let theta = test_point(&model);
        let draw = model.constrain(&theta);

        let lp = model.log_density(&theta);
        let prior_only = model.log_prior(&theta, &draw);
        let ll = rowwise_log_likelihood(&table, &draw);
        assert!((lp - prior_only - ll).abs() < 1e-9, "{} vs {}", lp - prior_only, ll);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let table = small_table();
        let model = HierarchicalModel::build(&table, PriorSpec::default());
        let theta = test_point(&model);
        let mut grad = DVector::zeros(theta.len());
        let lp = model.log_density_and_gradient(&theta, &mut grad);
        assert!((lp - model.log_density(&theta)).abs() < 1e-10);

        let h = 1e-6;
        for i in 0..theta.len() {
            let mut up = theta.clone();
            let mut down = theta.clone();
            up[i] += h;
            down[i] -= h;
            let numeric = (model.log_density(&up) - model.log_density(&down)) / (2.0 * h);
            assert!(
                (numeric - grad[i]).abs() < 1e-4 * (1.0 + numeric.abs()),
                "coordinate {}: analytic {} vs numeric {}",
                i,
                grad[i],
                numeric
            );
        }
    }

    #[test]
    fn test_constrain_applies_scales() {
        let table = small_table();
        let model = HierarchicalModel::build(&table, PriorSpec::default());
        let layout = model.layout();
        let mut theta = model.initial_point();
        theta[ParameterLayout::LOG_SIGMA_LOC] = 0.0; // σ_loc = 1
        theta[layout.z_loc(1)] = 2.0;
        theta[layout.z_factor(6)] = 1.0;

        let draw = model.constrain(&theta);
        assert_eq!(draw.sigma_loc, 1.0);
        assert!((draw.sigma_sys - 0.2).abs() < 1e-12);
        assert_eq!(draw.u_loc[1], 2.0);
        assert!((draw.u_factor[6] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_linear_predictor_is_additive() {
        let u_factor = [0.5, -1.0, 0.25, 0.0, 2.0, -0.5, 1.5];
        let off = FactorVector::all_off();
        let on = FactorVector::all_on();
        assert_eq!(linear_predictor(0.1, 0.2, &u_factor, &off), 0.1 + 0.2);
        let total: f64 = u_factor.iter().sum();
        assert!((linear_predictor(0.0, 0.0, &u_factor, &on) - total).abs() < 1e-12);
    }
}
