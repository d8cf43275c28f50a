//! The posterior sample arena.

use std::ops::Range;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::constants::N_FACTORS;
use crate::math;
use crate::model::Draw;
use crate::types::Factor;

use super::diagnostics::{ConvergenceWarning, SamplerDiagnostics};
use super::hmc::ChainStats;
use super::SamplerError;

/// Posterior summary of one factor's effect on the logit scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorEffect {
    /// The factor.
    pub factor: Factor,
    /// Model parameter name (`u_s_i`, ...).
    pub name: String,
    /// Posterior mean.
    pub mean: f64,
    /// Posterior standard deviation.
    pub std: f64,
    /// 95% credible interval (2.5% and 97.5% quantiles).
    pub ci: (f64, f64),
}

impl FactorEffect {
    /// Whether the 95% interval excludes zero.
    pub fn is_credible(&self) -> bool {
        self.ci.0 > 0.0 || self.ci.1 < 0.0
    }
}

/// Joint posterior draws of all model parameters.
///
/// Draws from all chains are flattened chain-major into a single draw
/// index `d`: chain `c` owns `d ∈ [c·n, (c+1)·n)`. Index `d` refers to the
/// same Monte Carlo draw for every parameter, so joint functionals (the
/// scorer's precision and recall) are computed per draw and never by mixing
/// draws.
///
/// Location effects are stored as a `locations × draws` matrix so one
/// draw's effects are contiguous.
#[derive(Debug, Clone)]
pub struct PosteriorSamples {
    n_chains: usize,
    draws_per_chain: usize,
    alpha: Vec<f64>,
    sigma_loc: Vec<f64>,
    sigma_sys: Vec<f64>,
    u_factor: Vec<[f64; N_FACTORS]>,
    u_loc: DMatrix<f64>,
    diagnostics: SamplerDiagnostics,
}

impl PosteriorSamples {
    /// Assemble the arena from per-chain draws.
    ///
    /// # Errors
    ///
    /// [`SamplerError::InconsistentChains`] if there are no draws, chains
    /// differ in length, or draws disagree on the number of locations.
    pub fn from_chains(chains: Vec<Vec<Draw>>, stats: &[ChainStats]) -> Result<Self, SamplerError> {
        let n_chains = chains.len();
        let draws_per_chain = chains.first().map_or(0, Vec::len);
        if n_chains == 0 || draws_per_chain == 0 {
            return Err(SamplerError::InconsistentChains {
                reason: "no draws".to_string(),
            });
        }
        if let Some(c) = chains.iter().position(|c| c.len() != draws_per_chain) {
            return Err(SamplerError::InconsistentChains {
                reason: format!(
                    "chain {} has {} draws, chain 0 has {}",
                    c,
                    chains[c].len(),
                    draws_per_chain
                ),
            });
        }

        let n_locations = chains[0][0].u_loc.len();
        let n_draws = n_chains * draws_per_chain;
        if chains.iter().flatten().any(|d| d.u_loc.len() != n_locations) {
            return Err(SamplerError::InconsistentChains {
                reason: "draws disagree on the number of locations".to_string(),
            });
        }

        let mut alpha = Vec::with_capacity(n_draws);
        let mut sigma_loc = Vec::with_capacity(n_draws);
        let mut sigma_sys = Vec::with_capacity(n_draws);
        let mut u_factor = Vec::with_capacity(n_draws);
        let mut u_loc_flat = Vec::with_capacity(n_draws * n_locations);

        for draw in chains.iter().flatten() {
            alpha.push(draw.alpha);
            sigma_loc.push(draw.sigma_loc);
            sigma_sys.push(draw.sigma_sys);
            u_factor.push(draw.u_factor);
            u_loc_flat.extend_from_slice(&draw.u_loc);
        }

        let mut samples = Self {
            n_chains,
            draws_per_chain,
            alpha,
            sigma_loc,
            sigma_sys,
            u_factor,
            u_loc: DMatrix::from_vec(n_locations, n_draws, u_loc_flat),
            diagnostics: SamplerDiagnostics::default(),
        };
        samples.diagnostics = SamplerDiagnostics::compute(&samples.traces(), stats);
        Ok(samples)
    }

    /// Single-chain arena without sampler statistics.
    ///
    /// Useful for posterior draws obtained elsewhere and for fixed
    /// parameter sets.
    pub fn from_draws(draws: Vec<Draw>) -> Result<Self, SamplerError> {
        Self::from_chains(vec![draws], &[])
    }

    /// Total draws (chains × draws per chain).
    pub fn n_draws(&self) -> usize {
        self.alpha.len()
    }

    /// Number of chains.
    pub fn n_chains(&self) -> usize {
        self.n_chains
    }

    /// Retained draws per chain.
    pub fn draws_per_chain(&self) -> usize {
        self.draws_per_chain
    }

    /// Number of location effects per draw.
    pub fn n_locations(&self) -> usize {
        self.u_loc.nrows()
    }

    /// Draw indices owned by `chain`.
    pub fn chain_range(&self, chain: usize) -> Range<usize> {
        let start = chain * self.draws_per_chain;
        start..start + self.draws_per_chain
    }

    /// α draws.
    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    /// σ_loc draws.
    pub fn sigma_loc(&self) -> &[f64] {
        &self.sigma_loc
    }

    /// σ_sys draws.
    pub fn sigma_sys(&self) -> &[f64] {
        &self.sigma_sys
    }

    /// Factor effect vectors, one per draw.
    pub fn u_factor(&self) -> &[[f64; N_FACTORS]] {
        &self.u_factor
    }

    /// Location effects of draw `d`, indexed by location.
    pub fn u_loc(&self, d: usize) -> &[f64] {
        let n = self.n_locations();
        &self.u_loc.as_slice()[d * n..(d + 1) * n]
    }

    /// All draws of one location effect.
    pub fn location_draws(&self, location: usize) -> Vec<f64> {
        self.u_loc.row(location).iter().copied().collect()
    }

    /// All draws of one factor effect.
    pub fn factor_draws(&self, factor: Factor) -> Vec<f64> {
        self.u_factor.iter().map(|u| u[factor.bit()]).collect()
    }

    /// Rebuild draw `d` as a [`Draw`].
    pub fn draw(&self, d: usize) -> Draw {
        Draw {
            alpha: self.alpha[d],
            sigma_loc: self.sigma_loc[d],
            sigma_sys: self.sigma_sys[d],
            u_loc: self.u_loc(d).to_vec(),
            u_factor: self.u_factor[d],
        }
    }

    /// Posterior summaries of the seven factor effects.
    pub fn factor_effects(&self) -> Vec<FactorEffect> {
        Factor::ALL
            .iter()
            .map(|&factor| {
                let draws = self.factor_draws(factor);
                FactorEffect {
                    factor,
                    name: factor.parameter_name().to_string(),
                    mean: math::mean(&draws),
                    std: math::std_dev(&draws),
                    ci: (math::quantile(&draws, 0.025), math::quantile(&draws, 0.975)),
                }
            })
            .collect()
    }

    /// Sampler diagnostics.
    pub fn diagnostics(&self) -> &SamplerDiagnostics {
        &self.diagnostics
    }

    /// Convergence warnings.
    pub fn warnings(&self) -> &[ConvergenceWarning] {
        &self.diagnostics.warnings
    }

    /// Whether no convergence warning was raised.
    pub fn is_converged(&self) -> bool {
        self.diagnostics.warnings.is_empty()
    }

    /// Per-chain traces of every scalar parameter, for diagnostics.
    fn traces(&self) -> Vec<(String, Vec<Vec<f64>>)> {
        let mut traces = Vec::with_capacity(3 + N_FACTORS + self.n_locations());
        traces.push(("α".to_string(), self.chain_traces(|d| self.alpha[d])));
        traces.push(("σ_loc".to_string(), self.chain_traces(|d| self.sigma_loc[d])));
        traces.push(("σ_sys".to_string(), self.chain_traces(|d| self.sigma_sys[d])));
        for factor in Factor::ALL {
            let k = factor.bit();
            traces.push((
                factor.parameter_name().to_string(),
                self.chain_traces(|d| self.u_factor[d][k]),
            ));
        }
        for l in 0..self.n_locations() {
            traces.push((
                format!("u_loc[{}]", l),
                self.chain_traces(|d| self.u_loc[(l, d)]),
            ));
        }
        traces
    }

    fn chain_traces(&self, value: impl Fn(usize) -> f64) -> Vec<Vec<f64>> {
        (0..self.n_chains)
            .map(|c| self.chain_range(c).map(&value).collect())
            .collect()
    }
}
