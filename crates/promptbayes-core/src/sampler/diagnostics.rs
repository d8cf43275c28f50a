//! Convergence diagnostics: split-R̂, effective sample size, divergences.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{MIN_ESS_PER_CHAIN, R_HAT_THRESHOLD};
use crate::math;

use super::hmc::ChainStats;


/// Warning attached to a sample set whose fit should not be trusted blindly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConvergenceWarning {
    /// Chains disagree on a parameter.
    HighRHat {
        /// Parameter name.
        parameter: String,
        /// Split-R̂.
        r_hat: f64,
    },

    /// Too few effectively independent draws of a parameter.
    LowEffectiveSamples {
        /// Parameter name.
        parameter: String,
        /// Estimated ESS summed over chains.
        ess: f64,
        /// ESS required.
        required: f64,
    },

    /// Some retained transitions diverged.
    Divergences {
        /// Divergent transitions.
        count: usize,
        /// Retained transitions.
        total: usize,
    },
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceWarning::HighRHat { parameter, r_hat } => {
                write!(f, "R-hat for {} is {:.3} (> {})", parameter, r_hat, R_HAT_THRESHOLD)
            }
            ConvergenceWarning::LowEffectiveSamples {
                parameter,
                ess,
                required,
            } => write!(
                f,
                "effective sample size for {} is {:.0} (< {:.0})",
                parameter, ess, required
            ),
            ConvergenceWarning::Divergences { count, total } => {
                write!(f, "{} of {} transitions diverged", count, total)
            }
        }
    }
}

/// Split-R̂ and ESS of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDiagnostic {
    /// Parameter name.
    pub name: String,
    /// Split-R̂ (NaN when chains are too short to split).
    pub r_hat: f64,
    /// Multi-chain effective sample size.
    pub ess: f64,
}

/// Diagnostics of one sampler run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerDiagnostics {
    /// Number of chains.
    pub n_chains: usize,
    /// Retained draws per chain.
    pub draws_per_chain: usize,
    /// Per-parameter diagnostics.
    pub parameters: Vec<ParameterDiagnostic>,
    /// Divergent retained transitions over all chains.
    pub divergences: usize,
    /// Mean acceptance statistic over all chains.
    pub mean_accept_stat: f64,
    /// Adapted step size per chain.
    pub step_sizes: Vec<f64>,
    /// Warnings raised.
    pub warnings: Vec<ConvergenceWarning>,
}

impl SamplerDiagnostics {
    /// Compute diagnostics from per-chain traces.
    ///
    /// `traces` holds, for each parameter, its name and one trace per chain.
    pub fn compute(traces: &[(String, Vec<Vec<f64>>)], stats: &[ChainStats]) -> Self {
        let n_chains = traces.first().map_or(0, |(_, chains)| chains.len());
        let draws_per_chain = traces
            .first()
            .and_then(|(_, chains)| chains.first())
            .map_or(0, Vec::len);

        let parameters: Vec<ParameterDiagnostic> = traces
            .iter()
            .map(|(name, chains)| ParameterDiagnostic {
                name: name.clone(),
                r_hat: split_r_hat(chains),
                ess: effective_sample_size(chains),
            })
            .collect();

        let divergences = stats.iter().map(|s| s.divergences).sum();
        let mean_accept_stat = if stats.is_empty() {
            0.0
        } else {
            stats.iter().map(|s| s.mean_accept_stat).sum::<f64>() / stats.len() as f64
        };

        let required_ess = MIN_ESS_PER_CHAIN * n_chains as f64;
        let mut warnings = Vec::new();
        for p in &parameters {
            if p.r_hat > R_HAT_THRESHOLD {
                warnings.push(ConvergenceWarning::HighRHat {
                    parameter: p.name.clone(),
                    r_hat: p.r_hat,
                });
            }
        }
        for p in &parameters {
            if p.ess < required_ess {
                warnings.push(ConvergenceWarning::LowEffectiveSamples {
                    parameter: p.name.clone(),
                    ess: p.ess,
                    required: required_ess,
                });
            }
        }
        if divergences > 0 {
            warnings.push(ConvergenceWarning::Divergences {
                count: divergences,
                total: n_chains * draws_per_chain,
            });
        }

        Self {
            n_chains,
            draws_per_chain,
            parameters,
            divergences,
            mean_accept_stat,
            step_sizes: stats.iter().map(|s| s.step_size).collect(),
            warnings,
        }
    }

    /// Largest finite split-R̂ across parameters.
    pub fn max_r_hat(&self) -> f64 {
        self.parameters
            .iter()
            .map(|p| p.r_hat)
            .filter(|r| !r.is_nan())
            .fold(f64::NAN, f64::max)
    }

    /// Smallest ESS across parameters.
    pub fn min_ess(&self) -> f64 {
        self.parameters
            .iter()
            .map(|p| p.ess)
            .fold(f64::INFINITY, f64::min)
    }

    /// Diagnostic entry for `name`.
    pub fn parameter(&self, name: &str) -> Option<&ParameterDiagnostic> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Cut every chain into two halves of equal length, dropping the middle
/// draw of an odd chain. `None` when a half would hold fewer than two draws.
fn split_halves(chains: &[Vec<f64>]) -> Option<Vec<&[f64]>> {
    let half = chains.iter().map(|c| c.len() / 2).min().unwrap_or(0);
    if half < 2 {
        return None;
    }
    let mut halves = Vec::with_capacity(2 * chains.len());
    for chain in chains {
        let n = chain.len();
        halves.push(&chain[..half]);
        halves.push(&chain[n - half..]);
    }
    Some(halves)
}

/// Between-half (`B`) and mean within-half (`W`) variance of split chains.
fn variance_components(halves: &[&[f64]]) -> (f64, f64) {
    let m = halves.len() as f64;
    let n = halves[0].len() as f64;
    let means: Vec<f64> = halves.iter().map(|h| math::mean(h)).collect();
    let grand_mean = math::mean(&means);

    let b = n / (m - 1.0) * means.iter().map(|&mu| math::sq(mu - grand_mean)).sum::<f64>();
    let w = halves.iter().map(|h| math::sample_variance(h)).sum::<f64>() / m;
    (b, w)
}

/// Split-R̂ (Gelman et al., BDA3 §11.4).
///
/// Each chain is cut into two halves (dropping the middle draw of an odd
/// chain) and the potential scale reduction is computed over the halves.
/// Returns NaN when halves hold fewer than two draws, 1 when every draw is
/// identical, and infinity when halves are internally constant but differ.
pub fn split_r_hat(chains: &[Vec<f64>]) -> f64 {
    let Some(halves) = split_halves(chains) else {
        return f64::NAN;
    };
    let n = halves[0].len() as f64;
    let (b, w) = variance_components(&halves);

    if w <= 0.0 {
        return if b <= 0.0 { 1.0 } else { f64::INFINITY };
    }

    let var_plus = (n - 1.0) / n * w + b / n;
    math::sqrt(var_plus / w)
}

/// Multi-chain effective sample size over split chains (BDA3 §11.5).
///
/// ```text
/// ρ_t = 1 − (W − mean_j γ_j(t)) / var⁺
/// τ   = −1 + 2 Σ_k P_k,   P_k = ρ_2k + ρ_2k+1
/// ESS = M·N / τ
/// ```
///
/// The pair sums `P_k` follow Geyer's initial monotone sequence: summing
/// stops at the first non-positive pair and each pair is capped by the one
/// before it. The result is capped at `M·N·log10(M·N)`. Chains too short to
/// split count at face value, and so does a parameter that never moves; one
/// whose halves are constant but disagree gets an ESS of 1.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let total = chains.iter().map(Vec::len).sum::<usize>() as f64;
    let Some(halves) = split_halves(chains) else {
        return total;
    };
    let n = halves[0].len();
    let draws = (halves.len() * n) as f64;
    let (b, w) = variance_components(&halves);

    if w <= 0.0 {
        return if b <= 0.0 { total } else { 1.0 };
    }
    let var_plus = (n as f64 - 1.0) / n as f64 * w + b / n as f64;

    let means: Vec<f64> = halves.iter().map(|h| math::mean(h)).collect();
    let rho = |t: usize| -> f64 {
        let mean_acov = halves
            .iter()
            .zip(&means)
            .map(|(h, &mu)| autocovariance(h, mu, t))
            .sum::<f64>()
            / halves.len() as f64;
        1.0 - (w - mean_acov) / var_plus
    };

    let mut pair_sum = 0.0;
    let mut previous = f64::INFINITY;
    let mut t = 0;
    while t + 1 < n {
        let pair = (rho(t) + rho(t + 1)).min(previous);
        if pair <= 0.0 {
            break;
        }
        pair_sum += pair;
        previous = pair;
        t += 2;
    }

    // 1 / log10(M·N)
    let tau_floor = std::f64::consts::LN_10 / math::ln(draws);
    let tau = (2.0 * pair_sum - 1.0).max(tau_floor);
    draws / tau
}

/// Lag-t autocovariance of one half, normalised by its length.
fn autocovariance(half: &[f64], mean: f64, t: usize) -> f64 {
    let n = half.len();
    half[..n - t]
        .iter()
        .zip(&half[t..])
        .map(|(&a, &b)| (a - mean) * (b - mean))
        .sum::<f64>()
        / n as f64
}
