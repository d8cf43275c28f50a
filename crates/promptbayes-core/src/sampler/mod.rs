//! Posterior sampling.
//!
//! [`sample`] runs independent HMC chains on the model's unconstrained
//! parameterisation and collects the constrained draws into a
//! [`PosteriorSamples`] arena with convergence diagnostics attached.
//!
//! Chains are seeded from `(seed, chain id)`, so the result is a pure
//! function of the model and the configuration. With the `parallel` feature
//! the chains run on the rayon pool; the output is identical to the
//! sequential run.

mod diagnostics;
mod hmc;
mod samples;

pub use diagnostics::{
    effective_sample_size, split_r_hat, ConvergenceWarning, ParameterDiagnostic, SamplerDiagnostics,
};
pub use hmc::ChainStats;
pub use samples::{FactorEffect, PosteriorSamples};

use std::fmt;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CHAINS, DEFAULT_DRAWS, DEFAULT_LEAPFROG_STEPS, DEFAULT_SEED, DEFAULT_TARGET_ACCEPT,
    DEFAULT_TUNE,
};
use crate::model::HierarchicalModel;

use hmc::{run_chain, ChainOutput};

/// Sampler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Retained draws per chain.
    pub draws: usize,
    /// Warmup iterations per chain (discarded).
    pub tune: usize,
    /// Number of independent chains.
    pub chains: usize,
    /// Base RNG seed.
    pub seed: u64,
    /// Target acceptance statistic for step-size adaptation, in (0, 1).
    pub target_accept: f64,
    /// Leapfrog steps per transition.
    pub leapfrog_steps: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            draws: DEFAULT_DRAWS,
            tune: DEFAULT_TUNE,
            chains: DEFAULT_CHAINS,
            seed: DEFAULT_SEED,
            target_accept: DEFAULT_TARGET_ACCEPT,
            leapfrog_steps: DEFAULT_LEAPFROG_STEPS,
        }
    }
}

impl SamplerConfig {
    /// Set retained draws per chain.
    pub fn with_draws(mut self, draws: usize) -> Self {
        self.draws = draws;
        self
    }

    /// Set warmup iterations per chain.
    pub fn with_tune(mut self, tune: usize) -> Self {
        self.tune = tune;
        self
    }

    /// Set the number of chains.
    pub fn with_chains(mut self, chains: usize) -> Self {
        self.chains = chains;
        self
    }

    /// Set the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the target acceptance statistic.
    pub fn with_target_accept(mut self, target_accept: f64) -> Self {
        self.target_accept = target_accept;
        self
    }

    /// Set leapfrog steps per transition.
    pub fn with_leapfrog_steps(mut self, steps: usize) -> Self {
        self.leapfrog_steps = steps;
        self
    }

    /// Total retained draws over all chains.
    pub fn total_draws(&self) -> usize {
        self.draws * self.chains
    }

    /// Check the settings.
    pub fn validate(&self) -> Result<(), SamplerError> {
        if self.draws == 0 {
            return Err(SamplerError::InvalidConfig("draws must be at least 1".into()));
        }
        if self.chains == 0 {
            return Err(SamplerError::InvalidConfig("chains must be at least 1".into()));
        }
        if self.leapfrog_steps == 0 {
            return Err(SamplerError::InvalidConfig(
                "leapfrog_steps must be at least 1".into(),
            ));
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(SamplerError::InvalidConfig(format!(
                "target_accept must be in (0, 1), got {}",
                self.target_accept
            )));
        }
        Ok(())
    }
}

/// Error returned by the sampler.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerError {
    /// The sampler settings are unusable.
    InvalidConfig(String),

    /// Chains cannot be assembled into one arena.
    InconsistentChains {
        /// What was wrong.
        reason: String,
    },
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::InvalidConfig(msg) => write!(f, "invalid sampler configuration: {}", msg),
            SamplerError::InconsistentChains { reason } => {
                write!(f, "inconsistent chains: {}", reason)
            }
        }
    }
}

impl std::error::Error for SamplerError {}

/// Draw from the posterior of `model`.
///
/// A blocking call; convergence problems do not fail it but are reported
/// through [`PosteriorSamples::warnings`].
///
/// # Errors
///
/// [`SamplerError::InvalidConfig`] if `config` does not validate.
pub fn sample(
    model: &HierarchicalModel,
    config: &SamplerConfig,
) -> Result<PosteriorSamples, SamplerError> {
    config.validate()?;

    tracing::info!(
        chains = config.chains,
        draws = config.draws,
        tune = config.tune,
        parameters = model.layout().dim(),
        observations = model.n_observations(),
        "sampling posterior"
    );

    #[cfg(feature = "parallel")]
    let outputs: Vec<ChainOutput> = (0..config.chains)
        .into_par_iter()
        .map(|chain| run_chain(model, config, chain))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let outputs: Vec<ChainOutput> = (0..config.chains)
        .map(|chain| run_chain(model, config, chain))
        .collect();

    let (chains, stats): (Vec<_>, Vec<_>) = outputs.into_iter().map(|o| (o.draws, o.stats)).unzip();
    let samples = PosteriorSamples::from_chains(chains, &stats)?;

    let diagnostics = samples.diagnostics();
    tracing::info!(
        draws = samples.n_draws(),
        divergences = diagnostics.divergences,
        max_r_hat = diagnostics.max_r_hat(),
        min_ess = diagnostics.min_ess(),
        "sampling complete"
    );
    for warning in samples.warnings() {
        tracing::debug!("convergence: {}", warning);
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriorSpec;
    use crate::observations::ObservationTable;
    use crate::types::{Configuration, Factor, TrialRecord};
    use std::collections::BTreeSet;

    /// Config 64 (reasoning on) detects every line in 36 of 40 trials,
    /// config 0 in 4 of 40.
    fn reasoning_model() -> HierarchicalModel {
        let off = Configuration::new(0).unwrap();
        let on = Configuration::new(64).unwrap();
        let lines = [3, 7, 11, 19];
        let mut trials = Vec::new();
        for i in 0..40 {
            let hit_on: &[u32] = if i < 36 { &lines } else { &[3] };
            let hit_off: &[u32] = if i < 4 { &lines } else { &[] };
            trials.push(TrialRecord::for_configuration(on, hit_on.iter().copied()));
            trials.push(TrialRecord::for_configuration(off, hit_off.iter().copied()));
        }
        let table = ObservationTable::extract(&trials, &BTreeSet::from([3, 7])).unwrap();
        HierarchicalModel::build(&table, PriorSpec::default())
    }

    fn test_config() -> SamplerConfig {
        SamplerConfig::default()
            .with_draws(300)
            .with_tune(300)
            .with_chains(2)
            .with_leapfrog_steps(16)
            .with_seed(7)
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let model = reasoning_model();
        for config in [
            test_config().with_draws(0),
            test_config().with_chains(0),
            test_config().with_leapfrog_steps(0),
            test_config().with_target_accept(1.0),
        ] {
            assert!(matches!(
                sample(&model, &config),
                Err(SamplerError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_sampling_is_deterministic() {
        let model = reasoning_model();
        let config = test_config().with_draws(50).with_tune(50);
        let a = sample(&model, &config).unwrap();
        let b = sample(&model, &config).unwrap();
        assert_eq!(a.alpha(), b.alpha());
        assert_eq!(a.u_factor(), b.u_factor());
        assert_eq!(a.diagnostics(), b.diagnostics());
    }

    #[test]
    fn test_sample_shape() {
        let model = reasoning_model();
        let samples = sample(&model, &test_config().with_draws(40).with_tune(40)).unwrap();
        assert_eq!(samples.n_draws(), 80);
        assert_eq!(samples.n_chains(), 2);
        assert_eq!(samples.n_locations(), 4);
        assert_eq!(samples.diagnostics().step_sizes.len(), 2);
        assert_eq!(
            samples.diagnostics().parameters.len(),
            3 + crate::constants::N_FACTORS + 4
        );
    }

    #[test]
    fn test_recovers_reasoning_effect() {
        let model = reasoning_model();
        let samples = sample(&model, &test_config()).unwrap();
        let effects = samples.factor_effects();
        let reasoning = &effects[Factor::UseReasoning.bit()];
        assert!(
            reasoning.mean > 1.0,
            "reasoning effect mean {}",
            reasoning.mean
        );
        assert!(samples.sigma_sys().iter().all(|&s| s > 0.0));
    }
}
