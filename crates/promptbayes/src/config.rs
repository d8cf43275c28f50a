//! Configuration for a full prompt-strategy analysis.

use std::fmt;

use serde::{Deserialize, Serialize};

use promptbayes_core::analysis::{DecisionBars, ScoringThresholds, UncertaintyBand};
use promptbayes_core::constants::{DEFAULT_PRIOR_SAMPLES, DEFAULT_RECALL_BOARD_MIN_PRECISION};
use promptbayes_core::{PriorSpec, SamplerConfig, SamplerError};

/// Environment variable consulted by [`FitPolicy::from_env_or`].
pub const FIT_POLICY_ENV: &str = "PROMPTBAYES_FIT_POLICY";

/// What the pipeline does when the posterior fit carries convergence warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPolicy {
    /// Log the warnings and return the analysis anyway.
    /// Use when: exploratory runs, quick presets.
    #[default]
    FailOpen,

    /// Refuse to return scores from an unconverged fit.
    /// Use when: the scores feed a decision about which prompt to ship.
    FailClosed,
}

impl FitPolicy {
    /// Get policy from environment variable, or use default.
    ///
    /// Checks `PROMPTBAYES_FIT_POLICY`:
    /// - "fail_open" or "warn" → FailOpen
    /// - "fail_closed" or "reject" → FailClosed
    /// - unset or other → default
    pub fn from_env_or(default: Self) -> Self {
        match std::env::var(FIT_POLICY_ENV).ok().as_deref() {
            Some(value) => Self::parse(value).unwrap_or(default),
            None => default,
        }
    }

    /// Parse a policy name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail_open" | "warn" => Some(Self::FailOpen),
            "fail_closed" | "reject" => Some(Self::FailClosed),
            _ => None,
        }
    }
}

/// Error returned by [`AnalysisConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The sampler settings are unusable.
    Sampler(SamplerError),

    /// A setting outside the sampler is out of range.
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// What the field must satisfy.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Sampler(e) => write!(f, "{}", e),
            ConfigError::Invalid { field, reason } => write!(f, "{}: {}", field, reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Sampler(e) => Some(e),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl From<SamplerError> for ConfigError {
    fn from(e: SamplerError) -> Self {
        ConfigError::Sampler(e)
    }
}

/// Configuration options for [`Analyzer`](crate::Analyzer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    // =========================================================================
    // Inference
    // =========================================================================
    /// HMC settings: draws, warmup, chains, seed, step-size target.
    pub sampler: SamplerConfig,

    /// Hyperparameters of the intercept and scale priors.
    pub prior: PriorSpec,

    // =========================================================================
    // Decision thresholds
    // =========================================================================
    /// Precision threshold and recall floor of the decision probabilities.
    ///
    /// Default: precision > 0.8, recall > 0.1.
    pub thresholds: ScoringThresholds,

    /// Open band of P(precision > threshold) reported as uncertain.
    ///
    /// Default: (0.1, 0.9).
    pub band: UncertaintyBand,

    /// Bars of the rollup counts.
    pub bars: DecisionBars,

    // =========================================================================
    // Prior predictive check
    // =========================================================================
    /// Number of prior draws for the prior predictive check.
    ///
    /// Default: 1,000.
    pub prior_check_samples: usize,

    /// Skip the prior predictive check entirely.
    pub skip_prior_check: bool,

    // =========================================================================
    // Reporting
    // =========================================================================
    /// Behaviour when the fit has convergence warnings.
    pub fit_policy: FitPolicy,

    /// Entries per leaderboard. Default: 5.
    pub leaderboard_size: usize,

    /// Mean-precision floor of the recall leaderboard. Default: 0.2.
    pub recall_board_min_precision: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            prior: PriorSpec::default(),

            thresholds: ScoringThresholds::default(),
            band: UncertaintyBand::default(),
            bars: DecisionBars::default(),

            prior_check_samples: DEFAULT_PRIOR_SAMPLES,
            skip_prior_check: false,

            fit_policy: FitPolicy::from_env_or(FitPolicy::FailOpen),
            leaderboard_size: 5,
            recall_board_min_precision: DEFAULT_RECALL_BOARD_MIN_PRECISION,
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a quick configuration for iterating on a corpus.
    ///
    /// - 2 chains × 500 draws after 500 warmup iterations
    /// - 200 prior predictive draws
    pub fn quick() -> Self {
        let base = Self::default();
        Self {
            sampler: base.sampler.clone().with_draws(500).with_tune(500).with_chains(2),
            prior_check_samples: 200,
            ..base
        }
    }

    /// Create a balanced configuration.
    ///
    /// - 4 chains × 2,000 draws after 1,000 warmup iterations
    pub fn balanced() -> Self {
        Self::default()
    }

    /// Create a thorough configuration for a final decision.
    ///
    /// - 4 chains × 4,000 draws after 2,000 warmup iterations
    /// - Higher acceptance target and longer trajectories
    /// - Rejects unconverged fits unless the environment overrides it
    pub fn thorough() -> Self {
        let base = Self::default();
        Self {
            sampler: base
                .sampler
                .clone()
                .with_draws(4_000)
                .with_tune(2_000)
                .with_target_accept(0.9)
                .with_leapfrog_steps(64),
            fit_policy: FitPolicy::from_env_or(FitPolicy::FailClosed),
            ..base
        }
    }

    /// Look up a preset by name (`quick`, `balanced`, `thorough`).
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "quick" => Some(Self::quick()),
            "balanced" | "default" => Some(Self::balanced()),
            "thorough" => Some(Self::thorough()),
            _ => None,
        }
    }

    // =========================================================================
    // Builder methods
    // =========================================================================

    /// Replace the sampler settings.
    pub fn with_sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    /// Set the sampler seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.sampler.seed = seed;
        self
    }

    /// Replace the prior hyperparameters.
    pub fn with_prior(mut self, prior: PriorSpec) -> Self {
        self.prior = prior;
        self
    }

    /// Set the recall floor of the decision probabilities.
    pub fn with_min_recall(mut self, min_recall: f64) -> Self {
        self.thresholds.min_recall = min_recall;
        self
    }

    /// Set the precision threshold of the decision probabilities.
    pub fn with_precision_threshold(mut self, precision: f64) -> Self {
        self.thresholds.precision = precision;
        self
    }

    /// Set the uncertainty band.
    pub fn with_band(mut self, band: UncertaintyBand) -> Self {
        self.band = band;
        self
    }

    /// Set the rollup bars.
    pub fn with_bars(mut self, bars: DecisionBars) -> Self {
        self.bars = bars;
        self
    }

    /// Set the number of prior predictive draws.
    pub fn with_prior_check_samples(mut self, samples: usize) -> Self {
        self.prior_check_samples = samples;
        self
    }

    /// Skip the prior predictive check.
    pub fn skip_prior_check(mut self, skip: bool) -> Self {
        self.skip_prior_check = skip;
        self
    }

    /// Set the fit policy.
    pub fn with_fit_policy(mut self, policy: FitPolicy) -> Self {
        self.fit_policy = policy;
        self
    }

    /// Set the number of entries per leaderboard.
    pub fn with_leaderboard_size(mut self, k: usize) -> Self {
        self.leaderboard_size = k;
        self
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sampler.validate()?;

        let unit = |x: f64| x > 0.0 && x < 1.0;
        if !unit(self.thresholds.precision) {
            return Err(ConfigError::invalid(
                "thresholds.precision",
                "must be in (0, 1)",
            ));
        }
        if !(0.0..1.0).contains(&self.thresholds.min_recall) {
            return Err(ConfigError::invalid(
                "thresholds.min_recall",
                "must be in [0, 1)",
            ));
        }
        if !(0.0 <= self.band.low && self.band.low < self.band.high && self.band.high <= 1.0) {
            return Err(ConfigError::invalid(
                "band",
                format!(
                    "need 0 <= low < high <= 1, got ({}, {})",
                    self.band.low, self.band.high
                ),
            ));
        }
        if !(unit(self.bars.unlikely) && unit(self.bars.likely))
            || self.bars.unlikely >= self.bars.likely
        {
            return Err(ConfigError::invalid(
                "bars",
                "need 0 < unlikely < likely < 1",
            ));
        }
        for (field, value) in [
            ("prior.intercept_sd", self.prior.intercept_sd),
            ("prior.location_scale_rate", self.prior.location_scale_rate),
            ("prior.factor_scale_rate", self.prior.factor_scale_rate),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(field, "must be positive and finite"));
            }
        }
        if !self.skip_prior_check && self.prior_check_samples == 0 {
            return Err(ConfigError::invalid(
                "prior_check_samples",
                "must be positive unless the prior check is skipped",
            ));
        }
        if self.leaderboard_size == 0 {
            return Err(ConfigError::invalid("leaderboard_size", "must be positive"));
        }
        Ok(())
    }
}
