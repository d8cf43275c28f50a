//! The analysis pipeline.
//!
//! ```text
//! trials ─► ObservationTable ─► HierarchicalModel ─► (prior check) ─► HMC
//!        ─► PosteriorSamples ─► ScoreTable ─► ranking / leaderboards / rollup
//! ```
//!
//! Each stage consumes the previous stage's immutable output. The prior
//! check is advisory; convergence warnings go through the [`FitPolicy`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use promptbayes_core::analysis::{
    rank_uncertain_configurations, score_all_configurations, validate_predictions, Leaderboards,
    Rollup, ScoreTable, UncertainConfiguration, ValidationReport,
};
use promptbayes_core::preflight::{run_prior_check, PriorCheckReport};
use promptbayes_core::sampler::{sample, ConvergenceWarning, FactorEffect};
use promptbayes_core::{
    HierarchicalModel, InputError, ObservationTable, PosteriorSamples, SamplerError, TrialRecord,
};

use crate::config::{AnalysisConfig, ConfigError, FitPolicy};
use crate::data::DataError;

/// Error returned by the pipeline.
#[derive(Debug)]
pub enum AnalysisError {
    /// The analysis configuration is invalid.
    Config(ConfigError),

    /// The trial corpus or ground truth cannot be modelled.
    Input(InputError),

    /// The sampler rejected its settings or produced unusable chains.
    Sampler(SamplerError),

    /// Reading or writing a record file failed.
    Data(DataError),

    /// The fit did not converge and the policy is [`FitPolicy::FailClosed`].
    UnreliableFit {
        /// The convergence warnings of the fit.
        warnings: Vec<ConvergenceWarning>,
    },
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::Config(e) => write!(f, "invalid configuration: {}", e),
            AnalysisError::Input(e) => write!(f, "invalid input: {}", e),
            AnalysisError::Sampler(e) => write!(f, "sampler error: {}", e),
            AnalysisError::Data(e) => write!(f, "data error: {}", e),
            AnalysisError::UnreliableFit { warnings } => {
                write!(f, "posterior fit is unreliable ({} warnings)", warnings.len())?;
                for w in warnings {
                    write!(f, "\n  - {}", w)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::Config(e) => Some(e),
            AnalysisError::Input(e) => Some(e),
            AnalysisError::Sampler(e) => Some(e),
            AnalysisError::Data(e) => Some(e),
            AnalysisError::UnreliableFit { .. } => None,
        }
    }
}

impl From<ConfigError> for AnalysisError {
    fn from(e: ConfigError) -> Self {
        AnalysisError::Config(e)
    }
}

impl From<InputError> for AnalysisError {
    fn from(e: InputError) -> Self {
        AnalysisError::Input(e)
    }
}

impl From<SamplerError> for AnalysisError {
    fn from(e: SamplerError) -> Self {
        AnalysisError::Sampler(e)
    }
}

impl From<DataError> for AnalysisError {
    fn from(e: DataError) -> Self {
        AnalysisError::Data(e)
    }
}

/// Sizes of the modelled corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusSummary {
    /// Trials in the corpus.
    pub n_trials: usize,
    /// Distinct flagged lines.
    pub n_locations: usize,
    /// Flagged lines that are true errors.
    pub n_true_errors: usize,
    /// Rows of the observation table (trials × locations).
    pub n_observations: usize,
    /// Distinct configurations that were trialed.
    pub n_observed_configs: usize,
    /// Posterior draws over all chains.
    pub n_draws: usize,
}

/// Everything the pipeline produces.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Sizes of the modelled corpus.
    pub corpus: CorpusSummary,
    /// Prior predictive report, unless skipped.
    pub prior_check: Option<PriorCheckReport>,
    /// The joint posterior draws.
    pub samples: PosteriorSamples,
    /// Posterior summaries of the seven factor effects.
    pub factor_effects: Vec<FactorEffect>,
    /// Scores of all 128 configurations.
    pub scores: ScoreTable,
    /// Configurations in the uncertainty band, most uncertain first.
    pub uncertain: Vec<UncertainConfiguration>,
    /// Recall, F1 and precision leaderboards.
    pub leaderboards: Leaderboards,
    /// Rollup counts.
    pub rollup: Rollup,
    /// The policy the fit was judged under.
    pub fit_policy: FitPolicy,
}

impl Analysis {
    /// Convergence warnings of the posterior fit.
    pub fn warnings(&self) -> &[ConvergenceWarning] {
        self.samples.warnings()
    }

    /// Whether the fit converged without warnings.
    pub fn is_reliable(&self) -> bool {
        self.samples.is_converged()
    }

    /// Compare the posterior predictions with held-out trials.
    pub fn validate(
        &self,
        true_errors: &BTreeSet<u32>,
        trials: &[TrialRecord],
    ) -> Result<ValidationReport, AnalysisError> {
        Ok(validate_predictions(&self.scores, true_errors, trials)?)
    }
}

/// Runs the full analysis under one [`AnalysisConfig`].
///
/// # Example
///
/// ```ignore
/// use promptbayes::{Analyzer, AnalysisConfig};
///
/// let analysis = Analyzer::new(AnalysisConfig::quick()).analyze(&trials, &truth)?;
/// for entry in &analysis.leaderboards.by_f1 {
///     println!("config {}: F1 {:.3}", entry.configuration, entry.f1);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalysisConfig,
}

impl Analyzer {
    /// Create an analyzer.
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the prior predictive check for `n_locations` locations.
    pub fn prior_check(&self, n_locations: usize) -> PriorCheckReport {
        run_prior_check(
            &self.config.prior,
            n_locations,
            self.config.prior_check_samples,
            self.config.sampler.seed,
        )
    }

    /// Run the pipeline on a trial corpus and its ground truth.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::Config`] if the configuration does not validate.
    /// - [`AnalysisError::Input`] if the corpus is empty, flags nothing, or
    ///   carries a malformed configuration.
    /// - [`AnalysisError::UnreliableFit`] if the fit has convergence
    ///   warnings and the policy is [`FitPolicy::FailClosed`].
    pub fn analyze(
        &self,
        trials: &[TrialRecord],
        true_errors: &BTreeSet<u32>,
    ) -> Result<Analysis, AnalysisError> {
        let config = &self.config;
        config.validate()?;

        let table = ObservationTable::extract(trials, true_errors)?;
        let n_observed_configs = table.observed_configurations().len();
        tracing::info!(
            trials = table.n_trials(),
            locations = table.n_locations(),
            true_errors = table.n_true_errors(),
            observations = table.observations().len(),
            configurations = n_observed_configs,
            "extracted observations"
        );

        let model = HierarchicalModel::build(&table, config.prior);

        let prior_check = if config.skip_prior_check {
            tracing::debug!("prior predictive check skipped");
            None
        } else {
            Some(self.prior_check(table.n_locations()))
        };

        let samples = sample(&model, &config.sampler)?;
        if !samples.is_converged() {
            match config.fit_policy {
                FitPolicy::FailOpen => {
                    for w in samples.warnings() {
                        tracing::warn!("unreliable fit: {}", w);
                    }
                }
                FitPolicy::FailClosed => {
                    return Err(AnalysisError::UnreliableFit {
                        warnings: samples.warnings().to_vec(),
                    });
                }
            }
        }

        let scores = score_all_configurations(&samples, table.is_true_error(), &config.thresholds)?
            .with_true_error_lines(table.true_error_lines());
        let uncertain = rank_uncertain_configurations(&scores, &config.band);
        let leaderboards = Leaderboards::build(
            &scores,
            config.recall_board_min_precision,
            config.leaderboard_size,
        );
        let rollup = Rollup::compute(&scores, &config.bars, &config.band);

        tracing::info!(
            likely_both = rollup.n_likely_both,
            uncertain = rollup.n_uncertain,
            "scored all configurations"
        );

        Ok(Analysis {
            corpus: CorpusSummary {
                n_trials: table.n_trials(),
                n_locations: table.n_locations(),
                n_true_errors: table.n_true_errors(),
                n_observations: table.observations().len(),
                n_observed_configs,
                n_draws: samples.n_draws(),
            },
            prior_check,
            factor_effects: samples.factor_effects(),
            samples,
            scores,
            uncertain,
            leaderboards,
            rollup,
            fit_policy: config.fit_policy,
        })
    }
}
