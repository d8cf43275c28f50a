//! Held-out validation of scored configurations.
//!
//! New trials of a few configurations (typically the leaderboard heads) are
//! scored the plain way, per trial, and compared with the posterior
//! prediction:
//!
//! ```text
//! trial precision  = |detected ∩ true| / |detected|         (0 if nothing detected)
//! trial recall     = |detected ∩ modelled| / |modelled|     (0 if none modelled)
//! trial recall_all = |detected ∩ true| / |true|
//! z                = (observed mean − predicted mean) / predicted std
//! ```
//!
//! `modelled` is the set of true errors the score table was fitted on, i.e.
//! the ground-truth lines that some fitted trial flagged. Predicted recall is
//! a fraction of those, so the recall comparison uses the same set;
//! `recall_all` also counts never-flagged ground-truth lines and is reported
//! alongside without a prediction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::math;
use crate::observations::validate_trial;
use crate::types::{Configuration, TrialRecord};

use super::scoring::{PosteriorStats, ScoreTable};

/// Precision and recall of a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    /// Fraction of flagged lines that are true errors.
    pub precision: f64,
    /// Fraction of the modelled true errors flagged.
    pub recall: f64,
    /// Fraction of all ground-truth errors flagged.
    pub recall_all: f64,
}

impl TrialOutcome {
    /// Score one trial's detections against the modelled true errors and the
    /// full ground truth.
    pub fn score(
        detected: &BTreeSet<u32>,
        modelled: &BTreeSet<u32>,
        true_errors: &BTreeSet<u32>,
    ) -> Self {
        let true_positives = detected.intersection(true_errors).count();
        let precision = fraction(true_positives, detected.len());
        let recall = fraction(detected.intersection(modelled).count(), modelled.len());
        let recall_all = fraction(true_positives, true_errors.len());
        Self {
            precision,
            recall,
            recall_all,
        }
    }
}

fn fraction(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Observed against predicted for one quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Mean over held-out trials.
    pub observed_mean: f64,
    /// Sample standard deviation over held-out trials (0 for one trial).
    pub observed_std: f64,
    /// Posterior mean.
    pub predicted_mean: f64,
    /// Posterior standard deviation.
    pub predicted_std: f64,
    /// observed − predicted.
    pub difference: f64,
    /// difference / predicted std; `None` when the posterior has no spread.
    pub z_score: Option<f64>,
}

impl Comparison {
    fn new(observed: &[f64], predicted: &PosteriorStats) -> Self {
        let observed_mean = math::mean(observed);
        let difference = observed_mean - predicted.mean;
        Self {
            observed_mean,
            observed_std: math::sqrt(math::sample_variance(observed)),
            predicted_mean: predicted.mean,
            predicted_std: predicted.std,
            difference,
            z_score: (predicted.std > 0.0).then(|| difference / predicted.std),
        }
    }
}

/// Validation of one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationValidation {
    /// Configuration index.
    #[serde(rename = "config_idx")]
    pub configuration: Configuration,
    /// Held-out trials of this configuration.
    pub n_trials: usize,
    /// Per-trial outcomes, in input order.
    pub trials: Vec<TrialOutcome>,
    /// Precision comparison.
    pub precision: Comparison,
    /// Recall comparison, over the modelled true errors.
    pub recall: Comparison,
    /// Mean recall over the whole ground truth. No posterior counterpart.
    pub observed_recall_all: f64,
}

/// Validation of every configuration present in the held-out trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// One entry per configuration, in index order.
    pub configurations: Vec<ConfigurationValidation>,
    /// Mean |difference| of precision over configurations.
    pub mean_abs_precision_error: f64,
    /// Mean |difference| of recall over configurations.
    pub mean_abs_recall_error: f64,
}

impl ValidationReport {
    /// Entry for `configuration`, if it had held-out trials.
    pub fn get(&self, configuration: Configuration) -> Option<&ConfigurationValidation> {
        self.configurations
            .iter()
            .find(|v| v.configuration == configuration)
    }
}

/// Compare held-out trials with the posterior predictions in `table`.
///
/// # Errors
///
/// - [`InputError::EmptyCorpus`] if `trials` is empty.
/// - [`InputError::MalformedConfig`] if a trial's declared index disagrees
///   with its factor map.
/// - [`InputError::LocationMismatch`] if `table` does not carry the lines of
///   all its true errors.
pub fn validate_predictions(
    table: &ScoreTable,
    true_errors: &BTreeSet<u32>,
    trials: &[TrialRecord],
) -> Result<ValidationReport, InputError> {
    if trials.is_empty() {
        return Err(InputError::EmptyCorpus);
    }
    let modelled: BTreeSet<u32> = table.true_error_lines.iter().copied().collect();
    if modelled.len() != table.n_true_errors {
        return Err(InputError::LocationMismatch {
            expected: table.n_true_errors,
            got: modelled.len(),
        });
    }

    let mut grouped: BTreeMap<Configuration, Vec<TrialOutcome>> = BTreeMap::new();
    for (i, trial) in trials.iter().enumerate() {
        let configuration = validate_trial(i, trial)?;
        grouped
            .entry(configuration)
            .or_default()
            .push(TrialOutcome::score(&trial.detected_lines, &modelled, true_errors));
    }

    let mut configurations = Vec::with_capacity(grouped.len());
    for (configuration, outcomes) in grouped {
        let Some(score) = table.get(configuration) else {
            continue;
        };
        let precisions: Vec<f64> = outcomes.iter().map(|o| o.precision).collect();
        let recalls: Vec<f64> = outcomes.iter().map(|o| o.recall).collect();
        let recalls_all: Vec<f64> = outcomes.iter().map(|o| o.recall_all).collect();
        configurations.push(ConfigurationValidation {
            configuration,
            n_trials: outcomes.len(),
            precision: Comparison::new(&precisions, &score.precision),
            recall: Comparison::new(&recalls, &score.recall),
            observed_recall_all: math::mean(&recalls_all),
            trials: outcomes,
        });
    }

    let abs_errors = |f: fn(&ConfigurationValidation) -> f64| -> f64 {
        let errors: Vec<f64> = configurations.iter().map(f).collect();
        math::mean(&errors)
    };
    let mean_abs_precision_error = abs_errors(|v| v.precision.difference.abs());
    let mean_abs_recall_error = abs_errors(|v| v.recall.difference.abs());

    tracing::info!(
        configurations = configurations.len(),
        trials = trials.len(),
        mean_abs_precision_error,
        "validated predictions against held-out trials"
    );

    Ok(ValidationReport {
        configurations,
        mean_abs_precision_error,
        mean_abs_recall_error,
    })
}
