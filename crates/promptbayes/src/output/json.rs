//! JSON document of an analysis.
//!
//! Written NaN and infinite diagnostics become `null` in JSON, so reading a
//! document back goes through [`read_score_table`], which only decodes the
//! parts needed to rebuild the score table.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use promptbayes_core::analysis::{
    ConfigurationScore, Leaderboards, Rollup, ScoreTable, ScoringThresholds,
    UncertainConfiguration, ValidationReport,
};
use promptbayes_core::constants::N_CONFIGS;
use promptbayes_core::preflight::PriorCheckReport;
use promptbayes_core::sampler::{FactorEffect, SamplerDiagnostics};

use crate::analyzer::{Analysis, CorpusSummary};
use crate::config::FitPolicy;
use crate::data::DataError;

/// Serializable form of an [`Analysis`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisDocument {
    /// Corpus sizes.
    pub corpus: CorpusSummary,
    /// Flagged lines that are true errors, the set recall is predicted over.
    pub true_error_lines: Vec<u32>,
    /// Thresholds of the decision probabilities.
    pub thresholds: ScoringThresholds,
    /// Factor effects keyed by parameter name (`u_s_i`, ...).
    pub factor_effects: BTreeMap<String, FactorEffect>,
    /// Configuration scores keyed by configuration index.
    pub config_results: BTreeMap<String, ConfigurationScore>,
    /// Uncertain configurations, most uncertain first.
    pub uncertain_configs: Vec<UncertainConfiguration>,
    /// Rollup counts.
    pub summary: Rollup,
    /// Recall, F1 and precision leaderboards.
    pub leaderboards: Leaderboards,
    /// Sampler diagnostics.
    pub sampler: SamplerDiagnostics,
    /// Prior predictive report, if it ran.
    pub prior_check: Option<PriorCheckReport>,
    /// Convergence warnings as text.
    pub warnings: Vec<String>,
    /// Policy the fit was judged under.
    pub fit_policy: FitPolicy,
}

impl From<&Analysis> for AnalysisDocument {
    fn from(analysis: &Analysis) -> Self {
        Self {
            corpus: analysis.corpus,
            true_error_lines: analysis.scores.true_error_lines.clone(),
            thresholds: analysis.scores.thresholds,
            factor_effects: analysis
                .factor_effects
                .iter()
                .map(|e| (e.name.clone(), e.clone()))
                .collect(),
            config_results: analysis
                .scores
                .iter()
                .map(|s| (s.configuration.index().to_string(), s.clone()))
                .collect(),
            uncertain_configs: analysis.uncertain.clone(),
            summary: analysis.rollup,
            leaderboards: analysis.leaderboards.clone(),
            sampler: analysis.samples.diagnostics().clone(),
            prior_check: analysis.prior_check.clone(),
            warnings: analysis.warnings().iter().map(|w| w.to_string()).collect(),
            fit_policy: analysis.fit_policy,
        }
    }
}

/// The parts of a written document needed to rebuild its [`ScoreTable`].
#[derive(Debug, Deserialize)]
struct ScoredDocument {
    corpus: CorpusSummary,
    true_error_lines: Vec<u32>,
    thresholds: ScoringThresholds,
    config_results: BTreeMap<String, ConfigurationScore>,
}

/// Serialize an analysis to a pretty-printed JSON string.
pub fn to_json_pretty(analysis: &Analysis) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&AnalysisDocument::from(analysis))
}

/// Serialize a validation report to a pretty-printed JSON string.
pub fn validation_to_json_pretty(report: &ValidationReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Write an analysis document to `path`.
pub fn write_analysis(path: &Path, analysis: &Analysis) -> Result<(), DataError> {
    fs::write(path, to_json_pretty(analysis)?)?;
    tracing::info!(path = %path.display(), "wrote analysis");
    Ok(())
}

/// Rebuild the score table of a written analysis document.
///
/// # Errors
///
/// [`DataError::Format`] unless the document scores every configuration
/// exactly once.
pub fn read_score_table(text: &str) -> Result<ScoreTable, DataError> {
    let document: ScoredDocument = serde_json::from_str(text)?;

    let mut scores: Vec<ConfigurationScore> = document.config_results.into_values().collect();
    scores.sort_by_key(|s| s.configuration);
    let complete = scores.len() == N_CONFIGS
        && scores
            .iter()
            .enumerate()
            .all(|(i, s)| s.configuration.index() == i);
    if !complete {
        return Err(DataError::Format {
            message: format!(
                "`config_results` must score all {} configurations once, found {}",
                N_CONFIGS,
                scores.len()
            ),
        });
    }

    Ok(ScoreTable {
        thresholds: document.thresholds,
        n_true_errors: document.corpus.n_true_errors,
        true_error_lines: document.true_error_lines,
        n_locations: document.corpus.n_locations,
        n_draws: document.corpus.n_draws,
        scores,
    })
}

/// Load the score table of an analysis document from `path`.
pub fn load_score_table(path: &Path) -> Result<ScoreTable, DataError> {
    read_score_table(&fs::read_to_string(path)?)
}
