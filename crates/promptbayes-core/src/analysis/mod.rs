//! Decision layer over the posterior sample set.
//!
//! - **Scoring** (`scoring`): posterior precision/recall of all 128
//!   configurations and the decision probabilities
//! - **Ranking** (`ranking`): uncertain configurations, leaderboards, rollup
//!   counts
//! - **Validation** (`validation`): predictions against held-out trials

pub mod ranking;
pub mod scoring;
pub mod validation;

pub use ranking::{
    rank_uncertain, rank_uncertain_configurations, top_by_f1, top_by_precision, top_by_recall,
    DecisionBars, LeaderboardEntry, Leaderboards, Rollup, UncertainConfiguration,
    UncertaintyBand,
};
pub use scoring::{
    configuration_posterior, score_all_configurations, score_configuration,
    ConfigurationPosterior, ConfigurationScore, PosteriorStats, ScoreTable, ScoringThresholds,
};
pub use validation::{
    validate_predictions, Comparison, ConfigurationValidation, TrialOutcome, ValidationReport,
};
