//! # promptbayes
//!
//! Decide which combination of prompting strategies gives an LLM
//! proofreader the best precision/recall tradeoff, under uncertainty.
//!
//! Trials of the 128 factorial prompt configurations are fitted with a
//! hierarchical logistic model (location and factor random effects), and
//! every configuration, trialed or not, gets a posterior over precision and
//! recall.
//!
//! ## Quick Start
//!
//! ```ignore
//! use promptbayes::{data, output, AnalysisConfig, Analyzer};
//! use std::path::Path;
//!
//! let trials = data::load_trials(Path::new("phase1_results.json"))?;
//! let truth = data::load_ground_truth(Path::new("ground_truth.json"))?;
//!
//! let analysis = Analyzer::new(AnalysisConfig::balanced()).analyze(&trials, &truth)?;
//! println!("{}", output::format_analysis(&analysis));
//! ```
//!
//! ## Reliability
//!
//! Convergence problems are handled by [`FitPolicy`]: `FailOpen` logs them
//! and returns the analysis, `FailClosed` returns
//! [`AnalysisError::UnreliableFit`]. The `PROMPTBAYES_FIT_POLICY`
//! environment variable overrides the preset default.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod analyzer;
mod config;

// Functional modules
pub mod data;
pub mod output;

// Re-exports for public API
pub use analyzer::{Analysis, AnalysisError, Analyzer, CorpusSummary};
pub use config::{AnalysisConfig, ConfigError, FitPolicy, FIT_POLICY_ENV};

// Re-export the statistical core
pub use promptbayes_core::analysis::{
    DecisionBars, LeaderboardEntry, Leaderboards, Rollup, ScoreTable, ScoringThresholds,
    UncertaintyBand, ValidationReport,
};
pub use promptbayes_core::{
    Configuration, Factor, FactorVector, InputError, PosteriorSamples, PriorSpec, SamplerConfig,
    SamplerError, TrialRecord,
};
