//! Hierarchical Bayesian scoring of LLM prompting strategies.
//!
//! Repeated proofreading trials under 128 factorial prompt configurations
//! (seven binary toggles) produce noisy, binary detection outcomes per
//! document line. This crate turns them into posterior distributions over
//! precision and recall for every configuration, including configurations
//! that were never trialed.
//!
//! The pipeline, leaves first:
//!
//! 1. [`ObservationTable::extract`]: trials × flagged lines → detection rows
//! 2. [`HierarchicalModel::build`]: logistic GLMM with location and factor
//!    random effects
//! 3. [`preflight::run_prior_check`]: prior predictive sanity check (advisory)
//! 4. [`sampler::sample`]: HMC chains → [`PosteriorSamples`]
//! 5. [`analysis::score_all_configurations`]: per-draw precision/recall
//! 6. [`analysis::rank_uncertain_configurations`], leaderboards, rollups
//!
//! ```ignore
//! use promptbayes_core::{
//!     analysis::{score_all_configurations, ScoringThresholds},
//!     sampler::{sample, SamplerConfig},
//!     HierarchicalModel, ObservationTable, PriorSpec,
//! };
//!
//! let table = ObservationTable::extract(&trials, &true_errors)?;
//! let model = HierarchicalModel::build(&table, PriorSpec::default());
//! let samples = sample(&model, &SamplerConfig::default())?;
//! let scores = score_all_configurations(&samples, table.is_true_error(), &ScoringThresholds::default())?;
//! ```
//!
//! # Features
//!
//! - `parallel`: run sampler chains and configuration scoring on rayon

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod constants;
pub mod error;
pub mod math;
pub mod model;
pub mod observations;
pub mod preflight;
pub mod sampler;
pub mod types;

pub use error::InputError;
pub use model::{Draw, HierarchicalModel, ParameterLayout, PriorSpec};
pub use observations::{Cell, Observation, ObservationTable};
pub use sampler::{PosteriorSamples, SamplerConfig, SamplerError};
pub use types::{Configuration, Factor, FactorVector, InvalidConfiguration, TrialRecord};
