//! Prior predictive checks run before the sampler.
//!
//! The check simulates from the priors alone and flags priors that are
//! implausibly informative: detection probabilities piled up near 0 or 1,
//! or a prior on precision that sits far from the uninformative 0.5.
//!
//! The check is advisory. It never blocks the pipeline; warnings are logged
//! and attached to the report for the caller to act on.

mod prior_predictive;

pub use prior_predictive::{
    simulate_prior, DetectionSummary, PrecisionPriorSummary, PriorSimulation, ScaleSummary,
    EXTREME_FRACTION_LIMIT, PRECISION_CENTRE_TOLERANCE,
};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::PriorSpec;

/// Advisory warning from the prior predictive check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PriorWarning {
    /// Most simulated detection probabilities are below 0.2 or above 0.8.
    ExtremeDetectionProbabilities {
        /// Representative configuration the warning is about.
        label: String,
        /// Fraction of draws outside [0.2, 0.8].
        extreme_fraction: f64,
    },

    /// The prior-implied precision is concentrated away from 0.5.
    PrecisionPriorOffCentre {
        /// Median prior precision.
        median: f64,
    },
}

impl PriorWarning {
    /// Suggested action.
    pub fn guidance(&self) -> &'static str {
        match self {
            PriorWarning::ExtremeDetectionProbabilities { .. } => {
                "priors are too informative on the logit scale; consider a smaller intercept sd"
            }
            PriorWarning::PrecisionPriorOffCentre { .. } => {
                "the model has a strong prior belief about precision; widen the scale hyperpriors"
            }
        }
    }
}

impl fmt::Display for PriorWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorWarning::ExtremeDetectionProbabilities {
                label,
                extreme_fraction,
            } => write!(
                f,
                "{}: {:.1}% of prior detection probabilities fall outside [0.2, 0.8]",
                label,
                extreme_fraction * 100.0
            ),
            PriorWarning::PrecisionPriorOffCentre { median } => write!(
                f,
                "prior precision median is {:.3}, far from the uninformative 0.5",
                median
            ),
        }
    }
}

/// Result of the prior predictive check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorCheckReport {
    /// Locations simulated.
    pub n_locations: usize,
    /// Draws per quantity.
    pub n_samples: usize,
    /// σ_loc hyperprior draws.
    pub sigma_loc: ScaleSummary,
    /// σ_sys hyperprior draws.
    pub sigma_sys: ScaleSummary,
    /// Detection probabilities for the representative configurations.
    pub detection: Vec<DetectionSummary>,
    /// Prior-implied precision for a 50% true-error population.
    pub precision: PrecisionPriorSummary,
    /// Advisory warnings.
    pub warnings: Vec<PriorWarning>,
}

impl PriorCheckReport {
    /// Whether any warning was raised.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Run the prior predictive check.
///
/// # Arguments
///
/// * `prior` - Prior hyperparameters of the model
/// * `n_locations` - Number of locations to simulate (use the real count)
/// * `n_samples` - Number of prior draws
/// * `seed` - Deterministic RNG seed
pub fn run_prior_check(
    prior: &PriorSpec,
    n_locations: usize,
    n_samples: usize,
    seed: u64,
) -> PriorCheckReport {
    let sim = simulate_prior(prior, n_locations, n_samples, seed);
    let precision = sim.precision_summary();

    let mut warnings = Vec::new();
    for d in &sim.detection {
        if d.extreme_fraction() > EXTREME_FRACTION_LIMIT {
            warnings.push(PriorWarning::ExtremeDetectionProbabilities {
                label: d.label.clone(),
                extreme_fraction: d.extreme_fraction(),
            });
        }
    }
    if (precision.median - 0.5).abs() > PRECISION_CENTRE_TOLERANCE {
        warnings.push(PriorWarning::PrecisionPriorOffCentre {
            median: precision.median,
        });
    }

    tracing::info!(
        n_locations,
        n_samples,
        precision_median = precision.median,
        "prior predictive check complete"
    );
    for w in &warnings {
        tracing::warn!("prior check: {} ({})", w, w.guidance());
    }

    PriorCheckReport {
        n_locations,
        n_samples,
        sigma_loc: sim.sigma_loc_summary(),
        sigma_sys: sim.sigma_sys_summary(),
        detection: sim.detection,
        precision,
        warnings,
    }
}
