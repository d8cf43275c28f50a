//! Prior predictive simulation.
//!
//! Draws every parameter from its prior alone (no data) and summarises the
//! detection probabilities and the precision those priors imply.

use rand::prelude::*;
use rand::SeedableRng;
use rand_distr::{Exp1, StandardNormal};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::constants::N_FACTORS;
use crate::math;
use crate::model::{linear_predictor, PriorSpec};
use crate::types::FactorVector;

/// Fraction of detection probabilities outside [0.2, 0.8] above which the
/// priors are considered too informative.
pub const EXTREME_FRACTION_LIMIT: f64 = 0.8;

/// Distance of the prior precision median from 0.5 above which the prior
/// is considered to carry a strong belief about precision.
pub const PRECISION_CENTRE_TOLERANCE: f64 = 0.2;

/// Summary of draws from a scale hyperprior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleSummary {
    /// Mean.
    pub mean: f64,
    /// Median.
    pub median: f64,
    /// Minimum.
    pub min: f64,
    /// Maximum.
    pub max: f64,
}

impl ScaleSummary {
    fn from_samples(samples: &[f64]) -> Self {
        Self {
            mean: math::mean(samples),
            median: math::median(samples),
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Prior predictive detection probabilities for one representative
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// Which representative configuration this is.
    pub label: String,
    /// Its factor toggles.
    pub factors: FactorVector,
    /// Mean detection probability.
    pub mean: f64,
    /// Median detection probability.
    pub median: f64,
    /// Smallest simulated probability.
    pub min: f64,
    /// Largest simulated probability.
    pub max: f64,
    /// Fraction of draws with p > 0.8.
    pub frac_above_80: f64,
    /// Fraction of draws with p < 0.2.
    pub frac_below_20: f64,
}

impl DetectionSummary {
    /// Fraction of draws outside [0.2, 0.8].
    pub fn extreme_fraction(&self) -> f64 {
        self.frac_above_80 + self.frac_below_20
    }
}

/// Prior-implied precision for a synthetic population in which the first
/// half of the locations are true errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecisionPriorSummary {
    /// Number of synthetic true errors.
    pub n_true_errors: usize,
    /// Mean precision.
    pub mean: f64,
    /// Median precision.
    pub median: f64,
    /// P(precision > 0.8).
    pub prob_above_80: f64,
    /// P(precision < 0.2).
    pub prob_below_20: f64,
}

/// Raw simulation output.
#[derive(Debug, Clone)]
pub struct PriorSimulation {
    /// σ_loc draws.
    pub sigma_loc: Vec<f64>,
    /// σ_sys draws.
    pub sigma_sys: Vec<f64>,
    /// Detection summaries for all-off, all-on and one random configuration.
    pub detection: Vec<DetectionSummary>,
    /// Per-draw precision under the synthetic population.
    pub precision: Vec<f64>,
    /// Number of synthetic true errors.
    pub n_true_errors: usize,
}

/// Simulate `n_samples` draws from the priors for `n_locations` locations.
///
/// `n_locations` is clamped to at least 1.
pub fn simulate_prior(
    prior: &PriorSpec,
    n_locations: usize,
    n_samples: usize,
    seed: u64,
) -> PriorSimulation {
    let n_locations = n_locations.max(1);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

    let sigma_loc: Vec<f64> = (0..n_samples)
        .map(|_| exponential(&mut rng, prior.location_scale_rate))
        .collect();
    let sigma_sys: Vec<f64> = (0..n_samples)
        .map(|_| exponential(&mut rng, prior.factor_scale_rate))
        .collect();

    let random_config = random_factors(&mut rng);
    let representatives = [
        ("All factors OFF", FactorVector::all_off()),
        ("All factors ON", FactorVector::all_on()),
        ("Random config", random_config),
    ];

    let mut detection = Vec::with_capacity(representatives.len());
    for (label, factors) in representatives {
        let p: Vec<f64> = (0..n_samples)
            .map(|s| {
                let alpha = normal(&mut rng, prior.intercept_sd);
                // Only the middle location is looked at; its effect is one draw
                let u_loc = normal(&mut rng, sigma_loc[s]);
                let u_factor = factor_draw(&mut rng, sigma_sys[s]);
                math::invlogit(linear_predictor(alpha, u_loc, &u_factor, &factors))
            })
            .collect();

        detection.push(DetectionSummary {
            label: label.to_string(),
            factors,
            mean: math::mean(&p),
            median: math::median(&p),
            min: p.iter().copied().fold(f64::INFINITY, f64::min),
            max: p.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            frac_above_80: math::fraction_above(&p, 0.8),
            frac_below_20: math::fraction_below(&p, 0.2),
        });
    }

    // Precision under a 50% true-error population
    let n_true_errors = n_locations / 2;
    let precision_config = random_factors(&mut rng);
    let precision: Vec<f64> = (0..n_samples)
        .map(|s| {
            let alpha = normal(&mut rng, prior.intercept_sd);
            let u_factor = factor_draw(&mut rng, sigma_sys[s]);
            let mut true_mass = 0.0;
            let mut total_mass = 0.0;
            for l in 0..n_locations {
                let u_loc = normal(&mut rng, sigma_loc[s]);
                let p = math::invlogit(linear_predictor(alpha, u_loc, &u_factor, &precision_config));
                if l < n_true_errors {
                    true_mass += p;
                }
                total_mass += p;
            }
            if total_mass > 0.0 {
                true_mass / total_mass
            } else {
                0.0
            }
        })
        .collect();

    PriorSimulation {
        sigma_loc,
        sigma_sys,
        detection,
        precision,
        n_true_errors,
    }
}

impl PriorSimulation {
    /// σ_loc summary.
    pub fn sigma_loc_summary(&self) -> ScaleSummary {
        ScaleSummary::from_samples(&self.sigma_loc)
    }

    /// σ_sys summary.
    pub fn sigma_sys_summary(&self) -> ScaleSummary {
        ScaleSummary::from_samples(&self.sigma_sys)
    }

    /// Prior-implied precision summary.
    pub fn precision_summary(&self) -> PrecisionPriorSummary {
        PrecisionPriorSummary {
            n_true_errors: self.n_true_errors,
            mean: math::mean(&self.precision),
            median: math::median(&self.precision),
            prob_above_80: math::fraction_above(&self.precision, 0.8),
            prob_below_20: math::fraction_below(&self.precision, 0.2),
        }
    }
}

fn exponential(rng: &mut Xoshiro256PlusPlus, rate: f64) -> f64 {
    let e: f64 = rng.sample(Exp1);
    e / rate
}

fn normal(rng: &mut Xoshiro256PlusPlus, sd: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z * sd
}

fn factor_draw(rng: &mut Xoshiro256PlusPlus, sd: f64) -> [f64; N_FACTORS] {
    core::array::from_fn(|_| normal(rng, sd))
}

fn random_factors(rng: &mut Xoshiro256PlusPlus) -> FactorVector {
    FactorVector::new(core::array::from_fn(|_| rng.random::<bool>()))
}
