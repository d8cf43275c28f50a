//! Posterior precision and recall for every configuration.
//!
//! For configuration `c` and draw `d`:
//!
//! ```text
//! p[d, ℓ]      = invlogit(α[d] + u_loc[d, ℓ] + Σ_k bit_k(c) · u_factor[d, k])
//! precision[d] = Σ_{ℓ true} p[d, ℓ] / max(Σ_ℓ p[d, ℓ], 1e-10)
//! recall[d]    = Σ_{ℓ true} p[d, ℓ] / n_true_errors
//! ```
//!
//! These are expected counts under the posterior predictive, not thresholded
//! detections. Every quantity of one draw is computed from that draw alone,
//! so the joint probability P(precision > t AND recall > r) is exact over the
//! Monte Carlo sample.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MIN_RECALL, DEFAULT_PRECISION_THRESHOLD, PRECISION_DENOMINATOR_FLOOR,
};
use crate::error::InputError;
use crate::math;
use crate::model::factor_shift;
use crate::sampler::PosteriorSamples;
use crate::types::{Configuration, FactorVector};

/// Thresholds of the decision probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringThresholds {
    /// Precision level of P(precision > threshold).
    pub precision: f64,
    /// Recall floor of P(recall > min_recall).
    pub min_recall: f64,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION_THRESHOLD,
            min_recall: DEFAULT_MIN_RECALL,
        }
    }
}

impl ScoringThresholds {
    /// Set the precision threshold.
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    /// Set the recall floor.
    pub fn with_min_recall(mut self, min_recall: f64) -> Self {
        self.min_recall = min_recall;
        self
    }
}

/// Mean, standard deviation and median of a posterior quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PosteriorStats {
    /// Posterior mean.
    pub mean: f64,
    /// Posterior standard deviation (population form).
    pub std: f64,
    /// Posterior median.
    pub median: f64,
}

impl PosteriorStats {
    /// Summarise a draw sequence.
    pub fn from_draws(draws: &[f64]) -> Self {
        Self {
            mean: math::mean(draws),
            std: math::std_dev(draws),
            median: math::median(draws),
        }
    }
}

/// Posterior summary of one configuration.
///
/// Serializes as a flat record (`mean_precision`, `std_precision`,
/// `prob_precision_gt_80`, ...), the shape comparison tooling reads from
/// `config_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ScoreRecord", from = "ScoreRecord")]
pub struct ConfigurationScore {
    /// Configuration index.
    pub configuration: Configuration,
    /// Factor toggles of the configuration.
    pub config: FactorVector,
    /// P(precision > precision threshold).
    pub prob_high_precision: f64,
    /// P(recall > min_recall).
    pub prob_recall_gt_min: f64,
    /// P(precision > threshold AND recall > min_recall), evaluated per draw.
    pub prob_both: f64,
    /// Precision summary.
    pub precision: PosteriorStats,
    /// Recall summary.
    pub recall: PosteriorStats,
}

/// Wire form of [`ConfigurationScore`].
#[derive(Serialize, Deserialize)]
struct ScoreRecord {
    config_idx: Configuration,
    prob_precision_gt_80: f64,
    prob_recall_gt_min: f64,
    prob_both: f64,
    mean_precision: f64,
    std_precision: f64,
    median_precision: f64,
    mean_recall: f64,
    std_recall: f64,
    median_recall: f64,
    config: FactorVector,
}

impl From<ConfigurationScore> for ScoreRecord {
    fn from(s: ConfigurationScore) -> Self {
        Self {
            config_idx: s.configuration,
            prob_precision_gt_80: s.prob_high_precision,
            prob_recall_gt_min: s.prob_recall_gt_min,
            prob_both: s.prob_both,
            mean_precision: s.precision.mean,
            std_precision: s.precision.std,
            median_precision: s.precision.median,
            mean_recall: s.recall.mean,
            std_recall: s.recall.std,
            median_recall: s.recall.median,
            config: s.config,
        }
    }
}

impl From<ScoreRecord> for ConfigurationScore {
    fn from(r: ScoreRecord) -> Self {
        Self {
            configuration: r.config_idx,
            config: r.config,
            prob_high_precision: r.prob_precision_gt_80,
            prob_recall_gt_min: r.prob_recall_gt_min,
            prob_both: r.prob_both,
            precision: PosteriorStats {
                mean: r.mean_precision,
                std: r.std_precision,
                median: r.median_precision,
            },
            recall: PosteriorStats {
                mean: r.mean_recall,
                std: r.std_recall,
                median: r.median_recall,
            },
        }
    }
}

impl ConfigurationScore {
    /// F1 of the posterior mean precision and recall (0 when both are 0).
    pub fn f1(&self) -> f64 {
        let p = self.precision.mean;
        let r = self.recall.mean;
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }
}

/// Per-draw precision and recall of one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationPosterior {
    /// The configuration.
    pub configuration: Configuration,
    /// Precision per draw.
    pub precision: Vec<f64>,
    /// Recall per draw, aligned with `precision`.
    pub recall: Vec<f64>,
}

impl ConfigurationPosterior {
    /// Summarise into a [`ConfigurationScore`].
    pub fn score(&self, thresholds: &ScoringThresholds) -> ConfigurationScore {
        let n = self.precision.len();
        let both = self
            .precision
            .iter()
            .zip(&self.recall)
            .filter(|(&p, &r)| p > thresholds.precision && r > thresholds.min_recall)
            .count();

        ConfigurationScore {
            configuration: self.configuration,
            config: self.configuration.factors(),
            prob_high_precision: math::fraction_above(&self.precision, thresholds.precision),
            prob_recall_gt_min: math::fraction_above(&self.recall, thresholds.min_recall),
            prob_both: if n > 0 { both as f64 / n as f64 } else { 0.0 },
            precision: PosteriorStats::from_draws(&self.precision),
            recall: PosteriorStats::from_draws(&self.recall),
        }
    }
}

/// Scores of all 128 configurations, in index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    /// Thresholds the probabilities were computed with.
    pub thresholds: ScoringThresholds,
    /// Flagged locations that are true errors.
    pub n_true_errors: usize,
    /// Lines of those true errors, ascending. Empty until attached with
    /// [`ScoreTable::with_true_error_lines`].
    #[serde(default)]
    pub true_error_lines: Vec<u32>,
    /// Flagged locations.
    pub n_locations: usize,
    /// Posterior draws scored.
    pub n_draws: usize,
    /// One score per configuration; `scores[i]` is configuration `i`.
    pub scores: Vec<ConfigurationScore>,
}

impl ScoreTable {
    /// Attach the lines behind the true-error mask the table was scored
    /// with, so held-out trials can be scored against the same set.
    pub fn with_true_error_lines(mut self, lines: impl IntoIterator<Item = u32>) -> Self {
        self.true_error_lines = lines.into_iter().collect();
        self.true_error_lines.sort_unstable();
        self.true_error_lines.dedup();
        self
    }

    /// Score of `configuration`.
    pub fn get(&self, configuration: Configuration) -> Option<&ConfigurationScore> {
        self.scores.get(configuration.index())
    }

    /// Iterate over scores in index order.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigurationScore> {
        self.scores.iter()
    }

    /// Number of scored configurations.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether no configuration was scored.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// P(precision > threshold) per configuration, in index order.
    pub fn precision_probabilities(&self) -> Vec<f64> {
        self.scores.iter().map(|s| s.prob_high_precision).collect()
    }
}

fn check_locations(samples: &PosteriorSamples, is_true_error: &[bool]) -> Result<(), InputError> {
    if samples.n_locations() != is_true_error.len() {
        return Err(InputError::LocationMismatch {
            expected: samples.n_locations(),
            got: is_true_error.len(),
        });
    }
    Ok(())
}

/// Per-draw precision and recall of one configuration.
///
/// # Errors
///
/// [`InputError::LocationMismatch`] if `is_true_error` does not have one
/// entry per location of `samples`.
pub fn configuration_posterior(
    samples: &PosteriorSamples,
    is_true_error: &[bool],
    configuration: Configuration,
) -> Result<ConfigurationPosterior, InputError> {
    check_locations(samples, is_true_error)?;
    Ok(posterior_unchecked(samples, is_true_error, configuration))
}

fn posterior_unchecked(
    samples: &PosteriorSamples,
    is_true_error: &[bool],
    configuration: Configuration,
) -> ConfigurationPosterior {
    let factors = configuration.factors();
    let n_true = is_true_error.iter().filter(|&&t| t).count();
    let n_draws = samples.n_draws();

    let mut precision = Vec::with_capacity(n_draws);
    let mut recall = Vec::with_capacity(n_draws);

    for d in 0..n_draws {
        let base = samples.alpha()[d] + factor_shift(&samples.u_factor()[d], &factors);
        let mut true_mass = 0.0;
        let mut total_mass = 0.0;
        for (&u, &is_true) in samples.u_loc(d).iter().zip(is_true_error) {
            let p = math::invlogit(base + u);
            if is_true {
                true_mass += p;
            }
            total_mass += p;
        }
        precision.push(true_mass / total_mass.max(PRECISION_DENOMINATOR_FLOOR));
        recall.push(if n_true > 0 {
            true_mass / n_true as f64
        } else {
            0.0
        });
    }

    ConfigurationPosterior {
        configuration,
        precision,
        recall,
    }
}

/// Score one configuration.
///
/// # Errors
///
/// [`InputError::LocationMismatch`] as for [`configuration_posterior`].
pub fn score_configuration(
    samples: &PosteriorSamples,
    is_true_error: &[bool],
    configuration: Configuration,
    thresholds: &ScoringThresholds,
) -> Result<ConfigurationScore, InputError> {
    Ok(configuration_posterior(samples, is_true_error, configuration)?.score(thresholds))
}

/// Score all 128 configurations, including ones never trialed.
///
/// Pure and deterministic: scoring the same samples twice gives identical
/// tables.
///
/// # Errors
///
/// [`InputError::LocationMismatch`] as for [`configuration_posterior`].
pub fn score_all_configurations(
    samples: &PosteriorSamples,
    is_true_error: &[bool],
    thresholds: &ScoringThresholds,
) -> Result<ScoreTable, InputError> {
    check_locations(samples, is_true_error)?;

    let score = |configuration: Configuration| {
        posterior_unchecked(samples, is_true_error, configuration).score(thresholds)
    };

    #[cfg(feature = "parallel")]
    let scores: Vec<ConfigurationScore> = Configuration::all()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(score)
        .collect();

    #[cfg(not(feature = "parallel"))]
    let scores: Vec<ConfigurationScore> = Configuration::all().map(score).collect();

    let n_true_errors = is_true_error.iter().filter(|&&t| t).count();
    tracing::debug!(
        configurations = scores.len(),
        draws = samples.n_draws(),
        n_true_errors,
        "scored configurations"
    );

    Ok(ScoreTable {
        thresholds: *thresholds,
        n_true_errors,
        true_error_lines: Vec::new(),
        n_locations: is_true_error.len(),
        n_draws: samples.n_draws(),
        scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{N_CONFIGS, N_FACTORS};
    use crate::model::Draw;

    fn draw(alpha: f64, u_loc: Vec<f64>, u_factor: [f64; N_FACTORS]) -> Draw {
        Draw {
            alpha,
            sigma_loc: 1.0,
            sigma_sys: 1.0,
            u_loc,
            u_factor,
        }
    }

    fn varied_samples(n_locations: usize) -> PosteriorSamples {
        let draws = (0..40)
            .map(|i| {
                let t = i as f64;
                draw(
                    (t * 0.37).sin(),
                    (0..n_locations)
                        .map(|l| ((t + 1.0) * (l as f64 + 0.5)).cos())
                        .collect(),
                    core::array::from_fn(|k| 0.4 * ((t + k as f64) * 0.9).sin()),
                )
            })
            .collect();
        PosteriorSamples::from_draws(draws).unwrap()
    }

    #[test]
    fn test_all_true_errors_give_unit_precision() {
        let samples = varied_samples(5);
        let table = score_all_configurations(&samples, &[true; 5], &ScoringThresholds::default())
            .unwrap();
        for score in table.iter() {
            assert_eq!(score.precision.mean, 1.0);
            assert_eq!(score.precision.std, 0.0);
            assert_eq!(score.prob_high_precision, 1.0);
        }
        let posterior =
            configuration_posterior(&samples, &[true; 5], Configuration::new(77).unwrap())
                .unwrap();
        assert!(posterior.precision.iter().all(|&p| p == 1.0));
    }

    #[test]
    fn test_zero_effects_score_identically() {
        let draws = (0..30)
            .map(|i| draw(-1.0 + i as f64 * 0.07, vec![0.0; 4], [0.0; N_FACTORS]))
            .collect();
        let samples = PosteriorSamples::from_draws(draws).unwrap();
        let table = score_all_configurations(
            &samples,
            &[true, false, true, false],
            &ScoringThresholds::default(),
        )
        .unwrap();

        assert_eq!(table.len(), N_CONFIGS);
        let first = &table.scores[0];
        for score in table.iter() {
            assert_eq!(score.precision, first.precision);
            assert_eq!(score.recall, first.recall);
            assert_eq!(score.prob_both, first.prob_both);
        }
        // Two of four equally detectable locations are true
        assert!((first.precision.mean - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_location_mismatch_rejected() {
        let samples = varied_samples(3);
        let err = score_all_configurations(&samples, &[true, false], &ScoringThresholds::default())
            .unwrap_err();
        assert_eq!(err, InputError::LocationMismatch { expected: 3, got: 2 });
    }

    #[test]
    fn test_no_true_errors() {
        let samples = varied_samples(3);
        let score = score_configuration(
            &samples,
            &[false; 3],
            Configuration::new(0).unwrap(),
            &ScoringThresholds::default(),
        )
        .unwrap();
        assert_eq!(score.precision.mean, 0.0);
        assert_eq!(score.recall.mean, 0.0);
        assert_eq!(score.prob_both, 0.0);
        assert_eq!(score.f1(), 0.0);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let samples = varied_samples(6);
        let truth = [true, false, false, true, true, false];
        let thresholds = ScoringThresholds::default();
        let a = score_all_configurations(&samples, &truth, &thresholds).unwrap();
        let b = score_all_configurations(&samples, &truth, &thresholds).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_joint_probability_uses_same_draw() {
        // Draw 0: high precision, low recall. Draw 1: low precision, high recall.
        let draws = vec![
            draw(0.0, vec![-2.0, -2.0, -30.0], [0.0; N_FACTORS]),
            draw(0.0, vec![30.0, 30.0, 30.0], [0.0; N_FACTORS]),
        ];
        let samples = PosteriorSamples::from_draws(draws).unwrap();
        let thresholds = ScoringThresholds::default().with_min_recall(0.5);
        let score = score_configuration(
            &samples,
            &[true, true, false],
            Configuration::new(0).unwrap(),
            &thresholds,
        )
        .unwrap();

        assert_eq!(score.prob_high_precision, 0.5);
        assert_eq!(score.prob_recall_gt_min, 0.5);
        // Marginals multiply to 0.25 but the draws never satisfy both
        assert_eq!(score.prob_both, 0.0);
    }

    #[test]
    fn test_precision_monotone_in_true_set() {
        let samples = varied_samples(5);
        let c = Configuration::new(42).unwrap();
        let fewer = configuration_posterior(&samples, &[true, false, false, false, false], c)
            .unwrap();
        let more = configuration_posterior(&samples, &[true, false, true, false, false], c)
            .unwrap();
        for (a, b) in fewer.precision.iter().zip(&more.precision) {
            assert!(b >= a);
        }
    }

    #[test]
    fn test_f1_of_means() {
        let posterior = ConfigurationPosterior {
            configuration: Configuration::new(1).unwrap(),
            precision: vec![0.5, 0.5],
            recall: vec![0.25, 0.25],
        };
        let score = posterior.score(&ScoringThresholds::default());
        assert!((score.f1() - 2.0 * 0.5 * 0.25 / 0.75).abs() < 1e-12);
        assert_eq!(score.config, Configuration::new(1).unwrap().factors());
    }

    #[test]
    fn test_score_serializes_config_idx() {
        let samples = varied_samples(2);
        let score = score_configuration(
            &samples,
            &[true, false],
            Configuration::new(9).unwrap(),
            &ScoringThresholds::default(),
        )
        .unwrap();
        let json = serde_json::to_value(&score).unwrap();
        assert_eq!(json["config_idx"], 9);
        assert_eq!(json["config"]["arrow_format"], true);
        assert_eq!(json["config"]["scope_restriction"], true);
        assert_eq!(json["mean_precision"], score.precision.mean);
        assert_eq!(json["std_recall"], score.recall.std);
        assert_eq!(json["prob_precision_gt_80"], score.prob_high_precision);
        assert!(json.get("precision").is_none());

        let back: ConfigurationScore = serde_json::from_value(json).unwrap();
        assert_eq!(back.configuration, score.configuration);
        assert_eq!(back.config, score.config);
    }
}

/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use crate::model::Draw;
    use proptest::prelude::*;

    fn samples_strategy(n_locations: usize) -> impl Strategy<Value = PosteriorSamples> {
        prop::collection::vec(
            (
                -6.0f64..6.0,
                prop::collection::vec(-4.0f64..4.0, n_locations),
                prop::array::uniform7(-3.0f64..3.0),
            ),
            1..12,
        )
        .prop_map(|raw| {
            let draws = raw
                .into_iter()
                .map(|(alpha, u_loc, u_factor)| Draw {
                    alpha,
                    sigma_loc: 1.0,
                    sigma_sys: 1.0,
                    u_loc,
                    u_factor,
                })
                .collect();
            PosteriorSamples::from_draws(draws).unwrap()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Precision and recall stay in [0, 1] for every draw
        #[test]
        fn prop_precision_recall_bounded(
            samples in samples_strategy(5),
            truth in prop::array::uniform5(any::<bool>()),
            config in 0usize..128,
        ) {
            let posterior = configuration_posterior(
                &samples,
                &truth,
                Configuration::new(config).unwrap(),
            ).unwrap();
            for (&p, &r) in posterior.precision.iter().zip(&posterior.recall) {
                prop_assert!((0.0..=1.0).contains(&p), "precision {}", p);
                prop_assert!((0.0..=1.0).contains(&r), "recall {}", r);
            }
        }

        /// The joint probability never exceeds either marginal
        #[test]
        fn prop_joint_below_marginals(
            samples in samples_strategy(4),
            truth in prop::array::uniform4(any::<bool>()),
            config in 0usize..128,
        ) {
            let score = score_configuration(
                &samples,
                &truth,
                Configuration::new(config).unwrap(),
                &ScoringThresholds::default(),
            ).unwrap();
            prop_assert!(score.prob_both <= score.prob_high_precision);
            prop_assert!(score.prob_both <= score.prob_recall_gt_min);
        }

        /// Adding a true error never lowers the true-error mass
        #[test]
        fn prop_recall_numerator_monotone(
            samples in samples_strategy(4),
            extra in 1usize..4,
        ) {
            let c = Configuration::new(0).unwrap();
            let mut base = [false; 4];
            base[0] = true;
            let mut grown = base;
            grown[extra] = true;
            let a = configuration_posterior(&samples, &base, c).unwrap();
            let b = configuration_posterior(&samples, &grown, c).unwrap();
            // recall × n_true is the true-error mass
            for (ra, rb) in a.recall.iter().zip(&b.recall) {
                prop_assert!(rb * 2.0 >= *ra - 1e-12);
            }
        }
    }
}
