//! Uncertainty ranking, leaderboards and rollup counts over a score table.
//!
//! Every ordering here is a stable sort over the table's index order, so
//! ties resolve by configuration index.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_RECALL_BOARD_MIN_PRECISION, DEFAULT_UNCERTAIN_HIGH, DEFAULT_UNCERTAIN_LOW,
};
use crate::types::Configuration;

use super::scoring::{ConfigurationScore, ScoreTable};

/// Open interval of decision probabilities considered genuinely uncertain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyBand {
    /// Lower edge (exclusive).
    pub low: f64,
    /// Upper edge (exclusive).
    pub high: f64,
}

impl Default for UncertaintyBand {
    fn default() -> Self {
        Self {
            low: DEFAULT_UNCERTAIN_LOW,
            high: DEFAULT_UNCERTAIN_HIGH,
        }
    }
}

impl UncertaintyBand {
    /// Band `(low, high)`.
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Whether `p` lies strictly inside the band.
    pub fn contains(&self, p: f64) -> bool {
        self.low < p && p < self.high
    }
}

/// A configuration whose decision probability is in the uncertain band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertainConfiguration {
    /// Configuration index.
    #[serde(rename = "config_idx")]
    pub configuration: Configuration,
    /// P(precision > threshold).
    pub prob: f64,
}

/// Indices of `probabilities` strictly inside `band`, most uncertain first.
///
/// Ranked by |p − 0.5| ascending; ties keep index order.
pub fn rank_uncertain(probabilities: &[f64], band: &UncertaintyBand) -> Vec<(usize, f64)> {
    let mut uncertain: Vec<(usize, f64)> = probabilities
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, p)| band.contains(p))
        .collect();
    uncertain.sort_by(|a, b| (a.1 - 0.5).abs().total_cmp(&(b.1 - 0.5).abs()));
    uncertain
}

/// Uncertain configurations of a score table, on P(precision > threshold).
pub fn rank_uncertain_configurations(
    table: &ScoreTable,
    band: &UncertaintyBand,
) -> Vec<UncertainConfiguration> {
    rank_uncertain(&table.precision_probabilities(), band)
        .into_iter()
        .map(|(i, prob)| UncertainConfiguration {
            configuration: table.scores[i].configuration,
            prob,
        })
        .collect()
}

fn top_by<'a>(
    scores: impl Iterator<Item = &'a ConfigurationScore>,
    metric: impl Fn(&ConfigurationScore) -> f64,
    k: usize,
) -> Vec<&'a ConfigurationScore> {
    let mut ranked: Vec<&ConfigurationScore> = scores.collect();
    ranked.sort_by(|a, b| metric(b).total_cmp(&metric(a)));
    ranked.truncate(k);
    ranked
}

/// Top `k` configurations by posterior mean recall among those whose mean
/// precision exceeds `min_mean_precision`.
pub fn top_by_recall(
    table: &ScoreTable,
    min_mean_precision: f64,
    k: usize,
) -> Vec<&ConfigurationScore> {
    top_by(
        table
            .iter()
            .filter(|s| s.precision.mean > min_mean_precision),
        |s| s.recall.mean,
        k,
    )
}

/// Top `k` configurations by F1 of posterior mean precision and recall.
pub fn top_by_f1(table: &ScoreTable, k: usize) -> Vec<&ConfigurationScore> {
    top_by(table.iter(), ConfigurationScore::f1, k)
}

/// Top `k` configurations by posterior mean precision.
pub fn top_by_precision(table: &ScoreTable, k: usize) -> Vec<&ConfigurationScore> {
    top_by(table.iter(), |s| s.precision.mean, k)
}

/// Compact leaderboard entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Configuration index.
    #[serde(rename = "config_idx")]
    pub configuration: Configuration,
    /// Posterior mean precision.
    pub precision: f64,
    /// Posterior mean recall.
    pub recall: f64,
    /// F1 of the means.
    pub f1: f64,
    /// P(precision > threshold AND recall > min_recall).
    pub prob_both: f64,
}

impl From<&ConfigurationScore> for LeaderboardEntry {
    fn from(s: &ConfigurationScore) -> Self {
        Self {
            configuration: s.configuration,
            precision: s.precision.mean,
            recall: s.recall.mean,
            f1: s.f1(),
            prob_both: s.prob_both,
        }
    }
}

/// The three leaderboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboards {
    /// By mean recall, subject to the precision floor.
    pub by_recall: Vec<LeaderboardEntry>,
    /// By F1 of the means.
    pub by_f1: Vec<LeaderboardEntry>,
    /// By mean precision.
    pub by_precision: Vec<LeaderboardEntry>,
}

impl Leaderboards {
    /// Build all three boards with `k` entries each.
    pub fn build(table: &ScoreTable, min_mean_precision: f64, k: usize) -> Self {
        let entries = |v: Vec<&ConfigurationScore>| -> Vec<LeaderboardEntry> {
            v.into_iter().map(LeaderboardEntry::from).collect()
        };
        Self {
            by_recall: entries(top_by_recall(table, min_mean_precision, k)),
            by_f1: entries(top_by_f1(table, k)),
            by_precision: entries(top_by_precision(table, k)),
        }
    }

    /// Boards with the default recall-board precision floor.
    pub fn with_defaults(table: &ScoreTable, k: usize) -> Self {
        Self::build(table, DEFAULT_RECALL_BOARD_MIN_PRECISION, k)
    }
}

/// Probability bars of the rollup counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionBars {
    /// A probability above this counts as "likely".
    pub likely: f64,
    /// A probability below this counts as "unlikely".
    pub unlikely: f64,
}

impl Default for DecisionBars {
    fn default() -> Self {
        Self {
            likely: DEFAULT_UNCERTAIN_HIGH,
            unlikely: DEFAULT_UNCERTAIN_LOW,
        }
    }
}

/// Counts of configurations by decision outcome.
///
/// Serialized under the `summary` keys downstream tooling reads
/// (`high_both_count`, `low_both_count`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rollup {
    /// Configurations scored.
    pub n_configs: usize,
    /// P(both) above the likely bar.
    #[serde(rename = "high_both_count")]
    pub n_likely_both: usize,
    /// P(both) below the unlikely bar.
    #[serde(rename = "low_both_count")]
    pub n_unlikely_both: usize,
    /// P(precision > threshold) above the likely bar.
    #[serde(rename = "high_precision_only_count")]
    pub n_likely_high_precision: usize,
    /// P(precision > threshold) below the unlikely bar.
    #[serde(rename = "low_precision_count")]
    pub n_unlikely_high_precision: usize,
    /// P(precision > threshold) inside the uncertainty band.
    #[serde(rename = "uncertain_count")]
    pub n_uncertain: usize,
}

impl Rollup {
    /// Count a score table.
    pub fn compute(table: &ScoreTable, bars: &DecisionBars, band: &UncertaintyBand) -> Self {
        Self {
            n_configs: table.len(),
            n_likely_both: count(table, |s| s.prob_both > bars.likely),
            n_unlikely_both: count(table, |s| s.prob_both < bars.unlikely),
            n_likely_high_precision: count(table, |s| s.prob_high_precision > bars.likely),
            n_unlikely_high_precision: count(table, |s| s.prob_high_precision < bars.unlikely),
            n_uncertain: count(table, |s| band.contains(s.prob_high_precision)),
        }
    }
}

fn count(table: &ScoreTable, pred: impl Fn(&ConfigurationScore) -> bool) -> usize {
    table.iter().filter(|s| pred(s)).count()
}
