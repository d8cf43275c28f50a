//! Observation extraction: trial records → flat detection table.
//!
//! Every trial contributes one row for *every* location flagged anywhere in
//! the corpus: `detected = true` for lines it reported, `detected = false`
//! for the rest. Absence of a detection therefore carries weight, and each
//! location has exactly `n_trials` rows regardless of how rarely it was
//! mentioned.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::types::{Configuration, FactorVector, TrialRecord};

/// One (location, trial) detection outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Dense location index.
    pub location: usize,
    /// Configuration of the trial.
    pub configuration: Configuration,
    /// Whether the trial flagged this location.
    pub detected: bool,
}

impl Observation {
    /// Factor vector of the trial that produced this row.
    pub fn factors(&self) -> FactorVector {
        self.configuration.factors()
    }
}

/// All observations sharing one (configuration, location) pair.
///
/// The Bernoulli likelihood only depends on the count of detections per
/// cell, so the model evaluates cells instead of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Configuration shared by the aggregated rows.
    pub configuration: Configuration,
    /// Dense location index.
    pub location: usize,
    /// Rows with `detected = true`.
    pub detected: u32,
    /// Total rows.
    pub trials: u32,
}

/// The flat observation table plus the location index built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationTable {
    observations: Vec<Observation>,
    lines: Vec<u32>,
    is_true_error: Vec<bool>,
    n_trials: usize,
}

impl ObservationTable {
    /// Build the table from a trial corpus and the set of true-error lines.
    ///
    /// # Errors
    ///
    /// - [`InputError::EmptyCorpus`] if `trials` is empty.
    /// - [`InputError::MalformedConfig`] if a trial's declared index is out of
    ///   range or disagrees with its factor toggles.
    /// - [`InputError::NoFlaggedLocations`] if no trial flagged anything.
    pub fn extract(trials: &[TrialRecord], true_errors: &BTreeSet<u32>) -> Result<Self, InputError> {
        if trials.is_empty() {
            return Err(InputError::EmptyCorpus);
        }

        let mut configurations = Vec::with_capacity(trials.len());
        for (i, trial) in trials.iter().enumerate() {
            configurations.push(validate_trial(i, trial)?);
        }

        let lines: Vec<u32> = trials
            .iter()
            .flat_map(|t| t.detected_lines.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if lines.is_empty() {
            return Err(InputError::NoFlaggedLocations {
                trials: trials.len(),
            });
        }

        let is_true_error = lines.iter().map(|l| true_errors.contains(l)).collect();

        let mut observations = Vec::with_capacity(trials.len() * lines.len());
        for (trial, &configuration) in trials.iter().zip(&configurations) {
            for (location, line) in lines.iter().enumerate() {
                observations.push(Observation {
                    location,
                    configuration,
                    detected: trial.detected_lines.contains(line),
                });
            }
        }

        tracing::debug!(
            trials = trials.len(),
            locations = lines.len(),
            rows = observations.len(),
            "extracted observation table"
        );

        Ok(Self {
            observations,
            lines,
            is_true_error,
            n_trials: trials.len(),
        })
    }

    /// All rows, trial-major, locations in index order within each trial.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Flagged lines in index order (ascending).
    pub fn lines(&self) -> &[u32] {
        &self.lines
    }

    /// Number of distinct flagged locations.
    pub fn n_locations(&self) -> usize {
        self.lines.len()
    }

    /// Number of trials in the corpus.
    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    /// Number of flagged locations that are true errors.
    pub fn n_true_errors(&self) -> usize {
        self.is_true_error.iter().filter(|&&t| t).count()
    }

    /// True-error flags aligned to location indices.
    pub fn is_true_error(&self) -> &[bool] {
        &self.is_true_error
    }

    /// Flagged lines that are true errors, ascending.
    pub fn true_error_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.lines
            .iter()
            .zip(&self.is_true_error)
            .filter(|(_, &t)| t)
            .map(|(&l, _)| l)
    }

    /// Dense index of a line, if it was flagged.
    pub fn index_of(&self, line: u32) -> Option<usize> {
        self.lines.binary_search(&line).ok()
    }

    /// Line → index map.
    pub fn location_map(&self) -> BTreeMap<u32, usize> {
        self.lines.iter().enumerate().map(|(i, &l)| (l, i)).collect()
    }

    /// Configurations that were trialed at least once.
    pub fn observed_configurations(&self) -> BTreeSet<Configuration> {
        self.observations.iter().map(|o| o.configuration).collect()
    }

    /// Number of rows for one location.
    pub fn rows_for_location(&self, location: usize) -> usize {
        self.observations
            .iter()
            .filter(|o| o.location == location)
            .count()
    }

    /// Aggregate rows into cells, ordered by (configuration, location).
    pub fn cells(&self) -> Vec<Cell> {
        let mut counts: BTreeMap<(Configuration, usize), (u32, u32)> = BTreeMap::new();
        for o in &self.observations {
            let entry = counts.entry((o.configuration, o.location)).or_insert((0, 0));
            entry.0 += u32::from(o.detected);
            entry.1 += 1;
        }
        counts
            .into_iter()
            .map(|((configuration, location), (detected, trials))| Cell {
                configuration,
                location,
                detected,
                trials,
            })
            .collect()
    }
}

pub(crate) fn validate_trial(i: usize, trial: &TrialRecord) -> Result<Configuration, InputError> {
    let implied = trial.configuration();
    if let Some(declared) = trial.declared_index {
        let declared =
            Configuration::new(declared).map_err(|e| InputError::malformed(i, e.to_string()))?;
        if declared != implied {
            return Err(InputError::malformed(
                i,
                format!(
                    "declared index {} does not match its factor map (which encodes {})",
                    declared.index(),
                    implied.index()
                ),
            ));
        }
    }
    Ok(implied)
}
