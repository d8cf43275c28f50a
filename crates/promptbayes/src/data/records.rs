//! JSON trial and ground-truth records.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use promptbayes_core::{FactorVector, TrialRecord};

use super::DataError;

/// One trial as the runner writes it.
#[derive(Debug, Deserialize)]
struct TrialEntry {
    config: FactorVector,
    detected_lines: Vec<u32>,
    #[serde(default)]
    config_index: Option<usize>,
}

impl From<TrialEntry> for TrialRecord {
    fn from(entry: TrialEntry) -> Self {
        let mut record = TrialRecord::new(entry.config, entry.detected_lines);
        record.declared_index = entry.config_index;
        record
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    line: u32,
}

/// Parse a trial corpus from JSON text.
///
/// Accepts `{"results": [...]}` or a bare array. Records are returned in
/// file order.
pub fn parse_trials(text: &str) -> Result<Vec<TrialRecord>, DataError> {
    let document: Value = serde_json::from_str(text)?;
    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(DataError::Format {
                    message: "`results` must be an array of trial records".into(),
                })
            }
            None => {
                return Err(DataError::Format {
                    message: "expected a `results` array or a bare array of trial records".into(),
                })
            }
        },
        _ => {
            return Err(DataError::Format {
                message: "expected a `results` array or a bare array of trial records".into(),
            })
        }
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value::<TrialEntry>(value)
                .map(TrialRecord::from)
                .map_err(|source| DataError::Record { index, source })
        })
        .collect()
}

/// Parse a ground-truth document from JSON text into the set of true-error
/// lines.
pub fn parse_ground_truth(text: &str) -> Result<BTreeSet<u32>, DataError> {
    let document: Value = serde_json::from_str(text)?;
    let Some(Value::Array(entries)) = document.get("errors").cloned() else {
        return Err(DataError::Format {
            message: "expected an `errors` array of {\"line\": n} records".into(),
        });
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value::<ErrorEntry>(value)
                .map(|e| e.line)
                .map_err(|source| DataError::Record { index, source })
        })
        .collect()
}

/// Load a trial corpus from a JSON file.
pub fn load_trials(path: &Path) -> Result<Vec<TrialRecord>, DataError> {
    let trials = parse_trials(&fs::read_to_string(path)?)?;
    tracing::debug!(path = %path.display(), trials = trials.len(), "loaded trial corpus");
    Ok(trials)
}

/// Load ground truth from a JSON file.
pub fn load_ground_truth(path: &Path) -> Result<BTreeSet<u32>, DataError> {
    let truth = parse_ground_truth(&fs::read_to_string(path)?)?;
    tracing::debug!(path = %path.display(), errors = truth.len(), "loaded ground truth");
    Ok(truth)
}
