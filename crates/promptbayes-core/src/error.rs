//! Input-shape errors raised before any modelling work.

use std::fmt;

/// Error returned when trial or ground-truth input cannot be modelled.
///
/// These are caller bugs, not recoverable conditions: the pipeline stops
/// before model construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// The trial corpus is empty.
    EmptyCorpus,

    /// No trial flagged any location, so there is nothing to model.
    NoFlaggedLocations {
        /// Number of trials in the corpus.
        trials: usize,
    },

    /// A trial does not carry a well-formed 7-factor encoding.
    MalformedConfig {
        /// Position of the trial in the corpus (0-indexed).
        trial: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A per-location array does not line up with the location set.
    LocationMismatch {
        /// Locations in the fitted model / sample set.
        expected: usize,
        /// Locations in the supplied array.
        got: usize,
    },
}

impl InputError {
    pub(crate) fn malformed(trial: usize, reason: impl Into<String>) -> Self {
        InputError::MalformedConfig {
            trial,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::EmptyCorpus => write!(f, "trial corpus is empty"),
            InputError::NoFlaggedLocations { trials } => write!(
                f,
                "none of the {} trials flagged a location; nothing to model",
                trials
            ),
            InputError::MalformedConfig { trial, reason } => {
                write!(f, "trial {} has a malformed configuration: {}", trial, reason)
            }
            InputError::LocationMismatch { expected, got } => write!(
                f,
                "location set mismatch: expected {} locations, got {}",
                expected, got
            ),
        }
    }
}

impl std::error::Error for InputError {}
