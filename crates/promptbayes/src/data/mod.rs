//! Loading of trial corpora and ground truth.
//!
//! # Supported Formats
//!
//! - **Trial corpus**: JSON, either `{"results": [...], ...}` as written by
//!   the trial runner or a bare array of records. Each record needs a
//!   `config` map of the seven named factor booleans and a `detected_lines`
//!   array; `config_index` is optional and checked against `config` later.
//!   Any other field is ignored.
//! - **Ground truth**: JSON `{"errors": [{"line": n, ...}, ...]}`.
//!
//! # Example
//!
//! ```ignore
//! use promptbayes::data::{load_ground_truth, load_trials};
//! use std::path::Path;
//!
//! let trials = load_trials(Path::new("phase1_results.json"))?;
//! let truth = load_ground_truth(Path::new("ground_truth.json"))?;
//! println!("Loaded {} trials, {} true errors", trials.len(), truth.len());
//! ```

mod records;

pub use records::{load_ground_truth, load_trials, parse_ground_truth, parse_trials};

use std::fmt;

/// Errors that can occur during data loading.
#[derive(Debug)]
pub enum DataError {
    /// IO error reading or writing a file.
    Io(std::io::Error),

    /// The file is not valid JSON.
    Json(serde_json::Error),

    /// The JSON is valid but not shaped like the expected document.
    Format {
        /// Description of the expected shape.
        message: String,
    },

    /// One record of a list could not be decoded.
    Record {
        /// Position of the record in its list (0-indexed).
        index: usize,
        /// The decoding error.
        source: serde_json::Error,
    },
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::Io(e) => write!(f, "IO error: {}", e),
            DataError::Json(e) => write!(f, "JSON error: {}", e),
            DataError::Format { message } => write!(f, "Unexpected document shape: {}", message),
            DataError::Record { index, source } => {
                write!(f, "Record {} could not be decoded: {}", index, source)
            }
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Io(e) => Some(e),
            DataError::Json(e) => Some(e),
            DataError::Record { source, .. } => Some(source),
            DataError::Format { .. } => None,
        }
    }
}

impl From<std::io::Error> for DataError {
    fn from(e: std::io::Error) -> Self {
        DataError::Io(e)
    }
}

impl From<serde_json::Error> for DataError {
    fn from(e: serde_json::Error) -> Self {
        DataError::Json(e)
    }
}
