//! Output formatting for analysis results.
//!
//! This module provides formatters for displaying an [`Analysis`](crate::Analysis)
//! in different formats:
//! - Terminal: Human-readable report with colors
//! - JSON: Machine-readable document, and the reader that rebuilds a score
//!   table from it for held-out validation

mod json;
mod terminal;

pub use json::{
    load_score_table, read_score_table, to_json_pretty, validation_to_json_pretty,
    write_analysis, AnalysisDocument,
};
pub use terminal::{
    format_analysis, format_factor_effect, format_prior_check, format_sampler_section,
    format_validation,
};
