//! Offline processing of collected NFT sales CSV files.
//!
//! Three stages: [`loader`] reads canonical-schema CSVs back into typed
//! records, [`merge`] combines per-run files into one deduplicated dataset,
//! and [`analytics`] computes summary tables and a text report.

pub mod analytics;
pub mod loader;
pub mod merge;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    /// No input files matched the merge scan.
    #[error("no input files found in {dir} matching prefix '{prefix}'")]
    EmptyInput { dir: String, prefix: String },

    /// The dataset holds no records at all.
    #[error("dataset is empty, nothing to analyze")]
    NoData,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
