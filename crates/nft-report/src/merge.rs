//! Merges per-run CSV files into one deduplicated dataset.
//!
//! The merge is schema-tolerant: files are read untyped, the output header
//! is the union of all input headers, and rows from files missing a column
//! get an empty value there. Duplicate sales are detected by the
//! (transaction_hash, token_id) pair; the first occurrence wins.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use nft_common::CANONICAL_COLUMNS;
use tracing::{info, warn};

use crate::ReportError;

/// Summary of a merge run.
#[derive(Debug)]
pub struct MergeOutcome {
    pub files: Vec<PathBuf>,
    pub rows_before: usize,
    pub rows_after: usize,
}

impl MergeOutcome {
    pub fn duplicates_removed(&self) -> usize {
        self.rows_before - self.rows_after
    }
}

/// Scans `dir` for CSV files whose name starts with `prefix`.
///
/// The result is sorted by file name so merge order is deterministic.
/// `exclude` filters out the merge output itself when it lives in the same
/// directory.
pub fn find_input_files(
    dir: &Path,
    prefix: &str,
    exclude: Option<&Path>,
) -> Result<Vec<PathBuf>, ReportError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !name.starts_with(prefix) || !name.ends_with(".csv") {
            continue;
        }
        if exclude.is_some_and(|e| e == path.as_path()) {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// Merges the given CSV files into `output`, dropping duplicate sales.
pub fn merge_files(inputs: &[PathBuf], output: &Path) -> Result<MergeOutcome, ReportError> {
    if inputs.is_empty() {
        return Err(ReportError::EmptyInput {
            dir: output
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            prefix: String::new(),
        });
    }

    // First pass over headers builds the union schema, canonical columns
    // first, extras in first-seen order.
    let mut columns: Vec<String> = Vec::new();
    let mut headers_per_file: Vec<Vec<String>> = Vec::new();
    for path in inputs {
        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        headers_per_file.push(headers);
    }
    for canonical in CANONICAL_COLUMNS {
        if headers_per_file.iter().any(|h| h.iter().any(|c| c == canonical)) {
            columns.push(canonical.to_string());
        }
    }
    for headers in &headers_per_file {
        for column in headers {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.clone());
            }
        }
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(output)?;
    writer.write_record(&columns)?;

    let tx_idx = columns.iter().position(|c| c == "transaction_hash");
    let id_idx = columns.iter().position(|c| c == "token_id");

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut rows_before = 0usize;
    let mut rows_after = 0usize;

    for (path, headers) in inputs.iter().zip(&headers_per_file) {
        // Map each union column to its position in this file, if present.
        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|c| headers.iter().position(|h| h == c))
            .collect();

        let mut reader = csv::Reader::from_path(path)?;
        let mut file_rows = 0usize;
        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping malformed row in {}: {}", path.display(), e);
                    continue;
                }
            };
            rows_before += 1;
            file_rows += 1;

            let row: Vec<&str> = positions
                .iter()
                .map(|p| p.and_then(|i| record.get(i)).unwrap_or(""))
                .collect();

            let key = (
                tx_idx.map(|i| row[i].to_string()).unwrap_or_default(),
                id_idx.map(|i| row[i].to_string()).unwrap_or_default(),
            );
            if !seen.insert(key) {
                continue;
            }

            writer.write_record(&row)?;
            rows_after += 1;
        }
        info!("Merged {} rows from {}", file_rows, path.display());
    }
    writer.flush()?;

    Ok(MergeOutcome {
        files: inputs.to_vec(),
        rows_before,
        rows_after,
    })
}
