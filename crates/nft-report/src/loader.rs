//! Reads canonical-schema CSV files back into typed records.

use std::path::Path;

use nft_common::SaleRecord;
use tracing::warn;

use crate::ReportError;

/// Outcome of loading a CSV file.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub records: Vec<SaleRecord>,
    /// Rows that failed to deserialize and were dropped.
    pub dropped: usize,
}

/// Loads sale records from a CSV file.
///
/// Individual rows that fail to deserialize are logged and dropped rather
/// than failing the whole load. A missing file or unreadable header is still
/// an error.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<LoadOutcome, ReportError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let mut outcome = LoadOutcome::default();

    for (idx, row) in reader.deserialize::<SaleRecord>().enumerate() {
        match row {
            Ok(record) => outcome.records.push(record),
            Err(e) => {
                warn!("Dropping row {} of {}: {}", idx + 2, path.display(), e);
                outcome.dropped += 1;
            }
        }
    }

    Ok(outcome)
}
