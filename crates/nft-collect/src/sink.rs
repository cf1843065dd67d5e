//! CSV persistence for canonical sale records.
//!
//! Two write paths: a bulk write for accumulate-mode results, and a
//! streaming sink that writes the canonical header up front and flushes
//! after every page so an interrupted run keeps everything written so far.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use nft_common::{SaleRecord, CANONICAL_COLUMNS};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while persisting records.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn create_writer(path: &Path) -> Result<csv::Writer<File>, SinkError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    // Fixed canonical header, independent of which fields are populated.
    writer.write_record(CANONICAL_COLUMNS)?;
    Ok(writer)
}

/// Writes a whole record set to `path` in one pass, header included.
/// An empty slice still produces a header-only file.
pub fn write_bulk(path: &Path, sales: &[SaleRecord]) -> Result<(), SinkError> {
    let mut writer = create_writer(path)?;
    for sale in sales {
        writer.serialize(sale)?;
    }
    writer.flush()?;
    info!(rows = sales.len(), path = %path.display(), "wrote sale records");
    Ok(())
}

/// Streaming sink: header first, then one row per record, flushed per page.
pub struct StreamingCsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: usize,
}

impl StreamingCsvSink {
    /// Creates/truncates the file and writes the canonical header.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let mut writer = create_writer(path)?;
        writer.flush()?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    /// Appends one page of records and flushes, so nothing already written
    /// is lost if the process is interrupted mid-run.
    pub fn write_page(&mut self, sales: &[SaleRecord]) -> Result<(), SinkError> {
        for sale in sales {
            self.writer.serialize(sale)?;
        }
        self.writer.flush()?;
        self.rows += sales.len();
        debug!(rows = sales.len(), total = self.rows, "flushed page");
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Writes periodic accumulate-mode snapshots so partial results survive a
/// crash. One file per snapshot: `{stem}_snapshot_{pages}.csv`.
pub struct SnapshotWriter {
    dir: PathBuf,
    stem: String,
}

impl SnapshotWriter {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            stem: stem.to_string(),
        }
    }

    pub fn write(&self, sales: &[SaleRecord], pages: usize) -> Result<PathBuf, SinkError> {
        let path = self.dir.join(format!("{}_snapshot_{}.csv", self.stem, pages));
        write_bulk(&path, sales)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn sample(token_id: &str) -> SaleRecord {
        SaleRecord {
            marketplace: "seaport".to_string(),
            contract_address: "0xcontract".to_string(),
            token_id: token_id.to_string(),
            quantity: "1".to_string(),
            buyer_address: "0xbuyer".to_string(),
            seller_address: "0xseller".to_string(),
            taker: "BUYER".to_string(),
            transaction_hash: "0xtx".to_string(),
            block_number: 26,
            block_timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            price_token: "ETH".to_string(),
            price_amount: dec!(1500000000000000000),
            price_eth: dec!(1.5),
            collection_name: "Things".to_string(),
            collection_slug: "things".to_string(),
            nft_title: "Thing".to_string(),
            nft_description: String::new(),
            nft_image_url: String::new(),
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join("nft_collect_sink_tests")
            .join(name)
    }

    #[test]
    fn test_bulk_write_round_trip() {
        let path = temp_path("bulk.csv");
        write_bulk(&path, &[sample("1"), sample("2")]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<SaleRecord> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], sample("1"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_bulk_write_empty_is_header_only() {
        let path = temp_path("empty.csv");
        write_bulk(&path, &[]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            CANONICAL_COLUMNS.join(",")
        );
        assert_eq!(lines.next(), None);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_streaming_sink_header_then_rows() {
        let path = temp_path("stream.csv");
        let mut sink = StreamingCsvSink::create(&path).unwrap();

        // Header is on disk before any row arrives.
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("marketplace,"));

        sink.write_page(&[sample("1"), sample("2")]).unwrap();
        sink.write_page(&[sample("3")]).unwrap();
        assert_eq!(sink.rows_written(), 3);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 4); // header + 3 rows

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_snapshot_writer_names_by_page_count() {
        let dir = std::env::temp_dir().join("nft_collect_snapshot_tests");
        let writer = SnapshotWriter::new(&dir, "nft_sales");
        let path = writer.write(&[sample("1")], 10).unwrap();
        assert!(path.ends_with("nft_sales_snapshot_10.csv"));
        assert!(path.exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
