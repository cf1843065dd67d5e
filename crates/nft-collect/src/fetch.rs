//! Sequential pagination loop over a `SaleSource`.
//!
//! Strictly one request outstanding at a time: each page is fully consumed
//! (and in stream mode persisted and flushed) before the next is requested.
//! The only suspension is a fixed inter-page delay to respect upstream rate
//! limits; there is no retry. A failed fetch aborts the loop while keeping
//! everything already accumulated or flushed.

use std::time::Duration;

use nft_common::SaleRecord;
use thiserror::Error;
use tracing::{info, warn};

use crate::sink::{SinkError, SnapshotWriter, StreamingCsvSink};
use crate::source::{Cursor, FetchError, SaleSource};

/// Errors surfaced by the stream-mode loop.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("persistence failed: {0}")]
    Sink(#[from] SinkError),
}

/// Loop policy knobs.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Upper bound on fetch calls; `None` runs until the source is drained.
    pub max_pages: Option<usize>,
    /// Fixed pause between pages. Not a retry mechanism.
    pub page_delay: Duration,
    /// Accumulate mode: write a snapshot every K pages.
    pub snapshot_every: Option<usize>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_pages: None,
            page_delay: Duration::from_secs(1),
            snapshot_every: Some(10),
        }
    }
}

/// Result of an accumulate-mode run. When the loop aborted on a fetch
/// error, everything gathered before the failure is still here so the
/// caller can persist partial progress.
#[derive(Debug, Default)]
pub struct Harvest {
    pub sales: Vec<SaleRecord>,
    /// Fetch calls performed.
    pub pages: usize,
    /// Raw records dropped by normalization.
    pub skipped: usize,
    /// The error that stopped the loop early, if any.
    pub aborted: Option<FetchError>,
}

/// Accumulate mode: gathers every page into memory, optionally writing
/// periodic snapshots so partial results survive a crash.
pub async fn collect_to_memory(
    source: &dyn SaleSource,
    options: &FetchOptions,
    snapshot: Option<&SnapshotWriter>,
) -> Harvest {
    let mut harvest = Harvest::default();
    let mut cursor: Option<Cursor> = None;

    loop {
        if let Some(max) = options.max_pages {
            if harvest.pages >= max {
                info!(source = source.name(), max, "reached page limit");
                break;
            }
        }

        let page = match source.fetch_page(cursor.as_ref()).await {
            Ok(page) => page,
            Err(e) => {
                warn!(source = source.name(), error = %e, "fetch aborted");
                harvest.aborted = Some(e);
                break;
            }
        };

        harvest.pages += 1;
        harvest.skipped += page.skipped;
        let page_empty = page.sales.is_empty() && page.skipped == 0;
        harvest.sales.extend(page.sales);

        info!(
            source = source.name(),
            page = harvest.pages,
            total = harvest.sales.len(),
            "accumulated page"
        );

        if let (Some(every), Some(writer)) = (options.snapshot_every, snapshot) {
            if every > 0 && harvest.pages % every == 0 {
                // A failed snapshot is not worth losing the run over.
                match writer.write(&harvest.sales, harvest.pages) {
                    Ok(path) => info!(path = %path.display(), "wrote snapshot"),
                    Err(e) => warn!(error = %e, "snapshot write failed"),
                }
            }
        }

        if page_empty {
            info!(source = source.name(), "no more records");
            break;
        }
        let Some(next) = page.next_cursor else {
            info!(source = source.name(), "no more pages");
            break;
        };
        cursor = Some(next);

        tokio::time::sleep(options.page_delay).await;
    }

    harvest
}

/// Stream-mode statistics.
#[derive(Debug, Default)]
pub struct StreamStats {
    pub rows: usize,
    pub pages: usize,
    pub skipped: usize,
}

/// Stream mode: persists and flushes each page as it arrives, holding only
/// the current page in memory. On error the sink's file remains valid up to
/// the last flushed row.
pub async fn stream_to_sink(
    source: &dyn SaleSource,
    sink: &mut StreamingCsvSink,
    options: &FetchOptions,
) -> Result<StreamStats, CollectError> {
    let mut stats = StreamStats::default();
    let mut cursor: Option<Cursor> = None;

    loop {
        if let Some(max) = options.max_pages {
            if stats.pages >= max {
                info!(source = source.name(), max, "reached page limit");
                break;
            }
        }

        let page = source.fetch_page(cursor.as_ref()).await?;
        stats.pages += 1;
        stats.skipped += page.skipped;

        sink.write_page(&page.sales)?;
        stats.rows += page.sales.len();

        info!(
            source = source.name(),
            page = stats.pages,
            rows = stats.rows,
            "streamed page"
        );

        if page.sales.is_empty() && page.skipped == 0 {
            info!(source = source.name(), "no more records");
            break;
        }
        let Some(next) = page.next_cursor else {
            info!(source = source.name(), "no more pages");
            break;
        };
        cursor = Some(next);

        tokio::time::sleep(options.page_delay).await;
    }

    Ok(stats)
}
