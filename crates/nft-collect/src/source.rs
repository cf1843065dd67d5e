//! Pagination seam shared by both sale-history sources.
//!
//! A source performs one network call per `fetch_page` and returns the
//! page's records already normalized into canonical `SaleRecord`s, together
//! with a continuation cursor. The fetch loop never sees raw wire shapes.

use async_trait::async_trait;
use nft_common::SaleRecord;
use thiserror::Error;

/// Errors that can occur while fetching a page. None of these are retried
/// by the core; the caller decides whether to abort the whole loop.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("GraphQL error: {0}")]
    Graph(String),
}

/// Continuation token for the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Opaque page key returned by the REST API.
    PageKey(String),
    /// Number of records already consumed from the subgraph.
    Skip(u64),
}

/// Why a single raw record was dropped during normalization.
///
/// Per-record failures are recoverable: the record is skipped and counted,
/// the page survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither a contract address nor a token id could be determined.
    MissingAssetId,
    /// The block timestamp was absent or unparseable.
    BadTimestamp,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingAssetId => write!(f, "missing asset identity"),
            SkipReason::BadTimestamp => write!(f, "missing or unparseable block timestamp"),
        }
    }
}

/// One fetched page after normalization.
#[derive(Debug, Default)]
pub struct SalePage {
    /// Normalized records, in server order.
    pub sales: Vec<SaleRecord>,
    /// Raw records dropped by the normalizer.
    pub skipped: usize,
    /// Cursor for the next page; `None` signals the last page.
    pub next_cursor: Option<Cursor>,
}

/// A paginated sale-history source.
#[async_trait]
pub trait SaleSource: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Performs one network call and returns the normalized page.
    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<SalePage, FetchError>;
}
