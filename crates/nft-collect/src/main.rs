//! nft-collect: NFT sales collection CLI.
//!
//! Pulls Seaport sale records from the Alchemy NFT API and the Seaport
//! subgraph, normalizes them into the canonical schema and writes CSV files.
//!
//! # Usage
//!
//! Bulk fetch from the REST API:
//! ```sh
//! nft-collect bulk --max-pages 50
//! ```
//!
//! Fetch the configured historical block ranges:
//! ```sh
//! nft-collect ranges
//! ```
//!
//! Fetch from the subgraph, streaming rows to disk as pages arrive:
//! ```sh
//! nft-collect subgraph --mode stream
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nft_collect::alchemy::AlchemyClient;
use nft_collect::config::CollectConfig;
use nft_collect::fetch::{collect_to_memory, stream_to_sink, Harvest};
use nft_collect::sink::{write_bulk, SnapshotWriter, StreamingCsvSink};
use nft_collect::source::SaleSource;
use nft_collect::subgraph::SubgraphClient;
use nft_common::SaleRecord;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// NFT sales collector for Seaport marketplace data.
#[derive(Parser, Debug)]
#[command(name = "nft-collect")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to TOML config file (defaults are used when absent)
    #[arg(long, short = 'c', default_value = "config/collect.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    /// Records per page, applied to both sources
    #[arg(long)]
    page_size: Option<usize>,

    /// Directory for output CSV files
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Alchemy API key
    #[arg(long, env = "ALCHEMY_API_KEY")]
    alchemy_api_key: Option<String>,

    /// The Graph gateway API key
    #[arg(long, env = "GRAPH_API_KEY")]
    graph_api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch sales from the Alchemy NFT API over the configured block window
    Bulk {
        /// Maximum pages to fetch (unbounded when omitted)
        #[arg(long)]
        max_pages: Option<usize>,

        /// Output file name, relative to the output directory
        #[arg(long, default_value = "nft_sales_data.csv")]
        output: String,
    },

    /// Fetch each configured historical block range into its own file
    Ranges,

    /// Fetch sales from the Seaport subgraph
    Subgraph {
        /// How results are persisted
        #[arg(long, value_enum, default_value_t = Mode::Both)]
        mode: Mode,

        /// Output file for accumulate mode
        #[arg(long, default_value = "subgraph_sales_data.csv")]
        out_memory: String,

        /// Output file for streaming mode
        #[arg(long, default_value = "subgraph_sales_data_incremental.csv")]
        out_stream: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Accumulate pages in memory, write one file at the end
    Memory,
    /// Flush each page to disk as it arrives
    Stream,
    /// Run both persistence modes in sequence
    Both,
}

/// Logs a short summary of a harvested dataset.
fn log_summary(label: &str, sales: &[SaleRecord]) {
    if sales.is_empty() {
        warn!("{}: no records collected", label);
        return;
    }

    let priced: Vec<Decimal> = sales
        .iter()
        .filter(|s| s.has_eth_price())
        .map(|s| s.price_eth)
        .collect();

    info!(
        "{}: {} records, {} with a positive ETH price",
        label,
        sales.len(),
        priced.len()
    );

    if let (Some(min), Some(max)) = (priced.iter().min(), priced.iter().max()) {
        let sum: Decimal = priced.iter().sum();
        let mean = sum / Decimal::from(priced.len());
        info!("{}: price range {} - {} ETH, mean {}", label, min, max, mean);
    }

    let first = sales.iter().map(|s| s.block_timestamp).min();
    let last = sales.iter().map(|s| s.block_timestamp).max();
    if let (Some(first), Some(last)) = (first, last) {
        info!("{}: time range {} to {}", label, first, last);
    }
}

/// Persists a harvest and reports it; partial data survives an abort.
fn persist_harvest(harvest: Harvest, output: &Path, label: &str) -> Result<()> {
    info!(
        "{}: fetched {} pages ({} records, {} skipped)",
        label,
        harvest.pages,
        harvest.sales.len(),
        harvest.skipped
    );
    log_summary(label, &harvest.sales);

    write_bulk(output, &harvest.sales)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("{}: wrote {} rows to {}", label, harvest.sales.len(), output.display());

    if let Some(err) = harvest.aborted {
        anyhow::bail!("{} aborted after {} pages: {}", label, harvest.pages, err);
    }
    Ok(())
}

async fn run_bulk(config: &CollectConfig, max_pages: Option<usize>, output: &str) -> Result<()> {
    let client = AlchemyClient::new(config.alchemy()?).context("Failed to build HTTP client")?;
    let options = config.fetch_options(max_pages.or(Some(config.alchemy_max_pages)));
    let snapshot = SnapshotWriter::new(&config.output_dir, &config.output_stem);

    let harvest = collect_to_memory(&client, &options, Some(&snapshot)).await;
    persist_harvest(harvest, &config.output_dir.join(output), client.name())
}

async fn run_ranges(config: &CollectConfig) -> Result<()> {
    if config.block_ranges.is_empty() {
        anyhow::bail!("No block ranges configured");
    }

    let base = AlchemyClient::new(config.alchemy()?).context("Failed to build HTTP client")?;
    let options = config.fetch_options(Some(config.range_max_pages));
    let mut failures = 0usize;

    for range in &config.block_ranges {
        info!(
            "Fetching range '{}': blocks {} to {}",
            range.name, range.from_block, range.to_block
        );
        let client = base.for_range(&range.from_block, &range.to_block);
        let harvest = collect_to_memory(&client, &options, None).await;
        let output = config
            .output_dir
            .join(format!("{}_{}.csv", config.output_stem, range.name));

        let label = format!("range '{}'", range.name);
        if let Err(e) = persist_harvest(harvest, &output, &label) {
            // Keep going; remaining ranges may still succeed.
            error!("{}", e);
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} ranges failed", failures, config.block_ranges.len());
    }
    Ok(())
}

async fn run_subgraph(
    config: &CollectConfig,
    mode: Mode,
    out_memory: &str,
    out_stream: &str,
) -> Result<()> {
    let client = SubgraphClient::new(config.subgraph()?).context("Failed to build HTTP client")?;
    let options = config.fetch_options(None);

    if matches!(mode, Mode::Memory | Mode::Both) {
        let harvest = collect_to_memory(&client, &options, None).await;
        persist_harvest(harvest, &config.output_dir.join(out_memory), client.name())?;
    }

    if matches!(mode, Mode::Stream | Mode::Both) {
        let path = config.output_dir.join(out_stream);
        let mut sink = StreamingCsvSink::create(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let stats = stream_to_sink(&client, &mut sink, &options).await?;
        info!(
            "{}: streamed {} rows over {} pages ({} skipped) to {}",
            client.name(),
            stats.rows,
            stats.pages,
            stats.skipped,
            path.display()
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(false).init();

    info!("nft-collect v{}", env!("CARGO_PKG_VERSION"));

    let mut config = if cli.config.exists() {
        match CollectConfig::from_file(&cli.config) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config {:?}: {:#}", cli.config, e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!("Config file {:?} not found, using defaults", cli.config);
        CollectConfig::default()
    };

    config.apply_overrides(
        cli.page_size,
        cli.output_dir.clone(),
        cli.alchemy_api_key.clone(),
        cli.graph_api_key.clone(),
    );

    let result = match cli.command {
        Commands::Bulk { max_pages, output } => run_bulk(&config, max_pages, &output).await,
        Commands::Ranges => run_ranges(&config).await,
        Commands::Subgraph {
            mode,
            out_memory,
            out_stream,
        } => run_subgraph(&config, mode, &out_memory, &out_stream).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subgraph_mode_default() {
        let cli = Cli::parse_from(["nft-collect", "subgraph"]);
        match cli.command {
            Commands::Subgraph { mode, .. } => assert_eq!(mode, Mode::Both),
            _ => panic!("expected subgraph subcommand"),
        }
    }

    #[test]
    fn test_bulk_overrides() {
        let cli = Cli::parse_from([
            "nft-collect",
            "--page-size",
            "25",
            "bulk",
            "--max-pages",
            "3",
        ]);
        assert_eq!(cli.page_size, Some(25));
        match cli.command {
            Commands::Bulk { max_pages, .. } => assert_eq!(max_pages, Some(3)),
            _ => panic!("expected bulk subcommand"),
        }
    }
}
