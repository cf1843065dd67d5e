//! nft-report: merge and analyze collected NFT sales CSV files.
//!
//! # Usage
//!
//! Merge all per-run files in a directory and analyze the result:
//! ```sh
//! nft-report merge --dir data --prefix nft_sales --analyze
//! ```
//!
//! Analyze one dataset:
//! ```sh
//! nft-report analyze --input data/nft_sales_merged.csv
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nft_report::analytics::{analyze, AnalyzeOptions};
use nft_report::loader::load_records;
use nft_report::merge::{find_input_files, merge_files};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Post-processing for collected NFT sales data.
#[derive(Parser, Debug)]
#[command(name = "nft-report")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge per-run CSV files into one deduplicated dataset
    Merge {
        /// Directory to scan for input files
        #[arg(long, short = 'd', default_value = "data")]
        dir: PathBuf,

        /// File name prefix to match
        #[arg(long, default_value = "nft_sales")]
        prefix: String,

        /// Output file, relative to --dir unless absolute
        #[arg(long, short = 'o', default_value = "nft_sales_merged.csv")]
        output: PathBuf,

        /// Run the analysis over the merged dataset afterwards
        #[arg(long)]
        analyze: bool,
    },

    /// Analyze one dataset and write the report plus summary tables
    Analyze {
        /// Input CSV in the canonical schema
        #[arg(long, short = 'i')]
        input: PathBuf,

        /// Directory for the report and analysis tables
        #[arg(long, default_value = "data")]
        output_dir: PathBuf,

        /// Report file name, relative to the output directory
        #[arg(long, default_value = "nft_analysis_report.txt")]
        report: String,

        /// Collections kept in the collection tables
        #[arg(long, default_value = "20")]
        top_collections: usize,

        /// Addresses kept in the buyer/seller tables
        #[arg(long, default_value = "10")]
        top_addresses: usize,
    },
}

fn run_analysis(input: &Path, output_dir: &Path, report: &str, options: &AnalyzeOptions) -> Result<()> {
    let outcome = load_records(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    if outcome.dropped > 0 {
        warn!("Dropped {} unreadable rows from {}", outcome.dropped, input.display());
    }
    info!("Loaded {} records from {}", outcome.records.len(), input.display());

    let analysis = analyze(&outcome.records, options).context("Analysis failed")?;

    let report_path = output_dir.join(report);
    std::fs::create_dir_all(output_dir)?;
    std::fs::write(&report_path, analysis.render_report())
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    info!("Wrote report to {}", report_path.display());

    analysis
        .write_tables(output_dir)
        .context("Failed to write analysis tables")?;
    Ok(())
}

fn run_merge(dir: &Path, prefix: &str, output: &Path, and_analyze: bool) -> Result<()> {
    let output = if output.is_absolute() {
        output.to_path_buf()
    } else {
        dir.join(output)
    };

    let inputs = find_input_files(dir, prefix, Some(&output))
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    if inputs.is_empty() {
        anyhow::bail!(
            "No input files found in {} matching prefix '{}'",
            dir.display(),
            prefix
        );
    }
    info!("Merging {} files from {}", inputs.len(), dir.display());

    let outcome = merge_files(&inputs, &output)?;
    info!(
        "Merged {} rows into {} ({} duplicates removed) -> {}",
        outcome.rows_before,
        outcome.rows_after,
        outcome.duplicates_removed(),
        output.display()
    );

    if and_analyze {
        run_analysis(&output, dir, "nft_analysis_report.txt", &AnalyzeOptions::default())?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(false).init();

    info!("nft-report v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Merge {
            dir,
            prefix,
            output,
            analyze,
        } => run_merge(&dir, &prefix, &output, analyze),
        Commands::Analyze {
            input,
            output_dir,
            report,
            top_collections,
            top_addresses,
        } => {
            let options = AnalyzeOptions {
                top_collections,
                top_addresses,
            };
            run_analysis(&input, &output_dir, &report, &options)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
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
    fn test_merge_defaults() {
        let cli = Cli::parse_from(["nft-report", "merge"]);
        match cli.command {
            Commands::Merge {
                dir,
                prefix,
                output,
                analyze,
            } => {
                assert_eq!(dir, PathBuf::from("data"));
                assert_eq!(prefix, "nft_sales");
                assert_eq!(output, PathBuf::from("nft_sales_merged.csv"));
                assert!(!analyze);
            }
            _ => panic!("expected merge subcommand"),
        }
    }

    #[test]
    fn test_analyze_options() {
        let cli = Cli::parse_from([
            "nft-report",
            "analyze",
            "--input",
            "data/sales.csv",
            "--top-collections",
            "5",
        ]);
        match cli.command {
            Commands::Analyze {
                input,
                top_collections,
                top_addresses,
                ..
            } => {
                assert_eq!(input, PathBuf::from("data/sales.csv"));
                assert_eq!(top_collections, 5);
                assert_eq!(top_addresses, 10);
            }
            _ => panic!("expected analyze subcommand"),
        }
    }
}
