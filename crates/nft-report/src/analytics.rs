//! Descriptive analytics over a sales dataset.
//!
//! Prices are carried as `Decimal` end to end; the statistics here are
//! descriptive output only, so they are computed in f64 after conversion.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use nft_common::SaleRecord;
use rust_decimal::prelude::ToPrimitive;
use tracing::info;

use crate::ReportError;

/// Histogram bucket upper edges and labels. Buckets are right-closed, so a
/// price lands in the first bucket whose upper edge is >= the price.
const PRICE_BUCKETS: &[(f64, &str)] = &[
    (0.01, "<0.01"),
    (0.05, "0.01-0.05"),
    (0.1, "0.05-0.1"),
    (0.5, "0.1-0.5"),
    (1.0, "0.5-1"),
    (5.0, "1-5"),
    (10.0, "5-10"),
    (f64::INFINITY, ">10"),
];

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// How many collections the collection tables keep.
    pub top_collections: usize,
    /// How many addresses the buyer/seller tables keep.
    pub top_addresses: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            top_collections: 20,
            top_addresses: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailySalesRow {
    pub date: NaiveDate,
    pub sales: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (zero when count < 2).
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRangeRow {
    pub label: &'static str,
    pub sales: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopCollectionRow {
    pub name: String,
    pub sales: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPriceRow {
    pub name: String,
    pub sales: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddressRow {
    pub address: String,
    pub sales: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyTrendRow {
    /// Calendar month, "YYYY-MM".
    pub month: String,
    pub sales: usize,
    pub mean_price: f64,
    pub median_price: f64,
    pub volume: f64,
    pub unique_txns: usize,
}

/// All computed tables. Each table is absent when its source data is empty.
#[derive(Debug, Default)]
pub struct AnalyticsReport {
    pub total_records: usize,
    pub priced_records: usize,
    pub first_sale: Option<NaiveDate>,
    pub last_sale: Option<NaiveDate>,

    pub daily_sales: Option<Vec<DailySalesRow>>,
    pub price_stats: Option<PriceStats>,
    pub price_ranges: Option<Vec<PriceRangeRow>>,
    pub top_collections: Option<Vec<TopCollectionRow>>,
    pub collection_prices: Option<Vec<CollectionPriceRow>>,
    pub top_buyers: Option<Vec<AddressRow>>,
    pub top_sellers: Option<Vec<AddressRow>>,
    pub monthly_trends: Option<Vec<MonthlyTrendRow>>,
}

/// Mean of a non-empty slice.
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of a pre-sorted non-empty slice.
fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Sample standard deviation (ddof = 1), zero for fewer than two values.
fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

fn price_f64(record: &SaleRecord) -> f64 {
    record.price_eth.to_f64().unwrap_or(0.0)
}

/// Counts occurrences of non-empty keys and returns the top `n`, sorted by
/// count descending with name as tie-break.
fn top_counts<'a, I>(keys: I, n: usize) -> Vec<(String, usize)>
where
    I: Iterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for key in keys {
        if key.is_empty() {
            continue;
        }
        *counts.entry(key).or_insert(0) += 1;
    }
    let mut rows: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows.truncate(n);
    rows
}

/// Computes every table over the dataset.
pub fn analyze(
    records: &[SaleRecord],
    options: &AnalyzeOptions,
) -> Result<AnalyticsReport, ReportError> {
    if records.is_empty() {
        return Err(ReportError::NoData);
    }

    let mut report = AnalyticsReport {
        total_records: records.len(),
        ..Default::default()
    };

    let dates: Vec<NaiveDate> = records
        .iter()
        .map(|r| r.block_timestamp.date_naive())
        .collect();
    report.first_sale = dates.iter().min().copied();
    report.last_sale = dates.iter().max().copied();

    // Daily sale counts.
    let mut daily: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for date in &dates {
        *daily.entry(*date).or_insert(0) += 1;
    }
    report.daily_sales = Some(
        daily
            .into_iter()
            .map(|(date, sales)| DailySalesRow { date, sales })
            .collect(),
    );

    // Price statistics and histogram over positively priced sales.
    let mut priced: Vec<f64> = records
        .iter()
        .filter(|r| r.has_eth_price())
        .map(price_f64)
        .collect();
    report.priced_records = priced.len();

    if !priced.is_empty() {
        priced.sort_by(|a, b| a.total_cmp(b));
        let m = mean(&priced);
        report.price_stats = Some(PriceStats {
            count: priced.len(),
            min: priced[0],
            max: priced[priced.len() - 1],
            mean: m,
            median: median_sorted(&priced),
            std: sample_std(&priced, m),
        });

        let mut buckets = vec![0usize; PRICE_BUCKETS.len()];
        for price in &priced {
            for (idx, (edge, _)) in PRICE_BUCKETS.iter().enumerate() {
                if *price <= *edge {
                    buckets[idx] += 1;
                    break;
                }
            }
        }
        report.price_ranges = Some(
            PRICE_BUCKETS
                .iter()
                .zip(buckets)
                .map(|((_, label), sales)| PriceRangeRow { label, sales })
                .collect(),
        );
    }

    // Collection popularity and per-collection prices.
    let top = top_counts(
        records.iter().map(|r| r.collection_name.as_str()),
        options.top_collections,
    );
    if !top.is_empty() {
        let mut prices_by_collection: HashMap<&str, Vec<f64>> = HashMap::new();
        for record in records.iter().filter(|r| !r.collection_name.is_empty()) {
            prices_by_collection
                .entry(record.collection_name.as_str())
                .or_default()
                .push(price_f64(record));
        }
        let collection_prices = top
            .iter()
            .filter_map(|(name, sales)| {
                let mut prices = prices_by_collection.get(name.as_str())?.clone();
                prices.sort_by(|a, b| a.total_cmp(b));
                Some(CollectionPriceRow {
                    name: name.clone(),
                    sales: *sales,
                    mean: mean(&prices),
                    median: median_sorted(&prices),
                    min: prices[0],
                    max: prices[prices.len() - 1],
                })
            })
            .collect();
        report.collection_prices = Some(collection_prices);
        report.top_collections = Some(
            top.into_iter()
                .map(|(name, sales)| TopCollectionRow { name, sales })
                .collect(),
        );
    }

    // Most active addresses.
    let buyers = top_counts(
        records.iter().map(|r| r.buyer_address.as_str()),
        options.top_addresses,
    );
    if !buyers.is_empty() {
        report.top_buyers = Some(
            buyers
                .into_iter()
                .map(|(address, sales)| AddressRow { address, sales })
                .collect(),
        );
    }
    let sellers = top_counts(
        records.iter().map(|r| r.seller_address.as_str()),
        options.top_addresses,
    );
    if !sellers.is_empty() {
        report.top_sellers = Some(
            sellers
                .into_iter()
                .map(|(address, sales)| AddressRow { address, sales })
                .collect(),
        );
    }

    // Month-over-month trends over all records, priced or not.
    let mut monthly: BTreeMap<String, (Vec<f64>, HashSet<&str>)> = BTreeMap::new();
    for record in records {
        let month = format!(
            "{:04}-{:02}",
            record.block_timestamp.year(),
            record.block_timestamp.month()
        );
        let entry = monthly.entry(month).or_default();
        entry.0.push(price_f64(record));
        entry.1.insert(record.transaction_hash.as_str());
    }
    report.monthly_trends = Some(
        monthly
            .into_iter()
            .map(|(month, (mut prices, txns))| {
                prices.sort_by(|a, b| a.total_cmp(b));
                MonthlyTrendRow {
                    month,
                    sales: prices.len(),
                    mean_price: mean(&prices),
                    median_price: median_sorted(&prices),
                    volume: prices.iter().sum(),
                    unique_txns: txns.len(),
                }
            })
            .collect(),
    );

    Ok(report)
}

impl AnalyticsReport {
    /// Renders the human-readable summary report.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "NFT SALES ANALYSIS REPORT");
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out);
        let _ = writeln!(out, "Total sales records: {}", self.total_records);
        if let (Some(first), Some(last)) = (self.first_sale, self.last_sale) {
            let _ = writeln!(out, "Date range: {} to {}", first, last);
        }
        let _ = writeln!(out, "Records with price data: {}", self.priced_records);

        if let Some(stats) = &self.price_stats {
            let _ = writeln!(out);
            let _ = writeln!(out, "PRICE STATISTICS (ETH)");
            let _ = writeln!(out, "{}", "-".repeat(30));
            let _ = writeln!(out, "Count:  {}", stats.count);
            let _ = writeln!(out, "Min:    {:.4}", stats.min);
            let _ = writeln!(out, "Max:    {:.4}", stats.max);
            let _ = writeln!(out, "Mean:   {:.4}", stats.mean);
            let _ = writeln!(out, "Median: {:.4}", stats.median);
            let _ = writeln!(out, "Std:    {:.4}", stats.std);
        }

        if let Some(ranges) = &self.price_ranges {
            let _ = writeln!(out);
            let _ = writeln!(out, "PRICE DISTRIBUTION (ETH)");
            let _ = writeln!(out, "{}", "-".repeat(30));
            for row in ranges {
                let _ = writeln!(out, "{:>10}: {}", row.label, row.sales);
            }
        }

        if let Some(collections) = &self.top_collections {
            let _ = writeln!(out);
            let _ = writeln!(out, "TOP COLLECTIONS BY SALES");
            let _ = writeln!(out, "{}", "-".repeat(30));
            for row in collections.iter().take(10) {
                let _ = writeln!(out, "{}: {}", row.name, row.sales);
            }
        }

        if let Some(trends) = &self.monthly_trends {
            let _ = writeln!(out);
            let _ = writeln!(out, "MONTHLY TRENDS");
            let _ = writeln!(out, "{}", "-".repeat(30));
            for row in trends {
                let _ = writeln!(
                    out,
                    "{}: {} sales, {:.4} ETH volume",
                    row.month, row.sales, row.volume
                );
            }
        }

        out
    }

    /// Writes each present table to `analysis_{name}.csv` under `dir`.
    /// Returns the written paths.
    pub fn write_tables(&self, dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        if let Some(rows) = &self.daily_sales {
            let path = dir.join("analysis_daily_sales.csv");
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(["date", "sales"])?;
            for row in rows {
                writer.write_record([row.date.to_string(), row.sales.to_string()])?;
            }
            writer.flush()?;
            written.push(path);
        }

        if let Some(stats) = &self.price_stats {
            let path = dir.join("analysis_price_stats.csv");
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(["count", "min", "max", "mean", "median", "std"])?;
            writer.write_record([
                stats.count.to_string(),
                format!("{:.6}", stats.min),
                format!("{:.6}", stats.max),
                format!("{:.6}", stats.mean),
                format!("{:.6}", stats.median),
                format!("{:.6}", stats.std),
            ])?;
            writer.flush()?;
            written.push(path);
        }

        if let Some(rows) = &self.price_ranges {
            let path = dir.join("analysis_price_ranges.csv");
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(["range", "sales"])?;
            for row in rows {
                writer.write_record([row.label.to_string(), row.sales.to_string()])?;
            }
            writer.flush()?;
            written.push(path);
        }

        if let Some(rows) = &self.top_collections {
            let path = dir.join("analysis_top_collections.csv");
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(["collection", "sales"])?;
            for row in rows {
                writer.write_record([row.name.clone(), row.sales.to_string()])?;
            }
            writer.flush()?;
            written.push(path);
        }

        if let Some(rows) = &self.collection_prices {
            let path = dir.join("analysis_collection_prices.csv");
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(["collection", "sales", "mean", "median", "min", "max"])?;
            for row in rows {
                writer.write_record([
                    row.name.clone(),
                    row.sales.to_string(),
                    format!("{:.6}", row.mean),
                    format!("{:.6}", row.median),
                    format!("{:.6}", row.min),
                    format!("{:.6}", row.max),
                ])?;
            }
            writer.flush()?;
            written.push(path);
        }

        for (rows, name) in [
            (&self.top_buyers, "analysis_top_buyers.csv"),
            (&self.top_sellers, "analysis_top_sellers.csv"),
        ] {
            if let Some(rows) = rows {
                let path = dir.join(name);
                let mut writer = csv::Writer::from_path(&path)?;
                writer.write_record(["address", "sales"])?;
                for row in rows {
                    writer.write_record([row.address.clone(), row.sales.to_string()])?;
                }
                writer.flush()?;
                written.push(path);
            }
        }

        if let Some(rows) = &self.monthly_trends {
            let path = dir.join("analysis_monthly_trends.csv");
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record([
                "month",
                "sales",
                "mean_price",
                "median_price",
                "volume",
                "unique_txns",
            ])?;
            for row in rows {
                writer.write_record([
                    row.month.clone(),
                    row.sales.to_string(),
                    format!("{:.6}", row.mean_price),
                    format!("{:.6}", row.median_price),
                    format!("{:.6}", row.volume),
                    row.unique_txns.to_string(),
                ])?;
            }
            writer.flush()?;
            written.push(path);
        }

        info!("Wrote {} analysis tables to {}", written.len(), dir.display());
        Ok(written)
    }
}
