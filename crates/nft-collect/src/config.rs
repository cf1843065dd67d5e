//! Configuration for nft-collect.
//!
//! Loaded from a TOML file with CLI overrides applied afterwards. API keys
//! are never embedded in source: they come from the config file or the
//! environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::alchemy::AlchemyConfig;
use crate::fetch::FetchOptions;
use crate::subgraph::SubgraphConfig;

/// One named block window for the multi-range mode.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockRange {
    pub name: String,
    pub from_block: String,
    pub to_block: String,
}

/// Top-level configuration for nft-collect.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub log_level: String,
    pub output_dir: PathBuf,
    /// Stem for accumulate-mode output and snapshot files.
    pub output_stem: String,

    pub alchemy_base_url: String,
    pub alchemy_api_key: Option<String>,
    pub from_block: String,
    pub to_block: String,
    pub order: String,
    pub marketplace: String,
    pub alchemy_page_size: usize,
    pub alchemy_max_pages: usize,
    /// Page cap applied to each block range individually.
    pub range_max_pages: usize,
    pub block_ranges: Vec<BlockRange>,

    pub gateway_url: String,
    pub graph_api_key: Option<String>,
    pub subgraph_id: String,
    pub subgraph_page_size: usize,

    pub page_delay: Duration,
    pub request_timeout: Duration,
    pub snapshot_every: usize,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self::from(TomlConfig::default())
    }
}

impl CollectConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Ok(Self::from(file))
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(
        &mut self,
        page_size: Option<usize>,
        output_dir: Option<PathBuf>,
        alchemy_api_key: Option<String>,
        graph_api_key: Option<String>,
    ) {
        if let Some(size) = page_size {
            self.alchemy_page_size = size;
            self.subgraph_page_size = size;
        }
        if let Some(dir) = output_dir {
            self.output_dir = dir;
        }
        if alchemy_api_key.is_some() {
            self.alchemy_api_key = alchemy_api_key;
        }
        if graph_api_key.is_some() {
            self.graph_api_key = graph_api_key;
        }
    }

    /// Builds the REST client config; fails when no key is configured.
    pub fn alchemy(&self) -> Result<AlchemyConfig> {
        let api_key = self
            .alchemy_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .context("Alchemy API key not configured; set ALCHEMY_API_KEY or [alchemy].api_key")?;
        Ok(AlchemyConfig {
            base_url: self.alchemy_base_url.clone(),
            api_key,
            from_block: self.from_block.clone(),
            to_block: self.to_block.clone(),
            order: self.order.clone(),
            marketplace: self.marketplace.clone(),
            page_size: self.alchemy_page_size,
            timeout: self.request_timeout,
        })
    }

    /// Builds the GraphQL client config; fails when no key is configured.
    pub fn subgraph(&self) -> Result<SubgraphConfig> {
        let api_key = self
            .graph_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .context("Graph API key not configured; set GRAPH_API_KEY or [subgraph].api_key")?;
        Ok(SubgraphConfig {
            gateway_url: self.gateway_url.clone(),
            api_key,
            subgraph_id: self.subgraph_id.clone(),
            page_size: self.subgraph_page_size,
            timeout: self.request_timeout,
        })
    }

    /// Loop options for a bounded accumulate-mode run.
    pub fn fetch_options(&self, max_pages: Option<usize>) -> FetchOptions {
        FetchOptions {
            max_pages,
            page_delay: self.page_delay,
            snapshot_every: Some(self.snapshot_every).filter(|k| *k > 0),
        }
    }
}

/// TOML file structure for deserialization.
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    alchemy: AlchemyToml,
    #[serde(default)]
    subgraph: SubgraphToml,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    log_level: String,
    output_dir: String,
    output_stem: String,
    page_delay_ms: u64,
    request_timeout_secs: u64,
    snapshot_every_pages: usize,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            output_dir: "data".to_string(),
            output_stem: "nft_sales".to_string(),
            page_delay_ms: 1000,
            request_timeout_secs: 30,
            snapshot_every_pages: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AlchemyToml {
    base_url: String,
    api_key: String,
    from_block: String,
    to_block: String,
    order: String,
    marketplace: String,
    page_size: usize,
    max_pages: usize,
    range_max_pages: usize,
    ranges: Vec<BlockRange>,
}

impl Default for AlchemyToml {
    fn default() -> Self {
        Self {
            base_url: "https://eth-mainnet.g.alchemy.com/nft/v2".to_string(),
            api_key: String::new(),
            from_block: "0".to_string(),
            to_block: "latest".to_string(),
            order: "desc".to_string(),
            marketplace: "seaport".to_string(),
            page_size: 100,
            max_pages: 50,
            range_max_pages: 10,
            ranges: default_block_ranges(),
        }
    }
}

/// Historical windows used when no ranges are configured.
fn default_block_ranges() -> Vec<BlockRange> {
    let ranges = [
        ("recent", "0x1000000", "latest"),
        ("mid_2023", "0xE00000", "0xFFFFFF"),
        ("early_2023", "0xC00000", "0xDFFFFF"),
        ("late_2022", "0xA00000", "0xBFFFFF"),
    ];
    ranges
        .iter()
        .map(|(name, from, to)| BlockRange {
            name: name.to_string(),
            from_block: from.to_string(),
            to_block: to.to_string(),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SubgraphToml {
    gateway_url: String,
    api_key: String,
    subgraph_id: String,
    page_size: usize,
}

impl Default for SubgraphToml {
    fn default() -> Self {
        Self {
            gateway_url: "https://gateway.thegraph.com/api".to_string(),
            api_key: String::new(),
            subgraph_id: "2GmLsgYGWoFoouZzKjp8biYDkfmeLTkEY3VDQyZqSJHA".to_string(),
            page_size: 1000,
        }
    }
}

impl From<TomlConfig> for CollectConfig {
    fn from(toml: TomlConfig) -> Self {
        let none_if_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        Self {
            log_level: toml.general.log_level,
            output_dir: PathBuf::from(toml.general.output_dir),
            output_stem: toml.general.output_stem,
            alchemy_base_url: toml.alchemy.base_url,
            alchemy_api_key: none_if_empty(toml.alchemy.api_key),
            from_block: toml.alchemy.from_block,
            to_block: toml.alchemy.to_block,
            order: toml.alchemy.order,
            marketplace: toml.alchemy.marketplace,
            alchemy_page_size: toml.alchemy.page_size,
            alchemy_max_pages: toml.alchemy.max_pages,
            range_max_pages: toml.alchemy.range_max_pages,
            block_ranges: toml.alchemy.ranges,
            gateway_url: toml.subgraph.gateway_url,
            graph_api_key: none_if_empty(toml.subgraph.api_key),
            subgraph_id: toml.subgraph.subgraph_id,
            subgraph_page_size: toml.subgraph.page_size,
            page_delay: Duration::from_millis(toml.general.page_delay_ms),
            request_timeout: Duration::from_secs(toml.general.request_timeout_secs),
            snapshot_every: toml.general.snapshot_every_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CollectConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.alchemy_page_size, 100);
        assert_eq!(config.subgraph_page_size, 1000);
        assert_eq!(config.page_delay, Duration::from_secs(1));
        assert_eq!(config.snapshot_every, 10);
        assert_eq!(config.block_ranges.len(), 4);
        assert!(config.alchemy_api_key.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [general]
            log_level = "debug"
            output_dir = "out"
            page_delay_ms = 250

            [alchemy]
            api_key = "alchemy-key"
            page_size = 50
            max_pages = 5

            [[alchemy.ranges]]
            name = "window"
            from_block = "0x1"
            to_block = "0x2"

            [subgraph]
            api_key = "graph-key"
        "#;

        let config = CollectConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.page_delay, Duration::from_millis(250));
        assert_eq!(config.alchemy_page_size, 50);
        assert_eq!(config.alchemy_max_pages, 5);
        assert_eq!(config.alchemy_api_key.as_deref(), Some("alchemy-key"));
        assert_eq!(config.graph_api_key.as_deref(), Some("graph-key"));
        assert_eq!(config.block_ranges.len(), 1);
        assert_eq!(config.block_ranges[0].name, "window");
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = CollectConfig::default();
        config.apply_overrides(
            Some(25),
            Some(PathBuf::from("elsewhere")),
            Some("cli-key".to_string()),
            None,
        );

        assert_eq!(config.alchemy_page_size, 25);
        assert_eq!(config.subgraph_page_size, 25);
        assert_eq!(config.output_dir, PathBuf::from("elsewhere"));
        assert_eq!(config.alchemy_api_key.as_deref(), Some("cli-key"));
        assert!(config.graph_api_key.is_none());
    }

    #[test]
    fn test_missing_api_key_is_an_error() {
        let config = CollectConfig::default();
        assert!(config.alchemy().is_err());
        assert!(config.subgraph().is_err());
    }

    #[test]
    fn test_client_configs_inherit_settings() {
        let mut config = CollectConfig::default();
        config.alchemy_api_key = Some("k1".to_string());
        config.graph_api_key = Some("k2".to_string());
        config.alchemy_page_size = 77;

        let alchemy = config.alchemy().unwrap();
        assert_eq!(alchemy.api_key, "k1");
        assert_eq!(alchemy.page_size, 77);
        assert_eq!(alchemy.marketplace, "seaport");

        let subgraph = config.subgraph().unwrap();
        assert_eq!(subgraph.api_key, "k2");
        assert_eq!(subgraph.page_size, 1000);
    }

    #[test]
    fn test_fetch_options_disable_snapshots_when_zero() {
        let mut config = CollectConfig::default();
        config.snapshot_every = 0;
        let options = config.fetch_options(Some(3));
        assert_eq!(options.max_pages, Some(3));
        assert_eq!(options.snapshot_every, None);
    }
}
