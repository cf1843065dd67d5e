//! Sale history from the Alchemy `getNFTSales` REST endpoint.
//!
//! One GET per page with `fromBlock`/`toBlock`/`order`/`marketplace`/`limit`
//! query parameters plus an opaque `pageKey` cursor. The response nests
//! optional metadata (`sellerFee`, `nft.image`, `nft.collection`) at several
//! levels; extraction is best-effort and downgrades missing sub-fields to
//! empty values instead of dropping the record.

use std::time::Duration;

use async_trait::async_trait;
use nft_common::{parse_block_number, parse_timestamp, wei_to_eth, SaleRecord};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::source::{Cursor, FetchError, SalePage, SaleSource, SkipReason};

/// Configuration for the Alchemy sale-history client.
#[derive(Debug, Clone)]
pub struct AlchemyConfig {
    /// API base URL, without the key segment.
    pub base_url: String,
    /// API key, injected from config/env. Never embedded in source.
    pub api_key: String,
    /// Start block, decimal or hex string ("0" = from genesis).
    pub from_block: String,
    /// End block ("latest" accepted).
    pub to_block: String,
    /// Sort order ("asc" or "desc").
    pub order: String,
    /// Marketplace filter (e.g. "seaport").
    pub marketplace: String,
    /// Records per page.
    pub page_size: usize,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for AlchemyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://eth-mainnet.g.alchemy.com/nft/v2".to_string(),
            api_key: String::new(),
            from_block: "0".to_string(),
            to_block: "latest".to_string(),
            order: "desc".to_string(),
            marketplace: "seaport".to_string(),
            page_size: 100,
            timeout: Duration::from_secs(30),
        }
    }
}

/// REST client for the `getNFTSales` endpoint.
pub struct AlchemyClient {
    client: Client,
    config: AlchemyConfig,
}

impl AlchemyClient {
    /// Creates a new client with its own HTTP connection pool.
    pub fn new(config: AlchemyConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Returns a client over the same connection pool with a different
    /// block window. Used by the multi-range mode.
    pub fn for_range(&self, from_block: &str, to_block: &str) -> Self {
        let mut config = self.config.clone();
        config.from_block = from_block.to_string();
        config.to_block = to_block.to_string();
        Self {
            client: self.client.clone(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/getNFTSales",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_key
        )
    }
}

#[async_trait]
impl SaleSource for AlchemyClient {
    fn name(&self) -> &str {
        "alchemy"
    }

    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<SalePage, FetchError> {
        let limit = self.config.page_size.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("fromBlock", self.config.from_block.as_str()),
            ("toBlock", self.config.to_block.as_str()),
            ("order", self.config.order.as_str()),
            ("marketplace", self.config.marketplace.as_str()),
            ("limit", limit.as_str()),
        ];

        match cursor {
            Some(Cursor::PageKey(key)) => params.push(("pageKey", key.as_str())),
            Some(other) => {
                return Err(FetchError::Malformed(format!(
                    "unexpected cursor for REST source: {:?}",
                    other
                )))
            }
            None => {}
        }

        debug!(page_key = ?cursor, "fetching Alchemy sales page");

        let response = self
            .client
            .get(self.endpoint())
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let page: SalesResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("unexpected response shape: {}", e)))?;

        Ok(normalize_page(page))
    }
}

/// Converts one decoded response into a canonical page, dropping records
/// the normalizer rejects.
fn normalize_page(page: SalesResponse) -> SalePage {
    let mut sales = Vec::with_capacity(page.nft_sales.len());
    let mut skipped = 0;

    for raw in page.nft_sales {
        let tx = raw.transaction_hash.clone().unwrap_or_default();
        match normalize_sale(raw) {
            Ok(sale) => sales.push(sale),
            Err(reason) => {
                skipped += 1;
                warn!(tx = %tx, %reason, "skipping unusable sale record");
            }
        }
    }

    SalePage {
        sales,
        skipped,
        next_cursor: page.page_key.map(Cursor::PageKey),
    }
}

/// Maps one raw REST sale into a `SaleRecord`.
///
/// Pure and total over its inputs: extraction failures downgrade to
/// default/empty values for that field, except for the asset identity and
/// the block timestamp, which skip the whole record.
fn normalize_sale(raw: RestSale) -> Result<SaleRecord, SkipReason> {
    let contract_address = raw.contract_address.unwrap_or_default();
    let token_id = raw.token_id.unwrap_or_default();
    if contract_address.is_empty() && token_id.is_empty() {
        return Err(SkipReason::MissingAssetId);
    }

    let block_timestamp = raw
        .block_timestamp
        .as_ref()
        .and_then(parse_timestamp)
        .ok_or(SkipReason::BadTimestamp)?;

    let block_number = raw
        .block_number
        .as_ref()
        .and_then(parse_block_number)
        .unwrap_or(0);

    let (price_token, price_amount, price_eth) = match raw.seller_fee {
        Some(fee) => {
            let symbol = fee.symbol.unwrap_or_default();
            let amount = fee
                .amount
                .as_deref()
                .and_then(|s| s.parse::<Decimal>().ok())
                .unwrap_or(Decimal::ZERO);
            let eth = if symbol == "ETH" && amount > Decimal::ZERO {
                wei_to_eth(amount)
            } else {
                Decimal::ZERO
            };
            (symbol, amount, eth)
        }
        None => (String::new(), Decimal::ZERO, Decimal::ZERO),
    };

    let (nft_title, nft_description, nft_image_url, collection_name, collection_slug) =
        match raw.nft {
            Some(nft) => (
                nft.title.unwrap_or_default(),
                nft.description.unwrap_or_default(),
                nft.image.and_then(|i| i.original_url).unwrap_or_default(),
                nft.collection
                    .as_ref()
                    .and_then(|c| c.name.clone())
                    .unwrap_or_default(),
                nft.collection
                    .and_then(|c| c.slug)
                    .unwrap_or_default(),
            ),
            None => Default::default(),
        };

    Ok(SaleRecord {
        marketplace: raw.marketplace.unwrap_or_default(),
        contract_address,
        token_id,
        quantity: quantity_string(raw.quantity),
        buyer_address: raw.buyer_address.unwrap_or_default(),
        seller_address: raw.seller_address.unwrap_or_default(),
        taker: raw.taker.unwrap_or_default(),
        transaction_hash: raw.transaction_hash.unwrap_or_default(),
        block_number,
        block_timestamp,
        price_token,
        price_amount,
        price_eth,
        collection_name,
        collection_slug,
        nft_title,
        nft_description,
        nft_image_url,
    })
}

/// Quantity arrives as a string or an integer; defaults to "1".
fn quantity_string(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => "1".to_string(),
    }
}

/// `getNFTSales` response envelope. A body without `nftSales` is malformed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SalesResponse {
    nft_sales: Vec<RestSale>,
    #[serde(default)]
    page_key: Option<String>,
}

/// One raw sale as returned by the REST API. Every field is optional; the
/// normalizer decides what is required.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestSale {
    marketplace: Option<String>,
    contract_address: Option<String>,
    token_id: Option<String>,
    quantity: Option<Value>,
    buyer_address: Option<String>,
    seller_address: Option<String>,
    taker: Option<String>,
    transaction_hash: Option<String>,
    /// Hex string, decimal string, or integer.
    block_number: Option<Value>,
    /// ISO-8601 string on this API, but tolerated as UNIX seconds too.
    block_timestamp: Option<Value>,
    seller_fee: Option<RestFee>,
    nft: Option<RestNft>,
}

#[derive(Debug, Deserialize)]
struct RestFee {
    symbol: Option<String>,
    /// Raw wei amount as a decimal string.
    amount: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestNft {
    title: Option<String>,
    description: Option<String>,
    image: Option<RestImage>,
    collection: Option<RestCollection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestImage {
    original_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestCollection {
    name: Option<String>,
    slug: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn raw_sale(value: Value) -> RestSale {
        serde_json::from_value(value).unwrap()
    }

    fn full_sale() -> Value {
        json!({
            "marketplace": "seaport",
            "contractAddress": "0xcontract",
            "tokenId": "42",
            "quantity": "1",
            "buyerAddress": "0xbuyer",
            "sellerAddress": "0xseller",
            "taker": "BUYER",
            "transactionHash": "0xtx",
            "blockNumber": "0x1a",
            "blockTimestamp": "2024-03-01T12:00:00Z",
            "sellerFee": {
                "symbol": "ETH",
                "amount": "1500000000000000000"
            },
            "nft": {
                "title": "Thing #42",
                "description": "A thing",
                "image": { "originalUrl": "https://img.example/42.png" },
                "collection": { "name": "Things", "slug": "things" }
            }
        })
    }

    #[test]
    fn test_normalize_full_sale() {
        let sale = normalize_sale(raw_sale(full_sale())).unwrap();
        assert_eq!(sale.marketplace, "seaport");
        assert_eq!(sale.block_number, 26);
        assert_eq!(sale.block_timestamp.to_rfc3339(), "2024-03-01T12:00:00+00:00");
        assert_eq!(sale.price_token, "ETH");
        assert_eq!(sale.price_amount, dec!(1500000000000000000));
        assert_eq!(sale.price_eth, dec!(1.5));
        assert_eq!(sale.collection_name, "Things");
        assert_eq!(sale.collection_slug, "things");
        assert_eq!(sale.nft_image_url, "https://img.example/42.png");
    }

    #[test]
    fn test_hex_block_number_normalizes_to_decimal() {
        let sale = normalize_sale(raw_sale(full_sale())).unwrap();
        assert_eq!(sale.block_number, 26);
    }

    #[test]
    fn test_missing_price_is_zero() {
        let mut value = full_sale();
        value.as_object_mut().unwrap().remove("sellerFee");
        let sale = normalize_sale(raw_sale(value)).unwrap();
        assert_eq!(sale.price_eth, Decimal::ZERO);
        assert_eq!(sale.price_amount, Decimal::ZERO);
        assert_eq!(sale.price_token, "");
    }

    #[test]
    fn test_non_eth_price_has_zero_eth() {
        let mut value = full_sale();
        value["sellerFee"]["symbol"] = json!("WETH");
        let sale = normalize_sale(raw_sale(value)).unwrap();
        assert_eq!(sale.price_amount, dec!(1500000000000000000));
        assert_eq!(sale.price_eth, Decimal::ZERO);
    }

    #[test]
    fn test_eth_price_is_amount_over_1e18() {
        let mut value = full_sale();
        value["sellerFee"]["amount"] = json!("250000000000000000");
        let sale = normalize_sale(raw_sale(value)).unwrap();
        assert_eq!(sale.price_eth, dec!(0.25));
    }

    #[test]
    fn test_unparseable_amount_downgrades_to_zero() {
        let mut value = full_sale();
        value["sellerFee"]["amount"] = json!("not-a-number");
        let sale = normalize_sale(raw_sale(value)).unwrap();
        assert_eq!(sale.price_amount, Decimal::ZERO);
        assert_eq!(sale.price_eth, Decimal::ZERO);
    }

    #[test]
    fn test_missing_metadata_defaults_to_empty() {
        let mut value = full_sale();
        value.as_object_mut().unwrap().remove("nft");
        let sale = normalize_sale(raw_sale(value)).unwrap();
        assert_eq!(sale.collection_name, "");
        assert_eq!(sale.nft_title, "");
        assert_eq!(sale.nft_image_url, "");
    }

    #[test]
    fn test_partial_metadata_downgrades_fields_only() {
        let mut value = full_sale();
        value["nft"] = json!({ "title": "Only title" });
        let sale = normalize_sale(raw_sale(value)).unwrap();
        assert_eq!(sale.nft_title, "Only title");
        assert_eq!(sale.collection_name, "");
        assert_eq!(sale.nft_image_url, "");
    }

    #[test]
    fn test_missing_asset_identity_skips_record() {
        let mut value = full_sale();
        value.as_object_mut().unwrap().remove("contractAddress");
        value.as_object_mut().unwrap().remove("tokenId");
        assert_eq!(
            normalize_sale(raw_sale(value)).unwrap_err(),
            SkipReason::MissingAssetId
        );
    }

    #[test]
    fn test_contract_alone_is_enough_identity() {
        let mut value = full_sale();
        value.as_object_mut().unwrap().remove("tokenId");
        assert!(normalize_sale(raw_sale(value)).is_ok());
    }

    #[test]
    fn test_bad_timestamp_skips_record() {
        let mut value = full_sale();
        value["blockTimestamp"] = json!("not a date");
        assert_eq!(
            normalize_sale(raw_sale(value)).unwrap_err(),
            SkipReason::BadTimestamp
        );
    }

    #[test]
    fn test_quantity_accepts_number_or_string() {
        assert_eq!(quantity_string(Some(json!("3"))), "3");
        assert_eq!(quantity_string(Some(json!(3))), "3");
        assert_eq!(quantity_string(None), "1");
        assert_eq!(quantity_string(Some(json!(""))), "1");
    }

    #[test]
    fn test_response_parsing_with_page_key() {
        let body = json!({
            "nftSales": [full_sale()],
            "pageKey": "abc123"
        });
        let response: SalesResponse = serde_json::from_value(body).unwrap();
        let page = normalize_page(response);
        assert_eq!(page.sales.len(), 1);
        assert_eq!(page.skipped, 0);
        assert_eq!(page.next_cursor, Some(Cursor::PageKey("abc123".to_string())));
    }

    #[test]
    fn test_response_parsing_last_page() {
        let body = json!({ "nftSales": [] });
        let response: SalesResponse = serde_json::from_value(body).unwrap();
        let page = normalize_page(response);
        assert!(page.sales.is_empty());
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn test_response_without_sales_key_is_malformed() {
        let body = json!({ "unexpected": [] });
        assert!(serde_json::from_value::<SalesResponse>(body).is_err());
    }

    #[test]
    fn test_normalize_page_counts_skips() {
        let mut bad = full_sale();
        bad["blockTimestamp"] = json!("garbage");
        let body = json!({ "nftSales": [full_sale(), bad] });
        let response: SalesResponse = serde_json::from_value(body).unwrap();
        let page = normalize_page(response);
        assert_eq!(page.sales.len(), 1);
        assert_eq!(page.skipped, 1);
    }

    #[test]
    fn test_for_range_overrides_block_window() {
        let client = AlchemyClient::new(AlchemyConfig {
            api_key: "key".to_string(),
            ..Default::default()
        })
        .unwrap();
        let ranged = client.for_range("0xA00000", "0xBFFFFF");
        assert_eq!(ranged.config.from_block, "0xA00000");
        assert_eq!(ranged.config.to_block, "0xBFFFFF");
        // Original window untouched.
        assert_eq!(client.config.from_block, "0");
    }

    #[test]
    fn test_endpoint_includes_key() {
        let client = AlchemyClient::new(AlchemyConfig {
            api_key: "demo-key".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "https://eth-mainnet.g.alchemy.com/nft/v2/demo-key/getNFTSales"
        );
    }
}
