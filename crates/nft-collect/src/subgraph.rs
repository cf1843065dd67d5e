//! Sale history from the Seaport subgraph on The Graph gateway.
//!
//! One POST per page with a fixed `orderFulfillments` query document and
//! `{first, skip}` variables. The skip cursor advances by the raw record
//! count of each page; an empty page signals exhaustion. A top-level
//! `errors` array in the response body is a fetch failure, not a page.

use std::time::Duration;

use async_trait::async_trait;
use nft_common::{parse_timestamp, SaleRecord};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::source::{Cursor, FetchError, SalePage, SaleSource, SkipReason};

/// Fixed query document. Only the `first`/`skip` variables change per page.
const SALES_QUERY: &str = r#"
query GetNftSales($first: Int!, $skip: Int!) {
  orderFulfillments(first: $first, skip: $skip) {
    id
    orderFulfillmentMethod
    trade {
      id
      timestamp
      priceETH
      tokenId
      buyer
      seller
    }
  }
}
"#;

/// Configuration for the subgraph client.
#[derive(Debug, Clone)]
pub struct SubgraphConfig {
    /// Gateway base URL, without the key segment.
    pub gateway_url: String,
    /// The Graph API key, injected from config/env.
    pub api_key: String,
    /// Deployment id of the Seaport subgraph.
    pub subgraph_id: String,
    /// Records per page.
    pub page_size: usize,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for SubgraphConfig {
    fn default() -> Self {
        Self {
            gateway_url: "https://gateway.thegraph.com/api".to_string(),
            api_key: String::new(),
            subgraph_id: "2GmLsgYGWoFoouZzKjp8biYDkfmeLTkEY3VDQyZqSJHA".to_string(),
            page_size: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

/// GraphQL client for the Seaport subgraph.
pub struct SubgraphClient {
    client: Client,
    config: SubgraphConfig,
}

impl SubgraphClient {
    pub fn new(config: SubgraphConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/subgraphs/id/{}",
            self.config.gateway_url.trim_end_matches('/'),
            self.config.api_key,
            self.config.subgraph_id
        )
    }
}

#[async_trait]
impl SaleSource for SubgraphClient {
    fn name(&self) -> &str {
        "subgraph"
    }

    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<SalePage, FetchError> {
        let skip = match cursor {
            None => 0,
            Some(Cursor::Skip(n)) => *n,
            Some(other) => {
                return Err(FetchError::Malformed(format!(
                    "unexpected cursor for GraphQL source: {:?}",
                    other
                )))
            }
        };

        debug!(skip, first = self.config.page_size, "fetching subgraph page");

        let body = json!({
            "query": SALES_QUERY,
            "variables": { "first": self.config.page_size, "skip": skip },
        });

        let response = self.client.post(self.endpoint()).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let envelope: GraphResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("unexpected response shape: {}", e)))?;

        normalize_page(envelope, skip)
    }
}

/// Converts one decoded envelope into a canonical page.
fn normalize_page(envelope: GraphResponse, skip: u64) -> Result<SalePage, FetchError> {
    if let Some(errors) = envelope.errors {
        if !errors.is_empty() {
            let payload = serde_json::to_string(&errors).unwrap_or_default();
            return Err(FetchError::Graph(payload));
        }
    }

    let fulfillments = envelope
        .data
        .map(|d| d.order_fulfillments)
        .unwrap_or_default();
    let raw_count = fulfillments.len() as u64;

    let mut sales = Vec::with_capacity(fulfillments.len());
    let mut skipped = 0;

    for raw in fulfillments {
        let id = raw.id.clone().unwrap_or_default();
        match normalize_fulfillment(raw) {
            Ok(sale) => sales.push(sale),
            Err(reason) => {
                skipped += 1;
                warn!(fulfillment = %id, %reason, "skipping unusable fulfillment");
            }
        }
    }

    // The skip offset advances by what the server returned, not by what
    // survived normalization.
    let next_cursor = if raw_count > 0 {
        Some(Cursor::Skip(skip + raw_count))
    } else {
        None
    };

    Ok(SalePage {
        sales,
        skipped,
        next_cursor,
    })
}

/// Maps one order fulfillment into a `SaleRecord`.
///
/// The subgraph has no contract-address notion; the trade's token id is the
/// asset identity. `priceETH` is already denominated in whole ETH.
fn normalize_fulfillment(raw: Fulfillment) -> Result<SaleRecord, SkipReason> {
    let trade = raw.trade.ok_or(SkipReason::MissingAssetId)?;

    let token_id = trade.token_id.unwrap_or_default();
    if token_id.is_empty() {
        return Err(SkipReason::MissingAssetId);
    }

    let block_timestamp = trade
        .timestamp
        .as_ref()
        .and_then(parse_timestamp)
        .ok_or(SkipReason::BadTimestamp)?;

    let price_eth = trade
        .price_eth
        .as_ref()
        .and_then(decimal_from_value)
        .filter(|p| *p > Decimal::ZERO)
        .unwrap_or(Decimal::ZERO);

    let price_token = if price_eth > Decimal::ZERO {
        "ETH".to_string()
    } else {
        String::new()
    };

    Ok(SaleRecord {
        marketplace: "seaport".to_string(),
        contract_address: String::new(),
        token_id,
        quantity: "1".to_string(),
        buyer_address: trade.buyer.unwrap_or_default(),
        seller_address: trade.seller.unwrap_or_default(),
        taker: String::new(),
        transaction_hash: trade.id.or(raw.id).unwrap_or_default(),
        block_number: 0,
        block_timestamp,
        price_token,
        price_amount: price_eth,
        price_eth,
        collection_name: String::new(),
        collection_slug: String::new(),
        nft_title: String::new(),
        nft_description: String::new(),
        nft_image_url: String::new(),
    })
}

/// `priceETH` arrives as a string or a number depending on indexer version.
fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    #[serde(default)]
    data: Option<GraphData>,
    #[serde(default)]
    errors: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct GraphData {
    #[serde(rename = "orderFulfillments", default)]
    order_fulfillments: Vec<Fulfillment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fulfillment {
    id: Option<String>,
    #[serde(rename = "orderFulfillmentMethod")]
    #[allow(dead_code)]
    order_fulfillment_method: Option<String>,
    trade: Option<Trade>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Trade {
    id: Option<String>,
    /// UNIX seconds, as an integer or a numeric string.
    timestamp: Option<Value>,
    #[serde(rename = "priceETH")]
    price_eth: Option<Value>,
    token_id: Option<String>,
    buyer: Option<String>,
    seller: Option<String>,
}
