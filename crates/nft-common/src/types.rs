//! Canonical sale record shared by every data source.
//!
//! All prices use `rust_decimal::Decimal`. Never use f64 for amounts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical CSV column order. `SaleRecord`'s field order must match.
pub const CANONICAL_COLUMNS: &[&str] = &[
    "marketplace",
    "contract_address",
    "token_id",
    "quantity",
    "buyer_address",
    "seller_address",
    "taker",
    "transaction_hash",
    "block_number",
    "block_timestamp",
    "price_token",
    "price_amount",
    "price_eth",
    "collection_name",
    "collection_slug",
    "nft_title",
    "nft_description",
    "nft_image_url",
];

/// One on-chain marketplace fill, normalized from either source.
///
/// Immutable once built: created by a source's normalizer, consumed by the
/// CSV sink and the analytics engine. Fields absent in the source default to
/// empty string / zero rather than null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    /// Marketplace identifier (e.g. "seaport").
    pub marketplace: String,
    /// NFT contract address. Empty when the source has no contract notion.
    pub contract_address: String,
    /// Token identifier within the contract.
    pub token_id: String,
    /// Quantity transferred, kept as reported (usually "1").
    pub quantity: String,
    pub buyer_address: String,
    pub seller_address: String,
    pub taker: String,
    /// Not unique: one transaction may contain multiple fills.
    pub transaction_hash: String,
    /// Base-10, regardless of hex or decimal source encoding.
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
    /// Currency symbol of the sale price.
    pub price_token: String,
    /// Raw numeric amount as reported by the source (wei for the REST path).
    #[serde(with = "rust_decimal::serde::str")]
    pub price_amount: Decimal,
    /// Whole-ETH units when `price_token == "ETH"`, else zero. Never negative.
    #[serde(with = "rust_decimal::serde::str")]
    pub price_eth: Decimal,
    pub collection_name: String,
    pub collection_slug: String,
    pub nft_title: String,
    pub nft_description: String,
    pub nft_image_url: String,
}

impl SaleRecord {
    /// Dedup key: a transaction may carry several fills, so the hash alone
    /// is not enough.
    pub fn dedup_key(&self) -> (String, String) {
        (self.transaction_hash.clone(), self.token_id.clone())
    }

    /// True when the record carries a usable positive ETH price.
    pub fn has_eth_price(&self) -> bool {
        self.price_eth > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample() -> SaleRecord {
        SaleRecord {
            marketplace: "seaport".to_string(),
            contract_address: "0xabc".to_string(),
            token_id: "42".to_string(),
            quantity: "1".to_string(),
            buyer_address: "0xbuyer".to_string(),
            seller_address: "0xseller".to_string(),
            taker: "BUYER".to_string(),
            transaction_hash: "0xhash".to_string(),
            block_number: 26,
            block_timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            price_token: "ETH".to_string(),
            price_amount: dec!(1500000000000000000),
            price_eth: dec!(1.5),
            collection_name: "Test Collection".to_string(),
            collection_slug: "test-collection".to_string(),
            nft_title: "Test #42".to_string(),
            nft_description: String::new(),
            nft_image_url: String::new(),
        }
    }

    #[test]
    fn test_dedup_key() {
        let record = sample();
        assert_eq!(
            record.dedup_key(),
            ("0xhash".to_string(), "42".to_string())
        );
    }

    #[test]
    fn test_has_eth_price() {
        let mut record = sample();
        assert!(record.has_eth_price());
        record.price_eth = Decimal::ZERO;
        assert!(!record.has_eth_price());
    }

    #[test]
    fn test_canonical_columns_cover_every_field() {
        let json = serde_json::to_value(sample()).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), CANONICAL_COLUMNS.len());
        for column in CANONICAL_COLUMNS {
            assert!(object.contains_key(*column), "missing column {}", column);
        }
    }

    #[test]
    fn test_decimal_fields_serialize_as_strings() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["price_eth"], "1.5");
        assert_eq!(json["price_amount"], "1500000000000000000");
    }
}
