//! Shared types and utilities for the NFT sales ETL.
//!
//! This crate contains:
//! - The canonical `SaleRecord` every source normalizes into
//! - The fixed CSV column set (`CANONICAL_COLUMNS`)
//! - Field-normalization helpers (block numbers, timestamps, wei amounts)

pub mod normalize;
pub mod types;

pub use normalize::{parse_block_number, parse_timestamp, wei_to_eth};
pub use types::{SaleRecord, CANONICAL_COLUMNS};
