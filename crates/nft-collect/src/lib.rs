//! Sale-history collection for the NFT sales ETL.
//!
//! This crate provides:
//! - The `SaleSource` pagination seam and its two implementations
//!   (Alchemy `getNFTSales` REST API, Seaport subgraph GraphQL)
//! - The sequential fetch loop in accumulate and stream modes
//! - The CSV persistence sink
//! - TOML configuration with CLI overrides

pub mod alchemy;
pub mod config;
pub mod fetch;
pub mod sink;
pub mod source;
pub mod subgraph;
