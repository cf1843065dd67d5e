//! Field-normalization helpers shared by both sources.
//!
//! Sources disagree on encodings: block numbers arrive as hex strings,
//! decimal strings, or integers; timestamps as ISO-8601 strings or UNIX
//! seconds. Everything here is best-effort: a value that cannot be parsed
//! yields `None` and the caller decides whether to default or skip.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

/// Wei per ETH.
const WEI_PER_ETH: Decimal = Decimal::from_parts(2_808_348_672, 232_830_643, 0, false, 0);

/// Parses a block number from an integer, a decimal string, or a
/// `0x`-prefixed hex string ("0x1a" -> 26).
pub fn parse_block_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).ok()
            } else {
                s.parse::<u64>().ok()
            }
        }
        _ => None,
    }
}

/// Parses a timestamp from UNIX seconds (integer or numeric string) or an
/// ISO-8601 / RFC 3339 string.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => Utc.timestamp_opt(n.as_i64()?, 0).single(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<i64>() {
                return Utc.timestamp_opt(secs, 0).single();
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }
        _ => None,
    }
}

/// Converts a raw wei amount to whole-ETH units.
pub fn wei_to_eth(wei: Decimal) -> Decimal {
    wei / WEI_PER_ETH
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_wei_per_eth_constant() {
        assert_eq!(WEI_PER_ETH, dec!(1000000000000000000));
    }

    #[test]
    fn test_block_number_hex_string() {
        assert_eq!(parse_block_number(&json!("0x1a")), Some(26));
        assert_eq!(parse_block_number(&json!("0X1A")), Some(26));
    }

    #[test]
    fn test_block_number_decimal_string() {
        assert_eq!(parse_block_number(&json!("1234567")), Some(1_234_567));
    }

    #[test]
    fn test_block_number_integer() {
        assert_eq!(parse_block_number(&json!(987_654)), Some(987_654));
    }

    #[test]
    fn test_block_number_garbage() {
        assert_eq!(parse_block_number(&json!("latest")), None);
        assert_eq!(parse_block_number(&json!(null)), None);
        assert_eq!(parse_block_number(&json!(-5)), None);
    }

    #[test]
    fn test_timestamp_unix_number() {
        let ts = parse_timestamp(&json!(1697875200)).unwrap();
        assert_eq!(ts.timestamp(), 1697875200);
    }

    #[test]
    fn test_timestamp_unix_string() {
        let ts = parse_timestamp(&json!("1697875200")).unwrap();
        assert_eq!(ts.timestamp(), 1697875200);
    }

    #[test]
    fn test_timestamp_iso_string() {
        let ts = parse_timestamp(&json!("2023-10-21T08:00:00Z")).unwrap();
        assert_eq!(ts.timestamp(), 1697875200);
    }

    #[test]
    fn test_timestamp_garbage() {
        assert_eq!(parse_timestamp(&json!("not a time")), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
    }

    #[test]
    fn test_wei_to_eth() {
        assert_eq!(wei_to_eth(dec!(1500000000000000000)), dec!(1.5));
        assert_eq!(wei_to_eth(Decimal::ZERO), Decimal::ZERO);
    }
}
