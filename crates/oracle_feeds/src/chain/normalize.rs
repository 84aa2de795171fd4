//! Normalization of timestamps and JSON-RPC quantities.

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
}

/// Parse a target time given as Unix seconds or RFC3339.
pub fn parse_timestamp(s: &str) -> Result<i64, NormalizeError> {
    let s = s.trim();
    let ts = match s.parse::<i64>() {
        Ok(ts) => ts,
        Err(_) => OffsetDateTime::parse(s, &Rfc3339)
            .map_err(|e| NormalizeError::InvalidTimestamp(format!("{}: {}", s, e)))?
            .unix_timestamp(),
    };
    if ts < 0 {
        return Err(NormalizeError::InvalidTimestamp(s.to_string()));
    }
    Ok(ts)
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(s: &str) -> Result<u64, NormalizeError> {
    let digits = s
        .trim()
        .strip_prefix("0x")
        .ok_or_else(|| NormalizeError::InvalidQuantity(s.to_string()))?;
    if digits.is_empty() {
        return Err(NormalizeError::InvalidQuantity(s.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| NormalizeError::InvalidQuantity(s.to_string()))
}

pub fn format_quantity(n: u64) -> String {
    format!("0x{:x}", n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_unix() {
        assert_eq!(parse_timestamp("1648771200").unwrap(), 1_648_771_200);
    }

    #[test]
    fn timestamp_rfc3339() {
        assert_eq!(
            parse_timestamp("2022-04-01T00:00:00Z").unwrap(),
            1_648_771_200
        );
    }

    #[test]
    fn timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("-5").is_err());
    }

    #[test]
    fn timestamp_rejects_pre_epoch_rfc3339() {
        assert!(parse_timestamp("1969-12-31T23:59:59Z").is_err());
        assert_eq!(parse_timestamp("1970-01-01T00:00:00Z").unwrap(), 0);
    }

    #[test]
    fn quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert!(parse_quantity("1b4").is_err());
        assert!(parse_quantity("0x").is_err());
        assert_eq!(format_quantity(436), "0x1b4");
    }
}
