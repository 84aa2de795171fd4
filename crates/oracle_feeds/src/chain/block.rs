//! Block headers and JSON-RPC block decoding.

use crate::chain::normalize::parse_quantity;
use crate::chain::provider::ProviderError;
use serde::{Deserialize, Serialize};

/// Longest `extraData` a standard (proof-of-work / beacon) header carries.
pub const MAX_STANDARD_EXTRA_DATA: usize = 32;

/// How a provider decodes block headers.
///
/// `Standard` rejects headers whose `extraData` exceeds 32 bytes, which is what
/// proof-of-authority chains emit (signer seals). `ExtendedFields` accepts them and
/// keeps the payload as `proof_of_authority_data`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderDecodeMode {
    #[default]
    Standard,
    ExtendedFields,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Option<String>,
    /// Gas price in wei. `None` when the node omitted the field.
    pub gas_price: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    /// Unix seconds.
    pub timestamp: i64,
    /// Populated only when the block was fetched with full transaction detail.
    pub transactions: Option<Vec<Transaction>>,
    pub proof_of_authority_data: Option<Vec<u8>>,
}

impl BlockHeader {
    pub fn new(number: u64, timestamp: i64) -> Self {
        Self {
            number,
            timestamp,
            transactions: None,
            proof_of_authority_data: None,
        }
    }

    pub fn with_transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = Some(transactions);
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    number: String,
    timestamp: String,
    #[serde(default)]
    extra_data: Option<String>,
    #[serde(default)]
    transactions: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    hash: Option<String>,
    gas_price: Option<String>,
}

/// Decode an `eth_getBlockByNumber` result object.
///
/// With `full` set, transaction objects are decoded; otherwise the hash list is dropped
/// and `transactions` stays `None`.
pub fn decode_block(
    value: &serde_json::Value,
    mode: HeaderDecodeMode,
    full: bool,
) -> Result<BlockHeader, ProviderError> {
    let raw: RawBlock = serde_json::from_value(value.clone())
        .map_err(|e| ProviderError::Decode(format!("block: {}", e)))?;
    let number = parse_quantity(&raw.number).map_err(|e| ProviderError::Decode(e.to_string()))?;
    let timestamp =
        parse_quantity(&raw.timestamp).map_err(|e| ProviderError::Decode(e.to_string()))?;
    let timestamp = i64::try_from(timestamp)
        .map_err(|_| ProviderError::Decode(format!("timestamp out of range: {}", raw.timestamp)))?;

    let extra = match raw.extra_data.as_deref() {
        Some(s) => hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| ProviderError::Decode(format!("extraData: {}", e)))?,
        None => Vec::new(),
    };
    let proof_of_authority_data = if extra.len() > MAX_STANDARD_EXTRA_DATA {
        match mode {
            HeaderDecodeMode::Standard => {
                return Err(ProviderError::IncompatibleHeaderFormat {
                    block: number,
                    extra_data_len: extra.len(),
                })
            }
            HeaderDecodeMode::ExtendedFields => Some(extra),
        }
    } else {
        None
    };

    let transactions = if full {
        let txs = raw
            .transactions
            .into_iter()
            .map(decode_transaction)
            .collect::<Result<Vec<_>, _>>()?;
        Some(txs)
    } else {
        None
    };

    Ok(BlockHeader {
        number,
        timestamp,
        transactions,
        proof_of_authority_data,
    })
}

fn decode_transaction(value: serde_json::Value) -> Result<Transaction, ProviderError> {
    if value.is_string() {
        return Err(ProviderError::Decode(
            "expected transaction object, got hash".to_string(),
        ));
    }
    let raw: RawTransaction = serde_json::from_value(value)
        .map_err(|e| ProviderError::Decode(format!("transaction: {}", e)))?;
    let gas_price = raw
        .gas_price
        .as_deref()
        .map(parse_quantity)
        .transpose()
        .map_err(|e| ProviderError::Decode(e.to_string()))?;
    Ok(Transaction {
        hash: raw.hash,
        gas_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn poa_extra() -> String {
        format!("0x{}", "ab".repeat(97))
    }

    #[test]
    fn decode_header_only() {
        let v = json!({
            "number": "0x10",
            "timestamp": "0x64",
            "extraData": "0x",
            "transactions": ["0xaaa", "0xbbb"]
        });
        let h = decode_block(&v, HeaderDecodeMode::Standard, false).unwrap();
        assert_eq!(h.number, 16);
        assert_eq!(h.timestamp, 100);
        assert!(h.transactions.is_none());
        assert!(h.proof_of_authority_data.is_none());
    }

    #[test]
    fn standard_mode_rejects_long_extra_data() {
        let v = json!({ "number": "0x1", "timestamp": "0x2", "extraData": poa_extra() });
        let err = decode_block(&v, HeaderDecodeMode::Standard, false).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::IncompatibleHeaderFormat {
                block: 1,
                extra_data_len: 97
            }
        ));
    }

    #[test]
    fn extended_mode_keeps_poa_data() {
        let v = json!({ "number": "0x1", "timestamp": "0x2", "extraData": poa_extra() });
        let h = decode_block(&v, HeaderDecodeMode::ExtendedFields, false).unwrap();
        assert_eq!(h.proof_of_authority_data.map(|d| d.len()), Some(97));
    }

    #[test]
    fn decode_full_transactions() {
        let v = json!({
            "number": "0x2",
            "timestamp": "0x5",
            "transactions": [
                { "hash": "0x01", "gasPrice": "0x3b9aca00" },
                { "hash": "0x02" }
            ]
        });
        let h = decode_block(&v, HeaderDecodeMode::Standard, true).unwrap();
        let txs = h.transactions.unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].gas_price, Some(1_000_000_000));
        assert_eq!(txs[1].gas_price, None);
    }

    #[test]
    fn full_decode_of_hash_list_fails() {
        let v = json!({ "number": "0x2", "timestamp": "0x5", "transactions": ["0x01"] });
        assert!(decode_block(&v, HeaderDecodeMode::Standard, true).is_err());
    }
}
