//! Block data provider capability consumed by the resolver.

use crate::chain::block::{BlockHeader, HeaderDecodeMode};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("block {block}: extraData is {extra_data_len} bytes, header needs extended decoding")]
    IncompatibleHeaderFormat { block: u64, extra_data_len: usize },
    #[error("decode: {0}")]
    Decode(String),
    #[error("cache: {0}")]
    Cache(#[from] crate::chain::cache::CacheError),
    #[error("offline mode: block not cached")]
    OfflineMiss,
    #[error("config: {0}")]
    Config(String),
}

/// Source of block headers indexed by block number.
///
/// Implementations are shared by reference across concurrent lookups; the only
/// state a caller may change is the decode mode, through
/// [`apply_compatibility_shim`](BlockDataProvider::apply_compatibility_shim).
#[async_trait]
pub trait BlockDataProvider: Send + Sync {
    /// Header without transaction bodies (`transactions == None`).
    async fn fetch_header(&self, number: u64) -> Result<BlockHeader, ProviderError>;

    async fn fetch_header_with_transactions(
        &self,
        number: u64,
    ) -> Result<BlockHeader, ProviderError>;

    async fn current_block_number(&self) -> Result<u64, ProviderError>;

    /// Switch this connection to [`HeaderDecodeMode::ExtendedFields`].
    ///
    /// Idempotent. An error here is advisory: callers log it and retry anyway.
    fn apply_compatibility_shim(&self) -> Result<(), ProviderError>;

    fn decode_mode(&self) -> HeaderDecodeMode;
}
