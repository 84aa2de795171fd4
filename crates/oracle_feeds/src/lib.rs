//! oracle_feeds: data-source adapters for oracle reporters.
//!
//! Each source fetches one timestamped value: the median gas price of the block
//! nearest to a past timestamp, or a historical exchange price.
//! Read-only; no keys; no transaction signing.

pub mod chain;
pub mod compute;
pub mod config;
pub mod feeds;
pub mod sources;
#[cfg(test)]
mod testing;

pub use chain::{
    BlockCache, BlockDataProvider, BlockHeader, HeaderDecodeMode, InMemoryChain, ProviderError,
    RpcConfig, RpcProvider, Transaction,
};
pub use compute::{compute_median_gas_price, resolve_nearest_block, GasPriceObservation};
pub use config::{ChainEndpoint, EndpointsConfig};
pub use feeds::{gas_price_oracle_feed, kraken_historical_feed, DataFeed};
pub use rust_decimal::Decimal;
pub use sources::{DataPoint, DataSource, GasPriceOracleSource, OptionalDataPoint, SourceError};
