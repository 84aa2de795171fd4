//! Block data: header model, provider capability, JSON-RPC client, cache, normalization.

pub mod block;
mod cache;
mod memory;
pub mod normalize;
mod provider;
mod rpc;

pub use block::{BlockHeader, HeaderDecodeMode, Transaction};
pub use cache::{BlockCache, CacheError};
pub use memory::InMemoryChain;
pub use normalize::{parse_timestamp, NormalizeError};
pub use provider::{BlockDataProvider, ProviderError};
pub use rpc::{RpcConfig, RpcProvider};
