//! In-memory chain for exercising the resolver without a node.

use crate::chain::block::{BlockHeader, HeaderDecodeMode, Transaction, MAX_STANDARD_EXTRA_DATA};
use crate::chain::provider::{BlockDataProvider, ProviderError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Clone, Debug)]
struct MemoryBlock {
    timestamp: i64,
    gas_prices: Vec<Option<u64>>,
}

/// Fixed chain of blocks `0..n` with fault injection and call accounting.
#[derive(Debug, Default)]
pub struct InMemoryChain {
    blocks: Vec<MemoryBlock>,
    requires_extended_headers: bool,
    shim_ineffective: bool,
    shim_fails: bool,
    failing: HashSet<u64>,
    extended: AtomicBool,
    header_fetches: Mutex<Vec<u64>>,
    full_fetches: AtomicUsize,
    shim_calls: AtomicUsize,
}

impl InMemoryChain {
    /// Block `i` gets `timestamps[i]` and no transactions.
    pub fn from_timestamps(timestamps: impl IntoIterator<Item = i64>) -> Self {
        Self {
            blocks: timestamps
                .into_iter()
                .map(|timestamp| MemoryBlock {
                    timestamp,
                    gas_prices: Vec::new(),
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Set the transactions of block `number`; `None` entries lack a gas price.
    pub fn with_gas_prices(mut self, number: u64, gas_prices: Vec<Option<u64>>) -> Self {
        if let Some(block) = self.blocks.get_mut(number as usize) {
            block.gas_prices = gas_prices;
        }
        self
    }

    /// Headers carry proof-of-authority seals: standard decoding fails until the shim is applied.
    pub fn requiring_extended_headers(mut self) -> Self {
        self.requires_extended_headers = true;
        self
    }

    /// The shim call succeeds but does not change decoding.
    pub fn with_ineffective_shim(mut self) -> Self {
        self.shim_ineffective = true;
        self
    }

    /// The shim call itself errors.
    pub fn with_failing_shim(mut self) -> Self {
        self.shim_fails = true;
        self
    }

    /// Every fetch of `number` fails with a node error.
    pub fn failing_at(mut self, number: u64) -> Self {
        self.failing.insert(number);
        self
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block numbers passed to `fetch_header`, in call order.
    pub fn header_fetches(&self) -> Vec<u64> {
        self.header_fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn full_fetch_count(&self) -> usize {
        self.full_fetches.load(Ordering::SeqCst)
    }

    pub fn shim_call_count(&self) -> usize {
        self.shim_calls.load(Ordering::SeqCst)
    }

    fn header(&self, number: u64) -> Result<(BlockHeader, &MemoryBlock), ProviderError> {
        if self.failing.contains(&number) {
            return Err(ProviderError::Rpc {
                code: -32000,
                message: format!("injected failure at block {}", number),
            });
        }
        let block = self
            .blocks
            .get(number as usize)
            .ok_or(ProviderError::BlockNotFound(number))?;
        let mut header = BlockHeader::new(number, block.timestamp);
        if self.requires_extended_headers {
            let seal = vec![0u8; MAX_STANDARD_EXTRA_DATA + 65];
            if self.decode_mode() == HeaderDecodeMode::Standard {
                return Err(ProviderError::IncompatibleHeaderFormat {
                    block: number,
                    extra_data_len: seal.len(),
                });
            }
            header.proof_of_authority_data = Some(seal);
        }
        Ok((header, block))
    }
}

#[async_trait]
impl BlockDataProvider for InMemoryChain {
    async fn fetch_header(&self, number: u64) -> Result<BlockHeader, ProviderError> {
        self.header_fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(number);
        self.header(number).map(|(h, _)| h)
    }

    async fn fetch_header_with_transactions(
        &self,
        number: u64,
    ) -> Result<BlockHeader, ProviderError> {
        self.full_fetches.fetch_add(1, Ordering::SeqCst);
        let (header, block) = self.header(number)?;
        let txs = block
            .gas_prices
            .iter()
            .enumerate()
            .map(|(i, gas_price)| Transaction {
                hash: Some(format!("0x{:016x}{:016x}", number, i)),
                gas_price: *gas_price,
            })
            .collect();
        Ok(header.with_transactions(txs))
    }

    async fn current_block_number(&self) -> Result<u64, ProviderError> {
        match self.blocks.len() {
            0 => Err(ProviderError::BlockNotFound(0)),
            n => Ok(n as u64 - 1),
        }
    }

    fn apply_compatibility_shim(&self) -> Result<(), ProviderError> {
        self.shim_calls.fetch_add(1, Ordering::SeqCst);
        if self.shim_fails {
            return Err(ProviderError::Config(
                "decoder layer already installed".to_string(),
            ));
        }
        if !self.shim_ineffective {
            self.extended.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn decode_mode(&self) -> HeaderDecodeMode {
        if self.extended.load(Ordering::SeqCst) {
            HeaderDecodeMode::ExtendedFields
        } else {
            HeaderDecodeMode::Standard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_headers_and_transactions() {
        let chain =
            InMemoryChain::from_timestamps([100, 110]).with_gas_prices(1, vec![Some(7), None]);
        assert_eq!(chain.current_block_number().await.unwrap(), 1);
        assert_eq!(chain.fetch_header(1).await.unwrap().timestamp, 110);
        let full = chain.fetch_header_with_transactions(1).await.unwrap();
        let txs = full.transactions.unwrap();
        assert_eq!(txs[0].gas_price, Some(7));
        assert_eq!(txs[1].gas_price, None);
        assert!(matches!(
            chain.fetch_header(2).await,
            Err(ProviderError::BlockNotFound(2))
        ));
        assert_eq!(chain.header_fetches(), vec![1, 2]);
    }

    #[tokio::test]
    async fn extended_headers_need_shim() {
        let chain = InMemoryChain::from_timestamps([100]).requiring_extended_headers();
        assert!(matches!(
            chain.fetch_header(0).await,
            Err(ProviderError::IncompatibleHeaderFormat { .. })
        ));
        chain.apply_compatibility_shim().unwrap();
        let h = chain.fetch_header(0).await.unwrap();
        assert!(h.proof_of_authority_data.is_some());
        assert_eq!(chain.shim_call_count(), 1);
    }
}
