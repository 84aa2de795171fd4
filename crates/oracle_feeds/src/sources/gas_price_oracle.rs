//! Median gas price of a chain at a past timestamp.

use crate::chain::{BlockCache, BlockDataProvider, RpcProvider};
use crate::compute::compute_median_gas_price;
use crate::config::EndpointsConfig;
use crate::sources::{DataPoint, DataSource, DatapointHistory, OptionalDataPoint, SourceError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Reports the median gas price (gwei) of the block on `chain_id` nearest to,
/// but not after, `timestamp`.
pub struct GasPriceOracleSource {
    pub chain_id: Option<u64>,
    pub timestamp: Option<i64>,
    endpoints: EndpointsConfig,
    cache: Option<Arc<BlockCache>>,
    provider: Option<Arc<dyn BlockDataProvider>>,
    history: DatapointHistory<Decimal>,
}

impl GasPriceOracleSource {
    pub fn new(chain_id: Option<u64>, timestamp: Option<i64>, endpoints: EndpointsConfig) -> Self {
        Self {
            chain_id,
            timestamp,
            endpoints,
            cache: None,
            provider: None,
            history: DatapointHistory::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<BlockCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use `provider` for every round instead of connecting from `endpoints`.
    pub fn with_provider(mut self, provider: Arc<dyn BlockDataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    fn connect(&self, chain_id: u64) -> Result<Arc<dyn BlockDataProvider>, SourceError> {
        if let Some(provider) = &self.provider {
            return Ok(Arc::clone(provider));
        }
        let config = self.endpoints.rpc_config(chain_id)?;
        let provider = RpcProvider::new(config, self.cache.clone())?;
        Ok(Arc::new(provider))
    }
}

#[async_trait]
impl DataSource for GasPriceOracleSource {
    type Value = Decimal;

    async fn fetch_new_datapoint(&self) -> Result<OptionalDataPoint<Decimal>, SourceError> {
        let chain_id = self
            .chain_id
            .filter(|&id| id != 0)
            .ok_or(SourceError::MissingParameter("chain id"))?;
        let timestamp = self
            .timestamp
            .ok_or(SourceError::MissingParameter("timestamp"))?;

        let provider = match self.connect(chain_id) {
            Ok(p) => p,
            Err(e) => {
                warn!(chain_id, error = %e, "error occurred while connecting to chain");
                return Ok(OptionalDataPoint::none());
            }
        };
        let latest = match provider.current_block_number().await {
            Ok(n) => n,
            Err(e) => {
                warn!(chain_id, error = %e, "error occurred while fetching latest block number");
                return Ok(OptionalDataPoint::none());
            }
        };
        let Some(obs) = compute_median_gas_price(provider.as_ref(), timestamp, latest).await else {
            return Ok(OptionalDataPoint::none());
        };

        info!(chain_id, block = obs.block_number, gwei = %obs.gwei, "median gas price");
        let dp = DataPoint {
            value: obs.gwei,
            observed_at: obs.observed_at,
        };
        self.history.store(dp.clone());
        Ok(dp.into())
    }

    fn history(&self) -> &DatapointHistory<Decimal> {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;
    use crate::config::ChainEndpoint;

    fn chain() -> Arc<InMemoryChain> {
        Arc::new(
            InMemoryChain::from_timestamps((0..10).map(|i| 100 + 10 * i))
                .with_gas_prices(3, vec![Some(5), Some(1), Some(3)]),
        )
    }

    #[tokio::test]
    async fn fetches_and_stores_datapoint() {
        let source = GasPriceOracleSource::new(Some(1), Some(135), EndpointsConfig::default())
            .with_provider(chain());
        let dp = source.fetch_new_datapoint().await.unwrap();
        assert_eq!(dp.value, Some(Decimal::new(3, 9)));
        assert!(dp.observed_at.is_some());
        assert_eq!(source.history().len(), 1);
        assert_eq!(
            source.latest_datapoint().map(|d| d.value),
            Some(Decimal::new(3, 9))
        );
    }

    #[tokio::test]
    async fn missing_parameters_are_errors() {
        let source = GasPriceOracleSource::new(None, Some(135), EndpointsConfig::default());
        assert!(matches!(
            source.fetch_new_datapoint().await,
            Err(SourceError::MissingParameter("chain id"))
        ));
        let source = GasPriceOracleSource::new(Some(1), None, EndpointsConfig::default());
        assert!(matches!(
            source.fetch_new_datapoint().await,
            Err(SourceError::MissingParameter("timestamp"))
        ));
    }

    #[tokio::test]
    async fn unknown_chain_yields_empty_datapoint() {
        let source = GasPriceOracleSource::new(Some(99), Some(135), EndpointsConfig::default());
        let dp = source.fetch_new_datapoint().await.unwrap();
        assert!(dp.is_none());
        assert!(source.history().is_empty());
    }

    #[tokio::test]
    async fn unreachable_node_yields_empty_datapoint() {
        let endpoints = EndpointsConfig::default().with_endpoint(ChainEndpoint {
            chain_id: 1,
            url: "http://127.0.0.1:9".into(),
            timeout_secs: Some(2),
            ..Default::default()
        });
        let source = GasPriceOracleSource::new(Some(1), Some(135), endpoints);
        let dp = source.fetch_new_datapoint().await.unwrap();
        assert!(dp.is_none());
    }

    #[tokio::test]
    async fn empty_block_yields_empty_datapoint() {
        let chain = Arc::new(InMemoryChain::from_timestamps([100, 110]));
        let source = GasPriceOracleSource::new(Some(1), Some(105), EndpointsConfig::default())
            .with_provider(chain);
        assert!(source.fetch_new_datapoint().await.unwrap().is_none());
    }
}
