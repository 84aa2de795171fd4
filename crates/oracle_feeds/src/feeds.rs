//! Feeds pair a query descriptor with the source that answers it.

use crate::config::EndpointsConfig;
use crate::sources::{
    DataSource, GasPriceOracleSource, KrakenHistoricalPriceSource, OptionalDataPoint, SourceError,
};
use serde::{Deserialize, Serialize};

pub trait Query {
    fn query_type(&self) -> &'static str;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceOracleQuery {
    pub chain_id: Option<u64>,
    pub timestamp: Option<i64>,
}

impl Query for GasPriceOracleQuery {
    fn query_type(&self) -> &'static str {
        "GasPriceOracle"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KrakenHistoricalPriceQuery {
    pub asset: String,
    pub currency: String,
    pub timestamp: Option<i64>,
}

impl Query for KrakenHistoricalPriceQuery {
    fn query_type(&self) -> &'static str {
        "KrakenHistoricalPrice"
    }
}

pub struct DataFeed<Q, S> {
    pub query: Q,
    pub source: S,
}

impl<Q: Query, S: DataSource> DataFeed<Q, S> {
    pub fn query_type(&self) -> &'static str {
        self.query.query_type()
    }

    pub async fn fetch(&self) -> Result<OptionalDataPoint<S::Value>, SourceError> {
        self.source.fetch_new_datapoint().await
    }
}

pub fn gas_price_oracle_feed(
    chain_id: Option<u64>,
    timestamp: Option<i64>,
    endpoints: EndpointsConfig,
) -> DataFeed<GasPriceOracleQuery, GasPriceOracleSource> {
    DataFeed {
        query: GasPriceOracleQuery {
            chain_id,
            timestamp,
        },
        source: GasPriceOracleSource::new(chain_id, timestamp, endpoints),
    }
}

pub fn kraken_historical_feed(
    asset: &str,
    currency: &str,
    timestamp: Option<i64>,
) -> Result<DataFeed<KrakenHistoricalPriceQuery, KrakenHistoricalPriceSource>, SourceError> {
    Ok(DataFeed {
        query: KrakenHistoricalPriceQuery {
            asset: asset.to_string(),
            currency: currency.to_string(),
            timestamp,
        },
        source: KrakenHistoricalPriceSource::new(asset, currency, timestamp)?,
    })
}
