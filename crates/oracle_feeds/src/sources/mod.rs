//! Data sources: each fetches one timestamped value per round.

mod gas_price_oracle;
mod kraken;

pub use gas_price_oracle::GasPriceOracleSource;
pub use kraken::{
    parse_trades_price, KrakenError, KrakenHistoricalPriceService, KrakenHistoricalPriceSource,
};

use crate::chain::ProviderError;
use crate::config::ConfigError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use time::OffsetDateTime;

/// Errors for a source that cannot run as configured. Expected absence of data
/// is not an error: it is an empty [`OptionalDataPoint`].
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{0} not provided")]
    MissingParameter(&'static str),
    #[error("not supported: {0}")]
    Unsupported(String),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataPoint<T> {
    pub value: T,
    pub observed_at: OffsetDateTime,
}

/// A value and its observation time, or neither.
#[derive(Clone, Debug, PartialEq)]
pub struct OptionalDataPoint<T> {
    pub value: Option<T>,
    pub observed_at: Option<OffsetDateTime>,
}

impl<T> OptionalDataPoint<T> {
    pub fn none() -> Self {
        Self {
            value: None,
            observed_at: None,
        }
    }

    pub fn is_none(&self) -> bool {
        self.value.is_none()
    }

    pub fn into_datapoint(self) -> Option<DataPoint<T>> {
        match (self.value, self.observed_at) {
            (Some(value), Some(observed_at)) => Some(DataPoint { value, observed_at }),
            _ => None,
        }
    }
}

impl<T> From<DataPoint<T>> for OptionalDataPoint<T> {
    fn from(dp: DataPoint<T>) -> Self {
        Self {
            value: Some(dp.value),
            observed_at: Some(dp.observed_at),
        }
    }
}

/// Most recent datapoints kept per source.
pub const DEFAULT_MAX_DATAPOINTS: usize = 256;

/// Datapoints a source has produced, oldest first. Holds at most `max_datapoints`;
/// storing beyond that drops the oldest.
#[derive(Debug)]
pub struct DatapointHistory<T> {
    points: Mutex<VecDeque<DataPoint<T>>>,
    max_datapoints: usize,
}

impl<T> Default for DatapointHistory<T> {
    fn default() -> Self {
        Self::with_max_datapoints(DEFAULT_MAX_DATAPOINTS)
    }
}

impl<T> DatapointHistory<T> {
    /// A `max_datapoints` of 0 is treated as 1.
    pub fn with_max_datapoints(max_datapoints: usize) -> Self {
        Self {
            points: Mutex::new(VecDeque::new()),
            max_datapoints: max_datapoints.max(1),
        }
    }

    pub fn max_datapoints(&self) -> usize {
        self.max_datapoints
    }
}

impl<T: Clone> DatapointHistory<T> {
    pub fn store(&self, dp: DataPoint<T>) {
        let mut points = self.points.lock().unwrap_or_else(PoisonError::into_inner);
        while points.len() >= self.max_datapoints {
            points.pop_front();
        }
        points.push_back(dp);
    }

    pub fn latest(&self) -> Option<DataPoint<T>> {
        self.points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait DataSource: Send + Sync {
    type Value: Clone + Send + Sync;

    /// Fetch the current value. Stores it in the history when one is produced.
    async fn fetch_new_datapoint(&self) -> Result<OptionalDataPoint<Self::Value>, SourceError>;

    fn history(&self) -> &DatapointHistory<Self::Value>;

    fn latest_datapoint(&self) -> Option<DataPoint<Self::Value>> {
        self.history().latest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_latest() {
        let history = DatapointHistory::default();
        assert!(history.latest().is_none());
        let t = OffsetDateTime::from_unix_timestamp(1).unwrap();
        history.store(DataPoint { value: 1u32, observed_at: t });
        history.store(DataPoint { value: 2u32, observed_at: t });
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().map(|d| d.value), Some(2));
    }

    #[test]
    fn history_is_bounded() {
        let t = OffsetDateTime::from_unix_timestamp(1).unwrap();
        let history = DatapointHistory::with_max_datapoints(3);
        for value in 0..10u32 {
            history.store(DataPoint { value, observed_at: t });
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().map(|d| d.value), Some(9));

        let history = DatapointHistory::default();
        for value in 0..(DEFAULT_MAX_DATAPOINTS as u32 + 50) {
            history.store(DataPoint { value, observed_at: t });
        }
        assert_eq!(history.len(), DEFAULT_MAX_DATAPOINTS);
    }

    #[test]
    fn optional_datapoint_conversions() {
        let t = OffsetDateTime::from_unix_timestamp(5).unwrap();
        let opt: OptionalDataPoint<u8> = DataPoint { value: 3, observed_at: t }.into();
        assert!(!opt.is_none());
        assert_eq!(opt.clone().into_datapoint().map(|d| d.value), Some(3));
        assert!(OptionalDataPoint::<u8>::none().into_datapoint().is_none());
    }
}
