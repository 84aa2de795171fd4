//! Kraken historical trade price.
//!
//! Uses the public `Trades` endpoint: the first trade at or after `since` gives the price.

use crate::sources::{DataPoint, DataSource, DatapointHistory, OptionalDataPoint, SourceError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

const KRAKEN_URL: &str = "https://api.kraken.com";
const SUPPORTED_ASSETS: &[&str] = &["ETH"];
const SUPPORTED_CURRENCIES: &[&str] = &["USD"];

#[derive(Error, Debug)]
pub enum KrakenError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("api error: {0:?}")]
    Api(Vec<String>),
    #[error("missing field {0}")]
    MissingField(String),
    #[error("invalid price {0}")]
    InvalidPrice(String),
}

/// Price of the first trade in a Kraken `Trades` response.
pub fn parse_trades_price(
    body: &serde_json::Value,
    asset: &str,
    currency: &str,
) -> Result<Decimal, KrakenError> {
    if let Some(errors) = body.get("error").and_then(|e| e.as_array()) {
        if !errors.is_empty() {
            return Err(KrakenError::Api(
                errors
                    .iter()
                    .map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_string))
                    .collect(),
            ));
        }
    }
    let pair = format!("X{}Z{}", asset, currency);
    let raw = body
        .get("result")
        .and_then(|r| r.get(&pair))
        .and_then(|trades| trades.get(0))
        .and_then(|trade| trade.get(0))
        .ok_or_else(|| KrakenError::MissingField(format!("result.{}[0][0]", pair)))?;
    let s = raw
        .as_str()
        .ok_or_else(|| KrakenError::InvalidPrice(raw.to_string()))?;
    Decimal::from_str(s).map_err(|_| KrakenError::InvalidPrice(s.to_string()))
}

pub struct KrakenHistoricalPriceService {
    base_url: String,
    client: reqwest::Client,
}

impl KrakenHistoricalPriceService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn trades_url(&self, asset: &str, currency: &str, since: i64) -> String {
        format!(
            "{}/0/public/Trades?pair={}&since={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&format!("{}{}", asset, currency)),
            since
        )
    }

    pub async fn get_price(
        &self,
        asset: &str,
        currency: &str,
        since: i64,
    ) -> Result<Decimal, KrakenError> {
        let url = self.trades_url(asset, currency, since);
        debug!(%url, "kraken trades");
        let body: serde_json::Value = self.client.get(&url).send().await?.json().await?;
        parse_trades_price(&body, asset, currency)
    }
}

/// Historical price of `asset` in `currency` at Unix time `ts`.
pub struct KrakenHistoricalPriceSource {
    pub asset: String,
    pub currency: String,
    pub ts: Option<i64>,
    service: KrakenHistoricalPriceService,
    history: DatapointHistory<Decimal>,
}

impl KrakenHistoricalPriceSource {
    pub fn new(asset: &str, currency: &str, ts: Option<i64>) -> Result<Self, SourceError> {
        Self::with_base_url(asset, currency, ts, KRAKEN_URL)
    }

    pub fn with_base_url(
        asset: &str,
        currency: &str,
        ts: Option<i64>,
        base_url: &str,
    ) -> Result<Self, SourceError> {
        let service = KrakenHistoricalPriceService::new(base_url)?;
        Ok(Self {
            asset: asset.to_string(),
            currency: currency.to_string(),
            ts,
            service,
            history: DatapointHistory::default(),
        })
    }
}

#[async_trait]
impl DataSource for KrakenHistoricalPriceSource {
    type Value = Decimal;

    async fn fetch_new_datapoint(&self) -> Result<OptionalDataPoint<Decimal>, SourceError> {
        let ts = self.ts.ok_or(SourceError::MissingParameter("timestamp"))?;
        let asset = self.asset.to_uppercase();
        let currency = self.currency.to_uppercase();
        if !SUPPORTED_ASSETS.contains(&asset.as_str()) {
            return Err(SourceError::Unsupported(format!("asset {}", asset)));
        }
        if !SUPPORTED_CURRENCIES.contains(&currency.as_str()) {
            return Err(SourceError::Unsupported(format!("currency {}", currency)));
        }

        let price = match self.service.get_price(&asset, &currency, ts).await {
            Ok(p) => p,
            Err(e @ KrakenError::Request(_)) => {
                warn!(error = %e, "kraken request failed");
                return Ok(OptionalDataPoint::none());
            }
            Err(e) => {
                error!(error = %e, "error parsing Kraken API response");
                return Ok(OptionalDataPoint::none());
            }
        };
        let dp = DataPoint {
            value: price,
            observed_at: OffsetDateTime::now_utc(),
        };
        self.history.store(dp.clone());
        Ok(dp.into())
    }

    fn history(&self) -> &DatapointHistory<Decimal> {
        &self.history
    }
}
