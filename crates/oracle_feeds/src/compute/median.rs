//! Median gas price of the block nearest to a timestamp.

use crate::chain::{BlockDataProvider, ProviderError};
use crate::compute::nearest_block::resolve_nearest_block;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, warn};

/// Decimal places between wei and gwei.
const GWEI_SCALE: u32 = 9;

#[derive(Error, Debug)]
pub enum GasPriceError {
    #[error("no block found for timestamp {target}")]
    NotFound { target: i64 },
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("block {block}: transaction {index} has no gasPrice")]
    MissingField { block: u64, index: usize },
    #[error("block {0} has no transactions")]
    EmptyBlock(u64),
    #[error("median {0} does not fit in wei")]
    OutOfRange(Decimal),
}

#[derive(Clone, Debug, PartialEq)]
pub struct GasPriceObservation {
    pub gwei: Decimal,
    pub block_number: u64,
    /// Wall-clock time of the observation, not the block's timestamp.
    pub observed_at: OffsetDateTime,
}

/// Sort `prices` ascending and return their median (wei, exact). `None` when empty.
pub fn median_gas_price(prices: &mut [u64]) -> Option<Decimal> {
    if prices.is_empty() {
        return None;
    }
    prices.sort();
    let middle = prices.len() / 2;
    let median = match prices.len() % 2 {
        0 => {
            (Decimal::from(prices[middle - 1]) + Decimal::from(prices[middle])) / Decimal::from(2u8)
        }
        _ => Decimal::from(prices[middle]),
    };
    Some(median)
}

pub fn wei_to_gwei(wei: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(wei), GWEI_SCALE).normalize()
}

/// Same as [`compute_median_gas_price`] but reports why no value was produced.
pub async fn try_compute_median_gas_price<P>(
    provider: &P,
    target: i64,
    latest_block: u64,
) -> Result<GasPriceObservation, GasPriceError>
where
    P: BlockDataProvider + ?Sized,
{
    let nearest = resolve_nearest_block(provider, target, 0, latest_block)
        .await
        .ok_or(GasPriceError::NotFound { target })?;
    let block = provider
        .fetch_header_with_transactions(nearest.number)
        .await?;
    let number = block.number;
    let mut prices = block
        .transactions
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(index, tx)| {
            tx.gas_price
                .ok_or(GasPriceError::MissingField { block: number, index })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let median = median_gas_price(&mut prices).ok_or(GasPriceError::EmptyBlock(number))?;
    let wei = median
        .trunc()
        .to_u64()
        .ok_or(GasPriceError::OutOfRange(median))?;
    Ok(GasPriceObservation {
        gwei: wei_to_gwei(wei),
        block_number: number,
        observed_at: OffsetDateTime::now_utc(),
    })
}

/// Median gas price (gwei) of the block closest to, but not after, `target`,
/// searched over `[0, latest_block]`. `None` when no value is available this round.
pub async fn compute_median_gas_price<P>(
    provider: &P,
    target: i64,
    latest_block: u64,
) -> Option<GasPriceObservation>
where
    P: BlockDataProvider + ?Sized,
{
    match try_compute_median_gas_price(provider, target, latest_block).await {
        Ok(obs) => Some(obs),
        Err(e @ GasPriceError::MissingField { .. }) => {
            error!(error = %e, "error occurred while sorting gas price from transactions");
            None
        }
        Err(e @ GasPriceError::Provider(_)) => {
            warn!(error = %e, "error occurred while fetching block");
            None
        }
        Err(e) => {
            info!(error = %e, "no gas price available");
            None
        }
    }
}
