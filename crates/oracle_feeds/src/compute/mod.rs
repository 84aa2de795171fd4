//! Nearest-block resolution and median gas price.

mod median;
pub mod nearest_block;

pub use median::{
    compute_median_gas_price, median_gas_price, try_compute_median_gas_price, wei_to_gwei,
    GasPriceError, GasPriceObservation,
};
pub use nearest_block::{fetch_probe, resolve_nearest_block};
