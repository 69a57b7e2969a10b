//! Fixed-point math and conversion utilities.
//!
//! This module is organized into focused submodules:
//!
//! - [`conversion`] - Type conversions (U256 to exact decimals, hex encoding)
//! - [`full_math`] - 512-bit multiply-divide
//! - [`tick_math`] - tick <-> sqrtPriceX96
//! - [`sqrt_price_math`] - token deltas between two sqrt prices
//! - [`liquidity_amounts`] - liquidity <-> token amounts
//! - [`fees`] - uncollected fees under mod 2^256 fee growth
//!
//! Everything here is pure and deterministic; nothing touches I/O.

mod conversion;
mod fees;
mod full_math;
mod liquidity_amounts;
mod sqrt_price_math;
mod tick_math;

// ============================================
// Common Constants
// ============================================

/// The Ethereum zero address (0x0000000000000000000000000000000000000000)
/// Used for mint/burn transfers.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

// ============================================
// Re-exports
// ============================================

pub use conversion::{checked_ratio, decimal_to_f64, hex_encode, price_to_decimal, u256_to_decimal};

pub use fees::{sub_in_256, uncollected_fees, FeeGrowthInputs};

pub use full_math::{div_rounding_up, mul_div, mul_div_rounding_up};

pub use liquidity_amounts::{
    get_amount0_for_liquidity, get_amount1_for_liquidity, get_amounts_for_liquidity,
    get_liquidity_for_amount0, get_liquidity_for_amount1, get_liquidity_for_amounts,
};

pub use sqrt_price_math::{get_amount0_delta, get_amount1_delta};

pub use tick_math::{
    sqrt_ratio_at_tick, tick_at_sqrt_ratio, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK,
};
