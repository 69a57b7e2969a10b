//! Token deltas between two sqrt prices (SqrtPriceMath.sol).

use alloy::primitives::U256;

use super::full_math::{div_rounding_up, mul_div, mul_div_rounding_up};
use crate::error::MathError;

/// Amount of token0 between two sqrt prices for `liquidity`.
///
/// `liquidity * 2^96 * (sqrt_b - sqrt_a) / sqrt_b / sqrt_a`, floored unless
/// `round_up` is set.
pub fn get_amount0_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    let (sqrt_lower, sqrt_upper) = if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        (sqrt_ratio_b_x96, sqrt_ratio_a_x96)
    } else {
        (sqrt_ratio_a_x96, sqrt_ratio_b_x96)
    };

    if sqrt_lower.is_zero() {
        return Err(MathError::DivisionByZero);
    }

    let numerator1 = U256::from(liquidity) << 96;
    let numerator2 = sqrt_upper - sqrt_lower;

    if round_up {
        div_rounding_up(mul_div_rounding_up(numerator1, numerator2, sqrt_upper)?, sqrt_lower)
    } else {
        Ok(mul_div(numerator1, numerator2, sqrt_upper)? / sqrt_lower)
    }
}

/// Amount of token1 between two sqrt prices for `liquidity`.
///
/// `liquidity * (sqrt_b - sqrt_a) / 2^96`, floored unless `round_up` is set.
pub fn get_amount1_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    let (sqrt_lower, sqrt_upper) = if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        (sqrt_ratio_b_x96, sqrt_ratio_a_x96)
    } else {
        (sqrt_ratio_a_x96, sqrt_ratio_b_x96)
    };

    let q96 = U256::from(1u8) << 96;
    if round_up {
        mul_div_rounding_up(U256::from(liquidity), sqrt_upper - sqrt_lower, q96)
    } else {
        mul_div(U256::from(liquidity), sqrt_upper - sqrt_lower, q96)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tick_math::sqrt_ratio_at_tick;

    #[test]
    fn test_zero_width_range_is_zero() {
        let p = sqrt_ratio_at_tick(100).unwrap();
        assert_eq!(get_amount0_delta(p, p, 1_000_000, false).unwrap(), U256::ZERO);
        assert_eq!(get_amount1_delta(p, p, 1_000_000, true).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_amount1_one_tick_above_par() {
        // liquidity 1e18 between price 1 and price 1.21 (sqrt 1.1)
        let q96 = U256::from(1u8) << 96;
        let sqrt_b = q96 * U256::from(11u8) / U256::from(10u8);
        let amount1 = get_amount1_delta(q96, sqrt_b, 1_000_000_000_000_000_000, false).unwrap();
        // 0.1 * 1e18, minus at most one unit of truncation from sqrt_b
        let expected = U256::from(100_000_000_000_000_000u128);
        assert!(amount1 <= expected && expected - amount1 <= U256::from(1u8));
    }

    #[test]
    fn test_rounding_up_is_floor_plus_at_most_one() {
        let a = sqrt_ratio_at_tick(-1234).unwrap();
        let b = sqrt_ratio_at_tick(5678).unwrap();
        let down = get_amount0_delta(a, b, 123_456_789_012_345, false).unwrap();
        let up = get_amount0_delta(a, b, 123_456_789_012_345, true).unwrap();
        assert!(up == down || up == down + U256::from(1u8));
        // argument order does not matter
        assert_eq!(get_amount0_delta(b, a, 123_456_789_012_345, false).unwrap(), down);
    }
}
