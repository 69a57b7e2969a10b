//! Liquidity <-> token amount conversions (LiquidityAmounts.sol).
//!
//! All results are floored, matching the periphery contracts bit for bit.

use alloy::primitives::U256;

use super::full_math::mul_div;
use crate::error::MathError;

#[inline]
fn sorted(a: U256, b: U256) -> (U256, U256) {
    if a > b {
        (b, a)
    } else {
        (a, b)
    }
}

#[inline]
fn q96() -> U256 {
    U256::from(1u8) << 96
}

fn to_u128(value: U256) -> Result<u128, MathError> {
    u128::try_from(value).map_err(|_| MathError::LiquidityOverflow)
}

// ============================================
// Amounts to Liquidity
// ============================================

/// Liquidity received for `amount0` between two sqrt prices.
pub fn get_liquidity_for_amount0(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    amount0: U256,
) -> Result<u128, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_a_x96, sqrt_ratio_b_x96);
    let intermediate = mul_div(sqrt_a, sqrt_b, q96())?;
    to_u128(mul_div(amount0, intermediate, sqrt_b - sqrt_a)?)
}

/// Liquidity received for `amount1` between two sqrt prices.
pub fn get_liquidity_for_amount1(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    amount1: U256,
) -> Result<u128, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_a_x96, sqrt_ratio_b_x96);
    to_u128(mul_div(amount1, q96(), sqrt_b - sqrt_a)?)
}

/// Maximum liquidity for the given amounts at the current price.
pub fn get_liquidity_for_amounts(
    sqrt_ratio_x96: U256,
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    amount0: U256,
    amount1: U256,
) -> Result<u128, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_a_x96, sqrt_ratio_b_x96);

    if sqrt_ratio_x96 <= sqrt_a {
        get_liquidity_for_amount0(sqrt_a, sqrt_b, amount0)
    } else if sqrt_ratio_x96 < sqrt_b {
        let liquidity0 = get_liquidity_for_amount0(sqrt_ratio_x96, sqrt_b, amount0)?;
        let liquidity1 = get_liquidity_for_amount1(sqrt_a, sqrt_ratio_x96, amount1)?;
        Ok(liquidity0.min(liquidity1))
    } else {
        get_liquidity_for_amount1(sqrt_a, sqrt_b, amount1)
    }
}

// ============================================
// Liquidity to Amounts
// ============================================

/// Amount of token0 held by `liquidity` between two sqrt prices.
pub fn get_amount0_for_liquidity(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_a_x96, sqrt_ratio_b_x96);
    if sqrt_a.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    Ok(mul_div(U256::from(liquidity) << 96, sqrt_b - sqrt_a, sqrt_b)? / sqrt_a)
}

/// Amount of token1 held by `liquidity` between two sqrt prices.
pub fn get_amount1_for_liquidity(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_a_x96, sqrt_ratio_b_x96);
    mul_div(U256::from(liquidity), sqrt_b - sqrt_a, q96())
}

/// Token amounts held by `liquidity` at the current price.
///
/// Returns `(amount0, amount1)`
pub fn get_amounts_for_liquidity(
    sqrt_ratio_x96: U256,
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
) -> Result<(U256, U256), MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_a_x96, sqrt_ratio_b_x96);

    if sqrt_ratio_x96 <= sqrt_a {
        Ok((get_amount0_for_liquidity(sqrt_a, sqrt_b, liquidity)?, U256::ZERO))
    } else if sqrt_ratio_x96 < sqrt_b {
        Ok((
            get_amount0_for_liquidity(sqrt_ratio_x96, sqrt_b, liquidity)?,
            get_amount1_for_liquidity(sqrt_a, sqrt_ratio_x96, liquidity)?,
        ))
    } else {
        Ok((U256::ZERO, get_amount1_for_liquidity(sqrt_a, sqrt_b, liquidity)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tick_math::sqrt_ratio_at_tick;

    #[test]
    fn test_below_range_is_all_token0() {
        let p = sqrt_ratio_at_tick(-600).unwrap();
        let a = sqrt_ratio_at_tick(-60).unwrap();
        let b = sqrt_ratio_at_tick(60).unwrap();
        let (amount0, amount1) = get_amounts_for_liquidity(p, a, b, 1_000_000_000).unwrap();
        assert!(amount0 > U256::ZERO);
        assert_eq!(amount1, U256::ZERO);
    }

    #[test]
    fn test_above_range_is_all_token1() {
        let p = sqrt_ratio_at_tick(600).unwrap();
        let a = sqrt_ratio_at_tick(-60).unwrap();
        let b = sqrt_ratio_at_tick(60).unwrap();
        let (amount0, amount1) = get_amounts_for_liquidity(p, a, b, 1_000_000_000).unwrap();
        assert_eq!(amount0, U256::ZERO);
        assert!(amount1 > U256::ZERO);
    }

    #[test]
    fn test_liquidity_round_trip_never_exceeds_deposit() {
        let p = sqrt_ratio_at_tick(0).unwrap();
        let a = sqrt_ratio_at_tick(-600).unwrap();
        let b = sqrt_ratio_at_tick(600).unwrap();
        let deposit0 = U256::from(1_000_000_000_000_000_000u128);
        let deposit1 = U256::from(1_000_000_000_000_000_000u128);

        let liquidity = get_liquidity_for_amounts(p, a, b, deposit0, deposit1).unwrap();
        let (amount0, amount1) = get_amounts_for_liquidity(p, a, b, liquidity).unwrap();

        // floor division everywhere: the position can never be worth more than what went in
        assert!(amount0 <= deposit0);
        assert!(amount1 <= deposit1);
        // and at the symmetric midpoint both sides are used almost fully
        assert!(deposit0 - amount0 < U256::from(1_000_000u64) || deposit1 - amount1 < U256::from(1_000_000u64));
    }

    #[test]
    fn test_liquidity_overflow() {
        let a = sqrt_ratio_at_tick(0).unwrap();
        let b = sqrt_ratio_at_tick(1).unwrap();
        assert_eq!(
            get_liquidity_for_amount1(a, b, U256::from(u128::MAX)),
            Err(MathError::LiquidityOverflow)
        );
    }
}
