//! Uncollected fee computation for a concentrated liquidity position.
//!
//! Fee growth counters are uint256 accumulators that are allowed to overflow
//! on-chain, so every difference must be taken mod 2^256.

use alloy::primitives::U256;

use super::full_math::mul_div;
use crate::error::MathError;

/// `x - y mod 2^256`, the EVM's unchecked uint256 subtraction.
#[inline]
pub fn sub_in_256(x: U256, y: U256) -> U256 {
    x.wrapping_sub(y)
}

/// Fee growth counters of one position and the ticks that bound it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeGrowthInputs {
    pub fee_growth_global: U256,
    pub fee_growth_outside_lower: U256,
    pub fee_growth_outside_upper: U256,
    pub fee_growth_inside_last: U256,
    pub tick_current: i32,
    pub liquidity: u128,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

/// Fees earned by a position since it was last poked, in raw token units.
///
/// `liquidity * (fee_growth_inside - fee_growth_inside_last) / 2^128`, floored.
pub fn uncollected_fees(input: &FeeGrowthInputs) -> Result<U256, MathError> {
    let fee_growth_below = if input.tick_current >= input.tick_lower {
        input.fee_growth_outside_lower
    } else {
        sub_in_256(input.fee_growth_global, input.fee_growth_outside_lower)
    };

    let fee_growth_above = if input.tick_current >= input.tick_upper {
        sub_in_256(input.fee_growth_global, input.fee_growth_outside_upper)
    } else {
        input.fee_growth_outside_upper
    };

    let fee_growth_inside = sub_in_256(
        sub_in_256(input.fee_growth_global, fee_growth_below),
        fee_growth_above,
    );

    mul_div(
        U256::from(input.liquidity),
        sub_in_256(fee_growth_inside, input.fee_growth_inside_last),
        U256::from(1u8) << 128,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q128() -> U256 {
        U256::from(1u8) << 128
    }

    #[test]
    fn test_sub_in_256_wraps() {
        let x = U256::from(5u8);
        let y = U256::from(7u8);
        // naive signed subtraction would give -2
        assert_eq!(sub_in_256(x, y), U256::MAX - U256::from(1u8));
        assert_eq!(sub_in_256(y, x), U256::from(2u8));
    }

    #[test]
    fn test_no_growth_since_last_poke_is_zero() {
        let input = FeeGrowthInputs {
            fee_growth_global: U256::from(123_456_789u64) * q128(),
            fee_growth_outside_lower: U256::ZERO,
            fee_growth_outside_upper: U256::ZERO,
            fee_growth_inside_last: U256::from(123_456_789u64) * q128(),
            tick_current: 10,
            liquidity: 1_000_000_000_000,
            tick_lower: -60,
            tick_upper: 60,
        };
        assert_eq!(uncollected_fees(&input).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_in_range_growth() {
        // 3 units of fee per unit of liquidity accrued inside the range
        let input = FeeGrowthInputs {
            fee_growth_global: U256::from(10u8) * q128(),
            fee_growth_outside_lower: U256::from(2u8) * q128(),
            fee_growth_outside_upper: U256::from(1u8) * q128(),
            fee_growth_inside_last: U256::from(4u8) * q128(),
            tick_current: 0,
            liquidity: 1_000,
            tick_lower: -60,
            tick_upper: 60,
        };
        // inside = 10 - 2 - 1 = 7, minus last 4 = 3
        assert_eq!(uncollected_fees(&input).unwrap(), U256::from(3_000u32));
    }

    #[test]
    fn test_wrapped_counters() {
        // the global counter overflowed past 2^256 after the position was poked
        let last = U256::MAX - U256::from(9u8) * q128() + U256::from(1u8);
        let input = FeeGrowthInputs {
            fee_growth_global: U256::from(5u8) * q128(),
            fee_growth_outside_lower: U256::ZERO,
            fee_growth_outside_upper: U256::ZERO,
            fee_growth_inside_last: last,
            tick_current: 0,
            liquidity: 2,
            tick_lower: -60,
            tick_upper: 60,
        };
        // 5 * 2^128 - (2^256 - 9 * 2^128) = 14 * 2^128 mod 2^256
        assert_eq!(uncollected_fees(&input).unwrap(), U256::from(28u8));
    }

    #[test]
    fn test_price_below_range_uses_lower_complement() {
        let input = FeeGrowthInputs {
            fee_growth_global: U256::from(10u8) * q128(),
            fee_growth_outside_lower: U256::from(6u8) * q128(),
            fee_growth_outside_upper: U256::from(1u8) * q128(),
            fee_growth_inside_last: U256::ZERO,
            tick_current: -100,
            liquidity: 1,
            tick_lower: -60,
            tick_upper: 60,
        };
        // below = 10 - 6 = 4, above = 1, inside = 10 - 4 - 1 = 5
        assert_eq!(uncollected_fees(&input).unwrap(), U256::from(5u8));
    }
}
