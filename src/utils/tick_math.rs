//! Tick math for Uniswap V3 style pools.
//!
//! Exact integer port of TickMath.sol: tick <-> sqrtPriceX96 (Q64.96) using
//! the bit-masked multiplication ladder and the fixed-point log2 refinement.

use alloy::primitives::{uint, I256, U256};

use crate::error::MathError;

// ============================================
// Domain
// ============================================

pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

/// sqrt_ratio_at_tick(MIN_TICK)
pub const MIN_SQRT_RATIO: U256 = uint!(4295128739_U256);
/// sqrt_ratio_at_tick(MAX_TICK)
pub const MAX_SQRT_RATIO: U256 = uint!(1461446703485210103287273052203988822378723970342_U256);

// ============================================
// Precomputed Constants
// ============================================

const Q128: U256 = uint!(0x100000000000000000000000000000000_U256);

/// 2^128 / sqrt(1.0001), applied when bit 0 of |tick| is set.
const RATIO_BIT0: U256 = uint!(0xfffcb933bd6fad37aa2d162d1a594001_U256);

/// 2^128 / sqrt(1.0001)^(2^i) for bits 1..=19 of |tick|.
const TICK_MULTIPLIERS: [U256; 19] = [
    uint!(0xfff97272373d413259a46990580e213a_U256),
    uint!(0xfff2e50f5f656932ef12357cf3c7fdcc_U256),
    uint!(0xffe5caca7e10e4e61c3624eaa0941cd0_U256),
    uint!(0xffcb9843d60f6159c9db58835c926644_U256),
    uint!(0xff973b41fa98c081472e6896dfb254c0_U256),
    uint!(0xff2ea16466c96a3843ec78b326b52861_U256),
    uint!(0xfe5dee046a99a2a811c461f1969c3053_U256),
    uint!(0xfcbe86c7900a88aedcffc83b479aa3a4_U256),
    uint!(0xf987a7253ac413176f2b074cf7815e54_U256),
    uint!(0xf3392b0822b70005940c7a398e4b70f3_U256),
    uint!(0xe7159475a2c29b7443b29c7fa6e889d9_U256),
    uint!(0xd097f3bdfd2022b8845ad8f792aa5825_U256),
    uint!(0xa9f746462d870fdf8a65dc1f90e061e5_U256),
    uint!(0x70d869a156d2a1b890bb3df62baf32f7_U256),
    uint!(0x31be135f97d08fd981231505542fcfa6_U256),
    uint!(0x9aa508b5b7a84e1c677de54f3e99bc9_U256),
    uint!(0x5d6af8dedb81196699c329225ee604_U256),
    uint!(0x2216e584f5fa1ea926041bedfe98_U256),
    uint!(0x48a170391f7dc42444e8fa2_U256),
];

const LOW_32_BITS: U256 = uint!(0xffffffff_U256);

/// log_sqrt(1.0001)(2) as a 128.128 fixed point number.
const LOG_SQRT10001_FACTOR: U256 = uint!(255738958999603826347141_U256);
const TICK_LOW_ERROR: U256 = uint!(3402992956809132418596140100660247210_U256);
const TICK_HI_ERROR: U256 = uint!(291339464771989622907027621153398088495_U256);

// ============================================
// Tick to Price Conversion
// ============================================

/// Convert a tick to sqrt price ratio (Q64.96 format)
///
/// Computes sqrt(1.0001^tick) * 2^96, rounded up, exactly as the pool does.
pub fn sqrt_ratio_at_tick(tick: i32) -> Result<U256, MathError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(MathError::TickOutOfRange(tick));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 { RATIO_BIT0 } else { Q128 };
    for (bit, multiplier) in TICK_MULTIPLIERS.iter().enumerate() {
        if abs_tick & (1u32 << (bit + 1)) != 0 {
            // ratio <= 2^128 and multiplier < 2^128, the product fits 256 bits
            ratio = (ratio * *multiplier) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 -> Q64.96, rounding up
    let round_up = if (ratio & LOW_32_BITS).is_zero() { U256::ZERO } else { U256::from(1u8) };
    Ok((ratio >> 32) + round_up)
}

// ============================================
// Price to Tick Conversion
// ============================================

/// Greatest tick `t` with `sqrt_ratio_at_tick(t) <= sqrt_price_x96`.
///
/// `MAX_SQRT_RATIO` itself maps to `MAX_TICK`.
pub fn tick_at_sqrt_ratio(sqrt_price_x96: U256) -> Result<i32, MathError> {
    if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 > MAX_SQRT_RATIO {
        return Err(MathError::SqrtRatioOutOfRange(sqrt_price_x96));
    }
    if sqrt_price_x96 == MAX_SQRT_RATIO {
        return Ok(MAX_TICK);
    }

    let ratio: U256 = sqrt_price_x96 << 32;
    let msb = ratio.bit_len() - 1;

    let mut r: U256 = if msb >= 128 { ratio >> (msb - 127) } else { ratio << (127 - msb) };
    let mut log_2: i128 = (msb as i128 - 128) << 64;

    for shift in (50..=63).rev() {
        r = (r * r) >> 127;
        let f: U256 = r >> 128;
        if !f.is_zero() {
            log_2 |= 1i128 << shift;
            r >>= 1;
        }
    }

    let log_2 = I256::try_from(log_2).map_err(|_| MathError::Overflow)?;
    let log_sqrt10001 = log_2 * I256::from_raw(LOG_SQRT10001_FACTOR);

    let tick_low = (log_sqrt10001 - I256::from_raw(TICK_LOW_ERROR)).asr(128).as_i32();
    let tick_hi = (log_sqrt10001 + I256::from_raw(TICK_HI_ERROR)).asr(128).as_i32();

    if tick_low == tick_hi {
        Ok(tick_low)
    } else if sqrt_ratio_at_tick(tick_hi)? <= sqrt_price_x96 {
        Ok(tick_hi)
    } else {
        Ok(tick_low)
    }
}
