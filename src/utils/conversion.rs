//! Type conversion and formatting utilities.
//!
//! Functions for converting between on-chain integers (U256) and exact
//! decimals (BigDecimal) with proper decimal handling.

use std::str::FromStr;

use alloy::primitives::{hex, U256};
use bigdecimal::BigDecimal;
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};

// ============================================
// Hex Encoding
// ============================================

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ============================================
// U256 Conversions
// ============================================

/// Convert a U256 to an exact BigDecimal scaled down by `decimals`.
///
/// No precision is lost: the integer becomes the unscaled value and
/// `decimals` the scale.
///
/// # Example
/// ```ignore
/// let value = U256::from(1_000_000u64);
/// let adjusted = u256_to_decimal(value, 6); // 1.000000
/// ```
pub fn u256_to_decimal(value: U256, decimals: u8) -> BigDecimal {
    let bytes: [u8; 32] = value.to_le_bytes();
    let big_int = BigInt::from_bytes_le(Sign::Plus, &bytes);
    BigDecimal::new(big_int, decimals as i64)
}

/// Decimal form of a stored float price.
///
/// Goes through the shortest round-trip representation so `0.1` stays `0.1`
/// instead of its exact binary expansion. Non-finite and non-positive values
/// are not prices and yield None.
pub fn price_to_decimal(price: f64) -> Option<BigDecimal> {
    if !price.is_finite() || price <= 0.0 {
        return None;
    }
    BigDecimal::from_str(&price.to_string()).ok()
}

/// Lossy conversion for log output only.
pub fn decimal_to_f64(value: &BigDecimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// `numerator / denominator`, or None when the denominator is zero.
pub fn checked_ratio(numerator: &BigDecimal, denominator: &BigDecimal) -> Option<BigDecimal> {
    if denominator.is_zero() {
        None
    } else {
        Some(numerator / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_to_decimal_is_exact() {
        let value = U256::from(1_000_000u64);
        assert_eq!(u256_to_decimal(value, 6), BigDecimal::from(1));

        // beyond f64 precision
        let value = U256::from_str("123456789012345678901234567890").unwrap();
        assert_eq!(
            u256_to_decimal(value, 18),
            BigDecimal::from_str("123456789012.345678901234567890").unwrap()
        );
    }

    #[test]
    fn test_checked_ratio() {
        let sixty = BigDecimal::from(60);
        assert_eq!(
            checked_ratio(&sixty, &BigDecimal::from(100)),
            Some(BigDecimal::from_str("0.6").unwrap())
        );
        assert_eq!(checked_ratio(&sixty, &BigDecimal::zero()), None);
    }

    #[test]
    fn test_price_to_decimal() {
        assert_eq!(price_to_decimal(0.1), Some(BigDecimal::from_str("0.1").unwrap()));
        assert_eq!(price_to_decimal(2500.0), Some(BigDecimal::from(2500)));
        assert_eq!(price_to_decimal(0.0), None);
        assert_eq!(price_to_decimal(f64::NAN), None);
        assert_eq!(price_to_decimal(-1.0), None);
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[0xab, 0x01]), "0xab01");
    }
}
