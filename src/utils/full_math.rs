//! 512-bit intermediate multiply-divide, as in Uniswap V3's FullMath.sol.

use alloy::primitives::{U256, U512};

use crate::error::MathError;

#[inline]
fn widen(x: U256) -> U512 {
    let l = x.as_limbs();
    U512::from_limbs([l[0], l[1], l[2], l[3], 0, 0, 0, 0])
}

#[inline]
fn narrow(x: U512) -> Result<U256, MathError> {
    let l = x.as_limbs();
    if l[4..].iter().any(|&limb| limb != 0) {
        return Err(MathError::Overflow);
    }
    Ok(U256::from_limbs([l[0], l[1], l[2], l[3]]))
}

/// floor(a * b / denominator) without intermediate overflow.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    narrow(widen(a) * widen(b) / widen(denominator))
}

/// ceil(a * b / denominator) without intermediate overflow.
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = widen(a) * widen(b);
    let denominator = widen(denominator);
    let mut result = product / denominator;
    if !(product % denominator).is_zero() {
        result += U512::from_limbs([1, 0, 0, 0, 0, 0, 0, 0]);
    }
    narrow(result)
}

/// ceil(a / b).
pub fn div_rounding_up(a: U256, b: U256) -> Result<U256, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let quotient = a / b;
    if (a % b).is_zero() {
        Ok(quotient)
    } else {
        Ok(quotient + U256::from(1u8))
    }
}
