use bigdecimal::BigDecimal;
use num_traits::Zero;

use crate::config::ProtocolFeeSettings;

/// Protocol fee cut applied to every fee collection.
///
/// A vault's static `fee` is a divisor: the operator keeps `1 / fee`. Some
/// historical vault records carry a fee at or above `anomaly_threshold`, which
/// is not a real divisor; those use `1 / fallback_denominator` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolFeePolicy {
    pub anomaly_threshold: u32,
    pub fallback_denominator: u32,
}

impl Default for ProtocolFeePolicy {
    fn default() -> Self {
        Self {
            anomaly_threshold: 100,
            fallback_denominator: 10,
        }
    }
}

impl From<&ProtocolFeeSettings> for ProtocolFeePolicy {
    fn from(settings: &ProtocolFeeSettings) -> Self {
        Self {
            anomaly_threshold: settings.anomaly_threshold,
            fallback_denominator: settings.fallback_denominator,
        }
    }
}

impl ProtocolFeePolicy {
    /// Share of collected fees kept by the protocol for a vault fee of `fee`.
    pub fn protocol_rate(&self, fee: u32) -> BigDecimal {
        let denominator = if fee >= self.anomaly_threshold {
            self.fallback_denominator
        } else {
            fee
        };

        if denominator == 0 {
            return BigDecimal::zero();
        }
        BigDecimal::from(1) / BigDecimal::from(denominator)
    }

    /// `(gamma_fee, user_fee)` split of `total_fee`.
    pub fn split(&self, fee: u32, total_fee: &BigDecimal) -> (BigDecimal, BigDecimal) {
        let gamma_fee = total_fee * self.protocol_rate(fee);
        let user_fee = total_fee - &gamma_fee;
        (gamma_fee, user_fee)
    }
}
