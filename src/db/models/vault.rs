use std::{fmt, str::FromStr};

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{
    error::{MathError, ReplayErrorKind},
    utils::{get_amounts_for_liquidity, sqrt_ratio_at_tick, uncollected_fees, FeeGrowthInputs},
};

/// Immutable per-hypervisor metadata.
///
/// Primary Key: address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultStatic {
    pub address: String,
    pub network: String,
    pub dex: String,
    /// Protocol fee divisor: the operator keeps `1 / fee` of collected fees
    pub fee: u32,
    pub pool_address: String,
    pub token0: String,
    pub token1: String,
    pub decimals_token0: u8,
    pub decimals_token1: u8,
    pub decimals_contract: u8,
}

/// DEX families whose pool state the snapshot decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dex {
    UniswapV3,
    PancakeswapV3,
    SushiswapV3,
    Quickswap,
    Camelot,
    Thena,
    Zyberswap,
    Ramses,
}

impl FromStr for Dex {
    type Err = ReplayErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "uniswapv3" | "uniswap" => Ok(Dex::UniswapV3),
            "pancakeswapv3" | "pancakeswap" => Ok(Dex::PancakeswapV3),
            "sushiswapv3" | "sushi" => Ok(Dex::SushiswapV3),
            "quickswap" | "algebra" => Ok(Dex::Quickswap),
            "camelot" => Ok(Dex::Camelot),
            "thena" => Ok(Dex::Thena),
            "zyberswap" => Ok(Dex::Zyberswap),
            "ramses" => Ok(Dex::Ramses),
            _ => Err(ReplayErrorKind::UnknownDex(s.to_string())),
        }
    }
}

impl fmt::Display for Dex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dex::UniswapV3 => "uniswapv3",
            Dex::PancakeswapV3 => "pancakeswapv3",
            Dex::SushiswapV3 => "sushiswapv3",
            Dex::Quickswap => "quickswap",
            Dex::Camelot => "camelot",
            Dex::Thena => "thena",
            Dex::Zyberswap => "zyberswap",
            Dex::Ramses => "ramses",
        };
        f.write_str(name)
    }
}

/// One of the vault's pool positions (base or limit) at a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    pub tokens_owed0: U256,
    pub tokens_owed1: U256,
    pub fee_growth_inside0_last: U256,
    pub fee_growth_inside1_last: U256,
    pub fee_growth_outside0_lower: U256,
    pub fee_growth_outside1_lower: U256,
    pub fee_growth_outside0_upper: U256,
    pub fee_growth_outside1_upper: U256,
}

impl PositionSnapshot {
    /// Raw token amounts owned by the position: liquidity value, owed tokens
    /// and fees accrued since the last poke.
    fn amounts(
        &self,
        sqrt_price_x96: U256,
        tick_current: i32,
        fee_growth_global0: U256,
        fee_growth_global1: U256,
    ) -> Result<(U256, U256), MathError> {
        if self.liquidity == 0 {
            return Ok((self.tokens_owed0, self.tokens_owed1));
        }

        let (amount0, amount1) = get_amounts_for_liquidity(
            sqrt_price_x96,
            sqrt_ratio_at_tick(self.tick_lower)?,
            sqrt_ratio_at_tick(self.tick_upper)?,
            self.liquidity,
        )?;

        let fees0 = uncollected_fees(&FeeGrowthInputs {
            fee_growth_global: fee_growth_global0,
            fee_growth_outside_lower: self.fee_growth_outside0_lower,
            fee_growth_outside_upper: self.fee_growth_outside0_upper,
            fee_growth_inside_last: self.fee_growth_inside0_last,
            tick_current,
            liquidity: self.liquidity,
            tick_lower: self.tick_lower,
            tick_upper: self.tick_upper,
        })?;
        let fees1 = uncollected_fees(&FeeGrowthInputs {
            fee_growth_global: fee_growth_global1,
            fee_growth_outside_lower: self.fee_growth_outside1_lower,
            fee_growth_outside_upper: self.fee_growth_outside1_upper,
            fee_growth_inside_last: self.fee_growth_inside1_last,
            tick_current,
            liquidity: self.liquidity,
            tick_lower: self.tick_lower,
            tick_upper: self.tick_upper,
        })?;

        let total0 = amount0
            .checked_add(self.tokens_owed0)
            .and_then(|v| v.checked_add(fees0))
            .ok_or(MathError::Overflow)?;
        let total1 = amount1
            .checked_add(self.tokens_owed1)
            .and_then(|v| v.checked_add(fees1))
            .ok_or(MathError::Overflow)?;
        Ok((total0, total1))
    }
}

/// Vault and pool state at one block, as stored by the snapshot collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub hypervisor_address: String,
    pub block: u64,
    /// DEX discriminator, decoded with [`Dex`]
    pub dex: String,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub fee_growth_global0: U256,
    pub fee_growth_global1: U256,
    pub base: PositionSnapshot,
    pub limit: PositionSnapshot,
    /// Tokens held by the vault contract outside any position
    pub idle_token0: U256,
    pub idle_token1: U256,
    pub total_supply: U256,
}

impl VaultSnapshot {
    /// Total raw underlying token amounts of the vault at this block.
    ///
    /// Returns `(amount0, amount1)`
    pub fn underlying_amounts(&self) -> Result<(U256, U256), ReplayErrorKind> {
        let dex: Dex = self.dex.parse()?;
        log::debug!(
            "Decoding {} snapshot of {} at block {}",
            dex,
            self.hypervisor_address,
            self.block
        );

        let mut total0 = self.idle_token0;
        let mut total1 = self.idle_token1;

        for position in [&self.base, &self.limit] {
            let (amount0, amount1) = position.amounts(
                self.sqrt_price_x96,
                self.tick,
                self.fee_growth_global0,
                self.fee_growth_global1,
            )?;
            total0 = total0.checked_add(amount0).ok_or(MathError::Overflow)?;
            total1 = total1.checked_add(amount1).ok_or(MathError::Overflow)?;
        }

        Ok((total0, total1))
    }
}
