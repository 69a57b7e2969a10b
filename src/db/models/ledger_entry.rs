use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Operation, PerShare, Topic};

/// Reserved ledger identity that receives the vault operator's fee cut.
pub const PROTOCOL_USER: &str = "protocol";

/// Natural key of a ledger row. Appends are idempotent on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerKey {
    pub hypervisor_address: String,
    pub block_number: u64,
    pub log_index: u32,
    pub user_address: String,
}

/// One append-only row of a user's accounting history for a hypervisor.
///
/// Amounts are decimal-adjusted token/share units. Current balances are the
/// running sum of `*_in - *_out` over a user's rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLedgerEntry {
    // Natural key
    pub user_address: String,
    pub hypervisor_address: String,
    pub block_number: u64,
    pub log_index: u32,

    pub timestamp: DateTime<Utc>,
    pub topic: Topic,

    // Underlying token flows
    pub token0_in: BigDecimal,
    pub token1_in: BigDecimal,
    pub token0_out: BigDecimal,
    pub token1_out: BigDecimal,

    // Share flows
    pub shares_in: BigDecimal,
    pub shares_out: BigDecimal,

    // Fee entitlement
    pub fees_token0_in: BigDecimal,
    pub fees_token1_in: BigDecimal,

    // USD context at this block (None when unresolved, never zero-filled)
    pub price_usd_token0: Option<BigDecimal>,
    pub price_usd_token1: Option<BigDecimal>,
    pub price_usd_share: Option<BigDecimal>,

    pub underlying_token0_per_share: Option<BigDecimal>,
    pub underlying_token1_per_share: Option<BigDecimal>,
}

impl UserLedgerEntry {
    /// Empty row for `user` at the operation's position.
    pub fn new(user_address: &str, op: &Operation) -> Self {
        Self {
            user_address: user_address.to_string(),
            hypervisor_address: op.hypervisor_address.clone(),
            block_number: op.block_number,
            log_index: op.log_index,
            timestamp: DateTime::<Utc>::from_timestamp(op.timestamp as i64, 0).unwrap_or_default(),
            topic: op.topic(),
            token0_in: BigDecimal::default(),
            token1_in: BigDecimal::default(),
            token0_out: BigDecimal::default(),
            token1_out: BigDecimal::default(),
            shares_in: BigDecimal::default(),
            shares_out: BigDecimal::default(),
            fees_token0_in: BigDecimal::default(),
            fees_token1_in: BigDecimal::default(),
            price_usd_token0: None,
            price_usd_token1: None,
            price_usd_share: None,
            underlying_token0_per_share: None,
            underlying_token1_per_share: None,
        }
    }

    pub fn with_per_share(mut self, per_share: Option<&PerShare>) -> Self {
        self.underlying_token0_per_share = per_share.map(|p| p.token0.clone());
        self.underlying_token1_per_share = per_share.map(|p| p.token1.clone());
        self
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey {
            hypervisor_address: self.hypervisor_address.clone(),
            block_number: self.block_number,
            log_index: self.log_index,
            user_address: self.user_address.clone(),
        }
    }

    /// Signed share movement of this row.
    pub fn shares_delta(&self) -> BigDecimal {
        &self.shares_in - &self.shares_out
    }

    /// Deposits and withdrawals are the ledger's mints and burns.
    pub fn is_mint_or_burn(&self) -> bool {
        matches!(self.topic, Topic::Deposit | Topic::Withdraw)
    }
}
