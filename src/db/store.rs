//! Collaborator interfaces the replay core consumes.
//!
//! Every method reports I/O failures as `anyhow::Error`; expected absence is
//! an `Option`. The core decides whether absence is fatal.

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::db::models::{OperationRecord, PricePoint, UserLedgerEntry, VaultSnapshot, VaultStatic};

/// Source of already-decoded hypervisor operations.
#[async_trait]
pub trait OperationSource: Send + Sync {
    /// Operations of `hypervisor` in `[block_ini, block_end]`, ascending by
    /// `(block_number, log_index)`. `block_end = None` means up to the tip.
    async fn fetch_operations(
        &self,
        hypervisor: &str,
        block_ini: u64,
        block_end: Option<u64>,
    ) -> anyhow::Result<Vec<OperationRecord>>;
}

/// Point-lookup USD price store. Last write wins per (network, block, token).
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn get_price(
        &self,
        network: &str,
        block: u64,
        token_address: &str,
    ) -> anyhow::Result<Option<PricePoint>>;

    async fn set_price(&self, price: &PricePoint) -> anyhow::Result<()>;
}

/// External price feed (oracle, aggregator API) consulted on a store miss.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Tag persisted alongside prices coming from this source.
    fn name(&self) -> &str;

    async fn fetch_price(
        &self,
        network: &str,
        token_address: &str,
        block: u64,
    ) -> anyhow::Result<Option<f64>>;
}

/// Append-only user ledger. Appends are idempotent on the entry's natural key.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, entry: &UserLedgerEntry) -> anyhow::Result<()>;

    async fn append_bulk(&self, entries: &[UserLedgerEntry]) -> anyhow::Result<()>;

    /// Last `n` distinct blocks present in the ledger for `hypervisor`,
    /// highest first.
    async fn last_blocks(&self, hypervisor: &str, n: usize) -> anyhow::Result<Vec<u64>>;

    /// Share balance of every user with entries strictly before `before_block`.
    async fn shares_by_user(
        &self,
        hypervisor: &str,
        before_block: u64,
    ) -> anyhow::Result<Vec<(String, BigDecimal)>>;

    /// Supply at `(block, log_index)` inclusive: the fold of every mint and
    /// burn share delta up to that position.
    async fn total_shares_at(
        &self,
        hypervisor: &str,
        block: u64,
        log_index: u32,
    ) -> anyhow::Result<BigDecimal>;
}

#[async_trait]
pub trait VaultMetadataProvider: Send + Sync {
    async fn static_info(&self, hypervisor: &str) -> anyhow::Result<Option<VaultStatic>>;
}

#[async_trait]
pub trait VaultSnapshotSource: Send + Sync {
    async fn snapshot_at(&self, hypervisor: &str, block: u64) -> anyhow::Result<Option<VaultSnapshot>>;
}

/// Reward/staking contracts whose share transfers are not tracked.
#[async_trait]
pub trait RewarderRegistry: Send + Sync {
    async fn rewarders(&self, network: &str) -> anyhow::Result<Vec<String>>;
}
