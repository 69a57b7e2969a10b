use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use num_traits::Zero;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

use crate::db::{
    models::{LedgerKey, OperationRecord, PricePoint, UserLedgerEntry, VaultSnapshot, VaultStatic},
    store::{
        LedgerStore, OperationSource, PriceStore, RewarderRegistry, VaultMetadataProvider,
        VaultSnapshotSource,
    },
};

type PriceKey = (String, u64, String);

/// In-process implementation of every collaborator.
///
/// Used for dry runs and as the fixture of the replay tests. The ledger is a
/// `BTreeMap` on the natural key, so re-appending an entry overwrites it.
#[derive(Default)]
pub struct MemoryStore {
    operations: RwLock<FxHashMap<String, Vec<OperationRecord>>>,
    prices: RwLock<FxHashMap<PriceKey, PricePoint>>,
    price_reads: AtomicUsize,
    ledger: RwLock<BTreeMap<LedgerKey, UserLedgerEntry>>,
    vaults: RwLock<FxHashMap<String, VaultStatic>>,
    snapshots: RwLock<FxHashMap<(String, u64), VaultSnapshot>>,
    rewarders: RwLock<FxHashMap<String, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== SEEDING ====================

    pub async fn insert_operations(&self, records: Vec<OperationRecord>) {
        let mut operations = self.operations.write().await;
        for record in records {
            operations
                .entry(record.hypervisor_address.to_lowercase())
                .or_default()
                .push(record);
        }
    }

    pub async fn insert_vault(&self, vault: VaultStatic) {
        self.vaults.write().await.insert(vault.address.to_lowercase(), vault);
    }

    pub async fn insert_snapshot(&self, snapshot: VaultSnapshot) {
        self.snapshots.write().await.insert(
            (snapshot.hypervisor_address.to_lowercase(), snapshot.block),
            snapshot,
        );
    }

    pub async fn insert_rewarders(&self, network: &str, rewarders: Vec<String>) {
        self.rewarders.write().await.insert(
            network.to_string(),
            rewarders.into_iter().map(|r| r.to_lowercase()).collect(),
        );
    }

    // ==================== INSPECTION ====================

    /// Every ledger entry of `hypervisor`, in (block, log_index, user) order.
    pub async fn entries(&self, hypervisor: &str) -> Vec<UserLedgerEntry> {
        let hypervisor = hypervisor.to_lowercase();
        self.ledger
            .read()
            .await
            .values()
            .filter(|e| e.hypervisor_address == hypervisor)
            .cloned()
            .collect()
    }

    pub async fn ledger_len(&self) -> usize {
        self.ledger.read().await.len()
    }

    /// Number of `get_price` calls served so far.
    pub fn price_reads(&self) -> usize {
        self.price_reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OperationSource for MemoryStore {
    async fn fetch_operations(
        &self,
        hypervisor: &str,
        block_ini: u64,
        block_end: Option<u64>,
    ) -> anyhow::Result<Vec<OperationRecord>> {
        let operations = self.operations.read().await;
        let mut records: Vec<OperationRecord> = operations
            .get(&hypervisor.to_lowercase())
            .map(|records| {
                records
                    .iter()
                    .filter(|r| {
                        r.block_number >= block_ini
                            && block_end.map_or(true, |end| r.block_number <= end)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|r| (r.block_number, r.log_index));
        Ok(records)
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn get_price(
        &self,
        network: &str,
        block: u64,
        token_address: &str,
    ) -> anyhow::Result<Option<PricePoint>> {
        self.price_reads.fetch_add(1, Ordering::Relaxed);
        let key = (network.to_string(), block, token_address.to_lowercase());
        Ok(self.prices.read().await.get(&key).cloned())
    }

    async fn set_price(&self, price: &PricePoint) -> anyhow::Result<()> {
        let key = (
            price.network.clone(),
            price.block,
            price.token_address.to_lowercase(),
        );
        self.prices.write().await.insert(key, price.clone());
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append(&self, entry: &UserLedgerEntry) -> anyhow::Result<()> {
        self.ledger.write().await.insert(entry.key(), entry.clone());
        Ok(())
    }

    async fn append_bulk(&self, entries: &[UserLedgerEntry]) -> anyhow::Result<()> {
        let mut ledger = self.ledger.write().await;
        for entry in entries {
            ledger.insert(entry.key(), entry.clone());
        }
        Ok(())
    }

    async fn last_blocks(&self, hypervisor: &str, n: usize) -> anyhow::Result<Vec<u64>> {
        let hypervisor = hypervisor.to_lowercase();
        let ledger = self.ledger.read().await;
        let mut blocks: Vec<u64> = ledger
            .keys()
            .filter(|k| k.hypervisor_address == hypervisor)
            .map(|k| k.block_number)
            .collect();
        blocks.dedup();
        blocks.reverse();
        blocks.truncate(n);
        Ok(blocks)
    }

    async fn shares_by_user(
        &self,
        hypervisor: &str,
        before_block: u64,
    ) -> anyhow::Result<Vec<(String, BigDecimal)>> {
        let hypervisor = hypervisor.to_lowercase();
        let ledger = self.ledger.read().await;
        let mut balances: BTreeMap<String, BigDecimal> = BTreeMap::new();
        for entry in ledger
            .values()
            .filter(|e| e.hypervisor_address == hypervisor && e.block_number < before_block)
        {
            *balances.entry(entry.user_address.clone()).or_default() += entry.shares_delta();
        }
        Ok(balances.into_iter().filter(|(_, shares)| !shares.is_zero()).collect())
    }

    async fn total_shares_at(
        &self,
        hypervisor: &str,
        block: u64,
        log_index: u32,
    ) -> anyhow::Result<BigDecimal> {
        let hypervisor = hypervisor.to_lowercase();
        let ledger = self.ledger.read().await;
        Ok(ledger
            .values()
            .filter(|e| {
                e.hypervisor_address == hypervisor
                    && e.is_mint_or_burn()
                    && (e.block_number, e.log_index) <= (block, log_index)
            })
            .fold(BigDecimal::zero(), |acc, e| acc + e.shares_delta()))
    }
}

#[async_trait]
impl VaultMetadataProvider for MemoryStore {
    async fn static_info(&self, hypervisor: &str) -> anyhow::Result<Option<VaultStatic>> {
        Ok(self.vaults.read().await.get(&hypervisor.to_lowercase()).cloned())
    }
}

#[async_trait]
impl VaultSnapshotSource for MemoryStore {
    async fn snapshot_at(&self, hypervisor: &str, block: u64) -> anyhow::Result<Option<VaultSnapshot>> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(&(hypervisor.to_lowercase(), block))
            .cloned())
    }
}

#[async_trait]
impl RewarderRegistry for MemoryStore {
    async fn rewarders(&self, network: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.rewarders.read().await.get(network).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Operation, OperationKind, ShareFlow, Topic};
    use alloy::primitives::U256;
    use std::str::FromStr;

    fn deposit(block: u64, log_index: u32, user: &str, shares: &str) -> UserLedgerEntry {
        let op = Operation {
            id: format!("0x{}_{}", block, log_index),
            hypervisor_address: "0xhyp".to_string(),
            block_number: block,
            log_index,
            timestamp: 0,
            decimals_token0: 18,
            decimals_token1: 18,
            decimals_contract: 18,
            per_share: None,
            kind: OperationKind::Deposit(ShareFlow {
                sender: user.to_string(),
                to: user.to_string(),
                shares: U256::ZERO,
                qtty_token0: U256::ZERO,
                qtty_token1: U256::ZERO,
            }),
        };
        let mut entry = UserLedgerEntry::new(user, &op);
        entry.shares_in = BigDecimal::from_str(shares).unwrap();
        entry
    }

    #[tokio::test]
    async fn test_append_is_idempotent_on_natural_key() {
        let store = MemoryStore::new();
        let entry = deposit(10, 1, "0xa", "5");
        store.append(&entry).await.unwrap();
        store.append_bulk(&[entry.clone(), entry]).await.unwrap();
        assert_eq!(store.ledger_len().await, 1);
    }

    #[tokio::test]
    async fn test_last_blocks_distinct_descending() {
        let store = MemoryStore::new();
        store
            .append_bulk(&[
                deposit(10, 1, "0xa", "1"),
                deposit(10, 2, "0xb", "1"),
                deposit(12, 0, "0xa", "1"),
                deposit(15, 3, "0xc", "1"),
            ])
            .await
            .unwrap();
        assert_eq!(store.last_blocks("0xHYP", 2).await.unwrap(), vec![15, 12]);
        assert_eq!(store.last_blocks("0xhyp", 10).await.unwrap(), vec![15, 12, 10]);
    }

    #[tokio::test]
    async fn test_share_folds() {
        let store = MemoryStore::new();
        let mut burn = deposit(12, 0, "0xa", "0");
        burn.topic = Topic::Withdraw;
        burn.shares_out = BigDecimal::from(2);
        store
            .append_bulk(&[deposit(10, 1, "0xa", "5"), deposit(11, 4, "0xb", "3"), burn])
            .await
            .unwrap();

        assert_eq!(
            store.total_shares_at("0xhyp", 11, 3).await.unwrap(),
            BigDecimal::from(5)
        );
        assert_eq!(
            store.total_shares_at("0xhyp", 12, 0).await.unwrap(),
            BigDecimal::from(6)
        );
        assert_eq!(
            store.shares_by_user("0xhyp", 12).await.unwrap(),
            vec![
                ("0xa".to_string(), BigDecimal::from(5)),
                ("0xb".to_string(), BigDecimal::from(3))
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_operations_filters_and_sorts() {
        let store = MemoryStore::new();
        let record = |block: u64, log_index: u32| OperationRecord {
            id: format!("0x{}_{}", block, log_index),
            hypervisor_address: "0xHyp".to_string(),
            block_number: block,
            log_index,
            timestamp: 0,
            topic: "approval".to_string(),
            decimals_token0: 18,
            decimals_token1: 18,
            decimals_contract: 18,
            token0_per_share: None,
            token1_per_share: None,
            payload: serde_json::Value::Null,
        };
        store
            .insert_operations(vec![record(5, 2), record(3, 0), record(5, 1), record(9, 0)])
            .await;

        let ids: Vec<String> = store
            .fetch_operations("0xhyp", 4, Some(8))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["0x5_1", "0x5_2"]);
    }
}
