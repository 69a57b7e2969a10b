use std::{sync::Arc, time::Duration};

use alloy::primitives::U256;
use bigdecimal::BigDecimal;
use log::{debug, error, info, warn};
use num_traits::{FromPrimitive, Zero};
use tokio::task::JoinSet;

use crate::{
    config::ReplaySettings,
    db::{
        models::{Operation, OperationKind, PerShare, UserLedgerEntry, VaultStatic, PROTOCOL_USER},
        LedgerStore, Stores, VaultSnapshotSource,
    },
    error::{PriceError, ReplayErrorKind},
    utils::{checked_ratio, decimal_to_f64, u256_to_decimal},
    worker::{policy::ProtocolFeePolicy, price_resolver::PriceResolver, shares::SharesIndex},
};

/// Result of one fee distribution that reached the holders.
#[derive(Debug, Clone)]
pub struct FeeDistribution {
    pub total_shares: BigDecimal,
    pub gamma_fee0: BigDecimal,
    pub gamma_fee1: BigDecimal,
    pub user_fee0: BigDecimal,
    pub user_fee1: BigDecimal,
    /// Sum of every holder's `shares / total_shares`
    pub percentage_sum: BigDecimal,
    pub holders: usize,
    pub price_usd_share: Option<BigDecimal>,
    /// USD value of user fees no tracked holder received
    pub usd_remainder: BigDecimal,
}

#[derive(Debug, Clone)]
pub enum FeeOutcome {
    /// No supply at the event's position
    NoShares,
    /// Nothing left for users after the protocol cut
    NoFees,
    Distributed(FeeDistribution),
}

/// Read-only inputs of the per-holder fee share computation.
struct FeeShareContext {
    template: UserLedgerEntry,
    total_shares: BigDecimal,
    user_fee0: BigDecimal,
    user_fee1: BigDecimal,
}

impl FeeShareContext {
    fn share(&self, user: &str, shares: &BigDecimal) -> (BigDecimal, UserLedgerEntry) {
        let percentage = shares / &self.total_shares;

        let mut entry = self.template.clone();
        entry.user_address = user.to_string();
        entry.fees_token0_in = &self.user_fee0 * &percentage;
        entry.fees_token1_in = &self.user_fee1 * &percentage;
        (percentage, entry)
    }

    fn shares_for(&self, holders: &[(String, BigDecimal)]) -> Vec<(BigDecimal, UserLedgerEntry)> {
        holders
            .iter()
            .map(|(user, shares)| self.share(user, shares))
            .collect()
    }
}

/// Fee & share accounting for one hypervisor.
///
/// Owns the session's shares index and price resolver. Every ledger write of
/// the replay goes through [`AccountingEngine::commit`] so the index never
/// drifts from what was persisted.
pub struct AccountingEngine {
    network: String,
    vault: VaultStatic,
    ledger: Arc<dyn LedgerStore>,
    snapshots: Arc<dyn VaultSnapshotSource>,
    prices: PriceResolver,
    policy: ProtocolFeePolicy,
    shares: SharesIndex,
    worker_count: usize,
    tolerance: BigDecimal,
}

impl AccountingEngine {
    pub fn new(
        vault: VaultStatic,
        stores: &Stores,
        settings: &ReplaySettings,
        shares: SharesIndex,
    ) -> Self {
        let prices = PriceResolver::new(
            stores.prices.clone(),
            stores.price_sources.clone(),
            settings.price_cache_capacity,
            Duration::from_secs(settings.price_cache_ttl_secs),
            settings.price_block_adjacency,
        );

        Self {
            network: settings.network.clone(),
            vault,
            ledger: stores.ledger.clone(),
            snapshots: stores.snapshots.clone(),
            prices,
            policy: ProtocolFeePolicy::from(&settings.protocol_fee),
            shares,
            worker_count: settings.worker_count.max(1),
            tolerance: BigDecimal::from_f64(settings.distribution_tolerance).unwrap_or_default(),
        }
    }

    pub fn shares(&self) -> &SharesIndex {
        &self.shares
    }

    pub fn vault(&self) -> &VaultStatic {
        &self.vault
    }

    /// Persist `entries` in one bulk append, then fold them into the index.
    pub async fn commit(&mut self, entries: Vec<UserLedgerEntry>) -> Result<(), ReplayErrorKind> {
        if entries.is_empty() {
            return Ok(());
        }

        self.ledger
            .append_bulk(&entries)
            .await
            .map_err(ReplayErrorKind::Store)?;

        for entry in &entries {
            self.shares.apply(entry);
        }
        Ok(())
    }

    // ============================================
    // Prices
    // ============================================

    /// Price for a non-fee entry: a missing price is recorded as None.
    async fn best_effort_price(
        &self,
        token: &str,
        block: u64,
    ) -> Result<Option<BigDecimal>, ReplayErrorKind> {
        match self.prices.get_price(&self.network, token, block).await {
            Ok(price) => Ok(Some(price)),
            Err(e @ PriceError::NotFound { .. }) => {
                warn!("[{}] block {}: {}", self.vault.address, block, e);
                Ok(None)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// USD value of one share, when every input is known.
    fn share_price(
        per_share: Option<&PerShare>,
        price0: Option<&BigDecimal>,
        price1: Option<&BigDecimal>,
    ) -> Option<BigDecimal> {
        match (per_share, price0, price1) {
            (Some(per_share), Some(price0), Some(price1)) => {
                Some(&per_share.token0 * price0 + &per_share.token1 * price1)
            },
            _ => None,
        }
    }

    /// Fill the USD context of entries that do not move fees.
    pub async fn attach_prices(
        &self,
        entries: &mut [UserLedgerEntry],
        block: u64,
    ) -> Result<(), ReplayErrorKind> {
        if entries.is_empty() {
            return Ok(());
        }

        let price0 = self.best_effort_price(&self.vault.token0, block).await?;
        let price1 = self.best_effort_price(&self.vault.token1, block).await?;

        for entry in entries.iter_mut() {
            let per_share = match (
                &entry.underlying_token0_per_share,
                &entry.underlying_token1_per_share,
            ) {
                (Some(token0), Some(token1)) => Some(PerShare {
                    token0: token0.clone(),
                    token1: token1.clone(),
                }),
                _ => None,
            };
            entry.price_usd_share =
                Self::share_price(per_share.as_ref(), price0.as_ref(), price1.as_ref());
            entry.price_usd_token0 = price0.clone();
            entry.price_usd_token1 = price1.clone();
        }
        Ok(())
    }

    // ============================================
    // Underlying amounts
    // ============================================

    /// Per-share underlying from the vault snapshot at `block`, if one exists.
    pub async fn snapshot_per_share(&self, block: u64) -> Result<Option<PerShare>, ReplayErrorKind> {
        let snapshot = self
            .snapshots
            .snapshot_at(&self.vault.address, block)
            .await
            .map_err(ReplayErrorKind::Store)?;
        let Some(snapshot) = snapshot else {
            return Ok(None);
        };

        let (amount0, amount1) = snapshot.underlying_amounts()?;
        let supply = u256_to_decimal(snapshot.total_supply, self.vault.decimals_contract);
        Ok(per_share_of(
            &u256_to_decimal(amount0, self.vault.decimals_token0),
            &u256_to_decimal(amount1, self.vault.decimals_token1),
            &supply,
        ))
    }

    /// Raw vault-wide token totals at the fee event's position.
    async fn underlying_totals(&self, op: &Operation) -> Result<(U256, U256), ReplayErrorKind> {
        match &op.kind {
            OperationKind::Rebalance(rebalance) => {
                Ok((rebalance.total_amount0, rebalance.total_amount1))
            },
            _ => {
                let snapshot = self
                    .snapshots
                    .snapshot_at(&op.hypervisor_address, op.block_number)
                    .await
                    .map_err(ReplayErrorKind::Store)?
                    .ok_or(ReplayErrorKind::MissingSnapshot(op.block_number))?;
                snapshot.underlying_amounts()
            },
        }
    }

    // ============================================
    // Fee distribution
    // ============================================

    /// Split the fees collected by a Rebalance or ZeroBurn between the
    /// protocol and every current holder, pro rata to shares.
    pub async fn distribute_fees(&mut self, op: &Operation) -> Result<FeeOutcome, ReplayErrorKind> {
        let (qtty0, qtty1) = match &op.kind {
            OperationKind::Rebalance(rebalance) => (rebalance.qtty_token0, rebalance.qtty_token1),
            OperationKind::ZeroBurn(zero_burn) => (zero_burn.qtty_token0, zero_burn.qtty_token1),
            _ => return Ok(FeeOutcome::NoFees),
        };
        let hypervisor = op.hypervisor_address.as_str();
        let block = op.block_number;

        let total_shares = self
            .ledger
            .total_shares_at(hypervisor, block, op.log_index)
            .await
            .map_err(ReplayErrorKind::Store)?;

        let total_fee0 = u256_to_decimal(qtty0, op.decimals_token0);
        let total_fee1 = u256_to_decimal(qtty1, op.decimals_token1);
        let (gamma_fee0, user_fee0) = self.policy.split(self.vault.fee, &total_fee0);
        let (gamma_fee1, user_fee1) = self.policy.split(self.vault.fee, &total_fee1);

        if total_shares <= BigDecimal::zero() {
            info!(
                "[{}] block {}: {} collected fees with no shares outstanding",
                hypervisor,
                block,
                op.topic()
            );
            return Ok(FeeOutcome::NoShares);
        }
        if user_fee0.is_zero() && user_fee1.is_zero() {
            debug!("[{}] block {}: {} collected no fees", hypervisor, block, op.topic());
            return Ok(FeeOutcome::NoFees);
        }

        // Prices: one may be missing, both is fatal
        let price0 = self.prices.get_price(&self.network, &self.vault.token0, block).await;
        let price1 = self.prices.get_price(&self.network, &self.vault.token1, block).await;
        let (price0, price1) = match (price0, price1) {
            (Err(PriceError::Store(e)), _) | (_, Err(PriceError::Store(e))) => {
                return Err(ReplayErrorKind::Store(e))
            },
            (Err(e), Err(_)) => return Err(e.into()),
            (price0, price1) => (price0.ok(), price1.ok()),
        };
        if price0.is_none() || price1.is_none() {
            warn!(
                "[{}] block {}: distributing fees without a usd price for token{}",
                hypervisor,
                block,
                if price0.is_none() { 0 } else { 1 }
            );
        }

        let (amount0, amount1) = self.underlying_totals(op).await?;
        let underlying0 = u256_to_decimal(amount0, op.decimals_token0);
        let underlying1 = u256_to_decimal(amount1, op.decimals_token1);
        let per_share = op
            .per_share
            .clone()
            .or_else(|| per_share_of(&underlying0, &underlying1, &total_shares));
        let price_usd_share = match (&price0, &price1) {
            (Some(p0), Some(p1)) => Some((&underlying0 * p0 + &underlying1 * p1) / &total_shares),
            _ => None,
        };

        let mut template = UserLedgerEntry::new(PROTOCOL_USER, op).with_per_share(per_share.as_ref());
        template.price_usd_token0 = price0.clone();
        template.price_usd_token1 = price1.clone();
        template.price_usd_share = price_usd_share.clone();

        let mut protocol_entry = template.clone();
        protocol_entry.fees_token0_in = gamma_fee0.clone();
        protocol_entry.fees_token1_in = gamma_fee1.clone();

        // Fork-join over holders; nothing is written until every worker is done
        let holders = self.shares.holders();
        let context = Arc::new(FeeShareContext {
            template,
            total_shares: total_shares.clone(),
            user_fee0: user_fee0.clone(),
            user_fee1: user_fee1.clone(),
        });

        let chunk_size = holders.len().div_ceil(self.worker_count).max(1);
        let chunk_count = holders.len().div_ceil(chunk_size);
        let mut workers = JoinSet::new();
        for (index, chunk) in holders.chunks(chunk_size).enumerate() {
            let chunk = chunk.to_vec();
            let context = context.clone();
            workers.spawn_blocking(move || (index, context.shares_for(&chunk)));
        }

        let mut parts: Vec<Vec<(BigDecimal, UserLedgerEntry)>> = vec![Vec::new(); chunk_count];
        while let Some(joined) = workers.join_next().await {
            let (index, part) = joined.map_err(|e| ReplayErrorKind::Worker(e.to_string()))?;
            parts[index] = part;
        }

        let mut percentage_sum = BigDecimal::zero();
        let mut entries = Vec::with_capacity(holders.len() + 1);
        entries.push(protocol_entry);
        for (percentage, entry) in parts.into_iter().flatten() {
            percentage_sum += percentage;
            entries.push(entry);
        }

        let undistributed = BigDecimal::from(1) - &percentage_sum;
        let mut usd_remainder = BigDecimal::zero();
        if let Some(price0) = &price0 {
            usd_remainder += &undistributed * &user_fee0 * price0;
        }
        if let Some(price1) = &price1 {
            usd_remainder += &undistributed * &user_fee1 * price1;
        }

        if undistributed.abs() > self.tolerance {
            // Untracked holders (stakers inside reward contracts); never normalized
            error!(
                "[{}] block {}: fee percentages sum to {} across {} holders, {:.6} usd undistributed",
                hypervisor,
                block,
                percentage_sum,
                holders.len(),
                decimal_to_f64(&usd_remainder)
            );
        } else {
            info!(
                "[{}] block {}: {} fees distributed to {} holders, percentage sum {}",
                hypervisor,
                block,
                op.topic(),
                holders.len(),
                percentage_sum
            );
        }

        self.commit(entries).await?;

        Ok(FeeOutcome::Distributed(FeeDistribution {
            total_shares,
            gamma_fee0,
            gamma_fee1,
            user_fee0,
            user_fee1,
            percentage_sum,
            holders: holders.len(),
            price_usd_share,
            usd_remainder,
        }))
    }
}

/// Underlying tokens per share, or None without supply.
pub(crate) fn per_share_of(
    amount0: &BigDecimal,
    amount1: &BigDecimal,
    shares: &BigDecimal,
) -> Option<PerShare> {
    Some(PerShare {
        token0: checked_ratio(amount0, shares)?,
        token1: checked_ratio(amount1, shares)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{
        models::{
            vault::tests::idle_snapshot, PricePoint, RebalanceFees, ShareFlow, Topic, ZeroBurnFees,
        },
        MemoryStore, PriceStore,
    };
    use std::str::FromStr;

    pub(crate) const HYP: &str = "0xhyp";
    pub(crate) const TOKEN0: &str = "0xtoken0";
    pub(crate) const TOKEN1: &str = "0xtoken1";

    pub(crate) fn vault(fee: u32) -> VaultStatic {
        VaultStatic {
            address: HYP.to_string(),
            network: "ethereum".to_string(),
            dex: "uniswapv3".to_string(),
            fee,
            pool_address: "0xpool".to_string(),
            token0: TOKEN0.to_string(),
            token1: TOKEN1.to_string(),
            decimals_token0: 6,
            decimals_token1: 18,
            decimals_contract: 18,
        }
    }

    pub(crate) fn operation(block: u64, log_index: u32, kind: OperationKind) -> Operation {
        Operation {
            id: format!("0xtx{}_{}", block, log_index),
            hypervisor_address: HYP.to_string(),
            block_number: block,
            log_index,
            timestamp: 1_700_000_000,
            decimals_token0: 6,
            decimals_token1: 18,
            decimals_contract: 18,
            per_share: None,
            kind,
        }
    }

    pub(crate) async fn seed_prices(store: &MemoryStore, block: u64) {
        for (token, price) in [(TOKEN0, 1.0), (TOKEN1, 2000.0)] {
            store
                .set_price(&PricePoint::new("ethereum", block, token, price, "database"))
                .await
                .unwrap();
        }
    }

    /// Mint `shares` (whole units) to `user` through a committed deposit entry.
    async fn mint(engine: &mut AccountingEngine, block: u64, log_index: u32, user: &str, shares: u64) {
        let op = operation(
            block,
            log_index,
            OperationKind::Deposit(ShareFlow {
                sender: user.to_string(),
                to: user.to_string(),
                shares: U256::from(shares) * U256::from(10u64).pow(U256::from(18u8)),
                qtty_token0: U256::ZERO,
                qtty_token1: U256::ZERO,
            }),
        );
        let mut entry = UserLedgerEntry::new(user, &op);
        entry.shares_in = BigDecimal::from(shares);
        engine.commit(vec![entry]).await.unwrap();
    }

    fn engine(store: &Arc<MemoryStore>, fee: u32) -> AccountingEngine {
        let settings = ReplaySettings::new("ethereum");
        AccountingEngine::new(
            vault(fee),
            &Stores::memory(store.clone()),
            &settings,
            SharesIndex::new(),
        )
    }

    fn rebalance(block: u64, log_index: u32, fee0: u64, fee1: u64) -> Operation {
        operation(
            block,
            log_index,
            OperationKind::Rebalance(RebalanceFees {
                tick: 0,
                total_amount0: U256::from(5_000_000u64),
                total_amount1: U256::ZERO,
                qtty_token0: U256::from(fee0),
                qtty_token1: U256::from(fee1),
                total_supply: U256::ZERO,
            }),
        )
    }

    fn fees_of<'a>(entries: &'a [UserLedgerEntry], user: &str, block: u64) -> &'a UserLedgerEntry {
        entries
            .iter()
            .find(|e| e.user_address == user && e.block_number == block)
            .unwrap()
    }

    #[tokio::test]
    async fn test_pro_rata_split() {
        let store = Arc::new(MemoryStore::new());
        seed_prices(&store, 20).await;
        // fee 0 keeps nothing for the protocol
        let mut engine = engine(&store, 0);
        mint(&mut engine, 10, 0, "0xa", 60).await;
        mint(&mut engine, 11, 0, "0xb", 40).await;

        // 10 token0 with 6 decimals
        let outcome = engine.distribute_fees(&rebalance(20, 1, 10_000_000, 0)).await.unwrap();
        let FeeOutcome::Distributed(summary) = outcome else {
            panic!("expected a distribution, got {:?}", outcome);
        };
        assert_eq!(summary.total_shares, BigDecimal::from(100));
        assert_eq!(summary.user_fee0, BigDecimal::from(10));
        assert_eq!(summary.percentage_sum, BigDecimal::from(1));
        assert_eq!(summary.holders, 2);

        let entries = store.entries(HYP).await;
        assert_eq!(fees_of(&entries, "0xa", 20).fees_token0_in, BigDecimal::from(6));
        assert_eq!(fees_of(&entries, "0xb", 20).fees_token0_in, BigDecimal::from(4));
        assert_eq!(fees_of(&entries, "0xa", 20).shares_delta(), BigDecimal::zero());
    }

    #[tokio::test]
    async fn test_protocol_cut_single_holder() {
        let store = Arc::new(MemoryStore::new());
        seed_prices(&store, 20).await;
        let mut engine = engine(&store, 10);
        mint(&mut engine, 10, 0, "0xholder", 500).await;

        let outcome = engine.distribute_fees(&rebalance(20, 1, 1_000_000, 0)).await.unwrap();
        let FeeOutcome::Distributed(summary) = outcome else {
            panic!("expected a distribution, got {:?}", outcome);
        };
        assert_eq!(summary.percentage_sum, BigDecimal::from(1));
        assert_eq!(summary.usd_remainder, BigDecimal::zero());

        let entries = store.entries(HYP).await;
        let protocol = fees_of(&entries, PROTOCOL_USER, 20);
        let holder = fees_of(&entries, "0xholder", 20);
        assert_eq!(protocol.fees_token0_in, BigDecimal::from_str("0.1").unwrap());
        assert_eq!(holder.fees_token0_in, BigDecimal::from_str("0.9").unwrap());
        assert_eq!(holder.fees_token1_in, BigDecimal::zero());
        assert_eq!(holder.price_usd_token1, Some(BigDecimal::from(2000)));
        // 5 token0 backing 500 shares at 1 usd
        assert_eq!(holder.price_usd_share, Some(BigDecimal::from_str("0.01").unwrap()));
    }

    #[tokio::test]
    async fn test_total_shares_is_taken_at_the_event_position() {
        let store = Arc::new(MemoryStore::new());
        seed_prices(&store, 20).await;
        let mut engine = engine(&store, 0);
        mint(&mut engine, 10, 0, "0xa", 50).await;
        // minted after the rebalance in the same block
        let mut late = UserLedgerEntry::new("0xb", &rebalance(20, 5, 0, 0));
        late.topic = Topic::Deposit;
        late.shares_in = BigDecimal::from(50);
        store.append(&late).await.unwrap();

        let outcome = engine.distribute_fees(&rebalance(20, 1, 1_000_000, 0)).await.unwrap();
        let FeeOutcome::Distributed(summary) = outcome else {
            panic!("expected a distribution, got {:?}", outcome);
        };
        assert_eq!(summary.total_shares, BigDecimal::from(50));
    }

    #[tokio::test]
    async fn test_untracked_supply_leaves_a_remainder() {
        let store = Arc::new(MemoryStore::new());
        seed_prices(&store, 20).await;
        let mut engine = engine(&store, 0);
        mint(&mut engine, 10, 0, "0xa", 80).await;
        mint(&mut engine, 10, 1, "0xrewarder", 20).await;
        // shares moved into a staking contract are not tracked as a holder
        engine.shares = SharesIndex::from_balances(vec![("0xa".to_string(), BigDecimal::from(80))]);

        let outcome = engine.distribute_fees(&rebalance(20, 1, 10_000_000, 0)).await.unwrap();
        let FeeOutcome::Distributed(summary) = outcome else {
            panic!("expected a distribution, got {:?}", outcome);
        };
        assert_eq!(summary.percentage_sum, BigDecimal::from_str("0.8").unwrap());
        // 20% of 10 token0 at 1 usd
        assert_eq!(summary.usd_remainder, BigDecimal::from(2));
    }

    #[tokio::test]
    async fn test_early_exits() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine(&store, 10);

        assert!(matches!(
            engine.distribute_fees(&rebalance(20, 1, 1_000_000, 0)).await.unwrap(),
            FeeOutcome::NoShares
        ));

        mint(&mut engine, 10, 0, "0xa", 1).await;
        assert!(matches!(
            engine.distribute_fees(&rebalance(21, 1, 0, 0)).await.unwrap(),
            FeeOutcome::NoFees
        ));
        assert_eq!(store.ledger_len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_prices() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine(&store, 10);
        mint(&mut engine, 10, 0, "0xa", 1).await;

        let result = engine.distribute_fees(&rebalance(20, 1, 1_000_000, 0)).await;
        assert!(matches!(result, Err(ReplayErrorKind::MissingPrice(_))));
        assert_eq!(store.ledger_len().await, 1);

        // one price is enough
        store
            .set_price(&PricePoint::new("ethereum", 30, TOKEN0, 1.0, "database"))
            .await
            .unwrap();
        let outcome = engine.distribute_fees(&rebalance(30, 1, 1_000_000, 0)).await.unwrap();
        let FeeOutcome::Distributed(summary) = outcome else {
            panic!("expected a distribution, got {:?}", outcome);
        };
        assert_eq!(summary.price_usd_share, None);
        let entries = store.entries(HYP).await;
        assert_eq!(fees_of(&entries, "0xa", 30).price_usd_token1, None);
    }

    struct UnreachablePrices;

    #[async_trait::async_trait]
    impl PriceStore for UnreachablePrices {
        async fn get_price(
            &self,
            _network: &str,
            _block: u64,
            _token_address: &str,
        ) -> anyhow::Result<Option<PricePoint>> {
            Err(anyhow::anyhow!("connection reset"))
        }

        async fn set_price(&self, _price: &PricePoint) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("connection reset"))
        }
    }

    #[tokio::test]
    async fn test_price_store_outage_is_a_store_failure() {
        let store = Arc::new(MemoryStore::new());
        let mut stores = Stores::memory(store.clone());
        stores.prices = Arc::new(UnreachablePrices);
        let mut engine = AccountingEngine::new(
            vault(10),
            &stores,
            &ReplaySettings::new("ethereum"),
            SharesIndex::new(),
        );
        mint(&mut engine, 10, 0, "0xa", 1).await;

        let err = engine.distribute_fees(&rebalance(20, 1, 1_000_000, 0)).await.unwrap_err();
        assert!(matches!(err, ReplayErrorKind::Store(_)), "got {:?}", err);
        assert_eq!(store.ledger_len().await, 1);
    }

    #[test]
    fn test_price_errors_are_classified() {
        let not_found = PriceError::NotFound {
            network: "ethereum".to_string(),
            token: TOKEN0.to_string(),
            block: 20,
        };
        assert!(matches!(
            ReplayErrorKind::from(not_found),
            ReplayErrorKind::MissingPrice(PriceError::NotFound { block: 20, .. })
        ));
        assert!(matches!(
            ReplayErrorKind::from(PriceError::Store(anyhow::anyhow!("timeout"))),
            ReplayErrorKind::Store(_)
        ));
    }

    #[tokio::test]
    async fn test_zero_burn_uses_snapshot() {
        let store = Arc::new(MemoryStore::new());
        seed_prices(&store, 20).await;
        let mut engine = engine(&store, 10);
        mint(&mut engine, 10, 0, "0xa", 10).await;

        let zero_burn = operation(
            20,
            2,
            OperationKind::ZeroBurn(ZeroBurnFees {
                fee: 10,
                qtty_token0: U256::from(1_000_000u64),
                qtty_token1: U256::ZERO,
            }),
        );
        assert!(matches!(
            engine.distribute_fees(&zero_burn).await,
            Err(ReplayErrorKind::MissingSnapshot(20))
        ));

        // 20 token0 idle in the vault
        store.insert_snapshot(idle_snapshot(HYP, 20, 20_000_000, 0)).await;
        let FeeOutcome::Distributed(summary) = engine.distribute_fees(&zero_burn).await.unwrap() else {
            panic!("expected a distribution");
        };
        assert_eq!(summary.price_usd_share, Some(BigDecimal::from(2)));

        let entries = store.entries(HYP).await;
        assert_eq!(
            fees_of(&entries, "0xa", 20).underlying_token0_per_share,
            Some(BigDecimal::from(2))
        );
    }

    #[tokio::test]
    async fn test_many_holders_fan_out() {
        let store = Arc::new(MemoryStore::new());
        seed_prices(&store, 20).await;
        let mut engine = engine(&store, 0);
        for i in 0..25u32 {
            mint(&mut engine, 10, i, &format!("0x{:02}", i), 4).await;
        }

        let FeeOutcome::Distributed(summary) =
            engine.distribute_fees(&rebalance(20, 1, 100_000_000, 0)).await.unwrap()
        else {
            panic!("expected a distribution");
        };
        assert_eq!(summary.holders, 25);
        assert_eq!(summary.percentage_sum, BigDecimal::from(1));

        let entries = store.entries(HYP).await;
        let fee_entries: Vec<_> = entries
            .iter()
            .filter(|e| e.block_number == 20 && e.user_address != PROTOCOL_USER)
            .collect();
        assert_eq!(fee_entries.len(), 25);
        assert!(fee_entries.iter().all(|e| e.fees_token0_in == BigDecimal::from(4)));
    }
}
