use std::time::Duration;

use bigdecimal::BigDecimal;
use log::{debug, error, info, warn};
use tokio::task::JoinSet;

use crate::{
    config::ReplaySettings,
    db::{
        models::{Operation, OperationKind, PerShare, ShareFlow, ShareTransfer, UserLedgerEntry},
        Stores,
    },
    error::{ReplayError, ReplayErrorKind},
    utils::{u256_to_decimal, ZERO_ADDRESS},
    worker::{
        accounting::{per_share_of, AccountingEngine, FeeOutcome},
        cursor::ReplayCursor,
        rewarders::RewarderCache,
        shares::SharesIndex,
    },
};

/// Placeholder operation id for failures outside any operation.
const NO_OPERATION: &str = "-";

/// What applying one operation did.
#[derive(Debug, Clone)]
pub enum Dispatched {
    /// Id already applied in this session
    Duplicate,
    /// Observed, no ledger effect
    Ignored,
    /// Ledger entries written for a deposit, withdrawal or transfer
    Entries(usize),
    /// Fee event handed to the accounting engine
    Fees(FeeOutcome),
}

#[derive(Debug, Clone, Default)]
pub struct ReplaySummary {
    pub hypervisor: String,
    pub from_block: u64,
    pub fetched: usize,
    pub applied: usize,
    pub duplicates: usize,
    pub ignored: usize,
    pub fee_distributions: usize,
    pub entries_written: usize,
    pub last_block: Option<u64>,
}

/// Replays one hypervisor's operations into the user ledger, strictly in
/// `(block, log_index)` order.
pub struct Dispatcher {
    hypervisor: String,
    network: String,
    from_block: u64,
    stores: Stores,
    engine: AccountingEngine,
    cursor: ReplayCursor,
    rewarders: RewarderCache,
}

impl Dispatcher {
    /// Start a replay session.
    ///
    /// Without an explicit `from_block` the session restarts at the
    /// second-to-last block already in the ledger, so a partially ingested
    /// last block is recomputed.
    pub async fn new(
        hypervisor: &str,
        from_block: Option<u64>,
        stores: Stores,
        settings: &ReplaySettings,
    ) -> Result<Self, ReplayError> {
        let hypervisor = hypervisor.to_lowercase();
        let fail = |block: u64, kind: ReplayErrorKind| {
            ReplayError::new(hypervisor.as_str(), block, NO_OPERATION, kind)
        };

        let vault = stores
            .vaults
            .static_info(&hypervisor)
            .await
            .map_err(|e| fail(0, ReplayErrorKind::Store(e)))?
            .ok_or_else(|| fail(0, ReplayErrorKind::MissingMetadata))?;
        if vault.network != settings.network {
            warn!(
                "[{}] vault is registered on {} but prices are resolved on {}",
                hypervisor, vault.network, settings.network
            );
        }

        let from_block = match from_block.or(settings.from_block) {
            Some(block) => block,
            None => {
                let blocks = stores
                    .ledger
                    .last_blocks(&hypervisor, 2)
                    .await
                    .map_err(|e| fail(0, ReplayErrorKind::Store(e)))?;
                blocks.last().copied().unwrap_or(0)
            },
        };

        let balances = stores
            .ledger
            .shares_by_user(&hypervisor, from_block)
            .await
            .map_err(|e| fail(from_block, ReplayErrorKind::Store(e)))?;
        let shares = SharesIndex::from_balances(balances);
        info!(
            "[{}] replay session from block {} with {} holders",
            hypervisor,
            from_block,
            shares.len()
        );

        let rewarders = RewarderCache::new(
            stores.rewarders.clone(),
            Duration::from_secs(settings.rewarder_refresh_secs),
        );
        let engine = AccountingEngine::new(vault, &stores, settings, shares);

        Ok(Self {
            network: settings.network.clone(),
            hypervisor,
            from_block,
            stores,
            engine,
            cursor: ReplayCursor::new(),
            rewarders,
        })
    }

    pub fn from_block(&self) -> u64 {
        self.from_block
    }

    pub fn engine(&self) -> &AccountingEngine {
        &self.engine
    }

    pub fn cursor(&self) -> &ReplayCursor {
        &self.cursor
    }

    /// Apply one operation: validate, dispatch by topic, then advance the cursor.
    pub async fn apply(&mut self, op: &Operation) -> Result<Dispatched, ReplayError> {
        let fail = |kind: ReplayErrorKind| {
            ReplayError::new(op.hypervisor_address.as_str(), op.block_number, op.id.as_str(), kind)
        };

        if let OperationKind::Deposit(flow) | OperationKind::Withdraw(flow) = &op.kind {
            if flow.sender != flow.to {
                return Err(fail(ReplayErrorKind::LegacyVault {
                    topic: op.topic().as_str(),
                    sender: flow.sender.clone(),
                    to: flow.to.clone(),
                }));
            }
        }

        if self.cursor.is_processed(&op.id) {
            debug!(
                "[{}] block {}: operation {} already processed, skipping",
                op.hypervisor_address, op.block_number, op.id
            );
            return Ok(Dispatched::Duplicate);
        }

        self.cursor
            .check_order(op.block_number, op.log_index)
            .map_err(fail)?;

        let dispatched = self.dispatch(op).await.map_err(fail)?;
        self.cursor.advance(&op.id, op.block_number, op.log_index);
        Ok(dispatched)
    }

    async fn dispatch(&mut self, op: &Operation) -> Result<Dispatched, ReplayErrorKind> {
        match &op.kind {
            OperationKind::Deposit(flow) => {
                let entry = Self::share_flow_entry(op, flow, true);
                self.write(vec![entry], op.block_number).await
            },
            OperationKind::Withdraw(flow) => {
                let entry = Self::share_flow_entry(op, flow, false);
                self.write(vec![entry], op.block_number).await
            },
            OperationKind::Transfer(transfer) => self.transfer(op, transfer).await,
            OperationKind::Rebalance(_) | OperationKind::ZeroBurn(_) => {
                Ok(Dispatched::Fees(self.engine.distribute_fees(op).await?))
            },
            OperationKind::Approval(_) | OperationKind::SetFee(_) => {
                debug!(
                    "[{}] block {}: {} has no ledger effect",
                    op.hypervisor_address,
                    op.block_number,
                    op.topic()
                );
                Ok(Dispatched::Ignored)
            },
        }
    }

    async fn write(
        &mut self,
        mut entries: Vec<UserLedgerEntry>,
        block: u64,
    ) -> Result<Dispatched, ReplayErrorKind> {
        let written = entries.len();
        self.engine.attach_prices(&mut entries, block).await?;
        self.engine.commit(entries).await?;
        Ok(Dispatched::Entries(written))
    }

    /// Deposit credits `to`; withdraw debits `sender`.
    fn share_flow_entry(op: &Operation, flow: &ShareFlow, deposit: bool) -> UserLedgerEntry {
        let shares = u256_to_decimal(flow.shares, op.decimals_contract);
        let token0 = u256_to_decimal(flow.qtty_token0, op.decimals_token0);
        let token1 = u256_to_decimal(flow.qtty_token1, op.decimals_token1);
        let per_share = op
            .per_share
            .clone()
            .or_else(|| per_share_of(&token0, &token1, &shares));

        let user = if deposit { &flow.to } else { &flow.sender };
        let mut entry = UserLedgerEntry::new(user, op).with_per_share(per_share.as_ref());
        if deposit {
            entry.shares_in = shares;
            entry.token0_in = token0;
            entry.token1_in = token1;
        } else {
            entry.shares_out = shares;
            entry.token0_out = token0;
            entry.token1_out = token1;
        }
        entry
    }

    async fn transfer(
        &mut self,
        op: &Operation,
        transfer: &ShareTransfer,
    ) -> Result<Dispatched, ReplayErrorKind> {
        // mint and burn halves are covered by Deposit and Withdraw
        if transfer.src == ZERO_ADDRESS || transfer.dst == ZERO_ADDRESS {
            debug!(
                "[{}] block {}: mint/burn transfer {} -> {} skipped",
                op.hypervisor_address, op.block_number, transfer.src, transfer.dst
            );
            return Ok(Dispatched::Ignored);
        }
        if transfer.src == transfer.dst {
            debug!(
                "[{}] block {}: self transfer of {} skipped",
                op.hypervisor_address, op.block_number, transfer.src
            );
            return Ok(Dispatched::Ignored);
        }

        for address in [&transfer.src, &transfer.dst] {
            let is_rewarder = self
                .rewarders
                .is_rewarder(&self.network, address)
                .await
                .map_err(ReplayErrorKind::Store)?;
            if is_rewarder {
                info!(
                    "[{}] block {}: transfer {} -> {} involves rewarder {}, not tracked",
                    op.hypervisor_address, op.block_number, transfer.src, transfer.dst, address
                );
                return Ok(Dispatched::Ignored);
            }
        }

        let shares = u256_to_decimal(transfer.qtty, op.decimals_contract);
        let per_share = match &op.per_share {
            Some(per_share) => Some(per_share.clone()),
            None => self.engine.snapshot_per_share(op.block_number).await?,
        };
        let (token0, token1) = match &per_share {
            Some(PerShare { token0, token1 }) => (&shares * token0, &shares * token1),
            None => {
                warn!(
                    "[{}] block {}: no underlying per share for transfer {}, recording shares only",
                    op.hypervisor_address, op.block_number, op.id
                );
                (BigDecimal::default(), BigDecimal::default())
            },
        };

        let mut debit = UserLedgerEntry::new(&transfer.src, op).with_per_share(per_share.as_ref());
        debit.shares_out = shares.clone();
        debit.token0_out = token0.clone();
        debit.token1_out = token1.clone();

        let mut credit = UserLedgerEntry::new(&transfer.dst, op).with_per_share(per_share.as_ref());
        credit.shares_in = shares;
        credit.token0_in = token0;
        credit.token1_in = token1;

        self.write(vec![debit, credit], op.block_number).await
    }

    /// Fetch every operation from the session start and apply it in order.
    pub async fn replay(&mut self) -> Result<ReplaySummary, ReplayError> {
        let records = self
            .stores
            .operations
            .fetch_operations(&self.hypervisor, self.from_block, None)
            .await
            .map_err(|e| {
                ReplayError::new(
                    self.hypervisor.as_str(),
                    self.from_block,
                    NO_OPERATION,
                    ReplayErrorKind::Store(e),
                )
            })?;

        let mut summary = ReplaySummary {
            hypervisor: self.hypervisor.clone(),
            from_block: self.from_block,
            fetched: records.len(),
            ..Default::default()
        };
        info!(
            "[{}] replaying {} operations from block {}",
            self.hypervisor,
            records.len(),
            self.from_block
        );

        for record in &records {
            let op = record.decode().map_err(|kind| {
                ReplayError::new(
                    record.hypervisor_address.to_lowercase(),
                    record.block_number,
                    record.id.as_str(),
                    kind,
                )
            })?;

            match self.apply(&op).await? {
                Dispatched::Duplicate => {
                    summary.duplicates += 1;
                    continue;
                },
                Dispatched::Ignored => summary.ignored += 1,
                Dispatched::Entries(written) => summary.entries_written += written,
                Dispatched::Fees(FeeOutcome::Distributed(distribution)) => {
                    summary.fee_distributions += 1;
                    // protocol entry plus one per holder
                    summary.entries_written += distribution.holders + 1;
                },
                Dispatched::Fees(_) => summary.ignored += 1,
            }
            summary.applied += 1;
            summary.last_block = Some(op.block_number);
        }

        info!(
            "[{}] replay done: {} applied, {} duplicates, {} fee distributions, {} entries, last block {:?}",
            self.hypervisor,
            summary.applied,
            summary.duplicates,
            summary.fee_distributions,
            summary.entries_written,
            summary.last_block
        );
        Ok(summary)
    }
}

/// Replay one hypervisor from `from_block` (or where the ledger left off).
pub async fn replay(
    hypervisor: &str,
    from_block: Option<u64>,
    stores: Stores,
    settings: &ReplaySettings,
) -> Result<ReplaySummary, ReplayError> {
    Dispatcher::new(hypervisor, from_block, stores, settings)
        .await?
        .replay()
        .await
}

/// Replay several hypervisors concurrently, one independent session each.
///
/// Results are returned in the order of `hypervisors`. A failed session does
/// not stop the others.
pub async fn replay_all(
    hypervisors: &[String],
    stores: Stores,
    settings: &ReplaySettings,
) -> Vec<Result<ReplaySummary, ReplayError>> {
    let mut sessions = JoinSet::new();
    for (index, hypervisor) in hypervisors.iter().cloned().enumerate() {
        let stores = stores.clone();
        let settings = settings.clone();
        sessions.spawn(async move { (index, replay(&hypervisor, None, stores, &settings).await) });
    }

    let mut results: Vec<Option<Result<ReplaySummary, ReplayError>>> =
        hypervisors.iter().map(|_| None).collect();
    while let Some(joined) = sessions.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => error!("Replay task aborted: {}", e),
        }
    }

    hypervisors
        .iter()
        .zip(results)
        .map(|(hypervisor, result)| {
            result.unwrap_or_else(|| {
                Err(ReplayError::new(
                    hypervisor.to_lowercase(),
                    0,
                    NO_OPERATION,
                    ReplayErrorKind::Worker("replay task aborted".to_string()),
                ))
            })
        })
        .collect()
}
