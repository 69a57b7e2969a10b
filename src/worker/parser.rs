use alloy::{
    primitives::{LogData, B256},
    rpc::types::Log,
    sol_types::SolEvent,
};
use rustc_hash::FxHashMap;

use crate::{
    abis::hypervisor,
    db::models::{
        FeeChange, Operation, OperationKind, RebalanceFees, ShareApproval, ShareFlow,
        ShareTransfer, VaultStatic, ZeroBurnFees,
    },
    error::ReplayErrorKind,
    utils::hex_encode,
};

fn address(bytes: &[u8]) -> String {
    hex_encode(bytes).to_lowercase()
}

fn decode<E: SolEvent>(data: &LogData) -> Result<E, ReplayErrorKind> {
    E::decode_log_data(data).map_err(|e| ReplayErrorKind::Decode(format!("{}: {}", E::SIGNATURE, e)))
}

/// Decode the event payload behind `topic0`, or `None` for non-hypervisor events.
fn decode_kind(topic0: &B256, data: &LogData) -> Result<Option<OperationKind>, ReplayErrorKind> {
    let kind = match topic0 {
        t if *t == hypervisor::Deposit::SIGNATURE_HASH => {
            let event: hypervisor::Deposit = decode(data)?;
            OperationKind::Deposit(ShareFlow {
                sender: address(event.sender.as_slice()),
                to: address(event.to.as_slice()),
                shares: event.shares,
                qtty_token0: event.amount0,
                qtty_token1: event.amount1,
            })
        },
        t if *t == hypervisor::Withdraw::SIGNATURE_HASH => {
            let event: hypervisor::Withdraw = decode(data)?;
            OperationKind::Withdraw(ShareFlow {
                sender: address(event.sender.as_slice()),
                to: address(event.to.as_slice()),
                shares: event.shares,
                qtty_token0: event.amount0,
                qtty_token1: event.amount1,
            })
        },
        t if *t == hypervisor::Transfer::SIGNATURE_HASH => {
            let event: hypervisor::Transfer = decode(data)?;
            OperationKind::Transfer(ShareTransfer {
                src: address(event.from.as_slice()),
                dst: address(event.to.as_slice()),
                qtty: event.value,
            })
        },
        t if *t == hypervisor::Rebalance::SIGNATURE_HASH => {
            let event: hypervisor::Rebalance = decode(data)?;
            OperationKind::Rebalance(RebalanceFees {
                tick: event.tick.as_i32(),
                total_amount0: event.totalAmount0,
                total_amount1: event.totalAmount1,
                qtty_token0: event.feeAmount0,
                qtty_token1: event.feeAmount1,
                total_supply: event.totalSupply,
            })
        },
        t if *t == hypervisor::ZeroBurn::SIGNATURE_HASH => {
            let event: hypervisor::ZeroBurn = decode(data)?;
            OperationKind::ZeroBurn(ZeroBurnFees {
                fee: event.fee,
                qtty_token0: event.fees0,
                qtty_token1: event.fees1,
            })
        },
        t if *t == hypervisor::Approval::SIGNATURE_HASH => {
            let event: hypervisor::Approval = decode(data)?;
            OperationKind::Approval(ShareApproval {
                owner: address(event.owner.as_slice()),
                spender: address(event.spender.as_slice()),
                value: event.value,
            })
        },
        t if *t == hypervisor::SetFee::SIGNATURE_HASH => {
            let event: hypervisor::SetFee = decode(data)?;
            OperationKind::SetFee(FeeChange { fee: event.newFee })
        },
        _ => return Ok(None),
    };

    Ok(Some(kind))
}

/// Decode one RPC log emitted by `vault` into an operation.
///
/// Returns `Ok(None)` for logs of other contracts and for events the
/// hypervisor does not define. A recognized event that fails to decode, or a
/// log without its block position, is a `Decode` error.
///
/// The timestamp comes from the log itself when the node provides it,
/// otherwise from `block_timestamps`.
pub fn parse_log(
    log: &Log,
    vault: &VaultStatic,
    block_timestamps: &FxHashMap<u64, u64>,
) -> Result<Option<Operation>, ReplayErrorKind> {
    let log_address = address(log.address().as_slice());
    if log_address != vault.address.to_lowercase() {
        return Ok(None);
    }

    let data = log.data();
    let Some(topic0) = data.topics().first() else {
        return Ok(None);
    };

    let Some(kind) = decode_kind(topic0, data)? else {
        return Ok(None);
    };

    let (Some(block_number), Some(log_index)) = (log.block_number, log.log_index) else {
        return Err(ReplayErrorKind::Decode(format!(
            "{} log of {} without block position",
            kind.topic(),
            log_address
        )));
    };
    let log_index = u32::try_from(log_index)
        .map_err(|_| ReplayErrorKind::Decode(format!("log index {} out of range", log_index)))?;

    let tx_hash = log
        .transaction_hash
        .as_ref()
        .map(|h| hex_encode(h.as_slice()))
        .unwrap_or_default();

    let timestamp = log
        .block_timestamp
        .or_else(|| block_timestamps.get(&block_number).copied())
        .unwrap_or(0);

    Ok(Some(Operation {
        id: format!("{}_{}", tx_hash, log_index),
        hypervisor_address: log_address,
        block_number,
        log_index,
        timestamp,
        decimals_token0: vault.decimals_token0,
        decimals_token1: vault.decimals_token1,
        decimals_contract: vault.decimals_contract,
        per_share: None,
        kind,
    }))
}

/// Decode a batch of logs, keeping only hypervisor operations, ordered by
/// `(block, log_index)`.
pub fn parse_logs<'a>(
    logs: impl IntoIterator<Item = &'a Log>,
    vault: &VaultStatic,
    block_timestamps: &FxHashMap<u64, u64>,
) -> Result<Vec<Operation>, ReplayErrorKind> {
    let mut operations = Vec::new();
    for log in logs {
        if let Some(operation) = parse_log(log, vault, block_timestamps)? {
            operations.push(operation);
        }
    }

    operations.sort_by_key(|op| op.position());
    Ok(operations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Topic;
    use crate::worker::accounting::tests::vault;
    use alloy::primitives::{aliases::I24, Address, U256};

    const VAULT: Address = Address::repeat_byte(0x11);
    const ALICE: Address = Address::repeat_byte(0xaa);
    const BOB: Address = Address::repeat_byte(0xbb);

    fn static_info() -> VaultStatic {
        let mut info = vault(10);
        info.address = address(VAULT.as_slice());
        info
    }

    fn rpc_log(emitter: Address, data: LogData, block: u64, log_index: u64) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: emitter,
                data,
            },
            block_hash: None,
            block_number: Some(block),
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(0x01)),
            transaction_index: None,
            log_index: Some(log_index),
            removed: false,
        }
    }

    #[test]
    fn test_parse_deposit() {
        let event = hypervisor::Deposit {
            sender: ALICE,
            to: ALICE,
            shares: U256::from(1_000u64),
            amount0: U256::from(5u64),
            amount1: U256::from(7u64),
        };
        let log = rpc_log(VAULT, event.encode_log_data(), 100, 4);
        let timestamps: FxHashMap<u64, u64> = [(100, 1_700_000_000)].into_iter().collect();

        let op = parse_log(&log, &static_info(), &timestamps).unwrap().unwrap();
        assert_eq!(op.topic(), Topic::Deposit);
        assert_eq!(op.id, format!("{}_4", hex_encode(B256::repeat_byte(0x01).as_slice())));
        assert_eq!(op.position(), (100, 4));
        assert_eq!(op.timestamp, 1_700_000_000);
        assert_eq!(op.hypervisor_address, address(VAULT.as_slice()));

        let OperationKind::Deposit(flow) = op.kind else {
            panic!("expected deposit");
        };
        assert_eq!(flow.sender, address(ALICE.as_slice()));
        assert_eq!(flow.shares, U256::from(1_000u64));
        assert_eq!(flow.qtty_token1, U256::from(7u64));
    }

    #[test]
    fn test_parse_rebalance_negative_tick() {
        let event = hypervisor::Rebalance {
            tick: I24::try_from(-120i32).unwrap(),
            totalAmount0: U256::from(10u64),
            totalAmount1: U256::from(20u64),
            feeAmount0: U256::from(1u64),
            feeAmount1: U256::from(2u64),
            totalSupply: U256::from(30u64),
        };
        let log = rpc_log(VAULT, event.encode_log_data(), 100, 0);

        let op = parse_log(&log, &static_info(), &FxHashMap::default())
            .unwrap()
            .unwrap();
        let OperationKind::Rebalance(fees) = op.kind else {
            panic!("expected rebalance");
        };
        assert_eq!(fees.tick, -120);
        assert_eq!(fees.qtty_token1, U256::from(2u64));
        assert_eq!(fees.total_supply, U256::from(30u64));
    }

    #[test]
    fn test_foreign_and_unknown_logs_are_skipped() {
        let transfer = hypervisor::Transfer {
            from: ALICE,
            to: BOB,
            value: U256::from(1u64),
        };
        let foreign = rpc_log(BOB, transfer.encode_log_data(), 100, 0);
        let unknown = rpc_log(
            VAULT,
            LogData::new_unchecked(vec![B256::repeat_byte(0x42)], Default::default()),
            100,
            1,
        );
        let anonymous = rpc_log(VAULT, LogData::new_unchecked(vec![], Default::default()), 100, 2);

        let info = static_info();
        let timestamps = FxHashMap::default();
        assert!(parse_log(&foreign, &info, &timestamps).unwrap().is_none());
        assert!(parse_log(&unknown, &info, &timestamps).unwrap().is_none());
        assert!(parse_log(&anonymous, &info, &timestamps).unwrap().is_none());
    }

    #[test]
    fn test_malformed_event_is_decode_error() {
        let truncated = LogData::new_unchecked(
            vec![hypervisor::ZeroBurn::SIGNATURE_HASH],
            vec![0u8; 8].into(),
        );
        let log = rpc_log(VAULT, truncated, 100, 0);

        assert!(matches!(
            parse_log(&log, &static_info(), &FxHashMap::default()),
            Err(ReplayErrorKind::Decode(_))
        ));
    }

    #[test]
    fn test_parse_logs_orders_by_position() {
        let set_fee = hypervisor::SetFee { newFee: 20 };
        let approval = hypervisor::Approval {
            owner: ALICE,
            spender: BOB,
            value: U256::MAX,
        };
        let logs = vec![
            rpc_log(VAULT, set_fee.encode_log_data(), 101, 0),
            rpc_log(VAULT, approval.encode_log_data(), 100, 9),
        ];

        let ops = parse_logs(&logs, &static_info(), &FxHashMap::default()).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].topic(), Topic::Approval);
        assert_eq!(ops[1].kind, OperationKind::SetFee(FeeChange { fee: 20 }));
    }
}
