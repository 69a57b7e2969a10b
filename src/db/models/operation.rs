use std::{fmt, str::FromStr};

use alloy::primitives::U256;
use bigdecimal::BigDecimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ReplayErrorKind;

/// Hypervisor event kinds the replay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Deposit,
    Withdraw,
    Transfer,
    Rebalance,
    ZeroBurn,
    Approval,
    SetFee,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Deposit => "deposit",
            Topic::Withdraw => "withdraw",
            Topic::Transfer => "transfer",
            Topic::Rebalance => "rebalance",
            Topic::ZeroBurn => "zero_burn",
            Topic::Approval => "approval",
            Topic::SetFee => "set_fee",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ReplayErrorKind;

    /// Accepts both snake_case and the contract's camelCase event names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "").as_str() {
            "deposit" => Ok(Topic::Deposit),
            "withdraw" => Ok(Topic::Withdraw),
            "transfer" => Ok(Topic::Transfer),
            "rebalance" => Ok(Topic::Rebalance),
            "zeroburn" => Ok(Topic::ZeroBurn),
            "approval" => Ok(Topic::Approval),
            "setfee" => Ok(Topic::SetFee),
            _ => Err(ReplayErrorKind::UnknownTopic(s.to_string())),
        }
    }
}

// ============================================
// Topic payloads
// ============================================

/// Deposit / Withdraw: shares minted or burned against token amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareFlow {
    pub sender: String,
    pub to: String,
    pub shares: U256,
    pub qtty_token0: U256,
    pub qtty_token1: U256,
}

/// ERC20 transfer of hypervisor shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareTransfer {
    pub src: String,
    pub dst: String,
    pub qtty: U256,
}

/// Rebalance: vault totals after the rebalance plus the fees it collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceFees {
    pub tick: i32,
    pub total_amount0: U256,
    pub total_amount1: U256,
    /// Fees collected, token0
    pub qtty_token0: U256,
    /// Fees collected, token1
    pub qtty_token1: U256,
    pub total_supply: U256,
}

/// ZeroBurn: fees collected without moving the positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroBurnFees {
    pub fee: u8,
    pub qtty_token0: U256,
    pub qtty_token1: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareApproval {
    pub owner: String,
    pub spender: String,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeChange {
    pub fee: u8,
}

/// Topic-specific content of an operation, decoded once at ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Deposit(ShareFlow),
    Withdraw(ShareFlow),
    Transfer(ShareTransfer),
    Rebalance(RebalanceFees),
    ZeroBurn(ZeroBurnFees),
    Approval(ShareApproval),
    SetFee(FeeChange),
}

impl OperationKind {
    pub fn topic(&self) -> Topic {
        match self {
            OperationKind::Deposit(_) => Topic::Deposit,
            OperationKind::Withdraw(_) => Topic::Withdraw,
            OperationKind::Transfer(_) => Topic::Transfer,
            OperationKind::Rebalance(_) => Topic::Rebalance,
            OperationKind::ZeroBurn(_) => Topic::ZeroBurn,
            OperationKind::Approval(_) => Topic::Approval,
            OperationKind::SetFee(_) => Topic::SetFee,
        }
    }
}

/// Underlying tokens backing one share at the operation's block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerShare {
    pub token0: BigDecimal,
    pub token1: BigDecimal,
}

/// One on-chain hypervisor event. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// `{tx_hash}_{log_index}`
    pub id: String,
    pub hypervisor_address: String,
    pub block_number: u64,
    pub log_index: u32,
    pub timestamp: u64,
    pub decimals_token0: u8,
    pub decimals_token1: u8,
    pub decimals_contract: u8,
    pub per_share: Option<PerShare>,
    pub kind: OperationKind,
}

impl Operation {
    pub fn topic(&self) -> Topic {
        self.kind.topic()
    }

    /// Ledger ordering key.
    pub fn position(&self) -> (u64, u32) {
        (self.block_number, self.log_index)
    }
}

// ============================================
// Raw records
// ============================================

/// Operation as persisted by the operation source: topic name + JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: String,
    pub hypervisor_address: String,
    pub block_number: u64,
    pub log_index: u32,
    pub timestamp: u64,
    pub topic: String,
    pub decimals_token0: u8,
    pub decimals_token1: u8,
    pub decimals_contract: u8,
    #[serde(default)]
    pub token0_per_share: Option<BigDecimal>,
    #[serde(default)]
    pub token1_per_share: Option<BigDecimal>,
    pub payload: serde_json::Value,
}

fn payload<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T, ReplayErrorKind> {
    serde_json::from_value(value.clone()).map_err(|e| ReplayErrorKind::Decode(e.to_string()))
}

fn lower(address: &mut String) {
    *address = address.to_lowercase();
}

impl OperationRecord {
    /// Decode the record into a typed operation.
    ///
    /// An unknown topic is an error, never skipped.
    pub fn decode(&self) -> Result<Operation, ReplayErrorKind> {
        let topic: Topic = self.topic.parse()?;

        let kind = match topic {
            Topic::Deposit | Topic::Withdraw => {
                let mut flow: ShareFlow = payload(&self.payload)?;
                lower(&mut flow.sender);
                lower(&mut flow.to);
                if topic == Topic::Deposit {
                    OperationKind::Deposit(flow)
                } else {
                    OperationKind::Withdraw(flow)
                }
            },
            Topic::Transfer => {
                let mut transfer: ShareTransfer = payload(&self.payload)?;
                lower(&mut transfer.src);
                lower(&mut transfer.dst);
                OperationKind::Transfer(transfer)
            },
            Topic::Rebalance => OperationKind::Rebalance(payload(&self.payload)?),
            Topic::ZeroBurn => OperationKind::ZeroBurn(payload(&self.payload)?),
            Topic::Approval => {
                let mut approval: ShareApproval = payload(&self.payload)?;
                lower(&mut approval.owner);
                lower(&mut approval.spender);
                OperationKind::Approval(approval)
            },
            Topic::SetFee => OperationKind::SetFee(payload(&self.payload)?),
        };

        let per_share = match (&self.token0_per_share, &self.token1_per_share) {
            (Some(token0), Some(token1)) => Some(PerShare {
                token0: token0.clone(),
                token1: token1.clone(),
            }),
            _ => None,
        };

        Ok(Operation {
            id: self.id.clone(),
            hypervisor_address: self.hypervisor_address.to_lowercase(),
            block_number: self.block_number,
            log_index: self.log_index,
            timestamp: self.timestamp,
            decimals_token0: self.decimals_token0,
            decimals_token1: self.decimals_token1,
            decimals_contract: self.decimals_contract,
            per_share,
            kind,
        })
    }
}

impl From<&Operation> for OperationRecord {
    fn from(op: &Operation) -> Self {
        // the payload structs only hold strings and integers
        let payload = match &op.kind {
            OperationKind::Deposit(flow) | OperationKind::Withdraw(flow) => serde_json::to_value(flow),
            OperationKind::Transfer(transfer) => serde_json::to_value(transfer),
            OperationKind::Rebalance(rebalance) => serde_json::to_value(rebalance),
            OperationKind::ZeroBurn(zero_burn) => serde_json::to_value(zero_burn),
            OperationKind::Approval(approval) => serde_json::to_value(approval),
            OperationKind::SetFee(set_fee) => serde_json::to_value(set_fee),
        }
        .unwrap_or(serde_json::Value::Null);

        Self {
            id: op.id.clone(),
            hypervisor_address: op.hypervisor_address.clone(),
            block_number: op.block_number,
            log_index: op.log_index,
            timestamp: op.timestamp,
            topic: op.topic().as_str().to_string(),
            decimals_token0: op.decimals_token0,
            decimals_token1: op.decimals_token1,
            decimals_contract: op.decimals_contract,
            token0_per_share: op.per_share.as_ref().map(|p| p.token0.clone()),
            token1_per_share: op.per_share.as_ref().map(|p| p.token1.clone()),
            payload,
        }
    }
}
