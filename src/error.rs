//! Error taxonomy for the ledger replay.
//!
//! Collaborators (stores, RPC, price sources) report failures as
//! `anyhow::Error`. The core classifies them into the typed errors below so a
//! caller can tell corrupt input apart from a missing price.

use alloy::primitives::U256;
use thiserror::Error;

/// Domain errors raised by the fixed-point math library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("tick {0} outside [-887272, 887272]")]
    TickOutOfRange(i32),
    #[error("sqrtPriceX96 {0} outside [MIN_SQRT_RATIO, MAX_SQRT_RATIO]")]
    SqrtRatioOutOfRange(U256),
    #[error("uint256 overflow")]
    Overflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("liquidity does not fit in uint128")]
    LiquidityOverflow,
}

/// Failures of the USD price resolution.
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("no usd price for {token} on {network} at block {block} (or adjacent blocks)")]
    NotFound {
        network: String,
        token: String,
        block: u64,
    },
    #[error("price store failure: {0:#}")]
    Store(anyhow::Error),
}

/// What went wrong while applying one operation.
#[derive(Debug, Error)]
pub enum ReplayErrorKind {
    #[error("legacy vault shape: {topic} with sender {sender} != to {to}")]
    LegacyVault {
        topic: &'static str,
        sender: String,
        to: String,
    },
    #[error("unknown operation topic '{0}'")]
    UnknownTopic(String),
    #[error("malformed operation payload: {0}")]
    Decode(String),
    #[error(
        "out of order: position ({block}, {log_index}) is before last processed ({last_block}, {last_log_index})"
    )]
    OutOfOrder {
        block: u64,
        log_index: u32,
        last_block: u64,
        last_log_index: u32,
    },
    #[error(transparent)]
    MissingPrice(PriceError),
    #[error("no static metadata for hypervisor")]
    MissingMetadata,
    #[error("no vault snapshot at block {0}")]
    MissingSnapshot(u64),
    #[error("unrecognized dex '{0}'")]
    UnknownDex(String),
    #[error(transparent)]
    Math(#[from] MathError),
    #[error("store failure: {0:#}")]
    Store(anyhow::Error),
    #[error("fee share worker failed: {0}")]
    Worker(String),
}

impl From<PriceError> for ReplayErrorKind {
    /// A price store outage is a collaborator failure, not a missing price.
    fn from(err: PriceError) -> Self {
        match err {
            PriceError::Store(e) => ReplayErrorKind::Store(e),
            not_found => ReplayErrorKind::MissingPrice(not_found),
        }
    }
}

/// A fatal replay failure, always reproducible against the public chain from
/// the hypervisor, block and operation id it carries.
#[derive(Debug, Error)]
#[error("hypervisor {hypervisor} block {block} operation {operation_id}: {kind}")]
pub struct ReplayError {
    pub hypervisor: String,
    pub block: u64,
    pub operation_id: String,
    #[source]
    pub kind: ReplayErrorKind,
}

impl ReplayError {
    pub fn new(
        hypervisor: impl Into<String>,
        block: u64,
        operation_id: impl Into<String>,
        kind: ReplayErrorKind,
    ) -> Self {
        Self {
            hypervisor: hypervisor.into(),
            block,
            operation_id: operation_id.into(),
            kind,
        }
    }
}
