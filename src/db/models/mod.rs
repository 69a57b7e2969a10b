pub mod ledger_entry;
pub mod operation;
pub mod price_point;
pub mod vault;

pub use ledger_entry::{LedgerKey, UserLedgerEntry, PROTOCOL_USER};
pub use operation::{
    FeeChange, Operation, OperationKind, OperationRecord, PerShare, RebalanceFees, ShareApproval,
    ShareFlow, ShareTransfer, Topic, ZeroBurnFees,
};
pub use price_point::PricePoint;
pub use vault::{Dex, PositionSnapshot, VaultSnapshot, VaultStatic};
