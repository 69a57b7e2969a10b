pub mod hypervisor;

pub use hypervisor::{Approval, Deposit, Rebalance, SetFee, Transfer, Withdraw, ZeroBurn};
