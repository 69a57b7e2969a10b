use bigdecimal::BigDecimal;
use num_traits::Zero;
use rustc_hash::FxHashMap;

use crate::db::models::{UserLedgerEntry, PROTOCOL_USER};

/// Current share balance per user for one hypervisor.
///
/// A cache over the ledger: seeded from the persisted balances when a replay
/// session starts, then kept current by applying every committed entry.
#[derive(Debug, Default, Clone)]
pub struct SharesIndex {
    balances: FxHashMap<String, BigDecimal>,
}

impl SharesIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_balances(balances: impl IntoIterator<Item = (String, BigDecimal)>) -> Self {
        let mut index = Self::new();
        for (user, shares) in balances {
            index.credit(&user, &shares);
        }
        index
    }

    fn credit(&mut self, user: &str, delta: &BigDecimal) {
        if delta.is_zero() {
            return;
        }
        let balance = self.balances.entry(user.to_string()).or_default();
        *balance += delta;
        if balance.is_zero() {
            self.balances.remove(user);
        }
    }

    /// Fold one ledger entry's share movement into the index.
    pub fn apply(&mut self, entry: &UserLedgerEntry) {
        if entry.user_address == PROTOCOL_USER {
            return;
        }
        self.credit(&entry.user_address, &entry.shares_delta());
    }

    pub fn balance(&self, user: &str) -> BigDecimal {
        self.balances.get(user).cloned().unwrap_or_default()
    }

    /// Every user with a non-zero balance, sorted by address.
    pub fn holders(&self) -> Vec<(String, BigDecimal)> {
        let mut holders: Vec<(String, BigDecimal)> = self
            .balances
            .iter()
            .map(|(user, shares)| (user.clone(), shares.clone()))
            .collect();
        holders.sort_by(|a, b| a.0.cmp(&b.0));
        holders
    }

    pub fn total(&self) -> BigDecimal {
        self.balances.values().fold(BigDecimal::zero(), |acc, v| acc + v)
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balances_fold_and_prune() {
        let mut index = SharesIndex::from_balances(vec![
            ("0xb".to_string(), BigDecimal::from(40)),
            ("0xa".to_string(), BigDecimal::from(60)),
        ]);
        assert_eq!(index.total(), BigDecimal::from(100));

        index.credit("0xa", &BigDecimal::from(-60));
        assert_eq!(index.balance("0xa"), BigDecimal::zero());
        assert_eq!(index.holders(), vec![("0xb".to_string(), BigDecimal::from(40))]);

        index.credit("0xc", &BigDecimal::from(5));
        assert_eq!(
            index.holders().iter().map(|h| h.0.as_str()).collect::<Vec<_>>(),
            vec!["0xb", "0xc"]
        );
        assert_eq!(index.len(), 2);
    }
}
