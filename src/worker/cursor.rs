use rustc_hash::FxHashSet;

use crate::error::ReplayErrorKind;

/// Progress of one replay session over one hypervisor.
///
/// Process-local only: where a new session starts is derived from the
/// persisted ledger, never from this cursor.
#[derive(Debug, Default)]
pub struct ReplayCursor {
    pub last_block_processed: u64,
    last_position: Option<(u64, u32)>,
    ids_processed: FxHashSet<String>,
}

impl ReplayCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.ids_processed.contains(id)
    }

    /// Operations must arrive ascending by `(block, log_index)`.
    pub fn check_order(&self, block: u64, log_index: u32) -> Result<(), ReplayErrorKind> {
        let Some((last_block, last_log_index)) = self.last_position else {
            return Ok(());
        };

        if block < last_block || (block == last_block && log_index < last_log_index) {
            return Err(ReplayErrorKind::OutOfOrder {
                block,
                log_index,
                last_block,
                last_log_index,
            });
        }
        Ok(())
    }

    /// Record a successfully dispatched operation.
    pub fn advance(&mut self, id: &str, block: u64, log_index: u32) {
        self.ids_processed.insert(id.to_string());
        self.last_block_processed = block;
        self.last_position = Some((block, log_index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_dedup() {
        let mut cursor = ReplayCursor::new();
        assert!(cursor.check_order(0, 0).is_ok());

        cursor.advance("0x1_3", 100, 3);
        assert!(cursor.is_processed("0x1_3"));
        assert_eq!(cursor.last_block_processed, 100);

        assert!(cursor.check_order(100, 3).is_ok());
        assert!(cursor.check_order(100, 4).is_ok());
        assert!(cursor.check_order(101, 0).is_ok());
        assert!(matches!(
            cursor.check_order(100, 2),
            Err(ReplayErrorKind::OutOfOrder { last_log_index: 3, .. })
        ));
        assert!(matches!(
            cursor.check_order(99, 9),
            Err(ReplayErrorKind::OutOfOrder { last_block: 100, .. })
        ));
    }
}
