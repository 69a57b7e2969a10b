use std::sync::Arc;

use log::info;

use crate::config::Settings;

pub mod memory;
pub mod models;
pub mod pegged;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use pegged::PeggedPriceSource;
pub use postgres::PostgresClient;
pub use store::{
    LedgerStore, OperationSource, PriceSource, PriceStore, RewarderRegistry,
    VaultMetadataProvider, VaultSnapshotSource,
};

/// Collaborators one replay session talks to.
///
/// Every handle is shared and read-only from the core's point of view; the
/// same bundle can back several hypervisor replays at once.
#[derive(Clone)]
pub struct Stores {
    pub operations: Arc<dyn OperationSource>,
    pub prices: Arc<dyn PriceStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub vaults: Arc<dyn VaultMetadataProvider>,
    pub snapshots: Arc<dyn VaultSnapshotSource>,
    pub rewarders: Arc<dyn RewarderRegistry>,
    /// External price feeds, consulted in order on a price store miss
    pub price_sources: Vec<Arc<dyn PriceSource>>,
}

impl Stores {
    /// Every collaborator served by one in-memory store.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            operations: store.clone(),
            prices: store.clone(),
            ledger: store.clone(),
            vaults: store.clone(),
            snapshots: store.clone(),
            rewarders: store,
            price_sources: Vec::new(),
        }
    }

    /// Connect to PostgreSQL, apply the schema and serve every collaborator
    /// from it.
    pub async fn postgres(settings: Arc<Settings>) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(settings.postgres.clone()).await?;
        postgres.migrate().await?;
        info!("Ledger stores backed by PostgreSQL");

        let postgres = Arc::new(postgres);
        Ok(Self {
            operations: postgres.clone(),
            prices: postgres.clone(),
            ledger: postgres.clone(),
            vaults: postgres.clone(),
            snapshots: postgres.clone(),
            rewarders: postgres,
            price_sources: Vec::new(),
        })
    }

    /// Append a price source, consulted after the ones already attached.
    pub fn with_price_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.price_sources.push(source);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::PriceResolver;
    use bigdecimal::BigDecimal;
    use std::{collections::HashMap, time::Duration};

    #[tokio::test]
    async fn test_attached_source_backs_store_misses() {
        let store = Arc::new(MemoryStore::new());
        let pegged: HashMap<String, f64> = [("0xusdc".to_string(), 1.0)].into_iter().collect();
        let stores = Stores::memory(store.clone())
            .with_price_source(Arc::new(PeggedPriceSource::new("ethereum", &pegged)));
        assert_eq!(stores.price_sources.len(), 1);

        let resolver = PriceResolver::new(
            stores.prices.clone(),
            stores.price_sources.clone(),
            100,
            Duration::from_secs(60),
            1,
        );
        let price = resolver.get_price("ethereum", "0xUSDC", 500).await.unwrap();
        assert_eq!(price, BigDecimal::from(1));

        let stored = store.get_price("ethereum", 500, "0xusdc").await.unwrap().unwrap();
        assert_eq!(stored.source, "pegged");
    }
}
