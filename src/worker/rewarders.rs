use std::{sync::Arc, time::Duration};

use log::debug;
use moka::future::Cache;
use rustc_hash::FxHashSet;

use crate::db::RewarderRegistry;

/// Known reward/staking contracts per network.
///
/// The registry is re-read once the cached set expires, so contracts
/// registered during a long replay are picked up.
pub struct RewarderCache {
    registry: Arc<dyn RewarderRegistry>,
    cache: Cache<String, Arc<FxHashSet<String>>>,
}

impl RewarderCache {
    pub fn new(registry: Arc<dyn RewarderRegistry>, refresh: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(64)
            .time_to_live(refresh)
            .build();

        Self { registry, cache }
    }

    async fn load(&self, network: &str) -> anyhow::Result<Arc<FxHashSet<String>>> {
        if let Some(rewarders) = self.cache.get(network).await {
            return Ok(rewarders);
        }

        let rewarders: FxHashSet<String> = self
            .registry
            .rewarders(network)
            .await?
            .into_iter()
            .map(|address| address.to_lowercase())
            .collect();
        debug!("Loaded {} rewarder contracts for {}", rewarders.len(), network);

        let rewarders = Arc::new(rewarders);
        self.cache.insert(network.to_string(), rewarders.clone()).await;
        Ok(rewarders)
    }

    pub async fn is_rewarder(&self, network: &str, address: &str) -> anyhow::Result<bool> {
        Ok(self.load(network).await?.contains(&address.to_lowercase()))
    }
}
