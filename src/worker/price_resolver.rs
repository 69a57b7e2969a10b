use std::{sync::Arc, time::Duration};

use bigdecimal::BigDecimal;
use log::{debug, warn};
use moka::future::Cache;

use crate::{
    db::{models::PricePoint, PriceSource, PriceStore},
    error::PriceError,
    utils::price_to_decimal,
};

type PriceKey = (String, u64, String);

/// USD price resolution for one replay session.
///
/// Resolves a token price at a block using, first success wins:
/// 1. The session cache
/// 2. The price store at the exact block
/// 3. External price sources, in order (a hit is persisted with its source tag)
/// 4. The price store at `block + d`, then `block - d`, for `d` in `1..=adjacency`
///
/// A price that cannot be resolved is an error. Callers never substitute zero.
pub struct PriceResolver {
    store: Arc<dyn PriceStore>,
    sources: Vec<Arc<dyn PriceSource>>,
    cache: Cache<PriceKey, BigDecimal>,
    adjacency: u64,
}

impl PriceResolver {
    pub fn new(
        store: Arc<dyn PriceStore>,
        sources: Vec<Arc<dyn PriceSource>>,
        cache_capacity: u64,
        cache_ttl: Duration,
        adjacency: u64,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(cache_capacity)
            .time_to_live(cache_ttl)
            .build();

        Self {
            store,
            sources,
            cache,
            adjacency,
        }
    }

    /// Valid price stored at exactly `block`, if any.
    async fn stored(
        &self,
        network: &str,
        block: u64,
        token: &str,
    ) -> Result<Option<BigDecimal>, PriceError> {
        let point = self
            .store
            .get_price(network, block, token)
            .await
            .map_err(PriceError::Store)?;

        Ok(point.and_then(|p| price_to_decimal(p.price)))
    }

    /// First price the external sources return, persisted to the store.
    async fn from_sources(
        &self,
        network: &str,
        block: u64,
        token: &str,
    ) -> Result<Option<BigDecimal>, PriceError> {
        for source in &self.sources {
            let price = match source.fetch_price(network, token, block).await {
                Ok(Some(price)) => price,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        "Price source {} failed for {} on {} at block {}: {:#}",
                        source.name(),
                        token,
                        network,
                        block,
                        e
                    );
                    continue;
                },
            };

            let Some(decimal) = price_to_decimal(price) else {
                debug!(
                    "Price source {} returned unusable price {} for {} at block {}",
                    source.name(),
                    price,
                    token,
                    block
                );
                continue;
            };

            self.store
                .set_price(&PricePoint::new(network, block, token, price, source.name()))
                .await
                .map_err(PriceError::Store)?;
            return Ok(Some(decimal));
        }

        Ok(None)
    }

    /// Nearest stored price within `adjacency` blocks, later block first,
    /// with the block it was found at.
    async fn adjacent(
        &self,
        network: &str,
        block: u64,
        token: &str,
    ) -> Result<Option<(u64, BigDecimal)>, PriceError> {
        for distance in 1..=self.adjacency {
            let candidates = [block.checked_add(distance), block.checked_sub(distance)];
            for candidate in candidates.into_iter().flatten() {
                if let Some(price) = self.stored(network, candidate, token).await? {
                    return Ok(Some((candidate, price)));
                }
            }
        }

        Ok(None)
    }

    /// USD price of `token` at `block`.
    pub async fn get_price(
        &self,
        network: &str,
        token: &str,
        block: u64,
    ) -> Result<BigDecimal, PriceError> {
        let token = token.to_lowercase();
        let key = (network.to_string(), block, token.clone());

        if let Some(price) = self.cache.get(&key).await {
            return Ok(price);
        }

        if let Some(price) = self.stored(network, block, &token).await? {
            self.cache.insert(key, price.clone()).await;
            return Ok(price);
        }

        if let Some(price) = self.from_sources(network, block, &token).await? {
            self.cache.insert(key, price.clone()).await;
            return Ok(price);
        }

        if let Some((substitute, price)) = self.adjacent(network, block, &token).await? {
            warn!(
                "No {} price for {} at block {}; using the price at block {}",
                network, token, block, substitute
            );
            self.cache.insert(key, price.clone()).await;
            return Ok(price);
        }

        Err(PriceError::NotFound {
            network: network.to_string(),
            token,
            block,
        })
    }
}
