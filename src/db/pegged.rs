use std::collections::HashMap;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::db::PriceSource;

/// Fixed usd prices for tokens pegged to a reference asset.
///
/// Answers only for its own network and only for configured tokens.
pub struct PeggedPriceSource {
    network: String,
    prices: FxHashMap<String, f64>,
}

impl PeggedPriceSource {
    pub fn new(network: &str, prices: &HashMap<String, f64>) -> Self {
        Self {
            network: network.to_string(),
            prices: prices
                .iter()
                .map(|(token, price)| (token.to_lowercase(), *price))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[async_trait]
impl PriceSource for PeggedPriceSource {
    fn name(&self) -> &str {
        "pegged"
    }

    async fn fetch_price(
        &self,
        network: &str,
        token_address: &str,
        _block: u64,
    ) -> anyhow::Result<Option<f64>> {
        if network != self.network {
            return Ok(None);
        }
        Ok(self.prices.get(&token_address.to_lowercase()).copied())
    }
}
