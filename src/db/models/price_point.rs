use serde::{Deserialize, Serialize};

/// USD price of a token at one block.
///
/// Primary Key: (network, block, token_address), last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub network: String,
    pub block: u64,
    pub token_address: String,
    pub price: f64,
    /// Where the price came from (e.g. "database", a price source name)
    pub source: String,
}

impl PricePoint {
    pub fn new(network: &str, block: u64, token_address: &str, price: f64, source: &str) -> Self {
        Self {
            network: network.to_string(),
            block,
            // Always lowercase addresses for consistent comparisons
            token_address: token_address.to_lowercase(),
            price,
            source: source.to_string(),
        }
    }
}
