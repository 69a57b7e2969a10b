use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Stores operations, the user ledger, prices, vault metadata and snapshots.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
}

fn default_pool_size() -> usize {
    16
}

fn default_connect_retries() -> u32 {
    3
}

/// Protocol fee cut policy.
///
/// The operator keeps `1 / fee` of every fee collection. Vaults reporting a
/// fee at or above `anomaly_threshold` carry corrupt metadata and fall back to
/// `1 / fallback_denominator`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProtocolFeeSettings {
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: u32,
    #[serde(default = "default_fallback_denominator")]
    pub fallback_denominator: u32,
}

fn default_anomaly_threshold() -> u32 {
    100
}

fn default_fallback_denominator() -> u32 {
    10
}

impl Default for ProtocolFeeSettings {
    fn default() -> Self {
        Self {
            anomaly_threshold: default_anomaly_threshold(),
            fallback_denominator: default_fallback_denominator(),
        }
    }
}

/// Replay session configuration, shared by every hypervisor replayed.
#[derive(Debug, Deserialize, Clone)]
pub struct ReplaySettings {
    /// Network name prices are keyed by (e.g. "ethereum")
    pub network: String,
    #[serde(default)]
    pub hypervisors: Vec<String>,
    /// Replay start. Defaults to the second-to-last block already in the ledger.
    #[serde(default)]
    pub from_block: Option<u64>,
    /// Parallel workers computing per-holder fee shares
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_price_cache_ttl_secs")]
    pub price_cache_ttl_secs: u64,
    #[serde(default = "default_price_cache_capacity")]
    pub price_cache_capacity: u64,
    #[serde(default = "default_rewarder_refresh_secs")]
    pub rewarder_refresh_secs: u64,
    /// Allowed deviation of the distributed percentage sum from 1
    #[serde(default = "default_distribution_tolerance")]
    pub distribution_tolerance: f64,
    #[serde(default)]
    pub protocol_fee: ProtocolFeeSettings,
    /// How many blocks away a substitute price may come from
    #[serde(default = "default_price_block_adjacency")]
    pub price_block_adjacency: u64,
    /// Token address -> fixed usd price, used when the price store has no row
    /// (pegged stablecoins)
    #[serde(default)]
    pub pegged_prices: HashMap<String, f64>,
}

fn default_worker_count() -> usize {
    8
}

fn default_price_cache_ttl_secs() -> u64 {
    3600
}

fn default_price_cache_capacity() -> u64 {
    100_000
}

fn default_rewarder_refresh_secs() -> u64 {
    600
}

fn default_distribution_tolerance() -> f64 {
    0.0001
}

fn default_price_block_adjacency() -> u64 {
    1
}

impl ReplaySettings {
    pub fn new(network: &str) -> Self {
        Self {
            network: network.to_string(),
            hypervisors: Vec::new(),
            from_block: None,
            worker_count: default_worker_count(),
            price_cache_ttl_secs: default_price_cache_ttl_secs(),
            price_cache_capacity: default_price_cache_capacity(),
            rewarder_refresh_secs: default_rewarder_refresh_secs(),
            distribution_tolerance: default_distribution_tolerance(),
            protocol_fee: ProtocolFeeSettings::default(),
            price_block_adjacency: default_price_block_adjacency(),
            pegged_prices: HashMap::new(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` (or any format the `config` crate reads) at
/// startup, with `HYPLEDGER__SECTION__KEY` environment overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub replay: ReplaySettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(
                Environment::with_prefix("HYPLEDGER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("replay.hypervisors")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
