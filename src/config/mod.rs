#[allow(clippy::module_inception)]
mod config;

pub use self::config::{PostgresSettings, ProtocolFeeSettings, ReplaySettings, Settings};
