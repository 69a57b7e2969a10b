pub mod abis;
pub mod config;
pub mod db;
pub mod error;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use db::{MemoryStore, PostgresClient, Stores};
pub use error::{MathError, PriceError, ReplayError, ReplayErrorKind};
pub use worker::{replay, replay_all, Dispatcher, ReplaySummary};
