pub mod accounting;
pub mod cursor;
pub mod dispatcher;
pub mod parser;
pub mod policy;
pub mod price_resolver;
pub mod rewarders;
pub mod shares;

pub use accounting::{AccountingEngine, FeeDistribution, FeeOutcome};
pub use cursor::ReplayCursor;
pub use dispatcher::{replay, replay_all, Dispatched, Dispatcher, ReplaySummary};
pub use parser::{parse_log, parse_logs};
pub use policy::ProtocolFeePolicy;
pub use price_resolver::PriceResolver;
pub use rewarders::RewarderCache;
pub use shares::SharesIndex;
