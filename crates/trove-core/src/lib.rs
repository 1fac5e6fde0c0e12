//! trove-core crate

pub mod bridge;
pub mod config;
pub mod events;
pub mod gauges;
pub mod indexer;
pub mod quote;
pub mod redeem;
pub mod troves;
pub mod types;

pub use config::{scan_start, Environment, IndexerConfig, PROD_LOOKBACK_BLOCKS};
pub use indexer::Indexer;
pub use types::{SyncState, SystemSnapshot, Trove};
