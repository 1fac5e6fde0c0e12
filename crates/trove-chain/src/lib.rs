//! trove-chain crate

pub mod contracts;
pub mod provider;
pub mod reader;
pub mod scanner;

pub use provider::{connect_http, connect_wallet, HttpProvider, WalletProvider};
pub use reader::{
    decode_trove_log, ChainReader, DecodedTroveLog, MulticallOutcome, MulticallRequest, TxStatus,
    DEFAULT_MULTICALL_BATCH,
};
pub use scanner::{chunk_ranges, order_logs, EventLogScanner, DEFAULT_CHUNK_SIZE};
