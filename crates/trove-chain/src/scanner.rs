//! Chunked historical event-log scanning with deterministic ordering.
//!
//! Providers cap the size of `eth_getLogs` responses, so arbitrary block
//! ranges are fetched as a sequence of bounded chunks. Chunking must not be
//! observable downstream: the scanner merges, dedupes, and orders logs into
//! the one canonical sequence the idempotent event keys and the watermark
//! semantics rely on.

use std::collections::HashSet;

use alloy::primitives::{Address, B256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use eyre::{Context, Result};

/// Default chunk width in blocks when the caller has no override.
pub const DEFAULT_CHUNK_SIZE: u64 = 10_000;

/// Splits `[from, to]` into inclusive sub-ranges of at most `chunk_size`
/// blocks. An inverted range yields no chunks.
pub fn chunk_ranges(from: u64, to: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let step = chunk_size.max(1);
    let mut ranges = Vec::new();
    let mut cursor = from;
    while cursor <= to {
        let end = cursor.saturating_add(step - 1).min(to);
        ranges.push((cursor, end));
        if end == u64::MAX {
            break;
        }
        cursor = end + 1;
    }
    ranges
}

/// Dedupes by `(tx_hash, log_index)` and sorts ascending by
/// `(block_number, log_index)` — the canonical event order.
pub fn order_logs(mut logs: Vec<Log>) -> Vec<Log> {
    let mut seen: HashSet<(Option<B256>, Option<u64>)> = HashSet::new();
    logs.retain(|log| seen.insert((log.transaction_hash, log.log_index)));
    logs.sort_by_key(|log| (log.block_number.unwrap_or(0), log.log_index.unwrap_or(0)));
    logs
}

/// Fetches events of one signature over a block range in bounded chunks.
pub struct EventLogScanner<P> {
    provider: P,
    address: Address,
    chunk_size: u64,
}

impl<P: Provider + Clone> EventLogScanner<P> {
    /// Creates a scanner for one emitting contract.
    pub fn new(provider: P, address: Address, chunk_size: u64) -> Self {
        Self {
            provider,
            address,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Returns the deduplicated, canonically ordered logs matching
    /// `signature` in `[from_block, to_block]`.
    ///
    /// `from_block > to_block` yields an empty sequence, not an error.
    /// Chunks are fetched sequentially; chunking bounds provider response
    /// size, it is not a parallelism knob.
    ///
    /// # Errors
    /// Returns error if any chunk fetch fails.
    #[tracing::instrument(skip(self), fields(address = %self.address, from_block, to_block))]
    pub async fn scan(&self, signature: B256, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        let mut logs = Vec::new();

        for (start, end) in chunk_ranges(from_block, to_block, self.chunk_size) {
            let filter = Filter::new()
                .address(self.address)
                .event_signature(signature)
                .from_block(start)
                .to_block(end);

            let chunk = self
                .provider
                .get_logs(&filter)
                .await
                .wrap_err_with(|| format!("failed to fetch logs for blocks {start}-{end}"))?;

            tracing::debug!(start, end, found = chunk.len(), "scanned log chunk");
            logs.extend(chunk);
        }

        Ok(order_logs(logs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Log as PrimitiveLog, LogData};

    fn synthetic_log(block_number: u64, log_index: u64, tx_byte: u8) -> Log {
        Log {
            inner: PrimitiveLog {
                address: Address::ZERO,
                data: LogData::new_unchecked(vec![B256::ZERO], Default::default()),
            },
            block_hash: None,
            block_number: Some(block_number),
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(tx_byte)),
            transaction_index: Some(0),
            log_index: Some(log_index),
            removed: false,
        }
    }

    #[test]
    fn chunk_ranges_cover_range_without_overlap() {
        let ranges = chunk_ranges(0, 10_000, 1_000);
        assert_eq!(ranges.len(), 11);
        assert_eq!(ranges[0], (0, 999));
        assert_eq!(ranges[10], (10_000, 10_000));

        for window in ranges.windows(2) {
            assert_eq!(window[0].1 + 1, window[1].0, "chunks must be contiguous");
        }
    }

    #[test]
    fn chunk_ranges_single_chunk_when_size_exceeds_range() {
        assert_eq!(chunk_ranges(0, 10_000, 10_001), vec![(0, 10_000)]);
    }

    #[test]
    fn chunk_ranges_empty_on_inverted_range() {
        assert!(chunk_ranges(100, 99, 1_000).is_empty());
    }

    #[test]
    fn order_logs_sorts_by_block_then_log_index() {
        let logs = vec![
            synthetic_log(20, 1, 1),
            synthetic_log(10, 5, 2),
            synthetic_log(20, 0, 3),
            synthetic_log(10, 2, 4),
        ];

        let ordered = order_logs(logs);
        let keys: Vec<(u64, u64)> = ordered
            .iter()
            .map(|log| (log.block_number.unwrap(), log.log_index.unwrap()))
            .collect();
        assert_eq!(keys, vec![(10, 2), (10, 5), (20, 0), (20, 1)]);
    }

    #[test]
    fn order_logs_drops_duplicate_events() {
        let logs = vec![
            synthetic_log(10, 2, 1),
            synthetic_log(10, 2, 1),
            synthetic_log(10, 3, 1),
        ];

        assert_eq!(order_logs(logs).len(), 2);
    }
}
