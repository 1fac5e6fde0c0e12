//! Integration tests for scan ordering, chunk invariance, watermark
//! arithmetic, and epoch alignment.

use alloy::primitives::{Address, Log as PrimitiveLog, LogData, B256};
use alloy::rpc::types::Log;
use trove_chain::{chunk_ranges, order_logs};
use trove_core::gauges::{adjacent_epochs, epoch_start};
use trove_core::{scan_start, Environment};

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

/// Simulates a chunked scan over a fixed universe of logs: each chunk sees
/// only the logs inside its block range, results are concatenated in chunk
/// order, then merged through `order_logs`.
fn scan_in_chunks(universe: &[Log], from: u64, to: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let mut collected = Vec::new();
    for (start, end) in chunk_ranges(from, to, chunk_size) {
        for log in universe {
            let block = log.block_number.unwrap();
            if block >= start && block <= end {
                collected.push(log.clone());
            }
        }
    }
    order_logs(collected)
        .iter()
        .map(|log| (log.block_number.unwrap(), log.log_index.unwrap()))
        .collect()
}

/// Scanning `[0, 10000]` in one chunk of size 10,001 yields the same ordered
/// sequence as scanning it in chunks of 1,000.
#[test]
fn chunk_size_does_not_change_the_event_sequence() {
    let universe = vec![
        synthetic_log(9_999, 4, 1),
        synthetic_log(500, 0, 2),
        synthetic_log(1_000, 2, 3),
        synthetic_log(1_000, 1, 4),
        synthetic_log(10_000, 0, 5),
        synthetic_log(0, 7, 6),
        synthetic_log(4_242, 3, 7),
    ];

    let single = scan_in_chunks(&universe, 0, 10_000, 10_001);
    let chunked = scan_in_chunks(&universe, 0, 10_000, 1_000);
    let tiny = scan_in_chunks(&universe, 0, 10_000, 7);

    assert_eq!(single, chunked);
    assert_eq!(single, tiny);
    assert_eq!(single.len(), universe.len());
}

/// Lower block numbers always precede higher ones; equal blocks break ties
/// by ascending log index.
#[test]
fn scan_order_is_block_then_log_index() {
    let universe = vec![
        synthetic_log(7, 9, 1),
        synthetic_log(3, 2, 2),
        synthetic_log(7, 1, 3),
        synthetic_log(3, 8, 4),
    ];

    let ordered = scan_in_chunks(&universe, 0, 10, 2);
    assert_eq!(ordered, vec![(3, 2), (3, 8), (7, 1), (7, 9)]);

    for pair in ordered.windows(2) {
        assert!(pair[0] < pair[1], "sequence must be strictly ascending");
    }
}

/// An inverted range yields an empty sequence, not an error.
#[test]
fn inverted_range_scans_nothing() {
    let universe = vec![synthetic_log(5, 0, 1)];
    assert!(scan_in_chunks(&universe, 10, 5, 1_000).is_empty());
}

/// Overlapping re-scans do not duplicate events once merged.
#[test]
fn overlapping_scans_deduplicate() {
    let log = synthetic_log(42, 1, 1);
    let merged = order_logs(vec![log.clone(), log.clone(), log]);
    assert_eq!(merged.len(), 1);
}

/// Watermark absent, height 5,000,500, prod lookback 500,000: the scan
/// starts at 4,500,501. The dev profile scans a tight local range instead.
#[test]
fn first_run_lookback_matches_profile() {
    assert_eq!(scan_start(None, 5_000_500, Environment::Prod), 4_500_501);
    assert_eq!(scan_start(None, 5_000_500, Environment::Dev), 5_000_500);
}

/// Any watermark resumes at exactly the next block on both profiles.
#[test]
fn watermark_resumes_at_next_block() {
    for environment in [Environment::Dev, Environment::Prod] {
        assert_eq!(scan_start(Some(5_000_500), 5_000_700, environment), 5_000_501);
    }
}

/// Duration 604,800 and block timestamp 1,700,000,100 align to epoch start
/// 1,699,833,600; the adjacent probes target exactly ±604,800.
#[test]
fn epoch_alignment_and_adjacent_probes() {
    let duration = 604_800;
    let start = epoch_start(1_700_000_100, duration);
    assert_eq!(start, 1_699_833_600);

    let (previous, next) = adjacent_epochs(start, duration);
    assert_eq!(previous, Some(start - duration));
    assert_eq!(next, start + duration);
}
