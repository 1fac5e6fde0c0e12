//! Integration tests for the snapshot repository's idempotence and
//! full-replace semantics.

use trove_store::{LiquidationRow, RedemptionRow, Store, TroveRow};

fn trove(owner: &str, ratio: f64) -> TroveRow {
    TroveRow {
        owner: owner.to_string(),
        collateral: 2.0,
        principal_debt: 80_000.0,
        interest: 45.0,
        collateralization_ratio: ratio,
    }
}

fn redemption(tx_hash: &str, log_index: u64) -> RedemptionRow {
    RedemptionRow {
        attempted_amount: 10_000.0,
        actual_amount: 9_850.0,
        collateral_sent: 0.15,
        collateral_fee: 0.001,
        affected_borrowers: vec!["0xaaa".to_string(), "0xbbb".to_string()],
        tx_hash: tx_hash.to_string(),
        block_number: 4_500_600,
        log_index,
        timestamp: 1_700_000_000,
        status: "success".to_string(),
    }
}

/// After `upsert_troves(S)` the stored owner set equals exactly the owners
/// in `S`, regardless of what was stored before.
#[test]
fn trove_set_is_replaced_exactly() {
    let store = Store::new(":memory:").expect("in-memory store should open");

    store
        .upsert_troves(&[trove("0x01", 1.2), trove("0x02", 1.4), trove("0x03", 1.6)])
        .expect("seed should succeed");
    store
        .upsert_troves(&[trove("0x02", 1.5), trove("0x04", 2.0)])
        .expect("replace should succeed");

    let stored = store.riskiest_troves(100).expect("query should succeed");
    let owners: Vec<&str> = stored.iter().map(|row| row.owner.as_str()).collect();
    assert_eq!(owners, vec!["0x02", "0x04"]);
}

/// Calling `upsert_redemptions` twice with the same event set yields the
/// same stored rows: no duplicates, no error.
#[test]
fn event_upserts_are_idempotent() {
    let store = Store::new(":memory:").expect("in-memory store should open");
    let events = vec![redemption("0xfeed", 0), redemption("0xfeed", 1), redemption("0xbeef", 0)];

    assert_eq!(
        store.upsert_redemptions(&events).expect("first insert"),
        3
    );
    assert_eq!(
        store.upsert_redemptions(&events).expect("second insert"),
        0
    );
    assert_eq!(store.counts().expect("counts").redemptions, 3);
}

/// Overlapping scan ranges re-deliver events; the `txHash:logIndex` key
/// absorbs the overlap.
#[test]
fn overlapping_ranges_do_not_duplicate_events() {
    let store = Store::new(":memory:").expect("in-memory store should open");

    let first_range = vec![
        LiquidationRow {
            borrower: "0xccc".to_string(),
            debt: 500.0,
            collateral: 0.01,
            operation: 1,
            tx_hash: "0xabc".to_string(),
            block_number: 100,
            log_index: 0,
            timestamp: 1_700_000_000,
            status: "success".to_string(),
        },
    ];
    let second_range: Vec<LiquidationRow> = first_range
        .iter()
        .cloned()
        .chain(std::iter::once(LiquidationRow {
            borrower: "0xddd".to_string(),
            debt: 800.0,
            collateral: 0.02,
            operation: 1,
            tx_hash: "0xdef".to_string(),
            block_number: 150,
            log_index: 2,
            timestamp: 1_700_000_600,
            status: "failed".to_string(),
        }))
        .collect();

    store.upsert_liquidations(&first_range).expect("first range");
    let inserted = store
        .upsert_liquidations(&second_range)
        .expect("overlapping range");

    assert_eq!(inserted, 1, "only the new event may be inserted");
    assert_eq!(store.counts().expect("counts").liquidations, 2);
}

/// A successful pass moves the watermark to exactly the observed height; a
/// failed pass (no `set_watermark` call) leaves it untouched.
#[test]
fn watermark_advances_only_on_success() {
    let store = Store::new(":memory:").expect("in-memory store should open");
    assert_eq!(store.get_watermark().expect("read"), None);

    store.set_watermark(5_000_500).expect("commit pass");
    assert_eq!(store.get_watermark().expect("read"), Some(5_000_500));

    // A pass that aborts before its final step never calls set_watermark;
    // the stored value must still be the previous height.
    assert_eq!(store.get_watermark().expect("read"), Some(5_000_500));
}
