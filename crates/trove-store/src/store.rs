//! SQLite storage layer for the protocol monitor.
//!
//! Uses WAL mode for concurrent read performance and prepared statements
//! for batch insert throughput. Every write is a keyed upsert or an
//! insert-or-ignore, so a pass that re-runs after a crash re-applies its
//! writes without duplicating anything.

use eyre::Result;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Current trove set row, keyed by owner address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TroveRow {
    /// Owner address (lowercase hex with 0x prefix).
    pub owner: String,
    /// Collateral in collateral-asset units.
    pub collateral: f64,
    /// Principal debt in stable-asset units.
    pub principal_debt: f64,
    /// Accrued interest in stable-asset units.
    pub interest: f64,
    /// Collateralization ratio (sentinel-capped for zero-debt troves).
    pub collateralization_ratio: f64,
}

/// Immutable liquidation event row, keyed by `txHash:logIndex`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiquidationRow {
    /// Liquidated borrower address (lowercase hex).
    pub borrower: String,
    /// Debt extinguished in stable-asset units.
    pub debt: f64,
    /// Collateral seized in collateral-asset units.
    pub collateral: f64,
    /// TroveManager operation code.
    pub operation: u8,
    /// Transaction hash (hex with 0x prefix).
    pub tx_hash: String,
    /// Block number containing the event.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u64,
    /// Block timestamp in unix seconds.
    pub timestamp: u64,
    /// Transaction status (`success`/`failed`).
    pub status: String,
}

/// Immutable redemption event row, keyed by `txHash:logIndex`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RedemptionRow {
    /// Stable-asset amount the redeemer asked for.
    pub attempted_amount: f64,
    /// Stable-asset amount actually redeemed.
    pub actual_amount: f64,
    /// Collateral paid out.
    pub collateral_sent: f64,
    /// Collateral retained as redemption fee.
    pub collateral_fee: f64,
    /// Borrowers whose troves the redemption touched (lowercase hex).
    pub affected_borrowers: Vec<String>,
    /// Transaction hash (hex with 0x prefix).
    pub tx_hash: String,
    /// Block number containing the event.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u64,
    /// Block timestamp in unix seconds.
    pub timestamp: u64,
    /// Transaction status (`success`/`failed`).
    pub status: String,
}

/// Point-in-time system aggregate, appended once per pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// Total system collateral.
    pub collateral: f64,
    /// Total system debt.
    pub debt: f64,
    /// Total collateral ratio.
    pub tcr: f64,
    /// Oracle collateral price.
    pub collateral_price: f64,
    /// Secondary reference price from the swap quote.
    pub stable_swap_price: f64,
}

/// Per-UTC-day metric row, keyed by calendar day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyMetricRow {
    /// Day key, `YYYY-MM-DD` in UTC.
    pub day: String,
    /// Trove count observed that day.
    pub trove_count: u64,
    /// Total system collateral.
    pub collateral: f64,
    /// Total system debt.
    pub debt: f64,
    /// Total collateral ratio.
    pub tcr: f64,
    /// Oracle collateral price.
    pub collateral_price: f64,
}

/// Bridged asset inventory row, keyed by token symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BridgeAssetRow {
    /// Symbol on the monitored chain.
    pub token_symbol: String,
    /// Symbol of the underlying asset on the secondary chain.
    pub ethereum_symbol: String,
    /// Token address on the monitored chain (lowercase hex).
    pub home_address: String,
    /// Token address on the secondary chain (lowercase hex).
    pub ethereum_address: String,
    /// Bridge custodian holding the balance.
    pub bridge_address: String,
    /// Raw balance in base units (decimal string).
    pub balance_raw: String,
    /// Balance scaled by token decimals.
    pub balance_formatted: f64,
    /// Token decimals.
    pub decimals: u8,
}

/// Voting/epoch singleton row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaugeStateRow {
    /// Epoch end timestamp.
    pub epoch_end: u64,
    /// Vote window end timestamp.
    pub vote_end: u64,
    /// Live voting-escrow supply (decimal string).
    pub ve_supply_live: String,
    /// Voter contract total weight (decimal string).
    pub total_votes_snapshot: String,
    /// Sum of per-gauge vote weights this pass tracked (decimal string).
    pub total_votes_tracked: String,
    /// Voting-escrow supply at epoch start (decimal string).
    pub ve_supply_epoch_start: String,
}

/// One gauge row, keyed by gauge address, fully overwritten each pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaugeRow {
    /// Gauge address (lowercase hex).
    pub gauge: String,
    /// Voted pool address (lowercase hex).
    pub pool: String,
    /// Pool display name, when the pool answers `name()`.
    pub pool_name: Option<String>,
    /// Bribe contract address (lowercase hex).
    pub bribe: String,
    /// Current vote weight (decimal string).
    pub votes: String,
    /// Reward epoch duration in seconds.
    pub duration: u64,
    /// Current epoch start timestamp.
    pub epoch_start: u64,
    /// Bribe rewards serialized as JSON `[{token, amount}, ...]`.
    pub bribes: String,
}

/// Aggregate row counts for the status command.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreCounts {
    pub troves: u64,
    pub liquidations: u64,
    pub redemptions: u64,
    pub snapshots: u64,
    pub gauges: u64,
}

pub struct Store {
    conn: RefCell<Connection>,
}

impl Store {
    /// Creates or opens a SQLite database with WAL mode enabled.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrations fail.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: RefCell::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn.borrow_mut().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS troves (
                owner TEXT PRIMARY KEY,
                collateral REAL,
                principal_debt REAL,
                interest REAL,
                collateralization_ratio REAL,
                updated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS liquidations (
                id TEXT PRIMARY KEY,
                borrower TEXT,
                debt REAL,
                collateral REAL,
                operation INTEGER,
                tx_hash TEXT,
                block_number INTEGER,
                log_index INTEGER,
                block_timestamp TEXT,
                tx_status TEXT
            );

            CREATE TABLE IF NOT EXISTS redemptions (
                id TEXT PRIMARY KEY,
                attempted_amount REAL,
                actual_amount REAL,
                collateral_sent REAL,
                collateral_fee REAL,
                affected_borrowers TEXT,
                tx_hash TEXT,
                block_number INTEGER,
                log_index INTEGER,
                block_timestamp TEXT,
                tx_status TEXT
            );

            CREATE TABLE IF NOT EXISTS price_feeds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                price REAL,
                source TEXT,
                block_number INTEGER,
                recorded_at TEXT
            );

            CREATE TABLE IF NOT EXISTS system_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collateral REAL,
                debt REAL,
                tcr REAL,
                collateral_price REAL,
                stable_swap_price REAL,
                recorded_at TEXT
            );

            CREATE TABLE IF NOT EXISTS system_metrics_daily (
                day TEXT PRIMARY KEY,
                trove_count INTEGER,
                collateral REAL,
                debt REAL,
                tcr REAL,
                collateral_price REAL,
                updated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS bridge_assets (
                token_symbol TEXT PRIMARY KEY,
                ethereum_symbol TEXT,
                home_address TEXT,
                ethereum_address TEXT,
                bridge_address TEXT,
                balance_raw TEXT,
                balance_formatted REAL,
                decimals INTEGER,
                updated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS gauge_state (
                key TEXT PRIMARY KEY,
                epoch_end INTEGER,
                vote_end INTEGER,
                ve_supply_live TEXT,
                total_votes_snapshot TEXT,
                total_votes_tracked TEXT,
                ve_supply_epoch_start TEXT,
                updated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS gauges (
                gauge TEXT PRIMARY KEY,
                pool TEXT,
                pool_name TEXT,
                bribe TEXT,
                votes TEXT,
                duration INTEGER,
                epoch_start INTEGER,
                bribes TEXT,
                updated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS indexer_state (
                key TEXT PRIMARY KEY,
                block_number INTEGER,
                updated_at TEXT
            );
            ",
        )?;
        Ok(())
    }

    fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    fn unix_to_rfc3339(timestamp: u64) -> String {
        chrono::DateTime::from_timestamp(timestamp as i64, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    }

    /// Replaces the entire current trove set.
    ///
    /// Owners present in `troves` are upserted; any previously stored owner
    /// missing from the input is deleted. An empty input clears the table.
    ///
    /// # Errors
    /// Returns error if any statement fails; the transaction rolls back.
    pub fn upsert_troves(&self, troves: &[TroveRow]) -> Result<()> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        let now = Self::now();
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR REPLACE INTO troves (
                    owner, collateral, principal_debt, interest,
                    collateralization_ratio, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                ",
            )?;

            for trove in troves {
                stmt.execute(rusqlite::params![
                    trove.owner.to_lowercase(),
                    trove.collateral,
                    trove.principal_debt,
                    trove.interest,
                    trove.collateralization_ratio,
                    now,
                ])?;
            }
        }

        if troves.is_empty() {
            tx.execute("DELETE FROM troves", [])?;
        } else {
            let placeholders = vec!["?"; troves.len()].join(",");
            let sql = format!("DELETE FROM troves WHERE owner NOT IN ({placeholders})");
            tx.execute(
                &sql,
                rusqlite::params_from_iter(troves.iter().map(|t| t.owner.to_lowercase())),
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Append-once insert of liquidation events keyed by `txHash:logIndex`.
    ///
    /// Safe to call repeatedly with overlapping block ranges. Returns the
    /// number of rows actually inserted.
    pub fn upsert_liquidations(&self, events: &[LiquidationRow]) -> Result<usize> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO liquidations (
                    id, borrower, debt, collateral, operation, tx_hash,
                    block_number, log_index, block_timestamp, tx_status
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;

            for event in events {
                inserted += stmt.execute(rusqlite::params![
                    format!("{}:{}", event.tx_hash, event.log_index),
                    event.borrower.to_lowercase(),
                    event.debt,
                    event.collateral,
                    event.operation,
                    event.tx_hash,
                    event.block_number,
                    event.log_index,
                    Self::unix_to_rfc3339(event.timestamp),
                    event.status,
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Append-once insert of redemption events keyed by `txHash:logIndex`.
    pub fn upsert_redemptions(&self, events: &[RedemptionRow]) -> Result<usize> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO redemptions (
                    id, attempted_amount, actual_amount, collateral_sent,
                    collateral_fee, affected_borrowers, tx_hash, block_number,
                    log_index, block_timestamp, tx_status
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;

            for event in events {
                let borrowers = if event.affected_borrowers.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&event.affected_borrowers)?)
                };
                inserted += stmt.execute(rusqlite::params![
                    format!("{}:{}", event.tx_hash, event.log_index),
                    event.attempted_amount,
                    event.actual_amount,
                    event.collateral_sent,
                    event.collateral_fee,
                    borrowers,
                    event.tx_hash,
                    event.block_number,
                    event.log_index,
                    Self::unix_to_rfc3339(event.timestamp),
                    event.status,
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Last fully processed block, if any pass has completed.
    pub fn get_watermark(&self) -> Result<Option<u64>> {
        let conn = self.conn.borrow();
        let value = conn
            .query_row(
                "SELECT block_number FROM indexer_state WHERE key = 'latest_block'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Records the last fully processed block. Written once per pass, after
    /// every other write succeeded.
    pub fn set_watermark(&self, block_number: u64) -> Result<()> {
        self.conn.borrow_mut().execute(
            "
            INSERT OR REPLACE INTO indexer_state (key, block_number, updated_at)
            VALUES ('latest_block', ?, ?)
            ",
            rusqlite::params![block_number, Self::now()],
        )?;
        Ok(())
    }

    /// Appends one price sample for a named source.
    pub fn record_price(&self, price: f64, source: &str, block_number: u64) -> Result<()> {
        self.conn.borrow_mut().execute(
            "
            INSERT INTO price_feeds (price, source, block_number, recorded_at)
            VALUES (?, ?, ?, ?)
            ",
            rusqlite::params![price, source, block_number, Self::now()],
        )?;
        Ok(())
    }

    /// Highest block at which a sample was recorded for `source`.
    pub fn last_price_block(&self, source: &str) -> Result<Option<u64>> {
        let conn = self.conn.borrow();
        let value = conn
            .query_row(
                "SELECT MAX(block_number) FROM price_feeds WHERE source = ?",
                rusqlite::params![source],
                |row| row.get::<_, Option<u64>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    /// Unweighted mean of snapshot swap prices recorded at or after `since`
    /// (RFC 3339). Returns `None` when the window has no samples.
    pub fn average_snapshot_price_since(&self, since: &str) -> Result<Option<f64>> {
        let conn = self.conn.borrow();
        let value = conn.query_row(
            "SELECT AVG(stable_swap_price) FROM system_snapshots WHERE recorded_at >= ?",
            rusqlite::params![since],
            |row| row.get::<_, Option<f64>>(0),
        )?;
        Ok(value)
    }

    /// Appends a system snapshot to the time series.
    pub fn insert_snapshot(&self, snapshot: &SnapshotRow) -> Result<()> {
        self.conn.borrow_mut().execute(
            "
            INSERT INTO system_snapshots (
                collateral, debt, tcr, collateral_price, stable_swap_price, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ",
            rusqlite::params![
                snapshot.collateral,
                snapshot.debt,
                snapshot.tcr,
                snapshot.collateral_price,
                snapshot.stable_swap_price,
                Self::now(),
            ],
        )?;
        Ok(())
    }

    /// Upserts the per-UTC-day metric row.
    pub fn upsert_daily_metric(&self, metric: &DailyMetricRow) -> Result<()> {
        self.conn.borrow_mut().execute(
            "
            INSERT OR REPLACE INTO system_metrics_daily (
                day, trove_count, collateral, debt, tcr, collateral_price, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
            rusqlite::params![
                metric.day,
                metric.trove_count,
                metric.collateral,
                metric.debt,
                metric.tcr,
                metric.collateral_price,
                Self::now(),
            ],
        )?;
        Ok(())
    }

    /// Upserts bridge asset balances keyed by token symbol.
    pub fn upsert_bridge_assets(&self, assets: &[BridgeAssetRow]) -> Result<()> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        let now = Self::now();
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR REPLACE INTO bridge_assets (
                    token_symbol, ethereum_symbol, home_address, ethereum_address,
                    bridge_address, balance_raw, balance_formatted, decimals, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;

            for asset in assets {
                stmt.execute(rusqlite::params![
                    asset.token_symbol,
                    asset.ethereum_symbol,
                    asset.home_address.to_lowercase(),
                    asset.ethereum_address.to_lowercase(),
                    asset.bridge_address.to_lowercase(),
                    asset.balance_raw,
                    asset.balance_formatted,
                    asset.decimals,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Upserts the voting/epoch singleton row.
    pub fn upsert_gauge_state(&self, state: &GaugeStateRow) -> Result<()> {
        self.conn.borrow_mut().execute(
            "
            INSERT OR REPLACE INTO gauge_state (
                key, epoch_end, vote_end, ve_supply_live, total_votes_snapshot,
                total_votes_tracked, ve_supply_epoch_start, updated_at
            ) VALUES ('current', ?, ?, ?, ?, ?, ?, ?)
            ",
            rusqlite::params![
                state.epoch_end,
                state.vote_end,
                state.ve_supply_live,
                state.total_votes_snapshot,
                state.total_votes_tracked,
                state.ve_supply_epoch_start,
                Self::now(),
            ],
        )?;
        Ok(())
    }

    /// Upserts gauge rows keyed by gauge address.
    pub fn upsert_gauges(&self, gauges: &[GaugeRow]) -> Result<()> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        let now = Self::now();
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR REPLACE INTO gauges (
                    gauge, pool, pool_name, bribe, votes, duration,
                    epoch_start, bribes, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;

            for gauge in gauges {
                stmt.execute(rusqlite::params![
                    gauge.gauge.to_lowercase(),
                    gauge.pool.to_lowercase(),
                    gauge.pool_name,
                    gauge.bribe.to_lowercase(),
                    gauge.votes,
                    gauge.duration,
                    gauge.epoch_start,
                    gauge.bribes,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Troves ordered by ascending collateralization ratio.
    pub fn riskiest_troves(&self, limit: u64) -> Result<Vec<TroveRow>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "
            SELECT owner, collateral, principal_debt, interest, collateralization_ratio
            FROM troves ORDER BY collateralization_ratio ASC LIMIT ?
            ",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![limit], |row| {
                Ok(TroveRow {
                    owner: row.get(0)?,
                    collateral: row.get(1)?,
                    principal_debt: row.get(2)?,
                    interest: row.get(3)?,
                    collateralization_ratio: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Row counts across the main tables, for the status command.
    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.conn.borrow();
        let count = |table: &str| -> Result<u64> {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            Ok(conn.query_row(&sql, [], |row| row.get(0))?)
        };

        Ok(StoreCounts {
            troves: count("troves")?,
            liquidations: count("liquidations")?,
            redemptions: count("redemptions")?,
            snapshots: count("system_snapshots")?,
            gauges: count("gauges")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trove(owner: &str, ratio: f64) -> TroveRow {
        TroveRow {
            owner: owner.to_string(),
            collateral: 1.5,
            principal_debt: 50_000.0,
            interest: 120.0,
            collateralization_ratio: ratio,
        }
    }

    fn liquidation(tx_hash: &str, log_index: u64) -> LiquidationRow {
        LiquidationRow {
            borrower: "0xBorrower".to_string(),
            debt: 1_000.0,
            collateral: 0.02,
            operation: 1,
            tx_hash: tx_hash.to_string(),
            block_number: 100,
            log_index,
            timestamp: 1_700_000_000,
            status: "success".to_string(),
        }
    }

    #[test]
    fn migrations_create_tables() {
        let store = Store::new(":memory:").expect("in-memory store should always open");
        let conn = store.conn.borrow();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("query should prepare");

        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .expect("query_map should succeed")
            .collect::<std::result::Result<Vec<_>, _>>()
            .expect("all rows should parse");

        for table in [
            "troves",
            "liquidations",
            "redemptions",
            "price_feeds",
            "system_snapshots",
            "system_metrics_daily",
            "bridge_assets",
            "gauge_state",
            "gauges",
            "indexer_state",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn upsert_troves_replaces_full_set() {
        let store = Store::new(":memory:").expect("in-memory store should always open");

        store
            .upsert_troves(&[trove("0xaaa", 1.5), trove("0xbbb", 2.0)])
            .expect("first upsert should succeed");
        store
            .upsert_troves(&[trove("0xbbb", 2.1), trove("0xccc", 3.0)])
            .expect("second upsert should succeed");

        let rows = store.riskiest_troves(10).expect("query should succeed");
        let owners: Vec<&str> = rows.iter().map(|r| r.owner.as_str()).collect();
        assert_eq!(owners, vec!["0xbbb", "0xccc"], "stale owner must be pruned");
        assert_eq!(rows[0].collateralization_ratio, 2.1);
    }

    #[test]
    fn upsert_troves_empty_input_clears_table() {
        let store = Store::new(":memory:").expect("in-memory store should always open");

        store
            .upsert_troves(&[trove("0xaaa", 1.5)])
            .expect("seed upsert should succeed");
        store.upsert_troves(&[]).expect("clear should succeed");

        assert_eq!(store.counts().expect("counts should succeed").troves, 0);
    }

    #[test]
    fn upsert_liquidations_is_idempotent() {
        let store = Store::new(":memory:").expect("in-memory store should always open");
        let events = vec![liquidation("0xtx1", 0), liquidation("0xtx1", 1)];

        let first = store
            .upsert_liquidations(&events)
            .expect("first insert should succeed");
        let second = store
            .upsert_liquidations(&events)
            .expect("repeat insert should succeed");

        assert_eq!(first, 2);
        assert_eq!(second, 0, "repeated events must be ignored");
        assert_eq!(store.counts().expect("counts").liquidations, 2);
    }

    #[test]
    fn watermark_round_trip() {
        let store = Store::new(":memory:").expect("in-memory store should always open");

        assert_eq!(store.get_watermark().expect("read should succeed"), None);

        store.set_watermark(5_000_500).expect("write should succeed");
        assert_eq!(
            store.get_watermark().expect("read should succeed"),
            Some(5_000_500)
        );

        store.set_watermark(5_000_700).expect("write should succeed");
        assert_eq!(
            store.get_watermark().expect("read should succeed"),
            Some(5_000_700)
        );
    }

    #[test]
    fn last_price_block_tracks_sources_independently() {
        let store = Store::new(":memory:").expect("in-memory store should always open");

        store
            .record_price(65_000.0, "btc_oracle", 120)
            .expect("record should succeed");
        store
            .record_price(99_800.0, "stable_swap", 240)
            .expect("record should succeed");

        assert_eq!(
            store.last_price_block("btc_oracle").expect("query"),
            Some(120)
        );
        assert_eq!(
            store.last_price_block("stable_swap").expect("query"),
            Some(240)
        );
        assert_eq!(store.last_price_block("stable_swap_4h").expect("query"), None);
    }

    #[test]
    fn average_snapshot_price_requires_samples_in_window() {
        let store = Store::new(":memory:").expect("in-memory store should always open");

        assert_eq!(
            store
                .average_snapshot_price_since("2000-01-01T00:00:00+00:00")
                .expect("query should succeed"),
            None
        );

        for price in [99_000.0, 101_000.0] {
            store
                .insert_snapshot(&SnapshotRow {
                    collateral: 10.0,
                    debt: 500_000.0,
                    tcr: 1.3,
                    collateral_price: 65_000.0,
                    stable_swap_price: price,
                })
                .expect("insert should succeed");
        }

        let average = store
            .average_snapshot_price_since("2000-01-01T00:00:00+00:00")
            .expect("query should succeed")
            .expect("window should contain samples");
        assert_eq!(average, 100_000.0);
    }

    #[test]
    fn daily_metric_upserts_by_day_key() {
        let store = Store::new(":memory:").expect("in-memory store should always open");
        let mut metric = DailyMetricRow {
            day: "2026-08-07".to_string(),
            trove_count: 10,
            collateral: 12.0,
            debt: 400_000.0,
            tcr: 1.9,
            collateral_price: 64_000.0,
        };

        store.upsert_daily_metric(&metric).expect("insert");
        metric.trove_count = 11;
        store.upsert_daily_metric(&metric).expect("update");

        let conn = store.conn.borrow();
        let (count, trove_count): (u64, u64) = conn
            .query_row(
                "SELECT COUNT(*), MAX(trove_count) FROM system_metrics_daily",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("query should succeed");
        assert_eq!(count, 1, "same day must overwrite");
        assert_eq!(trove_count, 11);
    }

    #[test]
    fn gauges_upsert_by_gauge_address() {
        let store = Store::new(":memory:").expect("in-memory store should always open");
        let mut row = GaugeRow {
            gauge: "0xGaUgE".to_string(),
            pool: "0xpool".to_string(),
            pool_name: Some("vAMM-A/B".to_string()),
            bribe: "0xbribe".to_string(),
            votes: "1000".to_string(),
            duration: 604_800,
            epoch_start: 1_699_833_600,
            bribes: "[]".to_string(),
        };

        store.upsert_gauges(std::slice::from_ref(&row)).expect("insert");
        row.votes = "2000".to_string();
        store.upsert_gauges(std::slice::from_ref(&row)).expect("update");

        assert_eq!(store.counts().expect("counts").gauges, 1);
    }
}
