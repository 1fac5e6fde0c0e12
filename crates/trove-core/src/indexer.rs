//! One synchronization pass over the protocol.
//!
//! A pass reads the oracle price, fans out every independent read, persists
//! the derived snapshot, back-scans liquidation/redemption events from the
//! watermark, records price history on its block cadence, and advances the
//! watermark only after everything else succeeded. A crash mid-pass repeats
//! work on the next invocation instead of skipping blocks; every event write
//! is idempotent by key, so the repeat is harmless.

use alloy::primitives::U256;
use chrono::Utc;
use eyre::Result;
use tracing::{info, warn};
use trove_chain::{connect_http, ChainReader, HttpProvider};
use trove_store::{
    BridgeAssetRow, DailyMetricRow, GaugeRow, GaugeStateRow, LiquidationRow, RedemptionRow,
    SnapshotRow, Store, TroveRow,
};

use crate::bridge::BridgeAssetReader;
use crate::config::{scan_start, IndexerConfig};
use crate::events::EventIndexer;
use crate::gauges::GaugeReader;
use crate::quote::{QuoteClient, DEFAULT_QUOTE_SELL_AMOUNT};
use crate::troves::TroveReader;
use crate::types::{
    BridgeAssetBalance, EpochTiming, GaugeIncentive, LiquidationEvent, RedemptionEvent, SwapQuote,
    SyncState, SystemSnapshot, SystemState, Trove, units_to_f64,
};

/// Minimum block gap between instantaneous price samples.
pub const INSTANT_PRICE_INTERVAL_BLOCKS: u64 = 120;

/// Minimum block gap between 4-hour rolling average samples.
pub const ROLLING_PRICE_INTERVAL_BLOCKS: u64 = 2_880;

/// Width of the rolling average window.
const ROLLING_WINDOW_HOURS: i64 = 4;

/// Named price-feed sources.
pub const PRICE_SOURCE_ORACLE: &str = "btc_oracle";
pub const PRICE_SOURCE_SWAP: &str = "stable_swap";
pub const PRICE_SOURCE_SWAP_4H: &str = "stable_swap_4h";

/// Results of the pass's concurrent reads, one slot per fetch.
///
/// Held as individual `Result`s so the orchestrator decides deliberately
/// which failures abort the pass: everything feeding the snapshot or the
/// trove set is fatal, the bridge inventory degrades to empty.
struct PassReads {
    height: Result<u64>,
    system: Result<SystemState>,
    troves: Result<Vec<Trove>>,
    swap: Result<SwapQuote>,
    incentives: Result<Vec<GaugeIncentive>>,
    timing: Result<EpochTiming>,
    ve_supply_live: Result<U256>,
    total_votes: Result<U256>,
    bridge: Result<Vec<BridgeAssetBalance>>,
}

/// Sequences one pass: read, derive, persist, advance the watermark.
pub struct Indexer {
    config: IndexerConfig,
    store: Store,
    troves: TroveReader<HttpProvider>,
    events: EventIndexer<HttpProvider>,
    gauges: GaugeReader<HttpProvider>,
    bridge: BridgeAssetReader<HttpProvider>,
    quote: QuoteClient,
}

impl Indexer {
    /// Connects both chains and builds every reader.
    ///
    /// # Errors
    /// Returns error if either RPC endpoint is unreachable.
    pub async fn connect(config: IndexerConfig, store: Store) -> Result<Self> {
        let main_provider = connect_http(&config.trove_rpc_url).await?;
        let eth_provider = connect_http(&config.ethereum_rpc_url).await?;

        let chain = ChainReader::new(main_provider);
        let troves = TroveReader::connect(chain.clone()).await?;
        let events = EventIndexer::new(chain.clone());
        let gauges = GaugeReader::new(chain);
        let bridge = BridgeAssetReader::new(ChainReader::new(eth_provider));
        let quote = QuoteClient::new(&config.quote_api_url);

        Ok(Self {
            config,
            store,
            troves,
            events,
            gauges,
            bridge,
            quote,
        })
    }

    /// The store this indexer persists into.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Runs one pass from `state` and returns the advanced state.
    ///
    /// # Errors
    /// Returns error on any pass-fatal read or persistence failure; the
    /// watermark is left untouched in that case, so the next invocation
    /// re-processes the same range.
    #[tracing::instrument(skip_all, fields(watermark = ?state.last_block))]
    pub async fn run(&self, state: SyncState) -> Result<SyncState> {
        let price = self.troves.fetch_price().await?;
        let reads = self.gather_reads(price).await;

        let height = reads.height?;
        let system = reads.system?;
        let troves = reads.troves?;
        let swap = reads.swap?;
        let incentives = reads.incentives?;
        let timing = reads.timing?;
        let ve_supply_live = reads.ve_supply_live?;
        let total_votes_snapshot = reads.total_votes?;
        let bridge_assets = reads.bridge.unwrap_or_else(|error| {
            warn!(%error, "bridge asset fetch failed; continuing without inventory");
            Vec::new()
        });

        info!(
            height,
            troves = troves.len(),
            tcr = system.ratio,
            collateral_price = system.collateral_price,
            swap_price = swap.buy_amount,
            "pass reads complete"
        );

        let snapshot = SystemSnapshot {
            collateral: system.collateral,
            debt: system.debt,
            ratio: system.ratio,
            collateral_price: system.collateral_price,
            stable_swap_price: swap.buy_amount,
        };

        let ve_supply_epoch_start = self
            .gauges
            .total_ve_supply_at(timing.epoch_start)
            .await
            .unwrap_or(U256::ZERO);
        let total_votes_tracked = incentives
            .iter()
            .fold(U256::ZERO, |acc, gauge| acc + gauge.votes);

        self.persist_snapshot(
            &troves,
            &snapshot,
            &incentives,
            &timing,
            ve_supply_live,
            total_votes_snapshot,
            total_votes_tracked,
            ve_supply_epoch_start,
            &bridge_assets,
        )?;

        self.process_events(state.last_block, height).await?;
        self.record_price_history(height, snapshot.collateral_price, snapshot.stable_swap_price)?;

        self.store.set_watermark(height)?;
        info!(height, "advanced watermark");

        Ok(SyncState {
            last_block: Some(height),
        })
    }

    async fn gather_reads(&self, price: U256) -> PassReads {
        let (height, system, troves, swap, incentives, timing, ve_supply_live, total_votes, bridge) =
            tokio::join!(
                self.troves.chain().block_number(),
                self.troves.system_state(price),
                self.troves.all_troves(price),
                self.quote.stable_sell_quote(DEFAULT_QUOTE_SELL_AMOUNT),
                self.gauges.fetch_incentives(true),
                self.gauges.epoch_timing(),
                self.gauges.total_ve_supply(),
                self.gauges.total_voting_power(),
                self.bridge.fetch_assets(),
            );

        PassReads {
            height,
            system,
            troves,
            swap,
            incentives,
            timing,
            ve_supply_live,
            total_votes,
            bridge,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn persist_snapshot(
        &self,
        troves: &[Trove],
        snapshot: &SystemSnapshot,
        incentives: &[GaugeIncentive],
        timing: &EpochTiming,
        ve_supply_live: U256,
        total_votes_snapshot: U256,
        total_votes_tracked: U256,
        ve_supply_epoch_start: U256,
        bridge_assets: &[BridgeAssetBalance],
    ) -> Result<()> {
        let trove_rows: Vec<TroveRow> = troves.iter().map(trove_row).collect();
        self.store.upsert_troves(&trove_rows)?;

        self.store.insert_snapshot(&SnapshotRow {
            collateral: snapshot.collateral,
            debt: snapshot.debt,
            tcr: snapshot.ratio,
            collateral_price: snapshot.collateral_price,
            stable_swap_price: snapshot.stable_swap_price,
        })?;

        self.store.upsert_daily_metric(&DailyMetricRow {
            day: Utc::now().format("%Y-%m-%d").to_string(),
            trove_count: troves.len() as u64,
            collateral: snapshot.collateral,
            debt: snapshot.debt,
            tcr: snapshot.ratio,
            collateral_price: snapshot.collateral_price,
        })?;

        self.store.upsert_gauge_state(&GaugeStateRow {
            epoch_end: timing.epoch_end,
            vote_end: timing.vote_end,
            ve_supply_live: ve_supply_live.to_string(),
            total_votes_snapshot: total_votes_snapshot.to_string(),
            total_votes_tracked: total_votes_tracked.to_string(),
            ve_supply_epoch_start: ve_supply_epoch_start.to_string(),
        })?;

        let gauge_rows: Vec<GaugeRow> = incentives.iter().map(gauge_row).collect();
        self.store.upsert_gauges(&gauge_rows)?;

        if bridge_assets.is_empty() {
            warn!("no bridge assets fetched during sync");
        } else {
            let bridge_rows: Vec<BridgeAssetRow> = bridge_assets
                .iter()
                .map(bridge_asset_row)
                .collect::<Result<_>>()?;
            self.store.upsert_bridge_assets(&bridge_rows)?;
            info!(assets = bridge_rows.len(), "upserted bridge assets");
        }

        info!("upserted troves, gauges, and stored system snapshot");
        Ok(())
    }

    /// Scans liquidations and redemptions from the watermark (or the
    /// profile's lookback window on first run) up to `height`.
    async fn process_events(&self, watermark: Option<u64>, height: u64) -> Result<()> {
        let start = scan_start(watermark, height, self.config.environment);
        info!(start, height, "scanning liquidation and redemption events");

        let (liquidations, redemptions) = tokio::try_join!(
            self.events
                .liquidations_since(start, height, self.config.liquidation_chunk_size),
            self.events
                .redemptions_since(start, height, self.config.redemption_chunk_size),
        )?;
        info!(
            liquidations = liquidations.len(),
            redemptions = redemptions.len(),
            "fetched events"
        );

        if !liquidations.is_empty() {
            let rows: Vec<LiquidationRow> = liquidations.iter().map(liquidation_row).collect();
            let inserted = self.store.upsert_liquidations(&rows)?;
            info!(inserted, "upserted liquidation events");
        }
        if !redemptions.is_empty() {
            let rows: Vec<RedemptionRow> = redemptions.iter().map(redemption_row).collect();
            let inserted = self.store.upsert_redemptions(&rows)?;
            info!(inserted, "upserted redemption events");
        }

        Ok(())
    }

    /// Records an instantaneous price sample every 120+ blocks and a 4-hour
    /// rolling average sample every 2,880+ blocks.
    fn record_price_history(&self, height: u64, oracle_price: f64, swap_price: f64) -> Result<()> {
        let last_oracle_block = self.store.last_price_block(PRICE_SOURCE_ORACLE)?;
        let due_instant = last_oracle_block
            .map_or(true, |last| height.saturating_sub(last) >= INSTANT_PRICE_INTERVAL_BLOCKS);

        if due_instant {
            self.store
                .record_price(oracle_price, PRICE_SOURCE_ORACLE, height)?;
            self.store
                .record_price(swap_price.round(), PRICE_SOURCE_SWAP, height)?;
            info!(oracle_price, swap_price, height, "recorded price samples");
        }

        let last_rolling_block = self.store.last_price_block(PRICE_SOURCE_SWAP_4H)?;
        let due_rolling = last_rolling_block
            .map_or(true, |last| height.saturating_sub(last) >= ROLLING_PRICE_INTERVAL_BLOCKS);

        if due_rolling {
            let window_start = (Utc::now() - chrono::Duration::hours(ROLLING_WINDOW_HOURS)).to_rfc3339();
            match self.store.average_snapshot_price_since(&window_start)? {
                Some(average) => {
                    self.store
                        .record_price(average, PRICE_SOURCE_SWAP_4H, height)?;
                    info!(average, height, "recorded 4h rolling average price");
                }
                None => {
                    info!("skipped recording 4h average price: no snapshots in window");
                }
            }
        }

        Ok(())
    }
}

fn trove_row(trove: &Trove) -> TroveRow {
    TroveRow {
        owner: format!("{:#x}", trove.owner),
        collateral: trove.collateral,
        principal_debt: trove.principal_debt,
        interest: trove.interest,
        collateralization_ratio: trove.collateralization_ratio,
    }
}

fn liquidation_row(event: &LiquidationEvent) -> LiquidationRow {
    LiquidationRow {
        borrower: format!("{:#x}", event.borrower),
        debt: event.debt,
        collateral: event.collateral,
        operation: event.operation,
        tx_hash: format!("{:#x}", event.tx_hash),
        block_number: event.block_number,
        log_index: event.log_index,
        timestamp: event.timestamp,
        status: event.status.as_str().to_string(),
    }
}

fn redemption_row(event: &RedemptionEvent) -> RedemptionRow {
    RedemptionRow {
        attempted_amount: event.attempted_amount,
        actual_amount: event.actual_amount,
        collateral_sent: event.collateral_sent,
        collateral_fee: event.collateral_fee,
        affected_borrowers: event
            .affected_borrowers
            .iter()
            .map(|borrower| format!("{:#x}", borrower))
            .collect(),
        tx_hash: format!("{:#x}", event.tx_hash),
        block_number: event.block_number,
        log_index: event.log_index,
        timestamp: event.timestamp,
        status: event.status.as_str().to_string(),
    }
}

fn gauge_row(incentive: &GaugeIncentive) -> GaugeRow {
    let bribes: Vec<serde_json::Value> = incentive
        .rewards
        .iter()
        .map(|reward| {
            serde_json::json!({
                "token": format!("{:#x}", reward.token),
                "amount": reward.amount.to_string(),
            })
        })
        .collect();

    GaugeRow {
        gauge: format!("{:#x}", incentive.gauge),
        pool: format!("{:#x}", incentive.pool),
        pool_name: incentive.pool_name.clone(),
        bribe: format!("{:#x}", incentive.bribe),
        votes: incentive.votes.to_string(),
        duration: incentive.duration,
        epoch_start: incentive.epoch_start,
        bribes: serde_json::Value::Array(bribes).to_string(),
    }
}

fn bridge_asset_row(asset: &BridgeAssetBalance) -> Result<BridgeAssetRow> {
    Ok(BridgeAssetRow {
        token_symbol: asset.token_symbol.to_string(),
        ethereum_symbol: asset.ethereum_symbol.to_string(),
        home_address: format!("{:#x}", asset.home_address),
        ethereum_address: format!("{:#x}", asset.ethereum_address),
        bridge_address: format!("{:#x}", asset.bridge_address),
        balance_raw: asset.balance_raw.to_string(),
        balance_formatted: units_to_f64(asset.balance_raw, asset.decimals)?,
        decimals: asset.decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256};
    use trove_chain::TxStatus;
    use crate::types::BribeReward;

    #[test]
    fn liquidation_row_uses_tx_hash_and_log_index_key_parts() {
        let event = LiquidationEvent {
            borrower: Address::repeat_byte(0xab),
            debt: 1_000.0,
            collateral: 0.02,
            operation: 1,
            tx_hash: B256::repeat_byte(0x01),
            block_number: 42,
            log_index: 3,
            timestamp: 1_700_000_000,
            status: TxStatus::Failed,
        };

        let row = liquidation_row(&event);
        assert!(row.tx_hash.starts_with("0x"));
        assert_eq!(row.log_index, 3);
        assert_eq!(row.status, "failed");
    }

    #[test]
    fn gauge_row_serializes_bribes_as_json() {
        let incentive = GaugeIncentive {
            pool: Address::repeat_byte(0x01),
            pool_name: Some("vAMM-A/B".to_string()),
            gauge: Address::repeat_byte(0x02),
            bribe: Address::repeat_byte(0x03),
            votes: U256::from(12_345u64),
            duration: 604_800,
            epoch_start: 1_699_833_600,
            rewards: vec![BribeReward {
                token: Address::repeat_byte(0x04),
                amount: U256::from(99u64),
                epoch_start: 1_699_833_600,
                previous_epoch_amount: None,
                next_epoch_amount: Some(U256::from(7u64)),
            }],
        };

        let row = gauge_row(&incentive);
        let parsed: serde_json::Value =
            serde_json::from_str(&row.bribes).expect("bribes must be valid JSON");
        assert_eq!(parsed[0]["amount"], "99");
        assert_eq!(row.votes, "12345");
    }
}
