//! Liquidation and redemption event indexing.
//!
//! Raw logs come from the chunked scanner in canonical order; this module
//! decodes them, resolves block timestamps and receipt statuses (one lookup
//! per distinct block/hash), and, for redemptions, recovers the set of
//! borrowers the redemption walked through.

use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::sol_types::SolEvent;
use eyre::Result;
use trove_chain::contracts::{addresses, ITroveManager};
use trove_chain::{ChainReader, EventLogScanner, TxStatus};

use crate::types::{wei_to_f64, LiquidationEvent, RedemptionEvent};

/// Builds domain events from TroveManager logs.
pub struct EventIndexer<P> {
    chain: ChainReader<P>,
    trove_manager: Address,
}

impl<P: Provider + Clone> EventIndexer<P> {
    pub fn new(chain: ChainReader<P>) -> Self {
        Self {
            chain,
            trove_manager: addresses::TROVE_MANAGER,
        }
    }

    /// Liquidation events in `[from_block, to_block]`, canonically ordered.
    #[tracing::instrument(skip(self), fields(from_block, to_block, chunk_size))]
    pub async fn liquidations_since(
        &self,
        from_block: u64,
        to_block: u64,
        chunk_size: u64,
    ) -> Result<Vec<LiquidationEvent>> {
        let scanner = EventLogScanner::new(
            self.chain.provider().clone(),
            self.trove_manager,
            chunk_size,
        );
        let logs = scanner
            .scan(
                ITroveManager::TroveLiquidated::SIGNATURE_HASH,
                from_block,
                to_block,
            )
            .await?;
        if logs.is_empty() {
            return Ok(Vec::new());
        }

        let timestamps = self
            .chain
            .timestamp_map(logs.iter().filter_map(|log| log.block_number))
            .await?;
        let statuses = self
            .chain
            .receipt_status_map(logs.iter().filter_map(|log| log.transaction_hash))
            .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            let Some(tx_hash) = log.transaction_hash else {
                continue;
            };
            let decoded = match log.log_decode::<ITroveManager::TroveLiquidated>() {
                Ok(decoded) => decoded.inner.data,
                Err(error) => {
                    tracing::debug!(%error, "skipping undecodable TroveLiquidated log");
                    continue;
                }
            };
            let block_number = log.block_number.unwrap_or(0);

            events.push(LiquidationEvent {
                borrower: decoded._borrower,
                debt: wei_to_f64(decoded._debt)?,
                collateral: wei_to_f64(decoded._coll)?,
                operation: decoded.operation,
                tx_hash,
                block_number,
                log_index: log.log_index.unwrap_or(0),
                timestamp: timestamps.get(&block_number).copied().unwrap_or(0),
                status: statuses
                    .get(&tx_hash)
                    .copied()
                    .unwrap_or(TxStatus::Success),
            });
        }

        Ok(events)
    }

    /// Redemption events in `[from_block, to_block]`, canonically ordered,
    /// with affected borrowers recovered from same-transaction
    /// `TroveUpdated` logs.
    #[tracing::instrument(skip(self), fields(from_block, to_block, chunk_size))]
    pub async fn redemptions_since(
        &self,
        from_block: u64,
        to_block: u64,
        chunk_size: u64,
    ) -> Result<Vec<RedemptionEvent>> {
        let scanner = EventLogScanner::new(
            self.chain.provider().clone(),
            self.trove_manager,
            chunk_size,
        );
        let logs = scanner
            .scan(
                ITroveManager::Redemption::SIGNATURE_HASH,
                from_block,
                to_block,
            )
            .await?;
        if logs.is_empty() {
            return Ok(Vec::new());
        }

        let borrowers = self
            .chain
            .redemption_borrowers(
                logs.iter().filter_map(|log| log.transaction_hash),
                self.trove_manager,
            )
            .await?;
        let timestamps = self
            .chain
            .timestamp_map(logs.iter().filter_map(|log| log.block_number))
            .await?;
        let statuses = self
            .chain
            .receipt_status_map(logs.iter().filter_map(|log| log.transaction_hash))
            .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            let Some(tx_hash) = log.transaction_hash else {
                continue;
            };
            let decoded = match log.log_decode::<ITroveManager::Redemption>() {
                Ok(decoded) => decoded.inner.data,
                Err(error) => {
                    tracing::debug!(%error, "skipping undecodable Redemption log");
                    continue;
                }
            };
            let block_number = log.block_number.unwrap_or(0);

            events.push(RedemptionEvent {
                attempted_amount: wei_to_f64(decoded._attemptedAmount)?,
                actual_amount: wei_to_f64(decoded._actualAmount)?,
                collateral_sent: wei_to_f64(decoded._collateralSent)?,
                collateral_fee: wei_to_f64(decoded._collateralFee)?,
                affected_borrowers: borrowers.get(&tx_hash).cloned().unwrap_or_default(),
                tx_hash,
                block_number,
                log_index: log.log_index.unwrap_or(0),
                timestamp: timestamps.get(&block_number).copied().unwrap_or(0),
                status: statuses
                    .get(&tx_hash)
                    .copied()
                    .unwrap_or(TxStatus::Success),
            });
        }

        Ok(events)
    }
}
