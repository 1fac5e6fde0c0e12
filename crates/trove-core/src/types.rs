//! Domain types derived from on-chain reads.

use alloy::primitives::{Address, B256, U256};
use eyre::{Context, Result};
use trove_chain::TxStatus;

/// Sentinel collateralization ratio for troves with zero debt.
pub const MAX_RATIO_SENTINEL: f64 = 9_007_199_254_740_991.0;

/// Converts an 18-decimal fixed-point chain value to `f64`.
pub fn wei_to_f64(value: U256) -> Result<f64> {
    units_to_f64(value, 18)
}

/// Converts a fixed-point chain value with the given decimals to `f64`.
pub fn units_to_f64(value: U256, decimals: u8) -> Result<f64> {
    alloy::primitives::utils::format_units(value, decimals)
        .wrap_err("value exceeds representable units")?
        .parse::<f64>()
        .wrap_err("formatted units are not a number")
}

/// One collateralized debt position, re-derived in full every pass.
#[derive(Clone, Debug, PartialEq)]
pub struct Trove {
    /// Owner address, the unique key of the position.
    pub owner: Address,
    /// Collateral in collateral-asset units.
    pub collateral: f64,
    /// Principal debt in stable-asset units.
    pub principal_debt: f64,
    /// Accrued interest in stable-asset units.
    pub interest: f64,
    /// `collateral * price / (principal + interest)`, including pending
    /// amounts; [`MAX_RATIO_SENTINEL`] when the trove carries no debt.
    pub collateralization_ratio: f64,
}

/// Aggregate system totals at the current block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SystemState {
    /// Total system collateral.
    pub collateral: f64,
    /// Total system debt.
    pub debt: f64,
    /// Total collateral ratio.
    pub ratio: f64,
    /// Oracle collateral price used for the ratio.
    pub collateral_price: f64,
}

/// System aggregate extended with the secondary reference price.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SystemSnapshot {
    pub collateral: f64,
    pub debt: f64,
    pub ratio: f64,
    pub collateral_price: f64,
    /// Stable-asset sell quote against USDC on the secondary chain.
    pub stable_swap_price: f64,
}

/// TCR and recovery-mode flag at a given price.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecoveryStatus {
    pub tcr: U256,
    pub recovery: bool,
    pub price: U256,
}

/// An observed `TroveLiquidated` event.
#[derive(Clone, Debug, PartialEq)]
pub struct LiquidationEvent {
    pub borrower: Address,
    pub debt: f64,
    pub collateral: f64,
    pub operation: u8,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    pub timestamp: u64,
    pub status: TxStatus,
}

/// An observed `Redemption` event with the borrowers it touched.
#[derive(Clone, Debug, PartialEq)]
pub struct RedemptionEvent {
    pub attempted_amount: f64,
    pub actual_amount: f64,
    pub collateral_sent: f64,
    pub collateral_fee: f64,
    pub affected_borrowers: Vec<Address>,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    pub timestamp: u64,
    pub status: TxStatus,
}

/// One bribe reward token for a gauge's current epoch.
///
/// `previous_epoch_amount` / `next_epoch_amount` are only populated by the
/// adjacent-epoch probe and never substituted into `amount`, so callers can
/// tell "this epoch" from "nearby epoch" data apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BribeReward {
    pub token: Address,
    pub amount: U256,
    pub epoch_start: u64,
    pub previous_epoch_amount: Option<U256>,
    pub next_epoch_amount: Option<U256>,
}

/// One (pool, gauge) pair with its bribe rewards, overwritten each pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GaugeIncentive {
    pub pool: Address,
    pub pool_name: Option<String>,
    pub gauge: Address,
    pub bribe: Address,
    pub votes: U256,
    pub duration: u64,
    pub epoch_start: u64,
    pub rewards: Vec<BribeReward>,
}

/// Epoch boundaries relative to the latest block timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EpochTiming {
    pub now: u64,
    pub epoch_start: u64,
    pub epoch_end: u64,
    pub vote_end: u64,
}

/// Balance of one bridged asset held by the custodian.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeAssetBalance {
    pub token_symbol: &'static str,
    pub ethereum_symbol: &'static str,
    pub home_address: Address,
    pub ethereum_address: Address,
    pub bridge_address: Address,
    pub decimals: u8,
    pub balance_raw: U256,
}

/// Reference stable-asset sell quote after network costs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwapQuote {
    /// Stable-asset units sold.
    pub sell_amount: f64,
    /// USDC units received.
    pub buy_amount: f64,
}

/// Indexer synchronization watermark, passed into and returned from a pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Last block fully processed, `None` before the first completed pass.
    pub last_block: Option<u64>,
}

/// Hints required to submit a valid redemption transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedemptionHints {
    pub first_redemption_hint: Address,
    pub upper_hint: Address,
    pub lower_hint: Address,
    pub partial_redemption_nicr: U256,
    /// Redeemable amount after truncation; zero means nothing is redeemable.
    pub truncated_amount: U256,
}

/// Dry-run result for a redemption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedemptionSimulation {
    pub truncated_amount: U256,
    pub gas_estimate: u64,
}

/// Submitted redemption transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedemptionOutcome {
    pub tx_hash: B256,
    pub truncated_amount: U256,
    pub gas_estimate: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wei_to_f64_scales_by_18_decimals() {
        let one_and_half = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(wei_to_f64(one_and_half).unwrap(), 1.5);
    }

    #[test]
    fn units_to_f64_honors_token_decimals() {
        let value = U256::from(2_500_000u64);
        assert_eq!(units_to_f64(value, 6).unwrap(), 2.5);
    }
}
