//! Trove-set and system-state reads against the TroveManager.

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use eyre::{eyre, Result};
use trove_chain::contracts::{addresses, IPriceFeed, ITroveManager, TROVE_STATUS_ACTIVE};
use trove_chain::{ChainReader, MulticallRequest, DEFAULT_MULTICALL_BATCH};

use crate::types::{wei_to_f64, RecoveryStatus, SystemState, Trove, MAX_RATIO_SENTINEL};

/// Fixed protocol floor for the total collateral ratio (110%, 18 decimals).
pub const MIN_TCR: U256 = U256::from_limbs([1_100_000_000_000_000_000, 0, 0, 0]);

/// Refuses redemption work while the system is in recovery mode.
///
/// The hint engine itself never checks this; callers must gate on it before
/// computing hints.
pub fn ensure_redeemable(status: &RecoveryStatus) -> Result<()> {
    if status.recovery || status.tcr < MIN_TCR {
        return Err(eyre!(
            "system is in recovery mode (TCR {} below 110% floor); redemptions are disabled",
            status.tcr
        ));
    }
    Ok(())
}

/// Reads troves, system totals, and the oracle price.
pub struct TroveReader<P> {
    chain: ChainReader<P>,
    trove_manager: Address,
    price_feed: Address,
    batch_size: usize,
}

impl<P: Provider + Clone> TroveReader<P> {
    /// Creates a reader, resolving the price-feed address from the
    /// TroveManager.
    ///
    /// # Errors
    /// Returns error if the price-feed lookup fails.
    pub async fn connect(chain: ChainReader<P>) -> Result<Self> {
        let trove_manager = addresses::TROVE_MANAGER;
        let manager = ITroveManager::new(trove_manager, chain.provider().clone());
        let price_feed = manager.priceFeed().call().await?.feed;

        tracing::debug!(%price_feed, "resolved price feed address");

        Ok(Self {
            chain,
            trove_manager,
            price_feed,
            batch_size: DEFAULT_MULTICALL_BATCH,
        })
    }

    /// The chain reader this reader issues calls through.
    pub fn chain(&self) -> &ChainReader<P> {
        &self.chain
    }

    /// Resolved price-feed address.
    pub fn price_feed(&self) -> Address {
        self.price_feed
    }

    /// Current oracle price of the collateral asset (18 decimals).
    pub async fn fetch_price(&self) -> Result<U256> {
        let feed = IPriceFeed::new(self.price_feed, self.chain.provider().clone());
        Ok(feed.fetchPrice().call().await?.price)
    }

    /// Aggregate collateral, debt, and collateral ratio at `price`.
    ///
    /// # Errors
    /// Returns error if either aggregate read fails; there is no meaningful
    /// partial system state.
    pub async fn system_state(&self, price: U256) -> Result<SystemState> {
        let manager = self.trove_manager;
        let requests = [
            MulticallRequest::new(manager, &ITroveManager::getEntireSystemCollCall {}),
            MulticallRequest::new(manager, &ITroveManager::getEntireSystemDebtCall {}),
        ];
        let outcomes = self.chain.multicall(&requests, self.batch_size).await?;

        let collateral = outcomes[0]
            .decode::<ITroveManager::getEntireSystemCollCall>()
            .ok_or_else(|| eyre!("failed to fetch system collateral"))?
            .entireSystemColl;
        let debt = outcomes[1]
            .decode::<ITroveManager::getEntireSystemDebtCall>()
            .ok_or_else(|| eyre!("failed to fetch system debt"))?
            .entireSystemDebt;

        let collateral = wei_to_f64(collateral)?;
        let debt = wei_to_f64(debt)?;
        let collateral_price = wei_to_f64(price)?;
        let ratio = if debt > 0.0 {
            collateral * collateral_price / debt
        } else {
            MAX_RATIO_SENTINEL
        };

        Ok(SystemState {
            collateral,
            debt,
            ratio,
            collateral_price,
        })
    }

    /// TCR and recovery-mode flag at `price`.
    pub async fn recovery_status(&self, price: U256) -> Result<RecoveryStatus> {
        let manager = self.trove_manager;
        let requests = [
            MulticallRequest::new(manager, &ITroveManager::getTCRCall { price }),
            MulticallRequest::new(manager, &ITroveManager::checkRecoveryModeCall { price }),
        ];
        let outcomes = self.chain.multicall(&requests, self.batch_size).await?;

        let tcr = outcomes[0]
            .decode::<ITroveManager::getTCRCall>()
            .ok_or_else(|| eyre!("failed to fetch TCR"))?
            .tcr;
        let recovery = outcomes[1]
            .decode::<ITroveManager::checkRecoveryModeCall>()
            .ok_or_else(|| eyre!("failed to fetch recovery mode flag"))?
            .recoveryMode;

        Ok(RecoveryStatus {
            tcr,
            recovery,
            price,
        })
    }

    /// Enumerates every trove owner from the on-chain owners array.
    pub async fn trove_owners(&self) -> Result<Vec<Address>> {
        let manager = ITroveManager::new(self.trove_manager, self.chain.provider().clone());
        let count = manager.getTroveOwnersCount().call().await?.count.to::<u64>();

        let requests: Vec<MulticallRequest> = (0..count)
            .map(|index| {
                MulticallRequest::new(
                    self.trove_manager,
                    &ITroveManager::getTroveFromTroveOwnersArrayCall {
                        index: U256::from(index),
                    },
                )
            })
            .collect();
        let outcomes = self.chain.multicall(&requests, self.batch_size).await?;

        Ok(outcomes
            .iter()
            .filter_map(|outcome| {
                outcome
                    .decode::<ITroveManager::getTroveFromTroveOwnersArrayCall>()
                    .map(|decoded| decoded.owner)
            })
            .collect())
    }

    /// Fetches position data for the given owners at `price`.
    ///
    /// Owners whose reads fail or whose trove is not active are skipped;
    /// the returned set is the complete current universe of live positions.
    #[tracing::instrument(skip_all, fields(owners = owners.len()))]
    pub async fn troves_with_data(&self, owners: &[Address], price: U256) -> Result<Vec<Trove>> {
        let requests: Vec<MulticallRequest> = owners
            .iter()
            .flat_map(|owner| {
                [
                    MulticallRequest::new(
                        self.trove_manager,
                        &ITroveManager::getEntireDebtAndCollCall { borrower: *owner },
                    ),
                    MulticallRequest::new(
                        self.trove_manager,
                        &ITroveManager::getTroveStatusCall { borrower: *owner },
                    ),
                ]
            })
            .collect();
        let outcomes = self.chain.multicall(&requests, self.batch_size).await?;

        let mut troves = Vec::with_capacity(owners.len());
        for (i, owner) in owners.iter().enumerate() {
            let debt_coll = outcomes[i * 2].decode::<ITroveManager::getEntireDebtAndCollCall>();
            let status = outcomes[i * 2 + 1].decode::<ITroveManager::getTroveStatusCall>();

            let (Some(debt_coll), Some(status)) = (debt_coll, status) else {
                tracing::debug!(owner = %owner, "skipping trove with failed reads");
                continue;
            };
            if status.status != U256::from(TROVE_STATUS_ACTIVE) {
                continue;
            }

            let debt = debt_coll.principal + debt_coll.interest;
            let ratio = if debt.is_zero() {
                MAX_RATIO_SENTINEL
            } else {
                wei_to_f64(debt_coll.coll * price / debt)?
            };

            troves.push(Trove {
                owner: *owner,
                collateral: wei_to_f64(debt_coll.coll)?,
                principal_debt: wei_to_f64(debt_coll.principal)?,
                interest: wei_to_f64(debt_coll.interest)?,
                collateralization_ratio: ratio,
            });
        }

        Ok(troves)
    }

    /// Owner enumeration and position fetch in one step.
    pub async fn all_troves(&self, price: U256) -> Result<Vec<Trove>> {
        let owners = self.trove_owners().await?;
        self.troves_with_data(&owners, price).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_tcr_is_110_percent() {
        assert_eq!(MIN_TCR, U256::from(1_100_000_000_000_000_000u128));
    }

    #[test]
    fn ensure_redeemable_blocks_recovery_mode() {
        let blocked = RecoveryStatus {
            tcr: U256::from(1_050_000_000_000_000_000u128),
            recovery: true,
            price: U256::from(1),
        };
        assert!(ensure_redeemable(&blocked).is_err());

        let low_tcr = RecoveryStatus {
            tcr: U256::from(1_099_999_999_999_999_999u128),
            recovery: false,
            price: U256::from(1),
        };
        assert!(ensure_redeemable(&low_tcr).is_err());

        let healthy = RecoveryStatus {
            tcr: U256::from(1_500_000_000_000_000_000u128),
            recovery: false,
            price: U256::from(1),
        };
        assert!(ensure_redeemable(&healthy).is_ok());
    }
}
