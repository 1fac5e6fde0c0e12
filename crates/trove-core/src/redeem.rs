//! Redemption hint computation, simulation, and submission.
//!
//! Hint computation asks the on-chain hint helper for the redeemable amount
//! and partial NICR, refines an approximate position into an exact
//! `(upperHint, lowerHint)` pair through the sorted-trove list, and hands the
//! whole bundle to `redeemCollateral`. The system-health (recovery mode)
//! gate is owned by callers, not this engine.

use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use eyre::{eyre, Context, Result};
use trove_chain::contracts::{addresses, IHintHelpers, IPriceFeed, ISortedTroves, ITroveManager, IERC20};
use trove_chain::WalletProvider;

use crate::types::{RedemptionHints, RedemptionOutcome, RedemptionSimulation};

/// Policy cap on hint-helper probe steps.
pub const MAX_HINT_ITERATIONS: u64 = 250;

/// Probe count for the randomized approximate hint search.
const APPROX_HINT_TRIALS: u64 = 32;

/// Source of the nonce for the on-chain approximate hint sampler.
///
/// Injected so tests can pin the search deterministically.
pub trait HintSeed {
    fn seed(&self) -> U256;
}

/// Production seed source: current wall-clock time in milliseconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct WallClockSeed;

impl HintSeed for WallClockSeed {
    fn seed(&self) -> U256 {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        U256::from(millis)
    }
}

/// A configured signer for the submission path.
#[derive(Clone)]
pub struct RedemptionSigner {
    pub provider: WalletProvider,
    pub address: Address,
}

/// Guard preconditions checked before any transaction is signed.
pub(crate) fn ensure_executable(hints: &RedemptionHints, has_signer: bool) -> Result<()> {
    if hints.truncated_amount.is_zero() {
        return Err(eyre!("hint helper returned zero redeemable amount"));
    }
    if !has_signer {
        return Err(eyre!("no signer configured; cannot submit a redemption"));
    }
    Ok(())
}

/// Computes redemption hints and optionally submits the redemption.
pub struct RedemptionEngine<P, S = WallClockSeed> {
    provider: P,
    price_feed: Address,
    seeder: S,
    signer: Option<RedemptionSigner>,
}

impl<P: Provider + Clone> RedemptionEngine<P, WallClockSeed> {
    /// Creates an engine with the wall-clock seed source.
    pub fn new(provider: P, price_feed: Address) -> Self {
        Self::with_seeder(provider, price_feed, WallClockSeed)
    }
}

impl<P: Provider + Clone, S: HintSeed> RedemptionEngine<P, S> {
    /// Creates an engine with an injected seed source.
    pub fn with_seeder(provider: P, price_feed: Address, seeder: S) -> Self {
        Self {
            provider,
            price_feed,
            seeder,
            signer: None,
        }
    }

    /// Attaches the signer used by [`Self::execute`].
    pub fn set_signer(&mut self, signer: RedemptionSigner) {
        self.signer = Some(signer);
    }

    /// Computes the hints needed to redeem `amount` of the stable asset.
    ///
    /// `max_iterations` bounds the hint helper's probe steps (higher is more
    /// exhaustive, capped at [`MAX_HINT_ITERATIONS`]). A zero partial NICR
    /// short-circuits with zero-address upper/lower hints; callers must treat
    /// `truncated_amount == 0` as "nothing redeemable", not success.
    #[tracing::instrument(skip(self), fields(%amount, max_iterations))]
    pub async fn compute_hints(&self, amount: U256, max_iterations: u64) -> Result<RedemptionHints> {
        let iterations = U256::from(max_iterations.min(MAX_HINT_ITERATIONS));

        let price = IPriceFeed::new(self.price_feed, self.provider.clone())
            .fetchPrice()
            .call()
            .await
            .wrap_err("failed to fetch oracle price")?
            .price;

        let helpers = IHintHelpers::new(addresses::HINT_HELPERS, self.provider.clone());
        let hints = helpers
            .getRedemptionHints(amount, price, iterations)
            .call()
            .await
            .wrap_err("failed to fetch redemption hints")?;

        if hints.partialRedemptionHintNICR.is_zero() {
            // The redemption either empties the last affected trove or finds
            // nothing redeemable; no insert position exists in either case.
            return Ok(RedemptionHints {
                first_redemption_hint: hints.firstRedemptionHint,
                upper_hint: Address::ZERO,
                lower_hint: Address::ZERO,
                partial_redemption_nicr: U256::ZERO,
                truncated_amount: hints.truncatedAmount,
            });
        }

        let approx = helpers
            .getApproxHint(
                hints.partialRedemptionHintNICR,
                U256::from(APPROX_HINT_TRIALS),
                self.seeder.seed(),
            )
            .call()
            .await
            .wrap_err("failed to fetch approximate hint")?
            .hintAddress;

        let position = ISortedTroves::new(addresses::SORTED_TROVES, self.provider.clone())
            .findInsertPosition(hints.partialRedemptionHintNICR, approx, approx)
            .call()
            .await
            .wrap_err("failed to refine insert position")?;

        Ok(RedemptionHints {
            first_redemption_hint: hints.firstRedemptionHint,
            upper_hint: position.upperHint,
            lower_hint: position.lowerHint,
            partial_redemption_nicr: hints.partialRedemptionHintNICR,
            truncated_amount: hints.truncatedAmount,
        })
    }

    /// Dry-runs the redemption to obtain a gas estimate without submitting.
    ///
    /// Falls back to the configured signer's address when `account` is not
    /// given.
    pub async fn simulate(
        &self,
        hints: &RedemptionHints,
        account: Option<Address>,
        max_iterations: u64,
    ) -> Result<RedemptionSimulation> {
        let sender = account
            .or_else(|| self.signer.as_ref().map(|signer| signer.address))
            .ok_or_else(|| eyre!("no account available to simulate redemption"))?;

        let manager = ITroveManager::new(addresses::TROVE_MANAGER, self.provider.clone());
        let gas_estimate = manager
            .redeemCollateral(
                hints.truncated_amount,
                hints.first_redemption_hint,
                hints.upper_hint,
                hints.lower_hint,
                hints.partial_redemption_nicr,
                U256::from(max_iterations.min(MAX_HINT_ITERATIONS)),
            )
            .from(sender)
            .estimate_gas()
            .await
            .wrap_err("redemption simulation failed")?;

        Ok(RedemptionSimulation {
            truncated_amount: hints.truncated_amount,
            gas_estimate,
        })
    }

    /// Submits the redemption after re-checking every guard.
    ///
    /// Guards, in order: non-zero truncated amount, configured signer,
    /// sufficient stable-asset balance. The spending allowance is raised only
    /// if the current one is insufficient, and the call is re-simulated
    /// immediately before submission to catch state drift since hint
    /// computation.
    #[tracing::instrument(skip_all, fields(truncated = %hints.truncated_amount))]
    pub async fn execute(
        &self,
        hints: &RedemptionHints,
        max_iterations: u64,
    ) -> Result<RedemptionOutcome> {
        ensure_executable(hints, self.signer.is_some())?;
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| eyre!("no signer configured; cannot submit a redemption"))?;

        let stable = IERC20::new(addresses::STABLE_TOKEN, self.provider.clone());
        let balance = stable
            .balanceOf(signer.address)
            .call()
            .await
            .wrap_err("failed to fetch stable-asset balance")?
            .balance;
        if balance < hints.truncated_amount {
            return Err(eyre!(
                "insufficient stable-asset balance: have {balance}, need {}",
                hints.truncated_amount
            ));
        }

        self.ensure_allowance(signer, hints.truncated_amount).await?;

        let simulation = self
            .simulate(hints, Some(signer.address), max_iterations)
            .await?;

        let manager = ITroveManager::new(addresses::TROVE_MANAGER, signer.provider.clone());
        let pending = manager
            .redeemCollateral(
                simulation.truncated_amount,
                hints.first_redemption_hint,
                hints.upper_hint,
                hints.lower_hint,
                hints.partial_redemption_nicr,
                U256::from(max_iterations.min(MAX_HINT_ITERATIONS)),
            )
            .send()
            .await
            .wrap_err("failed to submit redemption")?;
        let tx_hash = pending
            .watch()
            .await
            .wrap_err("redemption transaction was not confirmed")?;

        tracing::info!(%tx_hash, "redemption submitted");

        Ok(RedemptionOutcome {
            tx_hash,
            truncated_amount: simulation.truncated_amount,
            gas_estimate: simulation.gas_estimate,
        })
    }

    /// Raises the TroveManager allowance when the current one cannot cover
    /// `required`. A sufficient allowance is left untouched.
    async fn ensure_allowance(&self, signer: &RedemptionSigner, required: U256) -> Result<()> {
        let stable = IERC20::new(addresses::STABLE_TOKEN, self.provider.clone());
        let allowance = stable
            .allowance(signer.address, addresses::TROVE_MANAGER)
            .call()
            .await
            .wrap_err("failed to fetch stable-asset allowance")?
            .remaining;
        if allowance >= required {
            return Ok(());
        }

        let stable = IERC20::new(addresses::STABLE_TOKEN, signer.provider.clone());
        let pending = stable
            .approve(addresses::TROVE_MANAGER, required)
            .send()
            .await
            .wrap_err("failed to submit approval")?;
        let tx_hash = pending
            .watch()
            .await
            .wrap_err("approval transaction was not confirmed")?;

        tracing::info!(%tx_hash, %required, "approved stable-asset spending");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic seed source for tests.
    struct FixedSeed(u64);

    impl HintSeed for FixedSeed {
        fn seed(&self) -> U256 {
            U256::from(self.0)
        }
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let seeder = FixedSeed(42);
        assert_eq!(seeder.seed(), seeder.seed());
        assert_eq!(seeder.seed(), U256::from(42));
    }

    #[test]
    fn execute_guards_reject_zero_amount() {
        let hints = RedemptionHints {
            first_redemption_hint: Address::ZERO,
            upper_hint: Address::ZERO,
            lower_hint: Address::ZERO,
            partial_redemption_nicr: U256::ZERO,
            truncated_amount: U256::ZERO,
        };
        assert!(ensure_executable(&hints, true).is_err());
    }

    #[test]
    fn execute_guards_require_signer() {
        let hints = RedemptionHints {
            first_redemption_hint: Address::ZERO,
            upper_hint: Address::ZERO,
            lower_hint: Address::ZERO,
            partial_redemption_nicr: U256::from(1),
            truncated_amount: U256::from(1_000),
        };
        assert!(ensure_executable(&hints, false).is_err());
        assert!(ensure_executable(&hints, true).is_ok());
    }
}
