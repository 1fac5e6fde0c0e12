//! Voting-gauge incentive aggregation.
//!
//! Walks pool factory → voter → bribe contracts in chunked multicall rounds
//! and aggregates per-epoch bribe rewards. Reward crediting can lag the
//! epoch boundary, so a zero current-epoch amount optionally probes the
//! adjacent epochs; those amounts are surfaced separately instead of being
//! substituted in.

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use eyre::Result;
use trove_chain::contracts::{
    addresses, IBribeVotingReward, IPool, IPoolFactory, IVoter, IVotingEscrow,
};
use trove_chain::{ChainReader, MulticallRequest, DEFAULT_MULTICALL_BATCH};

use crate::types::{BribeReward, EpochTiming, GaugeIncentive};

/// Epoch start for a timestamp, aligned down to the epoch duration.
/// A zero duration means the bribe contract has no epoch alignment.
pub fn epoch_start(timestamp: u64, duration: u64) -> u64 {
    if duration == 0 {
        0
    } else {
        timestamp / duration * duration
    }
}

/// Adjacent epoch starts to probe: previous (when one exists) and next.
pub fn adjacent_epochs(epoch_start: u64, duration: u64) -> (Option<u64>, u64) {
    let previous = (duration > 0 && epoch_start >= duration).then(|| epoch_start - duration);
    (previous, epoch_start.saturating_add(duration))
}

struct GaugeEntry {
    pool: Address,
    pool_name: Option<String>,
    gauge: Address,
    votes: U256,
    bribe: Address,
}

struct BribeMeta {
    duration: u64,
    epoch_start: u64,
    reward_count: u64,
    tokens: Vec<Address>,
}

/// Reads gauges, bribes, and voting-power aggregates.
pub struct GaugeReader<P> {
    chain: ChainReader<P>,
    pool_factory: Address,
    voter: Address,
    voting_escrow: Address,
    batch_size: usize,
}

impl<P: Provider + Clone> GaugeReader<P> {
    pub fn new(chain: ChainReader<P>) -> Self {
        Self {
            chain,
            pool_factory: addresses::POOL_FACTORY,
            voter: addresses::VOTER,
            voting_escrow: addresses::VOTING_ESCROW,
            batch_size: DEFAULT_MULTICALL_BATCH,
        }
    }

    /// Enumerates every pool with a gauge and aggregates its bribe rewards
    /// for the current epoch.
    ///
    /// With `probe_adjacent_epochs` set, tokens whose current-epoch amount is
    /// exactly zero are re-queried at `epochStart ± duration` to surface
    /// rewards recorded against a neighboring boundary.
    #[tracing::instrument(skip(self), fields(probe_adjacent_epochs))]
    pub async fn fetch_incentives(&self, probe_adjacent_epochs: bool) -> Result<Vec<GaugeIncentive>> {
        let factory = IPoolFactory::new(self.pool_factory, self.chain.provider().clone());
        let pool_count = factory.allPoolsLength().call().await?.length.to::<u64>();

        let pool_requests: Vec<MulticallRequest> = (0..pool_count)
            .map(|index| {
                MulticallRequest::new(
                    self.pool_factory,
                    &IPoolFactory::allPoolsCall {
                        index: U256::from(index),
                    },
                )
            })
            .collect();
        let pool_outcomes = self.chain.multicall(&pool_requests, self.batch_size).await?;
        let pools: Vec<Address> = pool_outcomes
            .iter()
            .filter_map(|outcome| outcome.decode::<IPoolFactory::allPoolsCall>())
            .map(|decoded| decoded.pool)
            .collect();

        let name_requests: Vec<MulticallRequest> = pools
            .iter()
            .map(|pool| MulticallRequest::new(*pool, &IPool::nameCall {}))
            .collect();
        let name_outcomes = self.chain.multicall(&name_requests, self.batch_size).await?;

        let gauge_requests: Vec<MulticallRequest> = pools
            .iter()
            .flat_map(|pool| {
                [
                    MulticallRequest::new(self.voter, &IVoter::gaugesCall { pool: *pool }),
                    MulticallRequest::new(self.voter, &IVoter::weightsCall { pool: *pool }),
                ]
            })
            .collect();
        let gauge_outcomes = self.chain.multicall(&gauge_requests, self.batch_size).await?;

        let mut entries = Vec::new();
        for (i, pool) in pools.iter().enumerate() {
            let gauge = gauge_outcomes[i * 2]
                .decode::<IVoter::gaugesCall>()
                .map(|decoded| decoded.gauge);
            let Some(gauge) = gauge.filter(|gauge| *gauge != Address::ZERO) else {
                continue;
            };

            let votes = gauge_outcomes[i * 2 + 1]
                .decode::<IVoter::weightsCall>()
                .map(|decoded| decoded.weight)
                .unwrap_or(U256::ZERO);
            let pool_name = name_outcomes[i]
                .decode::<IPool::nameCall>()
                .map(|decoded| decoded.poolName);

            entries.push(GaugeEntry {
                pool: *pool,
                pool_name,
                gauge,
                votes,
                bribe: Address::ZERO,
            });
        }

        let bribe_requests: Vec<MulticallRequest> = entries
            .iter()
            .map(|entry| {
                MulticallRequest::new(self.voter, &IVoter::gaugeToBribeCall { gauge: entry.gauge })
            })
            .collect();
        let bribe_outcomes = self.chain.multicall(&bribe_requests, self.batch_size).await?;
        for (entry, outcome) in entries.iter_mut().zip(&bribe_outcomes) {
            if let Some(decoded) = outcome.decode::<IVoter::gaugeToBribeCall>() {
                if decoded.bribe != Address::ZERO {
                    entry.bribe = decoded.bribe;
                }
            }
        }

        let bribe_meta = self.fetch_bribe_meta(&entries).await?;
        let rewards = self
            .fetch_bribe_rewards(&bribe_meta, probe_adjacent_epochs)
            .await?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let meta = bribe_meta.get(&entry.bribe);
                GaugeIncentive {
                    pool: entry.pool,
                    pool_name: entry.pool_name,
                    gauge: entry.gauge,
                    bribe: entry.bribe,
                    votes: entry.votes,
                    duration: meta.map(|m| m.duration).unwrap_or(0),
                    epoch_start: meta.map(|m| m.epoch_start).unwrap_or(0),
                    rewards: rewards.get(&entry.bribe).cloned().unwrap_or_default(),
                }
            })
            .collect())
    }

    /// Resolves duration, epoch start, and reward-token list per distinct
    /// bribe contract.
    async fn fetch_bribe_meta(&self, entries: &[GaugeEntry]) -> Result<BTreeMap<Address, BribeMeta>> {
        let bribes: Vec<Address> = {
            let mut distinct: Vec<Address> = entries
                .iter()
                .map(|entry| entry.bribe)
                .filter(|bribe| *bribe != Address::ZERO)
                .collect();
            distinct.sort();
            distinct.dedup();
            distinct
        };

        let meta_requests: Vec<MulticallRequest> = bribes
            .iter()
            .flat_map(|bribe| {
                [
                    MulticallRequest::new(*bribe, &IBribeVotingReward::rewardsListLengthCall {}),
                    MulticallRequest::new(*bribe, &IBribeVotingReward::durationCall {}),
                ]
            })
            .collect();
        let meta_outcomes = self.chain.multicall(&meta_requests, self.batch_size).await?;

        let now = self.chain.latest_block_timestamp().await?;
        let mut meta = BTreeMap::new();
        for (i, bribe) in bribes.iter().enumerate() {
            let length = meta_outcomes[i * 2]
                .decode::<IBribeVotingReward::rewardsListLengthCall>()
                .map(|decoded| decoded.length.to::<u64>());
            let duration = meta_outcomes[i * 2 + 1]
                .decode::<IBribeVotingReward::durationCall>()
                .map(|decoded| decoded.epochDuration.to::<u64>());
            let (Some(reward_count), Some(duration)) = (length, duration) else {
                continue;
            };
            if reward_count == 0 || duration == 0 {
                continue;
            }

            meta.insert(
                *bribe,
                BribeMeta {
                    duration,
                    epoch_start: epoch_start(now, duration),
                    reward_count,
                    tokens: Vec::new(),
                },
            );
        }

        // Resolve the reward-token list for each surviving bribe.
        let mut token_requests = Vec::new();
        let mut token_targets = Vec::new();
        for (bribe, bribe_meta) in meta.iter() {
            for index in 0..bribe_meta.reward_count {
                token_requests.push(MulticallRequest::new(
                    *bribe,
                    &IBribeVotingReward::rewardsCall {
                        index: U256::from(index),
                    },
                ));
                token_targets.push(*bribe);
            }
        }
        let token_outcomes = self.chain.multicall(&token_requests, self.batch_size).await?;
        for (outcome, bribe) in token_outcomes.iter().zip(&token_targets) {
            let Some(decoded) = outcome.decode::<IBribeVotingReward::rewardsCall>() else {
                continue;
            };
            if let Some(bribe_meta) = meta.get_mut(bribe) {
                bribe_meta.tokens.push(decoded.token);
            }
        }

        Ok(meta)
    }

    /// Resolves current-epoch reward amounts, with the optional adjacent
    /// epoch probe for zero amounts.
    async fn fetch_bribe_rewards(
        &self,
        meta: &BTreeMap<Address, BribeMeta>,
        probe_adjacent_epochs: bool,
    ) -> Result<BTreeMap<Address, Vec<BribeReward>>> {
        let mut amount_requests = Vec::new();
        let mut amount_keys = Vec::new();
        for (bribe, bribe_meta) in meta.iter() {
            for token in &bribe_meta.tokens {
                amount_requests.push(MulticallRequest::new(
                    *bribe,
                    &IBribeVotingReward::tokenRewardsPerEpochCall {
                        token: *token,
                        epochStart: U256::from(bribe_meta.epoch_start),
                    },
                ));
                amount_keys.push((*bribe, *token));
            }
        }
        let amount_outcomes = self.chain.multicall(&amount_requests, self.batch_size).await?;

        let mut amounts: BTreeMap<(Address, Address), U256> = BTreeMap::new();
        for (outcome, key) in amount_outcomes.iter().zip(&amount_keys) {
            let amount = outcome
                .decode::<IBribeVotingReward::tokenRewardsPerEpochCall>()
                .map(|decoded| decoded.amount)
                .unwrap_or(U256::ZERO);
            amounts.insert(*key, amount);
        }

        let mut previous_amounts: BTreeMap<(Address, Address), U256> = BTreeMap::new();
        let mut next_amounts: BTreeMap<(Address, Address), U256> = BTreeMap::new();
        if probe_adjacent_epochs {
            let mut probe_requests = Vec::new();
            let mut probe_keys = Vec::new();
            for (bribe, bribe_meta) in meta.iter() {
                for token in &bribe_meta.tokens {
                    let key = (*bribe, *token);
                    if amounts.get(&key).copied().unwrap_or(U256::ZERO) != U256::ZERO {
                        continue;
                    }
                    let (previous, next) =
                        adjacent_epochs(bribe_meta.epoch_start, bribe_meta.duration);
                    if let Some(previous) = previous {
                        probe_requests.push(MulticallRequest::new(
                            *bribe,
                            &IBribeVotingReward::tokenRewardsPerEpochCall {
                                token: *token,
                                epochStart: U256::from(previous),
                            },
                        ));
                        probe_keys.push((key, true));
                    }
                    probe_requests.push(MulticallRequest::new(
                        *bribe,
                        &IBribeVotingReward::tokenRewardsPerEpochCall {
                            token: *token,
                            epochStart: U256::from(next),
                        },
                    ));
                    probe_keys.push((key, false));
                }
            }

            let probe_outcomes = self.chain.multicall(&probe_requests, self.batch_size).await?;
            for (outcome, (key, is_previous)) in probe_outcomes.iter().zip(&probe_keys) {
                let Some(decoded) =
                    outcome.decode::<IBribeVotingReward::tokenRewardsPerEpochCall>()
                else {
                    continue;
                };
                if decoded.amount.is_zero() {
                    continue;
                }
                if *is_previous {
                    previous_amounts.insert(*key, decoded.amount);
                } else {
                    next_amounts.insert(*key, decoded.amount);
                }
            }
        }

        let mut rewards: BTreeMap<Address, Vec<BribeReward>> = BTreeMap::new();
        for (bribe, bribe_meta) in meta.iter() {
            let tokens = bribe_meta
                .tokens
                .iter()
                .map(|token| {
                    let key = (*bribe, *token);
                    BribeReward {
                        token: *token,
                        amount: amounts.get(&key).copied().unwrap_or(U256::ZERO),
                        epoch_start: bribe_meta.epoch_start,
                        previous_epoch_amount: previous_amounts.get(&key).copied(),
                        next_epoch_amount: next_amounts.get(&key).copied(),
                    }
                })
                .collect();
            rewards.insert(*bribe, tokens);
        }

        Ok(rewards)
    }

    /// Epoch boundaries relative to the latest block timestamp.
    pub async fn epoch_timing(&self) -> Result<EpochTiming> {
        let now = self.chain.latest_block_timestamp().await?;
        let timestamp = U256::from(now);
        let requests = [
            MulticallRequest::new(self.voter, &IVoter::epochStartCall { timestamp }),
            MulticallRequest::new(self.voter, &IVoter::epochNextCall { timestamp }),
            MulticallRequest::new(self.voter, &IVoter::epochVoteEndCall { timestamp }),
        ];
        let outcomes = self.chain.multicall(&requests, self.batch_size).await?;

        Ok(EpochTiming {
            now,
            epoch_start: outcomes[0]
                .decode::<IVoter::epochStartCall>()
                .map(|decoded| decoded.start.to::<u64>())
                .unwrap_or(0),
            epoch_end: outcomes[1]
                .decode::<IVoter::epochNextCall>()
                .map(|decoded| decoded.next.to::<u64>())
                .unwrap_or(0),
            vote_end: outcomes[2]
                .decode::<IVoter::epochVoteEndCall>()
                .map(|decoded| decoded.voteEnd.to::<u64>())
                .unwrap_or(0),
        })
    }

    /// Total vote weight across all gauges.
    pub async fn total_voting_power(&self) -> Result<U256> {
        let voter = IVoter::new(self.voter, self.chain.provider().clone());
        Ok(voter.totalWeight().call().await?.weight)
    }

    /// Live voting-escrow supply.
    pub async fn total_ve_supply(&self) -> Result<U256> {
        let escrow = IVotingEscrow::new(self.voting_escrow, self.chain.provider().clone());
        Ok(escrow.totalVotingPower().call().await?.power)
    }

    /// Voting-escrow supply at a historical timestamp. Best-effort: contracts
    /// without history answer with a revert, which degrades to `None`.
    pub async fn total_ve_supply_at(&self, timestamp: u64) -> Option<U256> {
        let escrow = IVotingEscrow::new(self.voting_escrow, self.chain.provider().clone());
        escrow
            .totalVotingPowerAt(U256::from(timestamp))
            .call()
            .await
            .ok()
            .map(|decoded| decoded.power)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_start_aligns_down_to_duration() {
        assert_eq!(epoch_start(1_700_000_100, 604_800), 1_699_833_600);
    }

    #[test]
    fn epoch_start_zero_duration_means_no_alignment() {
        assert_eq!(epoch_start(1_700_000_100, 0), 0);
    }

    #[test]
    fn adjacent_epochs_probe_both_neighbors() {
        let (previous, next) = adjacent_epochs(1_699_833_600, 604_800);
        assert_eq!(previous, Some(1_699_228_800));
        assert_eq!(next, 1_700_438_400);
    }

    #[test]
    fn adjacent_epochs_skip_previous_before_first_epoch() {
        let (previous, next) = adjacent_epochs(0, 604_800);
        assert_eq!(previous, None);
        assert_eq!(next, 604_800);
    }
}
