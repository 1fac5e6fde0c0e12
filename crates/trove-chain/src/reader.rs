//! Batched and single read-only chain access.
//!
//! The [`ChainReader`] is deliberately thin: it issues calls and reports
//! per-call outcomes, nothing else. Retry policy lives with the caller — a
//! failed pass is re-run from the last committed watermark, so retrying at
//! this layer would only hide failures.

use std::collections::{BTreeSet, HashMap};

use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::Provider;
use alloy::rpc::types::{BlockId, BlockNumberOrTag, Log};
use alloy::sol_types::SolCall;
use eyre::{Context, Result};

use crate::contracts::{addresses, IMulticall3, ITroveManager, OP_REDEEM_COLLATERAL};

/// Default number of sub-calls per multicall round-trip.
pub const DEFAULT_MULTICALL_BATCH: usize = 250;

/// One call descriptor for a Multicall3 batch.
#[derive(Clone, Debug)]
pub struct MulticallRequest {
    /// Contract to call.
    pub target: Address,
    /// ABI-encoded calldata.
    pub calldata: Bytes,
}

impl MulticallRequest {
    /// Builds a request from a typed `sol!` call value.
    pub fn new(target: Address, call: &impl SolCall) -> Self {
        Self {
            target,
            calldata: call.abi_encode().into(),
        }
    }
}

/// Outcome of one sub-call within a batch.
///
/// `success == false` means the sub-call reverted; the batch as a whole still
/// succeeds and callers decide per entry what a failure means.
#[derive(Clone, Debug)]
pub struct MulticallOutcome {
    /// Whether the sub-call executed without reverting.
    pub success: bool,
    /// Raw return bytes (empty on revert or for void returns).
    pub data: Bytes,
}

impl MulticallOutcome {
    /// Decodes the return value of a typed call, treating reverts and empty
    /// returns as absent.
    pub fn decode<C: SolCall>(&self) -> Option<C::Return> {
        if !self.success || self.data.is_empty() {
            return None;
        }
        C::abi_decode_returns(&self.data, true).ok()
    }
}

/// Receipt execution status resolved for an event's transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failed,
}

impl TxStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Success => "success",
            TxStatus::Failed => "failed",
        }
    }
}

/// Result of decoding a raw receipt log against the TroveManager ABI.
///
/// Receipts carry logs from arbitrary third-party contracts; those decode to
/// [`DecodedTroveLog::Unrecognized`] and are discarded rather than treated as
/// errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedTroveLog {
    /// A `TroveUpdated` event with its borrower and operation code.
    TroveUpdated { borrower: Address, operation: u8 },
    /// Any log shape the TroveManager ABI does not describe.
    Unrecognized,
}

/// Decodes a receipt log as a `TroveUpdated` event, if it is one.
pub fn decode_trove_log(log: &Log) -> DecodedTroveLog {
    match log.log_decode::<ITroveManager::TroveUpdated>() {
        Ok(decoded) => {
            let event = decoded.inner.data;
            DecodedTroveLog::TroveUpdated {
                borrower: event._borrower,
                operation: event.operation,
            }
        }
        Err(_) => DecodedTroveLog::Unrecognized,
    }
}

/// Thin wrapper issuing single and batched read-only calls.
#[derive(Clone)]
pub struct ChainReader<P> {
    provider: P,
    multicall_address: Address,
}

impl<P: Provider + Clone> ChainReader<P> {
    /// Creates a reader over the given provider using the canonical
    /// Multicall3 deployment.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            multicall_address: addresses::MULTICALL3,
        }
    }

    /// The underlying provider, for typed `sol!` contract instances.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Current chain height.
    pub async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .wrap_err("failed to fetch current block number")
    }

    /// Timestamp of the latest block, used as the reference "now" for epoch
    /// arithmetic.
    pub async fn latest_block_timestamp(&self) -> Result<u64> {
        let block = self
            .provider
            .get_block(BlockId::latest())
            .await
            .wrap_err("failed to fetch latest block")?
            .ok_or_else(|| eyre::eyre!("latest block not available"))?;
        Ok(block.header.timestamp)
    }

    /// Executes a batch of calls through Multicall3 `aggregate3`, split into
    /// rounds of at most `batch_size` calls.
    ///
    /// Sub-call failures are reported per outcome and never abort the batch;
    /// only a failed round-trip to the chain is an error.
    #[tracing::instrument(skip_all, fields(calls = requests.len(), batch_size))]
    pub async fn multicall(
        &self,
        requests: &[MulticallRequest],
        batch_size: usize,
    ) -> Result<Vec<MulticallOutcome>> {
        let multicall = IMulticall3::new(self.multicall_address, self.provider.clone());
        let mut outcomes = Vec::with_capacity(requests.len());

        for round in requests.chunks(batch_size.max(1)) {
            let calls: Vec<IMulticall3::Call3> = round
                .iter()
                .map(|request| IMulticall3::Call3 {
                    target: request.target,
                    allowFailure: true,
                    callData: request.calldata.clone(),
                })
                .collect();

            let response = multicall
                .aggregate3(calls)
                .call()
                .await
                .wrap_err("multicall aggregate3 round failed")?;

            outcomes.extend(response.returnData.into_iter().map(|result| MulticallOutcome {
                success: result.success,
                data: result.returnData,
            }));
        }

        Ok(outcomes)
    }

    /// Resolves one timestamp per distinct block number.
    pub async fn timestamp_map(
        &self,
        block_numbers: impl IntoIterator<Item = u64>,
    ) -> Result<HashMap<u64, u64>> {
        let distinct: BTreeSet<u64> = block_numbers.into_iter().collect();

        let blocks = futures::future::try_join_all(distinct.iter().map(|number| {
            let provider = self.provider.clone();
            let number = *number;
            async move {
                provider
                    .get_block(BlockId::Number(BlockNumberOrTag::Number(number)))
                    .await
                    .wrap_err_with(|| format!("failed to fetch block {number}"))
            }
        }))
        .await?;

        let mut map = HashMap::with_capacity(distinct.len());
        for (number, block) in distinct.into_iter().zip(blocks) {
            map.insert(number, block.map(|b| b.header.timestamp).unwrap_or(0));
        }
        Ok(map)
    }

    /// Resolves one receipt status per distinct transaction hash.
    ///
    /// A missing receipt counts as success; a failed lookup degrades to
    /// `Failed` with a warning instead of aborting the pass.
    pub async fn receipt_status_map(
        &self,
        tx_hashes: impl IntoIterator<Item = B256>,
    ) -> Result<HashMap<B256, TxStatus>> {
        let distinct: BTreeSet<B256> = tx_hashes.into_iter().collect();

        let pairs = futures::future::join_all(distinct.into_iter().map(|hash| {
            let provider = self.provider.clone();
            async move {
                match provider.get_transaction_receipt(hash).await {
                    Ok(Some(receipt)) => {
                        let status = if receipt.status() {
                            TxStatus::Success
                        } else {
                            TxStatus::Failed
                        };
                        (hash, status)
                    }
                    Ok(None) => (hash, TxStatus::Success),
                    Err(error) => {
                        tracing::warn!(%hash, %error, "failed to fetch transaction receipt");
                        (hash, TxStatus::Failed)
                    }
                }
            }
        }))
        .await;

        Ok(pairs.into_iter().collect())
    }

    /// Derives the borrowers touched by each redemption transaction.
    ///
    /// Scans every log of each receipt, keeps `TroveUpdated` events emitted
    /// by the given TroveManager with the redemption operation code, and
    /// groups borrowers by transaction hash. Undecodable logs are skipped.
    pub async fn redemption_borrowers(
        &self,
        tx_hashes: impl IntoIterator<Item = B256>,
        trove_manager: Address,
    ) -> Result<HashMap<B256, Vec<Address>>> {
        let distinct: BTreeSet<B256> = tx_hashes.into_iter().collect();

        let entries = futures::future::join_all(distinct.into_iter().map(|hash| {
            let provider = self.provider.clone();
            async move {
                let receipt = match provider.get_transaction_receipt(hash).await {
                    Ok(Some(receipt)) => receipt,
                    Ok(None) => return (hash, Vec::new()),
                    Err(error) => {
                        tracing::warn!(
                            %hash,
                            %error,
                            "failed to fetch receipt when deriving redemption borrowers"
                        );
                        return (hash, Vec::new());
                    }
                };

                let mut borrowers = Vec::new();
                for log in receipt.inner.logs() {
                    if log.address() != trove_manager {
                        continue;
                    }
                    if let DecodedTroveLog::TroveUpdated {
                        borrower,
                        operation,
                    } = decode_trove_log(log)
                    {
                        if operation == OP_REDEEM_COLLATERAL {
                            borrowers.push(borrower);
                        }
                    }
                }
                (hash, borrowers)
            }
        }))
        .await;

        Ok(entries
            .into_iter()
            .filter(|(_, borrowers)| !borrowers.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Log as PrimitiveLog, U256};
    use alloy::sol_types::SolEvent;

    fn trove_updated_log(borrower: Address, operation: u8) -> Log {
        let event = ITroveManager::TroveUpdated {
            _borrower: borrower,
            _principal: U256::from(100),
            _interest: U256::from(1),
            _coll: U256::from(2),
            _stake: U256::from(2),
            operation,
        };
        Log {
            inner: PrimitiveLog {
                address: addresses::TROVE_MANAGER,
                data: event.encode_log_data(),
            },
            block_hash: None,
            block_number: Some(10),
            block_timestamp: None,
            transaction_hash: Some(B256::ZERO),
            transaction_index: Some(0),
            log_index: Some(0),
            removed: false,
        }
    }

    #[test]
    fn decode_trove_log_recognizes_trove_updated() {
        let borrower = Address::repeat_byte(0x11);
        let log = trove_updated_log(borrower, OP_REDEEM_COLLATERAL);

        assert_eq!(
            decode_trove_log(&log),
            DecodedTroveLog::TroveUpdated {
                borrower,
                operation: OP_REDEEM_COLLATERAL
            }
        );
    }

    #[test]
    fn decode_trove_log_skips_unrelated_shapes() {
        let event = ITroveManager::Redemption {
            _attemptedAmount: U256::from(5),
            _actualAmount: U256::from(5),
            _collateralSent: U256::from(1),
            _collateralFee: U256::ZERO,
        };
        let log = Log {
            inner: PrimitiveLog {
                address: addresses::TROVE_MANAGER,
                data: event.encode_log_data(),
            },
            block_hash: None,
            block_number: Some(10),
            block_timestamp: None,
            transaction_hash: Some(B256::ZERO),
            transaction_index: Some(0),
            log_index: Some(0),
            removed: false,
        };

        assert_eq!(decode_trove_log(&log), DecodedTroveLog::Unrecognized);
    }

    #[test]
    fn multicall_request_encodes_typed_calls() {
        let call = ITroveManager::getTroveStatusCall {
            borrower: Address::repeat_byte(0x22),
        };
        let request = MulticallRequest::new(addresses::TROVE_MANAGER, &call);

        assert_eq!(request.target, addresses::TROVE_MANAGER);
        // 4-byte selector plus one ABI word.
        assert_eq!(request.calldata.len(), 36);
    }

    #[test]
    fn outcome_decode_rejects_failures_and_empty_data() {
        let failed = MulticallOutcome {
            success: false,
            data: Bytes::from(vec![0u8; 32]),
        };
        assert!(failed.decode::<ITroveManager::getTroveStatusCall>().is_none());

        let empty = MulticallOutcome {
            success: true,
            data: Bytes::new(),
        };
        assert!(empty.decode::<ITroveManager::getTroveStatusCall>().is_none());

        let word = U256::from(1).to_be_bytes::<32>();
        let ok = MulticallOutcome {
            success: true,
            data: Bytes::from(word.to_vec()),
        };
        let decoded = ok
            .decode::<ITroveManager::getTroveStatusCall>()
            .expect("valid word should decode");
        assert_eq!(decoded.status, U256::from(1));
    }
}
