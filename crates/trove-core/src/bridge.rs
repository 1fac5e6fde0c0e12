//! Bridged-asset balances held by the custodian on the secondary chain.

use alloy::primitives::Address;
use alloy::providers::Provider;
use eyre::Result;
use trove_chain::contracts::{addresses, IERC20};
use trove_chain::{ChainReader, MulticallRequest, DEFAULT_MULTICALL_BATCH};

use crate::types::BridgeAssetBalance;

/// Static definition of one bridged token.
pub struct BridgeTokenDefinition {
    /// Symbol on the monitored chain.
    pub token_symbol: &'static str,
    /// Symbol of the underlying asset on the secondary chain.
    pub ethereum_symbol: &'static str,
    /// Token address on the monitored chain.
    pub home_address: Address,
    /// Token address on the secondary chain.
    pub ethereum_address: Address,
}

/// Assets the bridge custodian is expected to hold.
pub const BRIDGE_TOKENS: [BridgeTokenDefinition; 11] = [
    BridgeTokenDefinition {
        token_symbol: "mcbBTC",
        ethereum_symbol: "cbBTC",
        home_address: alloy::primitives::address!("6a7cd8e1384d49f502b4a4ce9ac9eb320835c5d7"),
        ethereum_address: alloy::primitives::address!("cbb7c0000ab88b473b1f5afd9ef808440eed33bf"),
    },
    BridgeTokenDefinition {
        token_symbol: "mDAI",
        ethereum_symbol: "DAI",
        home_address: alloy::primitives::address!("1531b6e3d51bf80f634957df81a990b92da4b154"),
        ethereum_address: alloy::primitives::address!("6b175474e89094c44da98b954eedeac495271d0f"),
    },
    BridgeTokenDefinition {
        token_symbol: "mFBTC",
        ethereum_symbol: "FBTC",
        home_address: alloy::primitives::address!("812fcc0bb8c207fd8d6165a7a1173037f43b2db8"),
        ethereum_address: alloy::primitives::address!("c96de26018a54d51c097160568752c4e3bd6c364"),
    },
    BridgeTokenDefinition {
        token_symbol: "mSolvBTC",
        ethereum_symbol: "SolvBTC",
        home_address: alloy::primitives::address!("a10ad2570ea7b93d19fdae6bd7189ff4929bc747"),
        ethereum_address: alloy::primitives::address!("7a56e1c57c7475ccf742a1832b028f0456652f97"),
    },
    BridgeTokenDefinition {
        token_symbol: "mswBTC",
        ethereum_symbol: "swBTC",
        home_address: alloy::primitives::address!("29fa8f46cbb9562b87773c8f50a7f9f27178261c"),
        ethereum_address: alloy::primitives::address!("8db2350d78abc13f5673a411d4700bcf87864dde"),
    },
    BridgeTokenDefinition {
        token_symbol: "mT",
        ethereum_symbol: "T",
        home_address: alloy::primitives::address!("aac423edc4e3ee9ef81517e8093d52737165b71f"),
        ethereum_address: alloy::primitives::address!("cdf7028ceab81fa0c6971208e83fa7872994bee5"),
    },
    BridgeTokenDefinition {
        token_symbol: "mUSDC",
        ethereum_symbol: "USDC",
        home_address: alloy::primitives::address!("04671c72aab5ac02a03c1098314b1bb6b560c197"),
        ethereum_address: alloy::primitives::address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
    },
    BridgeTokenDefinition {
        token_symbol: "mUSDe",
        ethereum_symbol: "USDe",
        home_address: alloy::primitives::address!("df6542260a9f768f07030e4895083f804241f4c4"),
        ethereum_address: alloy::primitives::address!("4c9edd5852cd905f086c759e8383e09bff1e68b3"),
    },
    BridgeTokenDefinition {
        token_symbol: "mUSDT",
        ethereum_symbol: "USDT",
        home_address: alloy::primitives::address!("eb5a5d39de4ea42c2aa6a57eca2894376683bb8e"),
        ethereum_address: alloy::primitives::address!("dac17f958d2ee523a2206206994597c13d831ec7"),
    },
    BridgeTokenDefinition {
        token_symbol: "mxSolvBTC",
        ethereum_symbol: "xSolvBTC",
        home_address: alloy::primitives::address!("df708431162ba247ddae362d2c919e0fbafcf9de"),
        ethereum_address: alloy::primitives::address!("d9d920aa40f578ab794426f5c90f6c731d159def"),
    },
    BridgeTokenDefinition {
        token_symbol: "BTC",
        ethereum_symbol: "tBTC",
        home_address: alloy::primitives::address!("7b7c000000000000000000000000000000000000"),
        ethereum_address: alloy::primitives::address!("18084fba666a33d37592fa2633fd49a74dd93a88"),
    },
];

/// Reads custodian balances for every bridged token.
pub struct BridgeAssetReader<P> {
    chain: ChainReader<P>,
    custodian: Address,
}

impl<P: Provider + Clone> BridgeAssetReader<P> {
    pub fn new(chain: ChainReader<P>) -> Self {
        Self {
            chain,
            custodian: addresses::BRIDGE_CUSTODIAN,
        }
    }

    /// Fetches balance and decimals for each bridged token in one multicall.
    ///
    /// Tokens whose balance or decimals call fails are skipped; the bridge
    /// inventory is best-effort by design.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_assets(&self) -> Result<Vec<BridgeAssetBalance>> {
        let requests: Vec<MulticallRequest> = BRIDGE_TOKENS
            .iter()
            .flat_map(|token| {
                [
                    MulticallRequest::new(
                        token.ethereum_address,
                        &IERC20::balanceOfCall {
                            account: self.custodian,
                        },
                    ),
                    MulticallRequest::new(token.ethereum_address, &IERC20::decimalsCall {}),
                ]
            })
            .collect();
        let outcomes = self
            .chain
            .multicall(&requests, DEFAULT_MULTICALL_BATCH)
            .await?;

        let mut assets = Vec::new();
        for (i, token) in BRIDGE_TOKENS.iter().enumerate() {
            let balance = outcomes[i * 2].decode::<IERC20::balanceOfCall>();
            let decimals = outcomes[i * 2 + 1].decode::<IERC20::decimalsCall>();

            let (Some(balance), Some(decimals)) = (balance, decimals) else {
                tracing::debug!(symbol = token.ethereum_symbol, "skipping unreadable bridge token");
                continue;
            };

            assets.push(BridgeAssetBalance {
                token_symbol: token.token_symbol,
                ethereum_symbol: token.ethereum_symbol,
                home_address: token.home_address,
                ethereum_address: token.ethereum_address,
                bridge_address: self.custodian,
                decimals: decimals.count,
                balance_raw: balance.balance,
            });
        }

        Ok(assets)
    }
}
