//! Alloy provider construction for the monitored chain and the secondary
//! reference chain.
//!
//! Read paths use a plain HTTP provider; the redemption path additionally
//! needs a wallet-filled provider so `approve`/`redeemCollateral` can be
//! signed locally.

use alloy::network::{Ethereum, EthereumWallet};
use alloy::primitives::Address;
use alloy::providers::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy::providers::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy::signers::local::PrivateKeySigner;
use eyre::{Context, Result};

/// HTTP provider with the recommended fill stack (gas, blob gas, nonce,
/// chain id).
pub type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// HTTP provider that additionally signs with a local private key.
pub type WalletProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider<Ethereum>,
>;

/// Connects a read-only HTTP provider and verifies connectivity.
///
/// The connectivity probe is a single `eth_blockNumber` call; a misconfigured
/// endpoint fails here instead of midway through a pass.
///
/// # Errors
/// Returns error if the URL is malformed or the probe call fails.
#[tracing::instrument(skip_all, fields(rpc_url = %rpc_url))]
pub async fn connect_http(rpc_url: &str) -> Result<HttpProvider> {
    let provider =
        ProviderBuilder::new().on_http(rpc_url.parse().wrap_err("invalid RPC URL format")?);

    let latest = provider
        .get_block_number()
        .await
        .wrap_err("failed to test RPC connectivity with eth_blockNumber")?;

    tracing::info!(rpc_url = %rpc_url, latest_block = latest, "RPC connection successful");

    Ok(provider)
}

/// Connects a signing provider from a hex-encoded private key.
///
/// Returns the provider together with the signer address so callers can run
/// balance and allowance checks without re-deriving it.
///
/// # Errors
/// Returns error if the key or URL cannot be parsed.
pub async fn connect_wallet(rpc_url: &str, private_key: &str) -> Result<(WalletProvider, Address)> {
    let signer: PrivateKeySigner = private_key
        .trim()
        .parse()
        .wrap_err("invalid signer private key")?;
    let signer_address = signer.address();
    let wallet = EthereumWallet::from(signer);

    let provider = ProviderBuilder::new()
        .wallet(wallet)
        .on_http(rpc_url.parse().wrap_err("invalid RPC URL format")?);

    tracing::info!(signer = %signer_address, "signer provider ready");

    Ok((provider, signer_address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_http_rejects_invalid_url() {
        let result = connect_http("invalid://url").await;
        assert!(result.is_err(), "should reject invalid URL");
    }

    #[tokio::test]
    async fn connect_wallet_rejects_bad_key() {
        let result = connect_wallet("http://localhost:8545", "not-a-key").await;
        assert!(result.is_err(), "should reject malformed private key");
    }
}
