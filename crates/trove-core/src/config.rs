//! Environment-driven configuration for the indexer and redemption tooling.

use eyre::{eyre, Result};

/// First-run lookback window on the prod profile, in blocks.
pub const PROD_LOOKBACK_BLOCKS: u64 = 500_000;

/// Default block-chunk width for event back-scans.
const DEFAULT_EVENT_CHUNK_SIZE: u64 = 1_000;

/// Default swap-quote API endpoint.
const DEFAULT_QUOTE_API_URL: &str = "https://api.cow.fi/mainnet";

/// Deployment profile, selecting the first-run scan window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

/// Configuration consumed at process start.
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    pub environment: Environment,
    /// RPC endpoint of the monitored chain.
    pub trove_rpc_url: String,
    /// RPC endpoint of the secondary chain holding the bridge custodian.
    pub ethereum_rpc_url: String,
    /// Chunk width for the liquidation back-scan.
    pub liquidation_chunk_size: u64,
    /// Chunk width for the redemption back-scan.
    pub redemption_chunk_size: u64,
    /// Base URL of the swap-quote API.
    pub quote_api_url: String,
    /// Optional signer key for the redemption tooling.
    pub redeemer_key: Option<String>,
}

impl IndexerConfig {
    /// Loads configuration from process environment variables.
    ///
    /// # Errors
    /// Returns error if a required variable is missing.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an injected variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let environment = match var("ENVIRONMENT").as_deref() {
            Some(value) if value.eq_ignore_ascii_case("prod") => Environment::Prod,
            _ => Environment::Dev,
        };

        let trove_rpc_url = var("TROVE_RPC_URL")
            .ok_or_else(|| eyre!("TROVE_RPC_URL env variable is missing"))?;
        let ethereum_rpc_url = var("ETHEREUM_RPC_URL")
            .ok_or_else(|| eyre!("ETHEREUM_RPC_URL env variable is missing"))?;

        Ok(Self {
            environment,
            trove_rpc_url,
            ethereum_rpc_url,
            liquidation_chunk_size: parse_positive(
                var("LIQUIDATION_CHUNK_SIZE"),
                DEFAULT_EVENT_CHUNK_SIZE,
            ),
            redemption_chunk_size: parse_positive(
                var("REDEMPTION_CHUNK_SIZE"),
                DEFAULT_EVENT_CHUNK_SIZE,
            ),
            quote_api_url: var("QUOTE_API_URL")
                .unwrap_or_else(|| DEFAULT_QUOTE_API_URL.to_string()),
            redeemer_key: var("REDEEMER_PRIVATE_KEY"),
        })
    }
}

fn parse_positive(value: Option<String>, fallback: u64) -> u64 {
    value
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|parsed| *parsed > 0)
        .unwrap_or(fallback)
}

/// First block of the event back-scan for a pass.
///
/// Scans resume at `watermark + 1`. With no watermark, the prod profile looks
/// back [`PROD_LOOKBACK_BLOCKS`] from the current height while the dev
/// profile scans only a tight local range near the head.
pub fn scan_start(watermark: Option<u64>, height: u64, environment: Environment) -> u64 {
    match watermark {
        Some(last) => last.saturating_add(1),
        None => match environment {
            Environment::Dev => height,
            Environment::Prod => height.saturating_sub(PROD_LOOKBACK_BLOCKS).saturating_add(1),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn from_vars_requires_rpc_urls() {
        let result = IndexerConfig::from_vars(vars(&[("TROVE_RPC_URL", "http://localhost:8545")]));
        assert!(result.is_err(), "missing ETHEREUM_RPC_URL must fail");
    }

    #[test]
    fn from_vars_applies_chunk_fallbacks() {
        let config = IndexerConfig::from_vars(vars(&[
            ("TROVE_RPC_URL", "http://localhost:8545"),
            ("ETHEREUM_RPC_URL", "http://localhost:8546"),
            ("LIQUIDATION_CHUNK_SIZE", "2500"),
            ("REDEMPTION_CHUNK_SIZE", "not-a-number"),
        ]))
        .expect("config should load");

        assert_eq!(config.environment, Environment::Dev);
        assert_eq!(config.liquidation_chunk_size, 2_500);
        assert_eq!(config.redemption_chunk_size, 1_000);
    }

    #[test]
    fn from_vars_rejects_non_positive_chunks() {
        let config = IndexerConfig::from_vars(vars(&[
            ("ENVIRONMENT", "prod"),
            ("TROVE_RPC_URL", "http://localhost:8545"),
            ("ETHEREUM_RPC_URL", "http://localhost:8546"),
            ("LIQUIDATION_CHUNK_SIZE", "0"),
        ]))
        .expect("config should load");

        assert_eq!(config.environment, Environment::Prod);
        assert_eq!(config.liquidation_chunk_size, 1_000);
    }

    #[test]
    fn scan_start_resumes_after_watermark() {
        assert_eq!(scan_start(Some(4_200_000), 5_000_500, Environment::Prod), 4_200_001);
        assert_eq!(scan_start(Some(4_200_000), 5_000_500, Environment::Dev), 4_200_001);
    }

    #[test]
    fn scan_start_prod_uses_bounded_lookback() {
        assert_eq!(scan_start(None, 5_000_500, Environment::Prod), 4_500_501);
    }

    #[test]
    fn scan_start_dev_stays_near_head() {
        assert_eq!(scan_start(None, 5_000_500, Environment::Dev), 5_000_500);
    }

    #[test]
    fn scan_start_saturates_on_short_chains() {
        assert_eq!(scan_start(None, 1_000, Environment::Prod), 1);
    }
}
