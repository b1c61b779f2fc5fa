use std::path::{Path, PathBuf};

use cosmwasm_std::{Coin, Uint128};
use serde::Deserialize;
use tracing::info;

use crate::{
    error::{DeployError, DeployResult},
    poll::PollPolicy,
};

/// One chain the deployment touches
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: String,
    pub rpc_endpoint: String,
    pub addr_prefix: String,
    pub fee_denom: String,
    #[serde(default = "default_gas_price")]
    pub gas_price: f64,
    #[serde(default = "default_gas_adjustment")]
    pub gas_adjustment: f64,
    /// Wait for a broadcast tx to be included in a block
    #[serde(default)]
    pub inclusion: PollPolicy,
}

fn default_gas_price() -> f64 {
    0.025
}

fn default_gas_adjustment() -> f64 {
    1.3
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelayConfig {
    /// Where established connections are kept between runs
    pub connection_store: PathBuf,
    #[serde(default)]
    pub drain: PollPolicy,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct GovernanceConfig {
    /// Waits on proposal status and unstaking claims
    #[serde(default)]
    pub poll: PollPolicy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DaoSettings {
    pub name: String,
    pub description: String,
    pub govec_name: String,
    pub govec_symbol: String,
    /// Minted to the deployer so it can vote on the bootstrap proposals
    pub genesis_amount: Uint128,
    pub mint_amount: Uint128,
    pub threshold: Uint128,
    pub max_voting_period_blocks: u64,
    pub unstaking_blocks: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FactorySettings {
    pub wallet_fee: Coin,
    pub claim_fee: Coin,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeployConfig {
    pub host: NetworkConfig,
    pub remote: NetworkConfig,
    pub relay: RelayConfig,
    #[serde(default)]
    pub governance: GovernanceConfig,
    pub dao: DaoSettings,
    pub factory: FactorySettings,
    pub remote_factory: FactorySettings,
}

impl DeployConfig {
    pub async fn from_file(path: &Path) -> DeployResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            DeployError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), host = %config.host.chain_id, remote = %config.remote.chain_id, "loaded deploy config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> DeployResult<Self> {
        let config: DeployConfig =
            toml::from_str(raw).map_err(|e| DeployError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> DeployResult<()> {
        if self.host.chain_id == self.remote.chain_id {
            return Err(DeployError::Config(format!(
                "host and remote share chain id {}",
                self.host.chain_id
            )));
        }
        if self.dao.threshold.is_zero() || self.dao.genesis_amount < self.dao.threshold {
            return Err(DeployError::Config(
                "genesis amount must reach the proposal threshold".into(),
            ));
        }
        for network in [&self.host, &self.remote] {
            if network.gas_adjustment < 1.0 {
                return Err(DeployError::Config(format!(
                    "{}: gas adjustment below 1.0",
                    network.chain_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const CONFIG: &str = r#"
[host]
chain_id = "juno-1"
rpc_endpoint = "http://localhost:26657"
addr_prefix = "juno"
fee_denom = "ujuno"

[host.inclusion]
interval_ms = 100
max_attempts = 20

[remote]
chain_id = "wasmd-1"
rpc_endpoint = "http://localhost:36657"
addr_prefix = "wasm"
fee_denom = "ucosm"
gas_price = 0.1

[relay]
connection_store = "connections.json"

[dao]
name = "VectisDAO"
description = "Wallets on steroids"
govec_name = "Govec"
govec_symbol = "GOV"
genesis_amount = "2"
mint_amount = "2"
threshold = "1"
max_voting_period_blocks = 100
unstaking_blocks = 3

[factory]
wallet_fee = { denom = "ujuno", amount = "100" }
claim_fee = { denom = "ujuno", amount = "100" }

[remote_factory]
wallet_fee = { denom = "ucosm", amount = "10" }
claim_fee = { denom = "ucosm", amount = "10" }
"#;

    #[test]
    fn parses_with_defaults() {
        let config = DeployConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.host.gas_price, 0.025);
        assert_eq!(config.remote.gas_price, 0.1);
        assert_eq!(config.host.inclusion.interval_ms, 100);
        assert_eq!(config.host.inclusion.max_interval_ms, 5_000);
        assert_eq!(config.relay.drain, PollPolicy::default());
        assert_eq!(config.dao.threshold, Uint128::one());
    }

    #[test]
    fn rejects_same_chain() {
        let raw = CONFIG.replace("wasmd-1", "juno-1");
        assert_matches!(DeployConfig::from_toml_str(&raw), Err(DeployError::Config(_)));
    }

    #[test]
    fn rejects_unreachable_threshold() {
        let raw = CONFIG.replace("threshold = \"1\"", "threshold = \"5\"");
        assert_matches!(DeployConfig::from_toml_str(&raw), Err(DeployError::Config(_)));
    }

    #[tokio::test]
    async fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.toml");
        tokio::fs::write(&path, CONFIG).await.unwrap();
        let config = DeployConfig::from_file(&path).await.unwrap();
        assert_eq!(config.remote.addr_prefix, "wasm");
    }
}
