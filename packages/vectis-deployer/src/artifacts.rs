use std::{collections::BTreeMap, path::Path};

use tracing::debug;

use crate::error::{DeployError, DeployResult};

pub const GOVEC: &str = "govec";
pub const DAO_CORE: &str = "dao_core";
pub const VOTING: &str = "voting";
pub const STAKING: &str = "staking";
pub const PROPOSAL: &str = "proposal";
pub const FACTORY: &str = "factory";
pub const PROXY: &str = "proxy";
pub const MULTISIG: &str = "multisig";
pub const DAO_TUNNEL: &str = "dao_tunnel";
pub const REMOTE_TUNNEL: &str = "remote_tunnel";
pub const REMOTE_FACTORY: &str = "remote_factory";

/// Code stored on the dao chain
pub const HOST_CONTRACTS: [&str; 9] = [
    GOVEC, DAO_CORE, VOTING, STAKING, PROPOSAL, FACTORY, PROXY, MULTISIG, DAO_TUNNEL,
];

/// Code stored on the remote chain, wallets there use their own proxy and multisig
pub const REMOTE_CONTRACTS: [&str; 4] = [REMOTE_TUNNEL, REMOTE_FACTORY, PROXY, MULTISIG];

/// Wasm bytecode keyed by contract name
#[derive(Debug, Clone, Default)]
pub struct ContractArtifacts {
    code: BTreeMap<String, Vec<u8>>,
}

impl ContractArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, wasm: Vec<u8>) {
        self.code.insert(name.to_string(), wasm);
    }

    pub fn with(mut self, name: &str, wasm: Vec<u8>) -> Self {
        self.insert(name, wasm);
        self
    }

    pub fn get(&self, name: &str) -> DeployResult<&[u8]> {
        self.code
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| DeployError::NotFound {
                what: format!("artifact {name}"),
            })
    }

    /// Reads `<dir>/<name>.wasm` for every name
    pub async fn from_dir(dir: &Path, names: &[&str]) -> DeployResult<Self> {
        let mut artifacts = Self::new();
        for name in names {
            let path = dir.join(format!("{name}.wasm"));
            let wasm = tokio::fs::read(&path).await.map_err(|e| {
                DeployError::Config(format!("artifact {}: {e}", path.display()))
            })?;
            debug!(contract = name, bytes = wasm.len(), "loaded artifact");
            artifacts.insert(name, wasm);
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn loads_named_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("govec.wasm"), b"\0asm-govec")
            .await
            .unwrap();
        let artifacts = ContractArtifacts::from_dir(dir.path(), &[GOVEC]).await.unwrap();
        assert_eq!(artifacts.get(GOVEC).unwrap(), b"\0asm-govec");
        assert_matches!(artifacts.get(DAO_CORE), Err(DeployError::NotFound { .. }));

        assert_matches!(
            ContractArtifacts::from_dir(dir.path(), &[GOVEC, DAO_TUNNEL]).await,
            Err(DeployError::Config(_))
        );
    }
}
