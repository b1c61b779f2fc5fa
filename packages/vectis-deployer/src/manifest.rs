use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    deployer::ContractRecord,
    error::{DeployError, DeployResult},
    relay::{write_atomic, Channel, Connection},
};

/// The ordered steps of a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Upload,
    BootstrapToken,
    BootstrapDao,
    Connection,
    DeployTunnel,
    RemoteTunnel,
    ApproveTunnel,
    Channels,
    RemoteFactory,
    Finalize,
    Verify,
}

impl Phase {
    pub const ALL: [Phase; 11] = [
        Phase::Upload,
        Phase::BootstrapToken,
        Phase::BootstrapDao,
        Phase::Connection,
        Phase::DeployTunnel,
        Phase::RemoteTunnel,
        Phase::ApproveTunnel,
        Phase::Channels,
        Phase::RemoteFactory,
        Phase::Finalize,
        Phase::Verify,
    ];

    /// Whether rerunning the phase after a failure inside it is safe without
    /// inspecting the chains first
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Phase::ApproveTunnel | Phase::Finalize)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Everything a run produced so far.
///
/// Passed by value between phases, each phase returns an extended copy and
/// the orchestrator persists it with the phase appended to `completed`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub host_chain_id: String,
    pub remote_chain_id: String,
    pub deployer: String,
    #[serde(default)]
    pub host_code_ids: BTreeMap<String, u64>,
    #[serde(default)]
    pub remote_code_ids: BTreeMap<String, u64>,
    pub govec: Option<ContractRecord>,
    pub dao: Option<ContractRecord>,
    pub proposal_module: Option<ContractRecord>,
    pub voting: Option<ContractRecord>,
    pub staking: Option<ContractRecord>,
    pub factory: Option<ContractRecord>,
    pub dao_tunnel: Option<ContractRecord>,
    pub remote_tunnel: Option<ContractRecord>,
    pub remote_factory: Option<ContractRecord>,
    pub connection: Option<Connection>,
    pub app_channel: Option<Channel>,
    pub transfer_channel: Option<Channel>,
    #[serde(default)]
    pub completed: Vec<Phase>,
}

macro_rules! required {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(&self) -> DeployResult<&ContractRecord> {
                self.$name.as_ref().ok_or(DeployError::MissingField(stringify!($name)))
            }
        )*
    };
}

impl DeploymentManifest {
    pub fn new(host_chain_id: &str, remote_chain_id: &str, deployer: &str) -> Self {
        DeploymentManifest {
            host_chain_id: host_chain_id.to_string(),
            remote_chain_id: remote_chain_id.to_string(),
            deployer: deployer.to_string(),
            ..Default::default()
        }
    }

    required!(
        govec,
        dao,
        proposal_module,
        voting,
        staking,
        factory,
        dao_tunnel,
        remote_tunnel,
        remote_factory,
    );

    pub fn connection(&self) -> DeployResult<&Connection> {
        self.connection
            .as_ref()
            .ok_or(DeployError::MissingField("connection"))
    }

    pub fn app_channel(&self) -> DeployResult<&Channel> {
        self.app_channel
            .as_ref()
            .ok_or(DeployError::MissingField("app_channel"))
    }

    pub fn transfer_channel(&self) -> DeployResult<&Channel> {
        self.transfer_channel
            .as_ref()
            .ok_or(DeployError::MissingField("transfer_channel"))
    }

    pub fn host_code_id(&self, name: &str) -> DeployResult<u64> {
        code_id(&self.host_code_ids, name, "host_code_ids")
    }

    pub fn remote_code_id(&self, name: &str) -> DeployResult<u64> {
        code_id(&self.remote_code_ids, name, "remote_code_ids")
    }

    pub fn is_completed(&self, phase: Phase) -> bool {
        self.completed.contains(&phase)
    }

    pub fn complete(mut self, phase: Phase) -> Self {
        if !self.is_completed(phase) {
            self.completed.push(phase);
        }
        self
    }

    /// Rejects a stored manifest that belongs to another deployment
    pub fn check_identity(&self, host_chain_id: &str, remote_chain_id: &str, deployer: &str) -> DeployResult<()> {
        for (field, expected, found) in [
            ("host_chain_id", host_chain_id, self.host_chain_id.as_str()),
            ("remote_chain_id", remote_chain_id, self.remote_chain_id.as_str()),
            ("deployer", deployer, self.deployer.as_str()),
        ] {
            if expected != found {
                return Err(DeployError::ManifestInconsistency {
                    field: field.to_string(),
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Flat role to address document handed to verification tooling
    pub fn flat(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("hostChainId".to_string(), self.host_chain_id.clone());
        out.insert("remoteChainId".to_string(), self.remote_chain_id.clone());
        out.insert("deployer".to_string(), self.deployer.clone());
        let records = [
            ("govec", &self.govec),
            ("dao", &self.dao),
            ("proposal", &self.proposal_module),
            ("voting", &self.voting),
            ("staking", &self.staking),
            ("factory", &self.factory),
            ("daoTunnel", &self.dao_tunnel),
            ("remoteTunnel", &self.remote_tunnel),
            ("remoteFactory", &self.remote_factory),
        ];
        for (role, record) in records {
            if let Some(record) = record {
                out.insert(format!("{role}Addr"), record.address.clone());
                out.insert(format!("{role}CodeId"), record.code_id.to_string());
            }
        }
        if let Some(conn) = &self.connection {
            out.insert("hostConnectionId".into(), conn.host_connection_id.clone());
            out.insert("remoteConnectionId".into(), conn.remote_connection_id.clone());
        }
        if let Some(channel) = &self.app_channel {
            out.insert("hostAppChannel".into(), channel.channel_id_host.clone());
            out.insert("remoteAppChannel".into(), channel.channel_id_remote.clone());
        }
        if let Some(channel) = &self.transfer_channel {
            out.insert("hostTransferChannel".into(), channel.channel_id_host.clone());
            out.insert("remoteTransferChannel".into(), channel.channel_id_remote.clone());
        }
        out
    }
}

fn code_id(ids: &BTreeMap<String, u64>, name: &str, field: &'static str) -> DeployResult<u64> {
    ids.get(name).copied().ok_or(DeployError::MissingField(field))
}

/// Durable storage for the manifest between runs
#[async_trait]
pub trait ManifestStore: Send + Sync {
    async fn load(&self) -> DeployResult<Option<DeploymentManifest>>;

    async fn save(&self, manifest: &DeploymentManifest) -> DeployResult<()>;
}

/// JSON file, replaced atomically on save
#[derive(Debug, Clone)]
pub struct FileManifestStore {
    path: PathBuf,
}

impl FileManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileManifestStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the flat document next to the manifest
    pub async fn export_flat(&self, manifest: &DeploymentManifest) -> DeployResult<PathBuf> {
        let path = self.path.with_extension("flat.json");
        write_atomic(&path, &serde_json::to_vec_pretty(&manifest.flat())?).await?;
        Ok(path)
    }
}

#[async_trait]
impl ManifestStore for FileManifestStore {
    async fn load(&self) -> DeployResult<Option<DeploymentManifest>> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, manifest: &DeploymentManifest) -> DeployResult<()> {
        write_atomic(&self.path, &serde_json::to_vec_pretty(manifest)?).await
    }
}

#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    inner: Mutex<Option<DeploymentManifest>>,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<DeploymentManifest> {
        self.inner.lock().await.clone()
    }

    pub async fn set(&self, manifest: Option<DeploymentManifest>) {
        *self.inner.lock().await = manifest;
    }
}

#[async_trait]
impl ManifestStore for MemoryManifestStore {
    async fn load(&self) -> DeployResult<Option<DeploymentManifest>> {
        Ok(self.inner.lock().await.clone())
    }

    async fn save(&self, manifest: &DeploymentManifest) -> DeployResult<()> {
        *self.inner.lock().await = Some(manifest.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn record(addr: &str) -> ContractRecord {
        ContractRecord {
            code_id: 3,
            address: addr.to_string(),
            admin: None,
        }
    }

    #[test]
    fn missing_fields_are_named() {
        let manifest = DeploymentManifest::new("juno-1", "wasmd-1", "juno1deployer");
        assert_matches!(manifest.dao(), Err(DeployError::MissingField("dao")));
        assert_matches!(manifest.connection(), Err(DeployError::MissingField("connection")));
        assert_matches!(manifest.host_code_id("govec"), Err(DeployError::MissingField("host_code_ids")));
    }

    #[test]
    fn completion_log_has_no_duplicates() {
        let manifest = DeploymentManifest::default()
            .complete(Phase::Upload)
            .complete(Phase::Upload)
            .complete(Phase::BootstrapToken);
        assert_eq!(manifest.completed, vec![Phase::Upload, Phase::BootstrapToken]);
        assert!(manifest.is_completed(Phase::Upload));
        assert!(!manifest.is_completed(Phase::Verify));
    }

    #[test]
    fn flat_uses_role_keys() {
        let mut manifest = DeploymentManifest::new("juno-1", "wasmd-1", "juno1deployer");
        manifest.govec = Some(record("juno1govec"));
        manifest.remote_factory = Some(record("wasm1factory"));
        let flat = manifest.flat();
        assert_eq!(flat["govecAddr"], "juno1govec");
        assert_eq!(flat["remoteFactoryAddr"], "wasm1factory");
        assert!(!flat.contains_key("daoAddr"));
    }

    #[test]
    fn identity_mismatch_is_inconsistent() {
        let manifest = DeploymentManifest::new("juno-1", "wasmd-1", "juno1deployer");
        manifest.check_identity("juno-1", "wasmd-1", "juno1deployer").unwrap();
        assert_matches!(
            manifest.check_identity("juno-1", "osmo-1", "juno1deployer"),
            Err(DeployError::ManifestInconsistency { field, .. }) if field == "remote_chain_id"
        );
    }

    #[test]
    fn only_tunnel_approval_and_finalize_are_not_idempotent() {
        let non_idempotent: Vec<_> = Phase::ALL.into_iter().filter(|p| !p.is_idempotent()).collect();
        assert_eq!(non_idempotent, vec![Phase::ApproveTunnel, Phase::Finalize]);
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileManifestStore::new(dir.path().join("manifest.json"));
        assert_eq!(store.load().await.unwrap(), None);

        let mut manifest = DeploymentManifest::new("juno-1", "wasmd-1", "juno1deployer");
        manifest.dao = Some(record("juno1dao"));
        let manifest = manifest.complete(Phase::BootstrapDao);
        store.save(&manifest).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(manifest.clone()));

        let flat = store.export_flat(&manifest).await.unwrap();
        assert!(flat.ends_with("manifest.flat.json"));
    }
}
