use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use cosmwasm_std::IbcOrder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    error::{DeployError, DeployResult},
    poll::PollPolicy,
};

/// Transport pairing between the two chains' IBC modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub host_connection_id: String,
    pub remote_connection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub host_port: String,
    pub remote_port: String,
    pub version: String,
    pub order: IbcOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub port_id_host: String,
    pub port_id_remote: String,
    pub channel_id_host: String,
    pub channel_id_remote: String,
    pub version: String,
}

impl Channel {
    fn matches(&self, spec: &ChannelSpec) -> bool {
        self.port_id_host == spec.host_port
            && self.port_id_remote == spec.remote_port
            && self.version == spec.version
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketDirection {
    HostToRemote,
    RemoteToHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketStage {
    /// Committed on the source, not yet received
    Receive,
    /// Received, the ack is not yet back on the source
    Acknowledge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPacket {
    pub sequence: u64,
    pub direction: PacketDirection,
    pub src_channel: String,
    pub dst_channel: String,
    pub stage: PacketStage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub received: u32,
    pub acknowledged: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub rounds: u32,
    pub relayed: RelayReport,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("relayer unreachable: {0}")]
    Unreachable(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("handshake rejected: {0}")]
    Handshake(String),
    #[error("relay failed: {0}")]
    Relay(String),
}

/// A relayer between one host and one remote chain
#[async_trait]
pub trait RelayBackend: Send + Sync {
    async fn connection_open(&self, conn: &Connection) -> Result<bool, RelayError>;

    /// Creates clients on both chains and runs the connection handshake
    async fn create_connection(&self) -> Result<Connection, RelayError>;

    async fn channels(&self, conn: &Connection) -> Result<Vec<Channel>, RelayError>;

    /// Runs the channel handshake, either side may reject the version or the ports
    async fn create_channel(
        &self,
        conn: &Connection,
        spec: &ChannelSpec,
    ) -> Result<Channel, RelayError>;

    /// Packets on `channel` in either direction that still need a receive or an ack
    async fn pending_packets(&self, channel: &Channel) -> Result<Vec<PendingPacket>, RelayError>;

    async fn relay(
        &self,
        channel: &Channel,
        packets: &[PendingPacket],
    ) -> Result<RelayReport, RelayError>;
}

/// Connections that outlive a run, keyed by `host_chain_id:remote_chain_id`
#[derive(Debug, Clone)]
pub struct ConnectionStore {
    path: PathBuf,
}

impl ConnectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConnectionStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key(host_chain_id: &str, remote_chain_id: &str) -> String {
        format!("{host_chain_id}:{remote_chain_id}")
    }

    async fn read_all(&self) -> DeployResult<BTreeMap<String, Connection>> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn load(
        &self,
        host_chain_id: &str,
        remote_chain_id: &str,
    ) -> DeployResult<Option<Connection>> {
        let mut all = self.read_all().await?;
        Ok(all.remove(&Self::key(host_chain_id, remote_chain_id)))
    }

    pub async fn save(
        &self,
        host_chain_id: &str,
        remote_chain_id: &str,
        conn: &Connection,
    ) -> DeployResult<()> {
        let mut all = self.read_all().await?;
        all.insert(Self::key(host_chain_id, remote_chain_id), conn.clone());
        write_atomic(&self.path, &serde_json::to_vec_pretty(&all)?).await
    }
}

/// Write to a sibling temp file then rename over the target
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> DeployResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// An established connection between the host and remote chain
pub struct RelayLink {
    backend: Arc<dyn RelayBackend>,
    connection: Connection,
    host_chain_id: String,
    remote_chain_id: String,
}

impl RelayLink {
    /// Recovers the stored connection for this chain pair, a new one is only
    /// created when none is stored or the stored one is no longer open.
    pub async fn establish(
        backend: Arc<dyn RelayBackend>,
        store: &ConnectionStore,
        host_chain_id: &str,
        remote_chain_id: &str,
    ) -> DeployResult<Self> {
        let link_err = |e: RelayError| relay_error(host_chain_id, remote_chain_id, e);

        if let Some(connection) = store.load(host_chain_id, remote_chain_id).await? {
            if backend.connection_open(&connection).await.map_err(link_err)? {
                info!(
                    target: "relayer",
                    host = %connection.host_connection_id,
                    remote = %connection.remote_connection_id,
                    "reusing stored connection"
                );
                return Ok(RelayLink {
                    backend,
                    connection,
                    host_chain_id: host_chain_id.to_string(),
                    remote_chain_id: remote_chain_id.to_string(),
                });
            }
            warn!(
                target: "relayer",
                host = %connection.host_connection_id,
                "stored connection is not open, creating a new one"
            );
        }

        let connection = backend.create_connection().await.map_err(link_err)?;
        store.save(host_chain_id, remote_chain_id, &connection).await?;
        info!(
            target: "relayer",
            host = %connection.host_connection_id,
            remote = %connection.remote_connection_id,
            "created connection"
        );
        Ok(RelayLink {
            backend,
            connection,
            host_chain_id: host_chain_id.to_string(),
            remote_chain_id: remote_chain_id.to_string(),
        })
    }

    /// Rebuilds the link around a connection recorded by an earlier run.
    /// Never creates a connection, a recorded one that is closed is an error.
    pub async fn recover(
        backend: Arc<dyn RelayBackend>,
        store: &ConnectionStore,
        host_chain_id: &str,
        remote_chain_id: &str,
        connection: Connection,
    ) -> DeployResult<Self> {
        let open = backend
            .connection_open(&connection)
            .await
            .map_err(|e| relay_error(host_chain_id, remote_chain_id, e))?;
        if !open {
            return Err(DeployError::ManifestInconsistency {
                field: "connection".to_string(),
                expected: format!("{} open", connection.host_connection_id),
                found: "closed".to_string(),
            });
        }
        store.save(host_chain_id, remote_chain_id, &connection).await?;
        info!(
            target: "relayer",
            host = %connection.host_connection_id,
            remote = %connection.remote_connection_id,
            "recovered recorded connection"
        );
        Ok(RelayLink {
            backend,
            connection,
            host_chain_id: host_chain_id.to_string(),
            remote_chain_id: remote_chain_id.to_string(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns the channel matching `spec` if one was already opened on this
    /// connection, otherwise runs the handshake.
    pub async fn open_channel(&self, spec: &ChannelSpec) -> DeployResult<Channel> {
        if let Some(existing) = self
            .backend
            .channels(&self.connection)
            .await
            .map_err(|e| self.error(e))?
            .into_iter()
            .find(|c| c.matches(spec))
        {
            info!(target: "relayer", channel = %existing.channel_id_host, port = %spec.host_port, "channel already open");
            return Ok(existing);
        }

        let channel = self
            .backend
            .create_channel(&self.connection, spec)
            .await
            .map_err(|e| match e {
                RelayError::Handshake(reason) => DeployError::ChannelHandshake {
                    host_port: spec.host_port.clone(),
                    remote_port: spec.remote_port.clone(),
                    reason,
                },
                other => self.error(other),
            })?;
        info!(
            target: "relayer",
            host_channel = %channel.channel_id_host,
            remote_channel = %channel.channel_id_remote,
            version = %channel.version,
            "opened channel"
        );
        Ok(channel)
    }

    pub async fn pending(&self, channel: &Channel) -> DeployResult<Vec<PendingPacket>> {
        self.backend
            .pending_packets(channel)
            .await
            .map_err(|e| self.error(e))
    }

    /// Relays and acknowledges until `channel` has nothing in flight.
    /// Gives up with [`DeployError::Timeout`] once the policy's attempts are spent.
    pub async fn drain(&self, channel: &Channel, policy: &PollPolicy) -> DeployResult<DrainReport> {
        let mut report = DrainReport::default();
        for attempt in 0..policy.max_attempts {
            let pending = self.pending(channel).await?;
            if pending.is_empty() {
                debug!(target: "relayer", channel = %channel.channel_id_host, rounds = report.rounds, "drained");
                return Ok(report);
            }
            let relayed = self
                .backend
                .relay(channel, &pending)
                .await
                .map_err(|e| self.error(e))?;
            report.rounds += 1;
            report.relayed.received += relayed.received;
            report.relayed.acknowledged += relayed.acknowledged;
            debug!(
                target: "relayer",
                attempt,
                pending = pending.len(),
                received = relayed.received,
                acknowledged = relayed.acknowledged,
                "relay round"
            );
            if attempt + 1 < policy.max_attempts {
                tokio::time::sleep(policy.delay(attempt)).await;
            }
        }
        // the last round may have moved everything
        if self.pending(channel).await?.is_empty() {
            debug!(target: "relayer", channel = %channel.channel_id_host, rounds = report.rounds, "drained");
            return Ok(report);
        }
        Err(DeployError::Timeout {
            what: format!("drain of channel {}", channel.channel_id_host),
            attempts: policy.max_attempts,
        })
    }

    fn error(&self, e: RelayError) -> DeployError {
        relay_error(&self.host_chain_id, &self.remote_chain_id, e)
    }
}

fn relay_error(host_chain_id: &str, remote_chain_id: &str, e: RelayError) -> DeployError {
    match e {
        RelayError::Unreachable(reason) => DeployError::Connection {
            chain_id: format!("{host_chain_id}<>{remote_chain_id}"),
            reason,
        },
        other => DeployError::Relay(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(n: u32) -> Connection {
        Connection {
            host_connection_id: format!("connection-{n}"),
            remote_connection_id: format!("connection-{}", n + 10),
        }
    }

    #[tokio::test]
    async fn store_keeps_pairs_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConnectionStore::new(dir.path().join("relay/connections.json"));
        assert_eq!(store.load("juno-1", "wasmd-1").await.unwrap(), None);

        store.save("juno-1", "wasmd-1", &conn(0)).await.unwrap();
        store.save("juno-1", "osmo-1", &conn(1)).await.unwrap();
        assert_eq!(store.load("juno-1", "wasmd-1").await.unwrap(), Some(conn(0)));
        assert_eq!(store.load("juno-1", "osmo-1").await.unwrap(), Some(conn(1)));
        assert_eq!(store.load("wasmd-1", "juno-1").await.unwrap(), None);

        store.save("juno-1", "wasmd-1", &conn(2)).await.unwrap();
        assert_eq!(store.load("juno-1", "wasmd-1").await.unwrap(), Some(conn(2)));
    }

    /// Holds `in_flight` packets until relayed, never creates connections
    struct FakeRelayer {
        in_flight: std::sync::Mutex<u64>,
        open: bool,
    }

    impl FakeRelayer {
        fn new(in_flight: u64, open: bool) -> Arc<Self> {
            Arc::new(FakeRelayer {
                in_flight: std::sync::Mutex::new(in_flight),
                open,
            })
        }
    }

    #[async_trait]
    impl RelayBackend for FakeRelayer {
        async fn connection_open(&self, _conn: &Connection) -> Result<bool, RelayError> {
            Ok(self.open)
        }

        async fn create_connection(&self) -> Result<Connection, RelayError> {
            Err(RelayError::Relay("unexpected connection".to_string()))
        }

        async fn channels(&self, _conn: &Connection) -> Result<Vec<Channel>, RelayError> {
            Ok(vec![])
        }

        async fn create_channel(
            &self,
            _conn: &Connection,
            _spec: &ChannelSpec,
        ) -> Result<Channel, RelayError> {
            Err(RelayError::Handshake("unsupported".to_string()))
        }

        async fn pending_packets(&self, channel: &Channel) -> Result<Vec<PendingPacket>, RelayError> {
            let n = *self.in_flight.lock().unwrap();
            Ok((1..=n)
                .map(|sequence| PendingPacket {
                    sequence,
                    direction: PacketDirection::HostToRemote,
                    src_channel: channel.channel_id_host.clone(),
                    dst_channel: channel.channel_id_remote.clone(),
                    stage: PacketStage::Receive,
                })
                .collect())
        }

        async fn relay(
            &self,
            _channel: &Channel,
            packets: &[PendingPacket],
        ) -> Result<RelayReport, RelayError> {
            *self.in_flight.lock().unwrap() = 0;
            let n = packets.len() as u32;
            Ok(RelayReport {
                received: n,
                acknowledged: n,
            })
        }
    }

    fn channel() -> Channel {
        Channel {
            port_id_host: "wasm.juno1tunnel".to_string(),
            port_id_remote: "wasm.wasm1tunnel".to_string(),
            channel_id_host: "channel-0".to_string(),
            channel_id_remote: "channel-3".to_string(),
            version: "vectis-v1".to_string(),
        }
    }

    #[tokio::test]
    async fn single_attempt_drain_counts_its_only_round() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConnectionStore::new(dir.path().join("connections.json"));
        let link = RelayLink::recover(FakeRelayer::new(2, true), &store, "juno-1", "wasmd-1", conn(0))
            .await
            .unwrap();

        let report = link.drain(&channel(), &PollPolicy::fixed(1, 1)).await.unwrap();
        assert_eq!(report.rounds, 1);
        assert_eq!(report.relayed.received, 2);
        assert!(link.pending(&channel()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recover_saves_recorded_connection() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConnectionStore::new(dir.path().join("connections.json"));
        let link = RelayLink::recover(FakeRelayer::new(0, true), &store, "juno-1", "wasmd-1", conn(4))
            .await
            .unwrap();
        assert_eq!(link.connection(), &conn(4));
        assert_eq!(store.load("juno-1", "wasmd-1").await.unwrap(), Some(conn(4)));
    }

    #[tokio::test]
    async fn recover_rejects_closed_connection() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConnectionStore::new(dir.path().join("connections.json"));
        let err = RelayLink::recover(FakeRelayer::new(0, false), &store, "juno-1", "wasmd-1", conn(4))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DeployError::ManifestInconsistency { ref field, .. } if field == "connection"));
        assert_eq!(store.load("juno-1", "wasmd-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(ConnectionStore::new(path).load("a", "b").await.is_err());
    }
}
