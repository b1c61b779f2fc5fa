use std::sync::Mutex;

use async_trait::async_trait;
use vectis_deployer::relay::{
    Channel, ChannelSpec, Connection, PacketDirection, PacketStage, PendingPacket, RelayBackend,
    RelayError, RelayReport,
};

use super::chain::{MockChain, Packet};

#[derive(Default)]
struct RelayerState {
    connections_created: u32,
    stalled: bool,
}

/// Moves packets between two [`MockChain`]s the way a hermes or rly process would
pub struct MockRelayer {
    host: MockChain,
    remote: MockChain,
    state: Mutex<RelayerState>,
}

impl MockRelayer {
    pub fn new(host: MockChain, remote: MockChain) -> Self {
        MockRelayer {
            host,
            remote,
            state: Mutex::new(RelayerState::default()),
        }
    }

    pub fn connections_created(&self) -> u32 {
        self.state.lock().expect("relayer poisoned").connections_created
    }

    /// A stalled relayer reports pending packets but never moves them
    pub fn stall(&self, stalled: bool) {
        self.state.lock().expect("relayer poisoned").stalled = stalled;
    }

    fn stalled(&self) -> bool {
        self.state.lock().expect("relayer poisoned").stalled
    }

    fn ends(&self, direction: PacketDirection) -> (&MockChain, &MockChain) {
        match direction {
            PacketDirection::HostToRemote => (&self.host, &self.remote),
            PacketDirection::RemoteToHost => (&self.remote, &self.host),
        }
    }

    fn in_flight(
        &self,
        direction: PacketDirection,
        src_channel: &str,
    ) -> Vec<(Packet, PacketStage)> {
        let (src, dst) = self.ends(direction);
        let packets = src.state().commitments(src_channel);
        let dst = dst.state();
        packets
            .into_iter()
            .map(|packet| {
                let stage = match dst.receipt(&packet.dst_channel, packet.sequence) {
                    Some(_) => PacketStage::Acknowledge,
                    None => PacketStage::Receive,
                };
                (packet, stage)
            })
            .collect()
    }
}

#[async_trait]
impl RelayBackend for MockRelayer {
    async fn connection_open(&self, conn: &Connection) -> Result<bool, RelayError> {
        let host = self.host.state().connection(&conn.host_connection_id);
        let remote = self.remote.state().connection(&conn.remote_connection_id);
        Ok(matches!((host, remote), (Some(h), Some(r)) if h.open && r.open))
    }

    async fn create_connection(&self) -> Result<Connection, RelayError> {
        let host_connection_id = self.host.state().open_connection();
        let remote_connection_id = self.remote.state().open_connection();
        self.host
            .state()
            .set_connection_counterparty(&host_connection_id, &remote_connection_id);
        self.remote
            .state()
            .set_connection_counterparty(&remote_connection_id, &host_connection_id);
        self.state.lock().expect("relayer poisoned").connections_created += 1;
        Ok(Connection {
            host_connection_id,
            remote_connection_id,
        })
    }

    async fn channels(&self, conn: &Connection) -> Result<Vec<Channel>, RelayError> {
        let channels = self.host.state().open_channels(&conn.host_connection_id);
        Ok(channels
            .into_iter()
            .filter_map(|(channel_id_host, end)| {
                Some(Channel {
                    port_id_host: end.port_id,
                    port_id_remote: end.counterparty_port_id,
                    channel_id_host,
                    channel_id_remote: end.counterparty_channel_id?,
                    version: end.version,
                })
            })
            .collect())
    }

    async fn create_channel(
        &self,
        conn: &Connection,
        spec: &ChannelSpec,
    ) -> Result<Channel, RelayError> {
        let channel_id_host = self
            .host
            .state()
            .chan_open(
                &spec.host_port,
                &spec.remote_port,
                None,
                &conn.host_connection_id,
                &spec.version,
                spec.order.clone(),
            )
            .map_err(RelayError::Handshake)?;
        let channel_id_remote = self
            .remote
            .state()
            .chan_open(
                &spec.remote_port,
                &spec.host_port,
                Some(channel_id_host.clone()),
                &conn.remote_connection_id,
                &spec.version,
                spec.order.clone(),
            )
            .map_err(RelayError::Handshake)?;
        self.host
            .state()
            .chan_connect(&channel_id_host, &channel_id_remote)
            .map_err(RelayError::Handshake)?;
        self.remote
            .state()
            .chan_connect(&channel_id_remote, &channel_id_host)
            .map_err(RelayError::Handshake)?;
        Ok(Channel {
            port_id_host: spec.host_port.clone(),
            port_id_remote: spec.remote_port.clone(),
            channel_id_host,
            channel_id_remote,
            version: spec.version.clone(),
        })
    }

    async fn pending_packets(&self, channel: &Channel) -> Result<Vec<PendingPacket>, RelayError> {
        self.host.advance_blocks(1);
        self.remote.advance_blocks(1);
        let mut pending = vec![];
        for (direction, src_channel) in [
            (PacketDirection::HostToRemote, &channel.channel_id_host),
            (PacketDirection::RemoteToHost, &channel.channel_id_remote),
        ] {
            pending.extend(self.in_flight(direction, src_channel).into_iter().map(
                |(packet, stage)| PendingPacket {
                    sequence: packet.sequence,
                    direction,
                    src_channel: packet.src_channel,
                    dst_channel: packet.dst_channel,
                    stage,
                },
            ));
        }
        Ok(pending)
    }

    async fn relay(
        &self,
        channel: &Channel,
        packets: &[PendingPacket],
    ) -> Result<RelayReport, RelayError> {
        let mut report = RelayReport::default();
        if self.stalled() {
            return Ok(report);
        }
        for pending in packets {
            let (src, dst) = self.ends(pending.direction);
            let src_channel = match pending.direction {
                PacketDirection::HostToRemote => &channel.channel_id_host,
                PacketDirection::RemoteToHost => &channel.channel_id_remote,
            };
            let Some(packet) = src
                .state()
                .commitments(src_channel)
                .into_iter()
                .find(|p| p.sequence == pending.sequence)
            else {
                continue;
            };
            let ack = dst.state().recv_packet(&packet).map_err(RelayError::Relay)?;
            if pending.stage == PacketStage::Receive {
                report.received += 1;
            }
            src.state()
                .acknowledge(&packet, &ack)
                .map_err(RelayError::Relay)?;
            report.acknowledged += 1;
        }
        Ok(report)
    }
}
