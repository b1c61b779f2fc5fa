use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::Addr;

use crate::WalletFactoryInstantiateMsg;

#[cw_serde]
pub struct DaoTunnelInstantiateMsg {
    pub govec_minter: String,
    pub denom: String,
}

#[cw_serde]
pub enum DaoTunnelExecuteMsg {
    /// Approves a remote-tunnel as a counterparty, keyed by the connection id on this chain
    /// and the remote `wasm.` port of the remote-tunnel
    AddApprovedController {
        connection_id: String,
        port_id: String,
    },
    RemoveApprovedController {
        connection_id: String,
        port_id: String,
    },
    /// Sends a `DaoTunnelPacketMsg::InstantiateFactory` packet over `channel_id`
    InstantiateRemoteFactory {
        code_id: u64,
        msg: WalletFactoryInstantiateMsg,
        channel_id: String,
    },
    UpdateRemoteTunnelChannel {
        channel_id: String,
    },
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum DaoTunnelQueryMsg {
    #[returns(RemoteTunnels)]
    Controllers {
        start_after: Option<(String, String)>,
        limit: Option<u32>,
    },
    #[returns(Option<Addr>)]
    Govec {},
}

#[cw_serde]
pub struct RemoteTunnels {
    /// (connection_id, port_id)
    pub tunnels: Vec<(String, String)>,
}

#[cw_serde]
pub struct DaoConfig {
    pub addr: String,
    pub dao_tunnel_port_id: String,
    /// Connection id on the remote chain
    pub connection_id: String,
    /// Set once the channel handshake with the dao-tunnel completes
    pub dao_tunnel_channel: Option<String>,
}

#[cw_serde]
pub struct ChainConfig {
    pub remote_factory: Option<String>,
    pub denom: String,
}

#[cw_serde]
pub struct RemoteTunnelInstantiateMsg {
    pub dao_config: DaoConfig,
    pub chain_config: ChainConfig,
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum RemoteTunnelQueryMsg {
    #[returns(Option<Addr>)]
    Factory {},
    #[returns(Option<String>)]
    Channel {},
    #[returns(DaoConfig)]
    DaoConfig {},
}
