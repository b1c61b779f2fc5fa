use cosmwasm_schema::{cw_serde, serde};
use cosmwasm_std::{from_json, to_json_binary, Binary, IbcOrder, StdResult};

pub use crate::{IbcError, WalletFactoryInstantiateMsg};

pub const IBC_APP_VERSION: &str = "vectis-v1";
pub const APP_ORDER: IbcOrder = IbcOrder::Unordered;

/// The ics20 transfer module port and version, identical on both chains
pub const ICS20_PORT: &str = "transfer";
pub const ICS20_VERSION: &str = "ics20-1";
pub const ICS20_ORDER: IbcOrder = IbcOrder::Unordered;

/// x/wasm binds every ibc enabled contract to the port `wasm.<contract_address>`
pub const WASM_PORT_PREFIX: &str = "wasm.";

pub fn wasm_port_id(contract_addr: &str) -> String {
    format!("{WASM_PORT_PREFIX}{contract_addr}")
}

/// Returns the contract address bound to a `wasm.` port, `None` for module ports
pub fn contract_from_port_id(port_id: &str) -> Option<&str> {
    port_id
        .strip_prefix(WASM_PORT_PREFIX)
        .filter(|addr| !addr.is_empty())
}

#[cw_serde]
pub struct PacketMsg {
    pub sender: String,
    pub job_id: u64,
    // This can only be DaoTunnelPacketMsg
    pub msg: Binary,
}

/// The IBC Packet Msg allowed dispatched by dao-tunnel
#[cw_serde]
pub enum DaoTunnelPacketMsg {
    UpdateChannel,
    InstantiateFactory {
        code_id: u64,
        msg: WalletFactoryInstantiateMsg,
    },
}

pub fn check_order(order: &IbcOrder) -> Result<(), IbcError> {
    if order != &APP_ORDER {
        Err(IbcError::InvalidChannelOrder)
    } else {
        Ok(())
    }
}

pub fn check_version(version: &str) -> Result<(), IbcError> {
    if version != IBC_APP_VERSION {
        Err(IbcError::InvalidChannelVersion(IBC_APP_VERSION))
    } else {
        Ok(())
    }
}

/// This is a generic ICS acknowledgement format.
/// Proto defined here: https://github.com/cosmos/cosmos-sdk/blob/v0.42.0/proto/ibc/core/channel/v1/channel.proto#L141-L147
/// If ibc_receive_packet returns Err(), then x/wasm runtime will rollback the state and return an error message in this format
#[cw_serde]
pub enum StdAck {
    Result(Binary),
    Error(String),
}

impl StdAck {
    // create a serialized success message
    pub fn success(data: impl serde::Serialize) -> StdResult<Binary> {
        let res = to_json_binary(&data)?;
        StdAck::Result(res).ack()
    }

    // create a serialized error message
    pub fn fail(err: String) -> StdResult<Binary> {
        StdAck::Error(err).ack()
    }

    pub fn ack(&self) -> StdResult<Binary> {
        to_json_binary(self)
    }

    pub fn parse(ack: &Binary) -> StdResult<Self> {
        from_json(ack)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StdAck::Result(_))
    }
}
