use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum IbcError {
    #[error("Only supports unordered channels")]
    InvalidChannelOrder,
    #[error("Counterparty version must be '{0}'")]
    InvalidChannelVersion(&'static str),
    #[error("Connection id must be = '{0}'")]
    InvalidConnectionId(String),
    #[error("Port id must be = '{0}'")]
    InvalidPortId(String),
    #[error("Invalid packet")]
    InvalidPacket,
    #[error("Invalid source: not an approved tunnel")]
    InvalidSrc,
}
