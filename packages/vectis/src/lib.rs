pub use crate::dao::{
    Admin, DaoExecuteMsg, DaoInstantiateMsg, DaoQueryMsg, GetItemResponse, ModuleInstantiateInfo,
    ProposalModule, ProposalModuleStatus, VectisDaoActors,
};
pub use crate::error::IbcError;
pub use crate::factory::{
    CodeIdType, FeesResponse, WalletFactoryExecuteMsg, WalletFactoryInstantiateMsg,
    WalletFactoryQueryMsg,
};
pub use crate::govec::{
    GovecConfigResponse, GovecExecuteMsg, GovecInstantiateMsg, GovecQueryMsg, UpdateAddrReq,
};
pub use crate::ibc::{
    check_order, check_version, contract_from_port_id, wasm_port_id, DaoTunnelPacketMsg,
    PacketMsg, StdAck, APP_ORDER, IBC_APP_VERSION, ICS20_ORDER, ICS20_PORT, ICS20_VERSION,
    WASM_PORT_PREFIX,
};
pub use crate::proposal::{
    PropInstantiateMsg, ProposalExecuteMsg, ProposalListResponse, ProposalQueryMsg,
    ProposalResponse, Threshold,
};
pub use crate::staking::{
    Claim, ClaimsResponse, StakeExecuteMsg, StakeInstantiateMsg, StakeQueryMsg, StakeReceiveMsg,
    StakedValueResponse, StakingInfo, TokenInfo, VoteInstantiateMsg, VotingPowerResponse,
    VotingQueryMsg,
};
pub use crate::tunnel::{
    ChainConfig, DaoConfig, DaoTunnelExecuteMsg, DaoTunnelInstantiateMsg, DaoTunnelQueryMsg,
    RemoteTunnelInstantiateMsg, RemoteTunnelQueryMsg, RemoteTunnels,
};

mod dao;
mod error;
mod factory;
mod govec;
mod ibc;
mod proposal;
mod staking;
mod tunnel;
