pub use std::sync::Arc;

pub use anyhow::{anyhow, Result};
pub use cosmwasm_std::{coin, to_json_binary, Addr, Binary, CosmosMsg, Empty, Uint128, WasmMsg};
pub use cw20::BalanceResponse;
pub use cw3::{Status, Vote};

pub use vectis_deployer::{
    artifacts::{self, HOST_CONTRACTS, REMOTE_CONTRACTS},
    backend::ChainBackend,
    events::{CONTRACT_ADDR_KEY, INSTANTIATE_EVENT, WASM_EVENT},
    relay::{ChannelSpec, ConnectionStore, RelayLink},
    ChainSession, ContractArtifacts, ContractDeployer, Credentials, CrossChainOrchestrator,
    DeployConfig, DeployError, DeploymentManifest, FeeMode, FileManifestStore, GovernanceDispatcher,
    ManifestStore, MemoryManifestStore, OrchestrationError, Phase, PollPolicy,
};
pub use vectis_wallet::{
    wasm_port_id, DaoQueryMsg, GovecConfigResponse, GovecExecuteMsg, GovecQueryMsg,
    ProposalQueryMsg, ProposalResponse, StakeQueryMsg, StakedValueResponse, APP_ORDER,
    IBC_APP_VERSION, ICS20_ORDER, ICS20_PORT, ICS20_VERSION,
};

pub use crate::common::{
    chain::{CodeRegistry, MockChain},
    contracts::{PingerCounts, PingerMsg, PingerQuery, PING_VERSION},
    relayer::MockRelayer,
    suite::{wasm, DaoFixture, DeploySuite, PINGER},
};
pub use crate::constants::*;
