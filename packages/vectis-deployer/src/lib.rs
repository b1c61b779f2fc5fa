//! Off-chain deployment of the Vectis DAO across a host (dao) chain and a
//! remote chain connected over IBC.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod deployer;
pub mod error;
pub mod events;
pub mod governance;
pub mod manifest;
pub mod orchestrator;
pub mod poll;
pub mod relay;
pub mod session;
pub mod signer;

pub use crate::artifacts::ContractArtifacts;
pub use crate::backend::{BackendError, ChainBackend, Msg, TxResult};
pub use crate::config::DeployConfig;
pub use crate::deployer::{ContractDeployer, ContractRecord};
pub use crate::error::{DeployError, DeployResult, OrchestrationError};
pub use crate::governance::{
    AdminAuthorizer, Authorizer, GovernanceAuthorizer, GovernanceDispatcher, ProposalWriter,
};
pub use crate::manifest::{
    DeploymentManifest, FileManifestStore, ManifestStore, MemoryManifestStore, Phase,
};
pub use crate::orchestrator::CrossChainOrchestrator;
pub use crate::poll::PollPolicy;
pub use crate::relay::{Channel, ChannelSpec, Connection, ConnectionStore, RelayBackend, RelayLink};
pub use crate::session::{ChainSession, FeeMode};
pub use crate::signer::Credentials;
