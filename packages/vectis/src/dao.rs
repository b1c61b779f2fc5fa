use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Addr, Binary, CosmosMsg};

/// Admin of a module instantiated by the dao-core contract
#[cw_serde]
pub enum Admin {
    Address { addr: String },
    /// The dao-core contract itself
    CoreModule {},
}

#[cw_serde]
pub struct ModuleInstantiateInfo {
    pub code_id: u64,
    pub msg: Binary,
    pub admin: Option<Admin>,
    pub label: String,
}

#[cw_serde]
pub struct DaoInstantiateMsg {
    /// Optional admin allowed to execute messages on behalf of the dao
    /// without a proposal. Used while bootstrapping and renounced after.
    pub admin: Option<String>,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub automatically_add_cw20s: bool,
    pub automatically_add_cw721s: bool,
    pub voting_module_instantiate_info: ModuleInstantiateInfo,
    pub proposal_modules_instantiate_info: Vec<ModuleInstantiateInfo>,
    pub dao_uri: Option<String>,
}

#[cw_serde]
pub enum DaoExecuteMsg {
    /// Callable by the admin only
    ExecuteAdminMsgs { msgs: Vec<CosmosMsg> },
    /// Callable by proposal modules only
    ExecuteProposalHook { msgs: Vec<CosmosMsg> },
    /// Callable by the dao itself
    SetItem { key: String, value: String },
    RemoveItem { key: String },
    /// `None` renounces the admin role for good
    NominateAdmin { admin: Option<String> },
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum DaoQueryMsg {
    #[returns(Option<Addr>)]
    Admin {},
    #[returns(Addr)]
    VotingModule {},
    #[returns(Vec<ProposalModule>)]
    ProposalModules {
        start_after: Option<String>,
        limit: Option<u32>,
    },
    #[returns(GetItemResponse)]
    GetItem { key: String },
    #[returns(Vec<(String, String)>)]
    ListItems {
        start_after: Option<String>,
        limit: Option<u32>,
    },
}

#[cw_serde]
pub enum ProposalModuleStatus {
    Enabled,
    Disabled,
}

#[cw_serde]
pub struct ProposalModule {
    pub address: Addr,
    pub prefix: String,
    pub status: ProposalModuleStatus,
}

#[cw_serde]
pub struct GetItemResponse {
    pub item: Option<String>,
}

/// Keys of the dao-core items the Vectis contracts look each other up with
#[cw_serde]
pub enum VectisDaoActors {
    Govec,
    Factory,
    DaoTunnel,
    Staking,
    ProposalModule,
    Voting,
}

impl VectisDaoActors {
    pub const ALL: [VectisDaoActors; 6] = [
        VectisDaoActors::Govec,
        VectisDaoActors::Factory,
        VectisDaoActors::DaoTunnel,
        VectisDaoActors::Staking,
        VectisDaoActors::ProposalModule,
        VectisDaoActors::Voting,
    ];
}

impl std::fmt::Display for VectisDaoActors {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
