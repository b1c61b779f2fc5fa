use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Addr, CosmosMsg, Uint128};
use cw3::{Status, Vote};
use cw_utils::{Duration, Expiration};

/// The vote count a proposal must reach to pass
#[cw_serde]
pub enum Threshold {
    AbsoluteCount { threshold: Uint128 },
}

#[cw_serde]
pub struct PropInstantiateMsg {
    pub threshold: Threshold,
    pub max_voting_period: Duration,
    pub min_voting_period: Option<Duration>,
    pub only_members_execute: bool,
    pub allow_revoting: bool,
    pub close_proposal_on_execution_failure: bool,
}

#[cw_serde]
pub enum ProposalExecuteMsg {
    /// Emits a `proposal_id` attribute on the `wasm` event
    Propose {
        title: String,
        description: String,
        msgs: Vec<CosmosMsg>,
    },
    Vote { proposal_id: u64, vote: Vote },
    /// Dispatches the proposal messages through the dao `ExecuteProposalHook`
    Execute { proposal_id: u64 },
    Close { proposal_id: u64 },
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum ProposalQueryMsg {
    #[returns(ProposalResponse)]
    Proposal { proposal_id: u64 },
    /// Newest first
    #[returns(ProposalListResponse)]
    ReverseProposals {
        start_before: Option<u64>,
        limit: Option<u64>,
    },
}

#[cw_serde]
pub struct ProposalResponse {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub msgs: Vec<CosmosMsg>,
    pub status: Status,
    pub proposer: Addr,
    pub yes_votes: Uint128,
    pub no_votes: Uint128,
    pub expires: Expiration,
}

#[cw_serde]
pub struct ProposalListResponse {
    pub proposals: Vec<ProposalResponse>,
}
