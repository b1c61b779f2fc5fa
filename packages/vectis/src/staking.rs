use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Addr, Uint128};
use cw20::Cw20ReceiveMsg;
use cw_utils::{Duration, Expiration};

#[cw_serde]
pub enum StakingInfo {
    Existing {
        staking_contract_address: String,
    },
    /// The voting module instantiates its own staking contract
    New {
        staking_code_id: u64,
        unstaking_duration: Option<Duration>,
    },
}

#[cw_serde]
pub enum TokenInfo {
    Existing {
        address: String,
        staking_contract: StakingInfo,
    },
}

/// Voting module init, nested inside the dao-core init
#[cw_serde]
pub struct VoteInstantiateMsg {
    pub token_info: TokenInfo,
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum VotingQueryMsg {
    #[returns(Addr)]
    StakingContract {},
    #[returns(Addr)]
    TokenContract {},
    #[returns(VotingPowerResponse)]
    VotingPowerAtHeight {
        address: String,
        height: Option<u64>,
    },
}

#[cw_serde]
pub struct VotingPowerResponse {
    pub power: Uint128,
    pub height: u64,
}

#[cw_serde]
pub struct StakeInstantiateMsg {
    pub token_address: String,
    pub unstaking_duration: Option<Duration>,
}

#[cw_serde]
pub enum StakeExecuteMsg {
    Receive(Cw20ReceiveMsg),
    Unstake { amount: Uint128 },
    Claim {},
}

/// Hook carried in the `msg` of a govec `Send` to the staking contract
#[cw_serde]
pub enum StakeReceiveMsg {
    Stake {},
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum StakeQueryMsg {
    #[returns(StakedValueResponse)]
    StakedValue { address: String },
    #[returns(ClaimsResponse)]
    Claims { address: String },
}

#[cw_serde]
pub struct StakedValueResponse {
    pub value: Uint128,
}

#[cw_serde]
pub struct Claim {
    pub amount: Uint128,
    pub release_at: Expiration,
}

#[cw_serde]
pub struct ClaimsResponse {
    pub claims: Vec<Claim>,
}
