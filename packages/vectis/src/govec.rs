use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Addr, Binary, Uint128};
use cw20::{BalanceResponse, Cw20Coin};

#[cw_serde]
pub struct GovecInstantiateMsg {
    pub name: String,
    pub symbol: String,
    /// Genesis balances, the bootstrap deployer holds one to vote in the first proposals
    pub initial_balances: Vec<Cw20Coin>,
    pub mint_cap: Option<Uint128>,
    /// Amount minted to each newly claimed wallet
    pub mint_amount: Uint128,
}

#[cw_serde]
pub enum UpdateAddrReq {
    Dao(String),
    DaoTunnel(String),
    Factory(String),
    Staking(String),
}

#[cw_serde]
pub enum GovecExecuteMsg {
    /// Transfer is a base message to move tokens to another account without triggering actions
    Transfer {
        recipient: String,
        amount: Uint128,
        relayed_from: Option<String>,
    },
    /// Burns the full balance of the caller
    Burn { relayed_from: Option<String> },
    /// Send is a base message to transfer tokens to a contract and trigger an action
    /// on the receiving contract.
    Send {
        contract: String,
        amount: Uint128,
        msg: Binary,
        relayed_from: Option<String>,
    },
    /// If authorised, mint the `mint_amount` defined by the dao to the new wallet
    /// permission: factory / dao-tunnel
    Mint { new_wallet: String },
    /// Updates one of the addresses govec trusts.
    /// Until `UpdateAddrReq::Dao` is executed the instantiator acts as the dao
    /// permission: executed by dao only
    UpdateConfigAddr { new_addr: UpdateAddrReq },
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum GovecQueryMsg {
    #[returns(BalanceResponse)]
    Balance { address: String },
    #[returns(GovecConfigResponse)]
    Config {},
}

#[cw_serde]
pub struct GovecConfigResponse {
    pub dao: Option<Addr>,
    pub staking: Option<Addr>,
    pub factory: Option<Addr>,
    pub dao_tunnel: Option<Addr>,
    pub mint_amount: Uint128,
    pub total_supply: Uint128,
}
