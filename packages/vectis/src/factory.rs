use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Addr, Coin};

#[cw_serde]
pub struct WalletFactoryInstantiateMsg {
    /// Smart contract wallet contract code id
    pub proxy_code_id: u64,
    /// Wallet guardians multisig contract code id
    /// Currently v0.16.0 of cw-plus cw3_fixed_multisig
    pub proxy_multisig_code_id: u64,
    /// Chain address prefix
    pub addr_prefix: String,
    /// Fee in native token to be sent to Dao Contract
    pub wallet_fee: Coin,
    /// Fee for claiming govec on the dao-chain
    pub claim_fee: Coin,
    /// Set on the dao-chain only, remote factories go through the remote-tunnel
    pub govec_minter: Option<String>,
}

#[cw_serde]
pub enum CodeIdType {
    Proxy,
    Multisig,
}

#[cw_serde]
pub enum WalletFactoryExecuteMsg {
    UpdateCodeId { ty: CodeIdType, new_code_id: u64 },
    UpdateGovecAddr { addr: String },
    UpdateDao { addr: String },
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum WalletFactoryQueryMsg {
    #[returns(u64)]
    CodeId { ty: CodeIdType },
    #[returns(FeesResponse)]
    Fees {},
    #[returns(Addr)]
    DaoAddr {},
    #[returns(Option<Addr>)]
    GovecAddr {},
}

#[cw_serde]
pub struct FeesResponse {
    pub wallet_fee: Coin,
    pub claim_fee: Coin,
}
