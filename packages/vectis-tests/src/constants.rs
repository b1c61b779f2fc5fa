use cosmwasm_std::Uint128;

pub const HOST_CHAIN_ID: &str = "juno-1";
pub const HOST_PREFIX: &str = "juno";
pub const HOST_DENOM: &str = "ujuno";

pub const REMOTE_CHAIN_ID: &str = "wasmd-1";
pub const REMOTE_PREFIX: &str = "wasm";
pub const REMOTE_DENOM: &str = "ucosm";

/// secp256k1 key of the deployer on both chains
pub const DEPLOYER_KEY: &str = "1111111111111111111111111111111111111111111111111111111111111111";
/// A second account, only ever acts through [`MockChain::execute_as`](crate::common::chain::MockChain::execute_as)
pub const OTHER_KEY: &str = "2222222222222222222222222222222222222222222222222222222222222222";

pub const GENESIS_AMOUNT: Uint128 = Uint128::new(100);
pub const THRESHOLD: Uint128 = Uint128::new(50);
pub const MINT_AMOUNT: Uint128 = Uint128::new(2);
pub const UNSTAKING_BLOCKS: u64 = 3;
pub const VOTING_PERIOD_BLOCKS: u64 = 100;

pub const WALLET_FEE: u128 = 100;
pub const CLAIM_FEE: u128 = 10;
