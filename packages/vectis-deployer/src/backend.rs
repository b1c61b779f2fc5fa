use async_trait::async_trait;
use cosmwasm_std::{Binary, Coin, CosmosMsg, Event};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A message carried by a transaction.
/// Wasm uploads have no `CosmosMsg` counterpart in cosmwasm-std.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Msg {
    StoreCode { wasm: Binary },
    Cosmos(CosmosMsg),
}

impl From<CosmosMsg> for Msg {
    fn from(msg: CosmosMsg) -> Self {
        Msg::Cosmos(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Vec<Coin>,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignDoc {
    pub chain_id: String,
    pub signer: String,
    pub sequence: u64,
    pub msgs: Vec<Msg>,
    pub fee: Fee,
    pub memo: String,
}

impl SignDoc {
    pub fn to_sign_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTx {
    pub body: SignDoc,
    /// Compressed secp256k1 public key
    pub pub_key: Binary,
    /// Compact ecdsa signature over sha256(sign bytes)
    pub signature: Binary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxResult {
    pub hash: String,
    pub height: u64,
    pub code: u32,
    pub log: String,
    pub gas_used: u64,
    pub events: Vec<Event>,
    pub data: Option<Binary>,
}

impl TxResult {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStatus {
    pub chain_id: String,
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub address: String,
    pub sequence: u64,
}

/// x/wasm contract metadata, `admin` is the wasm migrate admin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub code_id: u64,
    pub creator: String,
    pub admin: Option<String>,
    pub label: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("rejected with code {code}: {log}")]
    Rejected { code: u32, log: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("query failed: {0}")]
    Query(String),
}

/// Submit signed transactions, query contract state and fetch blocks.
///
/// The wire format is the node's business, the orchestrator only sees this trait.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    async fn status(&self) -> Result<ChainStatus, BackendError>;

    async fn account(&self, address: &str) -> Result<AccountInfo, BackendError>;

    /// Returns the gas the messages would use
    async fn simulate(&self, signer: &str, msgs: &[Msg]) -> Result<u64, BackendError>;

    /// Mempool acceptance only, returns the tx hash
    async fn broadcast(&self, tx: SignedTx) -> Result<String, BackendError>;

    /// `None` until the tx is included in a block
    async fn tx(&self, hash: &str) -> Result<Option<TxResult>, BackendError>;

    async fn query_smart(&self, contract: &str, msg: &Binary) -> Result<Binary, BackendError>;

    async fn contract_info(&self, contract: &str) -> Result<ContractInfo, BackendError>;

    /// Code id already stored for a wasm sha256 checksum
    async fn code_id_by_checksum(&self, checksum: &[u8]) -> Result<Option<u64>, BackendError>;
}
