use cosmwasm_std::{to_json_binary, Binary, Coin, CosmosMsg, WasmMsg};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tracing::info;

use crate::{
    backend::Msg,
    error::{DeployError, DeployResult},
    events::{extract_address, extract_attribute, CODE_ID_KEY, CONTRACT_ADDR_KEY, INSTANTIATE_EVENT, STORE_CODE_EVENT},
    session::{ChainSession, FeeMode},
};

/// A deployed contract. `address` is assigned by the chain and never changes,
/// `admin` tracks the wasm admin as it is reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub code_id: u64,
    pub address: String,
    pub admin: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContractDeployer {
    pub fee: FeeMode,
}

impl ContractDeployer {
    pub fn new(fee: FeeMode) -> Self {
        ContractDeployer { fee }
    }

    /// Stores `wasm` and returns its code id.
    /// Bytecode the chain already holds resolves to the existing id.
    pub async fn upload(&self, session: &ChainSession, name: &str, wasm: &[u8]) -> DeployResult<u64> {
        let checksum = Sha256::digest(wasm);
        if let Some(code_id) = session
            .backend()
            .code_id_by_checksum(&checksum)
            .await
            .map_err(|e| DeployError::Upload {
                contract: name.to_string(),
                reason: e.to_string(),
            })?
        {
            info!(chain_id = session.chain_id(), contract = name, code_id, "code already stored");
            return Ok(code_id);
        }

        let msg = Msg::StoreCode {
            wasm: Binary::from(wasm),
        };
        let res = session
            .submit_tx(vec![msg], &self.fee)
            .await
            .map_err(|e| upload_error(name, e))?;
        let code_id = extract_attribute(&res, STORE_CODE_EVENT, CODE_ID_KEY)?
            .parse::<u64>()
            .map_err(|e| DeployError::Upload {
                contract: name.to_string(),
                reason: format!("bad code id: {e}"),
            })?;
        info!(chain_id = session.chain_id(), contract = name, code_id, "stored code");
        Ok(code_id)
    }

    /// Instantiates `code_id`, the address is read from the `instantiate` event
    pub async fn instantiate<M: Serialize>(
        &self,
        session: &ChainSession,
        code_id: u64,
        msg: &M,
        label: &str,
        admin: Option<String>,
        funds: Vec<Coin>,
    ) -> DeployResult<ContractRecord> {
        let msg = CosmosMsg::Wasm(WasmMsg::Instantiate {
            admin: admin.clone(),
            code_id,
            msg: to_json_binary(msg)?,
            funds,
            label: label.to_string(),
        });
        let res = session
            .submit_tx(vec![msg.into()], &self.fee)
            .await
            .map_err(|e| instantiation_error(label, e))?;
        let address = extract_address(&res, INSTANTIATE_EVENT, CONTRACT_ADDR_KEY)?;
        info!(chain_id = session.chain_id(), label, code_id, %address, "instantiated");
        Ok(ContractRecord {
            code_id,
            address,
            admin,
        })
    }
}

// Network class failures stay as they are so callers can still retry them
fn upload_error(name: &str, e: DeployError) -> DeployError {
    match e {
        DeployError::Execution { log, .. } => DeployError::Upload {
            contract: name.to_string(),
            reason: log,
        },
        other => other,
    }
}

fn instantiation_error(label: &str, e: DeployError) -> DeployError {
    match e {
        DeployError::Execution { log, .. } => DeployError::Instantiation {
            label: label.to_string(),
            reason: log,
        },
        other => other,
    }
}
