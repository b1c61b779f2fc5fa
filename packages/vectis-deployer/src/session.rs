use std::sync::Arc;

use cosmwasm_std::{coin, from_json, to_json_binary, Coin, CosmosMsg, WasmMsg};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    backend::{BackendError, ChainBackend, ContractInfo, Fee, Msg, SignDoc, SignedTx, TxResult},
    config::NetworkConfig,
    error::{DeployError, DeployResult},
    poll::poll_until,
    signer::{Credentials, Signer},
};

/// How the fee of a transaction is set
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FeeMode {
    /// Simulate and apply the network gas adjustment
    #[default]
    Auto,
    Fixed { gas_limit: u64, amount: Vec<Coin> },
}

/// Authenticated handle to one chain: one signer, one endpoint.
///
/// Transactions are serialized per session, every tx consumes the account
/// sequence so a second one is only signed after the first is included.
pub struct ChainSession {
    config: NetworkConfig,
    signer: Signer,
    backend: Arc<dyn ChainBackend>,
    tx_lock: Mutex<()>,
}

impl ChainSession {
    pub async fn connect(
        config: NetworkConfig,
        creds: &Credentials,
        backend: Arc<dyn ChainBackend>,
    ) -> DeployResult<Self> {
        let status = backend.status().await.map_err(|e| DeployError::Connection {
            chain_id: config.chain_id.clone(),
            reason: format!("{}: {e}", config.rpc_endpoint),
        })?;
        if status.chain_id != config.chain_id {
            return Err(DeployError::Connection {
                chain_id: config.chain_id.clone(),
                reason: format!(
                    "{} serves chain {}",
                    config.rpc_endpoint, status.chain_id
                ),
            });
        }
        let signer = Signer::from_credentials(creds, &config.addr_prefix).map_err(|e| {
            DeployError::Connection {
                chain_id: config.chain_id.clone(),
                reason: e.to_string(),
            }
        })?;
        info!(
            chain_id = %config.chain_id,
            height = status.height,
            signer = signer.address(),
            "session connected"
        );
        Ok(ChainSession {
            config,
            signer,
            backend,
            tx_lock: Mutex::new(()),
        })
    }

    pub fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    pub fn rpc_endpoint(&self) -> &str {
        &self.config.rpc_endpoint
    }

    pub fn signer_address(&self) -> &str {
        self.signer.address()
    }

    pub fn fee_denom(&self) -> &str {
        &self.config.fee_denom
    }

    pub fn addr_prefix(&self) -> &str {
        &self.config.addr_prefix
    }

    pub fn backend(&self) -> &Arc<dyn ChainBackend> {
        &self.backend
    }

    /// Signs, broadcasts and waits for inclusion.
    /// A non zero result code is returned as [`DeployError::Execution`] with the chain log.
    pub async fn submit_tx(&self, msgs: Vec<Msg>, fee: &FeeMode) -> DeployResult<TxResult> {
        let _in_flight = self.tx_lock.lock().await;

        let account = self
            .backend
            .account(self.signer.address())
            .await
            .map_err(|e| self.broadcast_error(e))?;
        let fee = self.fee(&msgs, fee).await?;
        let body = SignDoc {
            chain_id: self.config.chain_id.clone(),
            signer: self.signer.address().to_string(),
            sequence: account.sequence,
            msgs,
            fee,
            memo: String::new(),
        };
        let signature = self.signer.sign(&body.to_sign_bytes()?)?;
        let tx = SignedTx {
            body,
            pub_key: self.signer.public_key(),
            signature,
        };

        let hash = self.backend.broadcast(tx).await.map_err(|e| match e {
            BackendError::Rejected { code, log } => DeployError::Execution {
                hash: String::new(),
                code,
                log,
            },
            other => self.broadcast_error(other),
        })?;
        debug!(chain_id = %self.config.chain_id, %hash, sequence = account.sequence, "broadcast");

        let what = format!("inclusion of {hash} on {}", self.config.chain_id);
        let res = poll_until(&self.config.inclusion, &what, |_| {
            let backend = self.backend.clone();
            let hash = hash.clone();
            let chain_id = self.config.chain_id.clone();
            async move {
                match backend.tx(&hash).await {
                    Ok(res) => Ok(res),
                    Err(BackendError::Unreachable(reason)) => {
                        warn!(%hash, %reason, "endpoint unreachable while waiting for inclusion");
                        Ok(None)
                    }
                    Err(e) => Err(DeployError::Broadcast {
                        chain_id,
                        reason: e.to_string(),
                    }),
                }
            }
        })
        .await?;

        if !res.is_ok() {
            return Err(DeployError::Execution {
                hash: res.hash,
                code: res.code,
                log: res.log,
            });
        }
        debug!(chain_id = %self.config.chain_id, %hash, height = res.height, gas_used = res.gas_used, "included");
        Ok(res)
    }

    pub async fn execute<M: Serialize>(
        &self,
        contract: &str,
        msg: &M,
        funds: Vec<Coin>,
        fee: &FeeMode,
    ) -> DeployResult<TxResult> {
        let msg = CosmosMsg::Wasm(WasmMsg::Execute {
            contract_addr: contract.to_string(),
            msg: to_json_binary(msg)?,
            funds,
        });
        self.submit_tx(vec![msg.into()], fee).await
    }

    /// Read-only smart query, decoded into `T`
    pub async fn query<M: Serialize, T: DeserializeOwned>(
        &self,
        contract: &str,
        msg: &M,
    ) -> DeployResult<T> {
        let res = self
            .backend
            .query_smart(contract, &to_json_binary(msg)?)
            .await
            .map_err(|e| DeployError::Query {
                contract: contract.to_string(),
                reason: e.to_string(),
            })?;
        Ok(from_json(&res)?)
    }

    pub async fn contract_info(&self, contract: &str) -> DeployResult<ContractInfo> {
        self.backend
            .contract_info(contract)
            .await
            .map_err(|e| DeployError::Query {
                contract: contract.to_string(),
                reason: e.to_string(),
            })
    }

    pub async fn height(&self) -> DeployResult<u64> {
        self.backend
            .status()
            .await
            .map(|s| s.height)
            .map_err(|e| self.broadcast_error(e))
    }

    async fn fee(&self, msgs: &[Msg], mode: &FeeMode) -> DeployResult<Fee> {
        let adjustment = match mode {
            FeeMode::Fixed { gas_limit, amount } => {
                return Ok(Fee {
                    amount: amount.clone(),
                    gas_limit: *gas_limit,
                })
            }
            FeeMode::Auto => self.config.gas_adjustment,
        };
        let gas_used = self
            .backend
            .simulate(self.signer.address(), msgs)
            .await
            .map_err(|e| match e {
                BackendError::Rejected { code, log } => DeployError::Execution {
                    hash: String::new(),
                    code,
                    log,
                },
                other => self.broadcast_error(other),
            })?;
        let gas_limit = (gas_used as f64 * adjustment).ceil() as u64;
        let amount = (gas_limit as f64 * self.config.gas_price).ceil() as u128;
        Ok(Fee {
            amount: vec![coin(amount, &self.config.fee_denom)],
            gas_limit,
        })
    }

    fn broadcast_error(&self, e: BackendError) -> DeployError {
        DeployError::Broadcast {
            chain_id: self.config.chain_id.clone(),
            reason: e.to_string(),
        }
    }
}

impl std::fmt::Debug for ChainSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSession")
            .field("chain_id", &self.config.chain_id)
            .field("rpc_endpoint", &self.config.rpc_endpoint)
            .field("signer", &self.signer.address())
            .finish()
    }
}
