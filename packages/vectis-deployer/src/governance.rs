use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use cosmwasm_std::{Addr, CosmosMsg};
use cw3::{Status, Vote};
use tracing::{debug, info};
use vectis_wallet::{DaoExecuteMsg, DaoQueryMsg, ProposalExecuteMsg, ProposalListResponse, ProposalQueryMsg, ProposalResponse};

use crate::{
    backend::TxResult,
    error::{DeployError, DeployResult},
    events,
    poll::{poll_until, PollPolicy},
    session::{ChainSession, FeeMode},
};

const PROPOSAL_ID_KEY: &str = "proposal_id";

/// Exclusive right to create proposals on one proposal module.
///
/// Proposal ids are discovered after submission, which is only sound while a
/// single writer proposes. At most one writer exists per module per dispatcher,
/// it is released on drop.
pub struct ProposalWriter {
    module: String,
    last_id: Option<u64>,
    registry: Arc<Mutex<HashSet<String>>>,
}

impl ProposalWriter {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn last_id(&self) -> Option<u64> {
        self.last_id
    }

    /// Takes over a proposal this signer created earlier
    fn adopt(&mut self, id: u64) {
        self.last_id = Some(self.last_id.map_or(id, |last| last.max(id)));
    }
}

impl Drop for ProposalWriter {
    fn drop(&mut self) {
        if let Ok(mut writers) = self.registry.lock() {
            writers.remove(&self.module);
        }
    }
}

impl std::fmt::Debug for ProposalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProposalWriter")
            .field("module", &self.module)
            .field("last_id", &self.last_id)
            .finish()
    }
}

/// Drives propose, vote and execute against a dao proposal module,
/// and the admin fast-path against the dao core while it still has an admin.
#[derive(Debug, Clone)]
pub struct GovernanceDispatcher {
    fee: FeeMode,
    poll: PollPolicy,
    writers: Arc<Mutex<HashSet<String>>>,
}

impl GovernanceDispatcher {
    pub fn new(fee: FeeMode, poll: PollPolicy) -> Self {
        GovernanceDispatcher {
            fee,
            poll,
            writers: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn writer(&self, module: &str) -> DeployResult<ProposalWriter> {
        let mut writers = self
            .writers
            .lock()
            .map_err(|_| DeployError::WriterTaken(module.to_string()))?;
        if !writers.insert(module.to_string()) {
            return Err(DeployError::WriterTaken(module.to_string()));
        }
        Ok(ProposalWriter {
            module: module.to_string(),
            last_id: None,
            registry: self.writers.clone(),
        })
    }

    /// Submits a proposal and returns its id.
    /// The id comes from the module's `proposal_id` event attribute when it
    /// emits one, otherwise from the newest entry of the proposal list.
    pub async fn propose(
        &self,
        session: &ChainSession,
        writer: &mut ProposalWriter,
        title: &str,
        description: &str,
        msgs: Vec<CosmosMsg>,
    ) -> DeployResult<u64> {
        let module = writer.module.clone();
        let res = session
            .execute(
                &module,
                &ProposalExecuteMsg::Propose {
                    title: title.to_string(),
                    description: description.to_string(),
                    msgs,
                },
                vec![],
                &self.fee,
            )
            .await?;

        let id = match events::wasm_attribute(&res, &module, PROPOSAL_ID_KEY) {
            Some(id) => id.parse::<u64>().map_err(|e| DeployError::Query {
                contract: module.clone(),
                reason: format!("bad proposal id {id}: {e}"),
            })?,
            None => self.latest_proposal(session, &module).await?.id,
        };

        if writer.last_id.is_some_and(|last| id <= last) {
            return Err(DeployError::Query {
                contract: module,
                reason: format!("proposal id {id} did not increase"),
            });
        }
        writer.last_id = Some(id);
        info!(proposal_module = %module, proposal_id = id, title, "proposed");
        Ok(id)
    }

    /// A proposal of this signer carrying exactly `msgs` that is still open or
    /// passed but not executed, left behind by an interrupted attempt
    pub async fn unfinished_proposal(
        &self,
        session: &ChainSession,
        module: &str,
        msgs: &[CosmosMsg],
    ) -> DeployResult<Option<ProposalResponse>> {
        let list: ProposalListResponse = session
            .query(
                module,
                &ProposalQueryMsg::ReverseProposals {
                    start_before: None,
                    limit: None,
                },
            )
            .await?;
        Ok(list.proposals.into_iter().find(|prop| {
            matches!(prop.status, Status::Open | Status::Passed)
                && prop.proposer.as_str() == session.signer_address()
                && prop.msgs == msgs
        }))
    }

    async fn latest_proposal(
        &self,
        session: &ChainSession,
        module: &str,
    ) -> DeployResult<ProposalResponse> {
        let list: ProposalListResponse = session
            .query(
                module,
                &ProposalQueryMsg::ReverseProposals {
                    start_before: None,
                    limit: Some(1),
                },
            )
            .await?;
        list.proposals
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::NotFound {
                what: format!("proposals on {module}"),
            })
    }

    pub async fn proposal(
        &self,
        session: &ChainSession,
        module: &str,
        proposal_id: u64,
    ) -> DeployResult<ProposalResponse> {
        session
            .query(module, &ProposalQueryMsg::Proposal { proposal_id })
            .await
    }

    pub async fn vote(
        &self,
        session: &ChainSession,
        module: &str,
        proposal_id: u64,
        vote: Vote,
    ) -> DeployResult<TxResult> {
        let prop = self.proposal(session, module, proposal_id).await?;
        if prop.status != Status::Open {
            return Err(DeployError::ProposalClosed {
                proposal_id,
                status: format!("{:?}", prop.status),
            });
        }
        let res = session
            .execute(
                module,
                &ProposalExecuteMsg::Vote { proposal_id, vote },
                vec![],
                &self.fee,
            )
            .await
            .map_err(|e| match e {
                DeployError::Execution { log, .. } if log.contains("Already voted") => {
                    DeployError::AlreadyVoted(proposal_id)
                }
                other => other,
            })?;
        debug!(proposal_module = module, proposal_id, ?vote, "voted");
        Ok(res)
    }

    /// Waits until the proposal passes. A rejection is final.
    pub async fn await_passed(
        &self,
        session: &ChainSession,
        module: &str,
        proposal_id: u64,
    ) -> DeployResult<ProposalResponse> {
        let what = format!("proposal {proposal_id} on {module} to pass");
        poll_until(&self.poll, &what, |_| async move {
            let prop = self.proposal(session, module, proposal_id).await?;
            match prop.status {
                Status::Passed | Status::Executed => Ok(Some(prop)),
                Status::Rejected => Err(DeployError::ProposalClosed {
                    proposal_id,
                    status: format!("{:?}", prop.status),
                }),
                _ => Ok(None),
            }
        })
        .await
    }

    /// Executes a passed proposal. Events of the messages it dispatched are in the result.
    pub async fn execute(
        &self,
        session: &ChainSession,
        module: &str,
        proposal_id: u64,
    ) -> DeployResult<TxResult> {
        let prop = self.proposal(session, module, proposal_id).await?;
        match prop.status {
            Status::Passed => {}
            Status::Open => {
                return Err(DeployError::ThresholdNotMet {
                    proposal_id,
                    status: format!("{:?}", prop.status),
                })
            }
            other => {
                return Err(DeployError::ProposalClosed {
                    proposal_id,
                    status: format!("{other:?}"),
                })
            }
        }
        let res = session
            .execute(
                module,
                &ProposalExecuteMsg::Execute { proposal_id },
                vec![],
                &self.fee,
            )
            .await?;
        info!(proposal_module = module, proposal_id, hash = %res.hash, "executed proposal");
        Ok(res)
    }

    /// Address created by a message nested in `tx`, matched exactly
    pub fn extract_address(&self, tx: &TxResult, event_type: &str, key: &str) -> DeployResult<String> {
        events::extract_address(tx, event_type, key)
    }

    pub async fn admin(&self, session: &ChainSession, dao: &str) -> DeployResult<Option<Addr>> {
        session.query(dao, &DaoQueryMsg::Admin {}).await
    }

    /// Fails unless the session signer is still the dao admin
    async fn ensure_admin(&self, session: &ChainSession, dao: &str) -> DeployResult<()> {
        match self.admin(session, dao).await? {
            Some(admin) if admin.as_str() == session.signer_address() => Ok(()),
            Some(admin) => Err(DeployError::AdminAlreadyTransferred {
                contract: dao.to_string(),
                current: admin.to_string(),
            }),
            None => Err(DeployError::AdminRenounced {
                contract: dao.to_string(),
            }),
        }
    }

    pub async fn execute_as_admin(
        &self,
        session: &ChainSession,
        authorizer: &AdminAuthorizer,
        msgs: Vec<CosmosMsg>,
    ) -> DeployResult<TxResult> {
        self.ensure_admin(session, &authorizer.dao).await?;
        session
            .execute(
                &authorizer.dao,
                &DaoExecuteMsg::ExecuteAdminMsgs { msgs },
                vec![],
                &self.fee,
            )
            .await
    }
}

/// Authorizes messages to be executed by the dao
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &mut self,
        session: &ChainSession,
        dispatcher: &GovernanceDispatcher,
        title: &str,
        msgs: Vec<CosmosMsg>,
    ) -> DeployResult<TxResult>;
}

/// The bootstrap admin of the dao core.
///
/// Renouncing consumes it, so the fast-path is unreachable afterwards.
#[derive(Debug)]
pub struct AdminAuthorizer {
    dao: String,
}

impl AdminAuthorizer {
    /// Checks that the session signer currently holds the dao admin role
    pub async fn acquire(
        session: &ChainSession,
        dispatcher: &GovernanceDispatcher,
        dao: &str,
    ) -> DeployResult<Self> {
        dispatcher.ensure_admin(session, dao).await?;
        Ok(AdminAuthorizer {
            dao: dao.to_string(),
        })
    }

    pub fn dao(&self) -> &str {
        &self.dao
    }

    pub async fn renounce(
        self,
        session: &ChainSession,
        dispatcher: &GovernanceDispatcher,
    ) -> DeployResult<TxResult> {
        dispatcher.ensure_admin(session, &self.dao).await?;
        let res = session
            .execute(
                &self.dao,
                &DaoExecuteMsg::NominateAdmin { admin: None },
                vec![],
                &dispatcher.fee,
            )
            .await?;
        info!(dao = %self.dao, "renounced dao admin");
        Ok(res)
    }
}

#[async_trait]
impl Authorizer for AdminAuthorizer {
    async fn authorize(
        &mut self,
        session: &ChainSession,
        dispatcher: &GovernanceDispatcher,
        title: &str,
        msgs: Vec<CosmosMsg>,
    ) -> DeployResult<TxResult> {
        debug!(dao = %self.dao, title, "executing as admin");
        dispatcher.execute_as_admin(session, self, msgs).await
    }
}

/// Full proposal cycle: propose, vote, wait for the threshold, execute
#[derive(Debug)]
pub struct GovernanceAuthorizer {
    writer: ProposalWriter,
    vote: Vote,
}

impl GovernanceAuthorizer {
    pub fn new(writer: ProposalWriter) -> Self {
        GovernanceAuthorizer {
            writer,
            vote: Vote::Yes,
        }
    }

    pub fn into_writer(self) -> ProposalWriter {
        self.writer
    }
}

#[async_trait]
impl Authorizer for GovernanceAuthorizer {
    async fn authorize(
        &mut self,
        session: &ChainSession,
        dispatcher: &GovernanceDispatcher,
        title: &str,
        msgs: Vec<CosmosMsg>,
    ) -> DeployResult<TxResult> {
        let module = self.writer.module().to_string();
        let unfinished = dispatcher.unfinished_proposal(session, &module, &msgs).await?;
        let (id, status) = match unfinished {
            Some(prop) => {
                info!(proposal_module = %module, proposal_id = prop.id, status = ?prop.status, title, "resuming proposal");
                self.writer.adopt(prop.id);
                (prop.id, prop.status)
            }
            None => {
                let id = dispatcher
                    .propose(session, &mut self.writer, title, "", msgs)
                    .await?;
                (id, Status::Open)
            }
        };
        if status == Status::Open {
            match dispatcher.vote(session, &module, id, self.vote).await {
                Ok(_) | Err(DeployError::AlreadyVoted(_)) => {}
                Err(e) => return Err(e),
            }
        }
        dispatcher.await_passed(session, &module, id).await?;
        dispatcher.execute(session, &module, id).await
    }
}
