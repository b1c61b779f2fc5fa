use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use cosmwasm_std::{coin, to_json_binary, Addr, Uint128};
use cw20::Cw20Coin;
use cw_utils::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use vectis_deployer::{
    artifacts::{self, HOST_CONTRACTS, REMOTE_CONTRACTS},
    config::{DaoSettings, FactorySettings, GovernanceConfig, NetworkConfig, RelayConfig},
    signer::Signer,
    ChainSession, ContractArtifacts, ContractDeployer, Credentials, CrossChainOrchestrator,
    DeployConfig, DeployResult, FeeMode, FileManifestStore, PollPolicy,
};
use vectis_wallet::{
    Admin, DaoInstantiateMsg, DaoQueryMsg, GovecExecuteMsg, GovecInstantiateMsg,
    ModuleInstantiateInfo, PropInstantiateMsg, ProposalModule, StakeReceiveMsg, StakingInfo,
    Threshold, TokenInfo, VoteInstantiateMsg, VotingQueryMsg,
};

use super::{
    chain::{CodeRegistry, MockChain, MockCode},
    contracts::{DaoCore, DaoTunnel, Factory, Govec, Noop, Pinger, Proposal, RemoteTunnel, Stake, Voting},
    relayer::MockRelayer,
};
use crate::constants::*;

pub const PINGER: &str = "pinger";

/// Bytecode the mock chains recognise for `name`
pub fn wasm(name: &str) -> Vec<u8> {
    [b"\0asm".as_slice(), name.as_bytes()].concat()
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn network(chain_id: &str, prefix: &str, denom: &str) -> NetworkConfig {
    NetworkConfig {
        chain_id: chain_id.to_string(),
        rpc_endpoint: format!("mock://{chain_id}"),
        addr_prefix: prefix.to_string(),
        fee_denom: denom.to_string(),
        gas_price: 0.025,
        gas_adjustment: 1.3,
        inclusion: PollPolicy::fixed(1, 10),
    }
}

/// A dao bootstrapped by hand, without tunnels
#[derive(Debug, Clone)]
pub struct DaoFixture {
    pub govec: String,
    pub dao: String,
    pub proposal: String,
    pub voting: String,
    pub staking: String,
}

/// Two chains, a relayer between them and a deploy config pointing at them
pub struct DeploySuite {
    pub host: MockChain,
    pub remote: MockChain,
    pub relayer: Arc<MockRelayer>,
    pub artifacts: ContractArtifacts,
    pub config: DeployConfig,
    pub creds: Credentials,
    pub dir: TempDir,
}

impl DeploySuite {
    pub fn init() -> Self {
        init_tracing();

        let mut registry = CodeRegistry::default();
        let mut artifacts = ContractArtifacts::new();
        let codes: [(&str, Arc<dyn MockCode>); 12] = [
            (artifacts::GOVEC, Arc::new(Govec)),
            (artifacts::DAO_CORE, Arc::new(DaoCore)),
            (artifacts::VOTING, Arc::new(Voting)),
            (artifacts::STAKING, Arc::new(Stake)),
            (artifacts::PROPOSAL, Arc::new(Proposal)),
            (artifacts::FACTORY, Arc::new(Factory)),
            (artifacts::PROXY, Arc::new(Noop)),
            (artifacts::MULTISIG, Arc::new(Noop)),
            (artifacts::DAO_TUNNEL, Arc::new(DaoTunnel)),
            (artifacts::REMOTE_TUNNEL, Arc::new(RemoteTunnel)),
            (artifacts::REMOTE_FACTORY, Arc::new(Factory)),
            (PINGER, Arc::new(Pinger)),
        ];
        for (name, code) in codes {
            registry.register(&wasm(name), code);
            artifacts.insert(name, wasm(name));
        }
        let registry = Arc::new(registry);

        let host = MockChain::new(HOST_CHAIN_ID, HOST_PREFIX, HOST_DENOM, registry.clone());
        let remote = MockChain::new(REMOTE_CHAIN_ID, REMOTE_PREFIX, REMOTE_DENOM, registry);
        let relayer = Arc::new(MockRelayer::new(host.clone(), remote.clone()));

        let dir = tempfile::tempdir().expect("temp dir");
        let config = DeployConfig {
            host: network(HOST_CHAIN_ID, HOST_PREFIX, HOST_DENOM),
            remote: network(REMOTE_CHAIN_ID, REMOTE_PREFIX, REMOTE_DENOM),
            relay: RelayConfig {
                connection_store: dir.path().join("connections.json"),
                drain: PollPolicy::fixed(1, 10),
            },
            governance: GovernanceConfig {
                poll: PollPolicy::fixed(1, 50),
            },
            dao: DaoSettings {
                name: "VectisDAO".to_string(),
                description: "Vectis smart contract wallets".to_string(),
                govec_name: "Govec".to_string(),
                govec_symbol: "GOV".to_string(),
                genesis_amount: GENESIS_AMOUNT,
                mint_amount: MINT_AMOUNT,
                threshold: THRESHOLD,
                max_voting_period_blocks: VOTING_PERIOD_BLOCKS,
                unstaking_blocks: UNSTAKING_BLOCKS,
            },
            factory: FactorySettings {
                wallet_fee: coin(WALLET_FEE, HOST_DENOM),
                claim_fee: coin(CLAIM_FEE, HOST_DENOM),
            },
            remote_factory: FactorySettings {
                wallet_fee: coin(WALLET_FEE, REMOTE_DENOM),
                claim_fee: coin(CLAIM_FEE, REMOTE_DENOM),
            },
        };

        DeploySuite {
            host,
            remote,
            relayer,
            artifacts,
            config,
            creds: Credentials::new(DEPLOYER_KEY),
            dir,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.path().join("manifest.json")
    }

    pub fn manifest_store(&self) -> FileManifestStore {
        FileManifestStore::new(self.manifest_path())
    }

    pub fn connection_store_path(&self) -> PathBuf {
        self.config.relay.connection_store.clone()
    }

    pub async fn host_session(&self) -> DeployResult<ChainSession> {
        ChainSession::connect(self.config.host.clone(), &self.creds, Arc::new(self.host.clone())).await
    }

    pub async fn remote_session(&self) -> DeployResult<ChainSession> {
        ChainSession::connect(self.config.remote.clone(), &self.creds, Arc::new(self.remote.clone()))
            .await
    }

    pub async fn orchestrator(&self) -> DeployResult<CrossChainOrchestrator> {
        CrossChainOrchestrator::connect(
            self.config.clone(),
            &self.creds,
            Arc::new(self.host.clone()),
            Arc::new(self.remote.clone()),
            self.relayer.clone(),
            self.artifacts.clone(),
        )
        .await
    }

    /// Address of a second account on `prefix`
    pub fn other_address(prefix: &str) -> String {
        Signer::from_credentials(&Credentials::new(OTHER_KEY), prefix)
            .expect("valid key")
            .address()
            .to_string()
    }

    /// govec, dao core, voting, staking and one proposal module on the host,
    /// with `stake` of the deployer's genesis balance staked
    pub async fn dao_fixture(&self, session: &ChainSession, stake: Uint128) -> Result<DaoFixture> {
        let deployer = ContractDeployer::new(FeeMode::Auto);
        let mut code_ids = std::collections::BTreeMap::new();
        for name in HOST_CONTRACTS {
            let code_id = deployer.upload(session, name, self.artifacts.get(name)?).await?;
            code_ids.insert(name, code_id);
        }
        let code_id = |name: &str| code_ids.get(name).copied().ok_or_else(|| anyhow!("no code for {name}"));
        let owner = session.signer_address().to_string();

        let govec = deployer
            .instantiate(
                session,
                code_id(artifacts::GOVEC)?,
                &GovecInstantiateMsg {
                    name: "Govec".to_string(),
                    symbol: "GOV".to_string(),
                    initial_balances: vec![Cw20Coin {
                        address: owner.clone(),
                        amount: GENESIS_AMOUNT,
                    }],
                    mint_cap: None,
                    mint_amount: MINT_AMOUNT,
                },
                "Govec",
                Some(owner.clone()),
                vec![],
            )
            .await?
            .address;

        let vote_msg = VoteInstantiateMsg {
            token_info: TokenInfo::Existing {
                address: govec.clone(),
                staking_contract: StakingInfo::New {
                    staking_code_id: code_id(artifacts::STAKING)?,
                    unstaking_duration: Some(Duration::Height(UNSTAKING_BLOCKS)),
                },
            },
        };
        let prop_msg = PropInstantiateMsg {
            threshold: Threshold::AbsoluteCount {
                threshold: THRESHOLD,
            },
            max_voting_period: Duration::Height(VOTING_PERIOD_BLOCKS),
            min_voting_period: None,
            only_members_execute: true,
            allow_revoting: false,
            close_proposal_on_execution_failure: true,
        };
        let dao = deployer
            .instantiate(
                session,
                code_id(artifacts::DAO_CORE)?,
                &DaoInstantiateMsg {
                    admin: Some(owner.clone()),
                    name: "VectisDAO".to_string(),
                    description: "fixture".to_string(),
                    image_url: None,
                    automatically_add_cw20s: true,
                    automatically_add_cw721s: true,
                    voting_module_instantiate_info: ModuleInstantiateInfo {
                        code_id: code_id(artifacts::VOTING)?,
                        msg: to_json_binary(&vote_msg)?,
                        admin: Some(Admin::CoreModule {}),
                        label: "voting".to_string(),
                    },
                    proposal_modules_instantiate_info: vec![ModuleInstantiateInfo {
                        code_id: code_id(artifacts::PROPOSAL)?,
                        msg: to_json_binary(&prop_msg)?,
                        admin: Some(Admin::CoreModule {}),
                        label: "proposal".to_string(),
                    }],
                    dao_uri: None,
                },
                "VectisDAO",
                Some(owner),
                vec![],
            )
            .await?
            .address;

        let modules: Vec<ProposalModule> = session
            .query(
                &dao,
                &DaoQueryMsg::ProposalModules {
                    start_after: None,
                    limit: None,
                },
            )
            .await?;
        let proposal = modules
            .first()
            .map(|m| m.address.to_string())
            .ok_or_else(|| anyhow!("dao has no proposal module"))?;
        let voting: Addr = session.query(&dao, &DaoQueryMsg::VotingModule {}).await?;
        let staking: Addr = session
            .query(voting.as_str(), &VotingQueryMsg::StakingContract {})
            .await?;

        if !stake.is_zero() {
            session
                .execute(
                    &govec,
                    &GovecExecuteMsg::Send {
                        contract: staking.to_string(),
                        amount: stake,
                        msg: to_json_binary(&StakeReceiveMsg::Stake {})?,
                        relayed_from: None,
                    },
                    vec![],
                    &FeeMode::Auto,
                )
                .await?;
        }

        Ok(DaoFixture {
            govec,
            dao,
            proposal,
            voting: voting.to_string(),
            staking: staking.to_string(),
        })
    }

    /// Every host and remote artifact, for upload assertions
    pub fn contract_names() -> impl Iterator<Item = &'static str> {
        HOST_CONTRACTS.into_iter().chain(REMOTE_CONTRACTS)
    }
}
