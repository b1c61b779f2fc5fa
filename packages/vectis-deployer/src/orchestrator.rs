use std::{collections::BTreeSet, fmt::Debug, sync::Arc};

use cosmwasm_std::{to_json_binary, Addr, CosmosMsg, Uint128, WasmMsg};
use cw20::{BalanceResponse, Cw20Coin};
use cw_utils::{Duration, Expiration};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use vectis_wallet::{
    wasm_port_id, Admin, ChainConfig, ClaimsResponse, DaoConfig, DaoExecuteMsg, DaoInstantiateMsg,
    DaoQueryMsg, DaoTunnelExecuteMsg, DaoTunnelInstantiateMsg, DaoTunnelQueryMsg,
    GetItemResponse, GovecConfigResponse, GovecExecuteMsg, GovecInstantiateMsg, GovecQueryMsg,
    ModuleInstantiateInfo, PropInstantiateMsg, ProposalModule, RemoteTunnelInstantiateMsg,
    RemoteTunnelQueryMsg, RemoteTunnels, StakeExecuteMsg, StakeQueryMsg, StakeReceiveMsg,
    StakedValueResponse, StakingInfo, Threshold, TokenInfo, UpdateAddrReq, VectisDaoActors,
    VoteInstantiateMsg, VotingQueryMsg, WalletFactoryExecuteMsg, WalletFactoryInstantiateMsg,
    WalletFactoryQueryMsg, APP_ORDER, IBC_APP_VERSION, ICS20_ORDER, ICS20_PORT, ICS20_VERSION,
};

use crate::{
    artifacts::{self, ContractArtifacts, HOST_CONTRACTS, REMOTE_CONTRACTS},
    backend::{ChainBackend, TxResult},
    config::DeployConfig,
    deployer::{ContractDeployer, ContractRecord},
    error::{DeployError, DeployResult, OrchestrationError},
    events::{extract_address, CONTRACT_ADDR_KEY, INSTANTIATE_EVENT},
    governance::{AdminAuthorizer, Authorizer, GovernanceAuthorizer, GovernanceDispatcher},
    manifest::{DeploymentManifest, ManifestStore, Phase},
    poll::poll_until,
    relay::{ChannelSpec, ConnectionStore, RelayBackend, RelayLink},
    session::{ChainSession, FeeMode},
    signer::Credentials,
};

/// Capabilities that live for one run only
#[derive(Default)]
struct RunState {
    link: Option<RelayLink>,
    admin: Option<AdminAuthorizer>,
}

/// Deploys the Vectis DAO on the host chain, a remote tunnel and factory on the
/// remote chain, wires them over IBC and hands control to the dao.
///
/// Phases run strictly in order. After each one the manifest is saved with the
/// phase in its completion log, a later run skips what the log holds.
pub struct CrossChainOrchestrator {
    host: Arc<ChainSession>,
    remote: Arc<ChainSession>,
    relayer: Arc<dyn RelayBackend>,
    artifacts: ContractArtifacts,
    config: DeployConfig,
    deployer: ContractDeployer,
    dispatcher: GovernanceDispatcher,
}

impl CrossChainOrchestrator {
    pub fn new(
        host: Arc<ChainSession>,
        remote: Arc<ChainSession>,
        relayer: Arc<dyn RelayBackend>,
        artifacts: ContractArtifacts,
        config: DeployConfig,
    ) -> Self {
        let dispatcher = GovernanceDispatcher::new(FeeMode::Auto, config.governance.poll.clone());
        CrossChainOrchestrator {
            host,
            remote,
            relayer,
            artifacts,
            config,
            deployer: ContractDeployer::new(FeeMode::Auto),
            dispatcher,
        }
    }

    /// Opens both sessions with the same deploying key
    pub async fn connect(
        config: DeployConfig,
        creds: &Credentials,
        host_backend: Arc<dyn ChainBackend>,
        remote_backend: Arc<dyn ChainBackend>,
        relayer: Arc<dyn RelayBackend>,
        artifacts: ContractArtifacts,
    ) -> DeployResult<Self> {
        let host = ChainSession::connect(config.host.clone(), creds, host_backend).await?;
        let remote = ChainSession::connect(config.remote.clone(), creds, remote_backend).await?;
        Ok(Self::new(
            Arc::new(host),
            Arc::new(remote),
            relayer,
            artifacts,
            config,
        ))
    }

    pub fn host(&self) -> &ChainSession {
        &self.host
    }

    pub fn remote(&self) -> &ChainSession {
        &self.remote
    }

    pub fn dispatcher(&self) -> &GovernanceDispatcher {
        &self.dispatcher
    }

    pub async fn run(
        &self,
        store: &dyn ManifestStore,
    ) -> Result<DeploymentManifest, OrchestrationError> {
        let mut manifest = self
            .load(store)
            .await
            .map_err(|source| OrchestrationError {
                phase: Phase::Upload,
                source,
            })?;

        let mut run_state = RunState::default();
        for phase in Phase::ALL {
            if manifest.is_completed(phase) {
                debug!(%phase, "already completed");
                continue;
            }
            let span = info_span!("phase", %phase);
            let current = manifest.clone();
            let state = &mut run_state;
            let run = async move {
                let next = self.run_phase(phase, current, state).await?.complete(phase);
                store.save(&next).await?;
                Ok::<_, DeployError>(next)
            };
            manifest = run.instrument(span).await.map_err(|source| {
                let err = OrchestrationError { phase, source };
                warn!(
                    %phase,
                    error = %err.source,
                    transient = err.is_transient(),
                    rerun_is_safe = err.rerun_is_safe(),
                    "phase failed"
                );
                err
            })?;
            info!(%phase, "phase completed");
        }
        Ok(manifest)
    }

    async fn load(&self, store: &dyn ManifestStore) -> DeployResult<DeploymentManifest> {
        let deployer = self.host.signer_address();
        match store.load().await? {
            Some(manifest) => {
                manifest.check_identity(self.host.chain_id(), self.remote.chain_id(), deployer)?;
                info!(completed = manifest.completed.len(), "resuming from stored manifest");
                Ok(manifest)
            }
            None => Ok(DeploymentManifest::new(
                self.host.chain_id(),
                self.remote.chain_id(),
                deployer,
            )),
        }
    }

    async fn run_phase(
        &self,
        phase: Phase,
        manifest: DeploymentManifest,
        state: &mut RunState,
    ) -> DeployResult<DeploymentManifest> {
        match phase {
            Phase::Upload => self.upload(manifest).await,
            Phase::BootstrapToken => self.bootstrap_token(manifest).await,
            Phase::BootstrapDao => self.bootstrap_dao(manifest).await,
            Phase::Connection => self.connection(manifest, state).await,
            Phase::DeployTunnel => self.deploy_tunnel(manifest, state).await,
            Phase::RemoteTunnel => self.remote_tunnel(manifest).await,
            Phase::ApproveTunnel => self.approve_tunnel(manifest, state).await,
            Phase::Channels => self.channels(manifest, state).await,
            Phase::RemoteFactory => self.remote_factory(manifest, state).await,
            Phase::Finalize => self.finalize(manifest, state).await,
            Phase::Verify => {
                self.verify(&manifest).await?;
                Ok(manifest)
            }
        }
    }

    async fn upload(&self, mut manifest: DeploymentManifest) -> DeployResult<DeploymentManifest> {
        for name in HOST_CONTRACTS {
            let code_id = self
                .deployer
                .upload(&self.host, name, self.artifacts.get(name)?)
                .await?;
            manifest.host_code_ids.insert(name.to_string(), code_id);
        }
        for name in REMOTE_CONTRACTS {
            let code_id = self
                .deployer
                .upload(&self.remote, name, self.artifacts.get(name)?)
                .await?;
            manifest.remote_code_ids.insert(name.to_string(), code_id);
        }
        Ok(manifest)
    }

    async fn bootstrap_token(
        &self,
        mut manifest: DeploymentManifest,
    ) -> DeployResult<DeploymentManifest> {
        let dao = &self.config.dao;
        let msg = GovecInstantiateMsg {
            name: dao.govec_name.clone(),
            symbol: dao.govec_symbol.clone(),
            initial_balances: vec![Cw20Coin {
                address: manifest.deployer.clone(),
                amount: dao.genesis_amount,
            }],
            mint_cap: None,
            mint_amount: dao.mint_amount,
        };
        let govec = self
            .deployer
            .instantiate(
                &self.host,
                manifest.host_code_id(artifacts::GOVEC)?,
                &msg,
                "Vectis Govec",
                Some(manifest.deployer.clone()),
                vec![],
            )
            .await?;
        manifest.govec = Some(govec);
        Ok(manifest)
    }

    /// The dao instantiates its voting, staking and proposal modules itself,
    /// their addresses are read back from the dao afterwards.
    async fn bootstrap_dao(
        &self,
        mut manifest: DeploymentManifest,
    ) -> DeployResult<DeploymentManifest> {
        let settings = &self.config.dao;
        let govec = manifest.govec()?.address.clone();
        let staking_code_id = manifest.host_code_id(artifacts::STAKING)?;
        let voting_code_id = manifest.host_code_id(artifacts::VOTING)?;
        let proposal_code_id = manifest.host_code_id(artifacts::PROPOSAL)?;

        let vote_msg = VoteInstantiateMsg {
            token_info: TokenInfo::Existing {
                address: govec.clone(),
                staking_contract: StakingInfo::New {
                    staking_code_id,
                    unstaking_duration: Some(Duration::Height(settings.unstaking_blocks)),
                },
            },
        };
        let prop_msg = PropInstantiateMsg {
            threshold: Threshold::AbsoluteCount {
                threshold: settings.threshold,
            },
            max_voting_period: Duration::Height(settings.max_voting_period_blocks),
            min_voting_period: None,
            only_members_execute: true,
            allow_revoting: false,
            close_proposal_on_execution_failure: true,
        };
        let dao_msg = DaoInstantiateMsg {
            // executes the bootstrap messages directly until renounced
            admin: Some(manifest.deployer.clone()),
            name: settings.name.clone(),
            description: settings.description.clone(),
            image_url: None,
            automatically_add_cw20s: true,
            automatically_add_cw721s: true,
            voting_module_instantiate_info: ModuleInstantiateInfo {
                code_id: voting_code_id,
                msg: to_json_binary(&vote_msg)?,
                admin: Some(Admin::CoreModule {}),
                label: "Vectis voting".to_string(),
            },
            proposal_modules_instantiate_info: vec![ModuleInstantiateInfo {
                code_id: proposal_code_id,
                msg: to_json_binary(&prop_msg)?,
                admin: Some(Admin::CoreModule {}),
                label: "Vectis proposal".to_string(),
            }],
            dao_uri: None,
        };
        let dao = self
            .deployer
            .instantiate(
                &self.host,
                manifest.host_code_id(artifacts::DAO_CORE)?,
                &dao_msg,
                "Vectis DAO",
                Some(manifest.deployer.clone()),
                vec![],
            )
            .await?;

        let modules: Vec<ProposalModule> = self
            .host
            .query(
                &dao.address,
                &DaoQueryMsg::ProposalModules {
                    start_after: None,
                    limit: None,
                },
            )
            .await?;
        let proposal = modules
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::NotFound {
                what: format!("proposal module of {}", dao.address),
            })?;
        let voting: Addr = self
            .host
            .query(&dao.address, &DaoQueryMsg::VotingModule {})
            .await?;
        let staking: Addr = self
            .host
            .query(voting.as_str(), &VotingQueryMsg::StakingContract {})
            .await?;
        info!(dao = %dao.address, proposal = %proposal.address, %voting, %staking, "dao modules");

        // the deployer votes on the bootstrap proposals with its genesis balance
        let staked: StakedValueResponse = self
            .host
            .query(
                staking.as_str(),
                &StakeQueryMsg::StakedValue {
                    address: manifest.deployer.clone(),
                },
            )
            .await?;
        if staked.value.is_zero() {
            self.host
                .execute(
                    &govec,
                    &GovecExecuteMsg::Send {
                        contract: staking.to_string(),
                        amount: settings.genesis_amount,
                        msg: to_json_binary(&StakeReceiveMsg::Stake {})?,
                        relayed_from: None,
                    },
                    vec![],
                    &FeeMode::Auto,
                )
                .await?;
            debug!(amount = %settings.genesis_amount, "staked genesis govec");
        }

        let dao_admin = Some(dao.address.clone());
        manifest.proposal_module = Some(ContractRecord {
            code_id: proposal_code_id,
            address: proposal.address.to_string(),
            admin: dao_admin.clone(),
        });
        manifest.voting = Some(ContractRecord {
            code_id: voting_code_id,
            address: voting.to_string(),
            admin: dao_admin.clone(),
        });
        manifest.staking = Some(ContractRecord {
            code_id: staking_code_id,
            address: staking.to_string(),
            admin: dao_admin,
        });
        manifest.dao = Some(dao);
        Ok(manifest)
    }

    async fn connection(
        &self,
        mut manifest: DeploymentManifest,
        state: &mut RunState,
    ) -> DeployResult<DeploymentManifest> {
        let link = self.establish_link().await?;
        manifest.connection = Some(link.connection().clone());
        state.link = Some(link);
        Ok(manifest)
    }

    async fn establish_link(&self) -> DeployResult<RelayLink> {
        RelayLink::establish(
            self.relayer.clone(),
            &ConnectionStore::new(&self.config.relay.connection_store),
            self.host.chain_id(),
            self.remote.chain_id(),
        )
        .await
    }

    /// The link of this run, rebuilt from the manifest's connection when an
    /// earlier run established it
    async fn link<'a>(
        &self,
        state: &'a mut RunState,
        manifest: &DeploymentManifest,
    ) -> DeployResult<&'a RelayLink> {
        if state.link.is_none() {
            let link = RelayLink::recover(
                self.relayer.clone(),
                &ConnectionStore::new(&self.config.relay.connection_store),
                self.host.chain_id(),
                self.remote.chain_id(),
                manifest.connection()?.clone(),
            )
            .await?;
            state.link = Some(link);
        }
        state
            .link
            .as_ref()
            .ok_or(DeployError::MissingField("connection"))
    }

    async fn admin_exec(
        &self,
        state: &mut RunState,
        dao: &str,
        title: &str,
        msgs: Vec<CosmosMsg>,
    ) -> DeployResult<TxResult> {
        if state.admin.is_none() {
            state.admin = Some(AdminAuthorizer::acquire(&self.host, &self.dispatcher, dao).await?);
        }
        let admin = state.admin.as_mut().ok_or(DeployError::AdminRenounced {
            contract: dao.to_string(),
        })?;
        admin
            .authorize(&self.host, &self.dispatcher, title, msgs)
            .await
    }

    /// The dao instantiates the factory and the dao-tunnel, so it is their
    /// contract level admin and their wasm admin from the start.
    async fn deploy_tunnel(
        &self,
        mut manifest: DeploymentManifest,
        state: &mut RunState,
    ) -> DeployResult<DeploymentManifest> {
        let dao = manifest.dao()?.address.clone();
        let govec = manifest.govec()?.address.clone();

        let factory_code_id = manifest.host_code_id(artifacts::FACTORY)?;
        let factory_msg = WalletFactoryInstantiateMsg {
            proxy_code_id: manifest.host_code_id(artifacts::PROXY)?,
            proxy_multisig_code_id: manifest.host_code_id(artifacts::MULTISIG)?,
            addr_prefix: self.host.addr_prefix().to_string(),
            wallet_fee: self.config.factory.wallet_fee.clone(),
            claim_fee: self.config.factory.claim_fee.clone(),
            govec_minter: None,
        };
        let factory = self
            .admin_instantiate(state, &dao, factory_code_id, &factory_msg, "Vectis Factory")
            .await?;

        let tunnel_code_id = manifest.host_code_id(artifacts::DAO_TUNNEL)?;
        let tunnel_msg = DaoTunnelInstantiateMsg {
            govec_minter: govec,
            denom: self.host.fee_denom().to_string(),
        };
        let dao_tunnel = self
            .admin_instantiate(state, &dao, tunnel_code_id, &tunnel_msg, "Vectis DAO Tunnel")
            .await?;
        info!(
            factory = %factory.address,
            dao_tunnel = %dao_tunnel.address,
            port = %wasm_port_id(&dao_tunnel.address),
            "deployed host contracts"
        );

        manifest.factory = Some(factory);
        manifest.dao_tunnel = Some(dao_tunnel);
        Ok(manifest)
    }

    async fn admin_instantiate<M: Serialize>(
        &self,
        state: &mut RunState,
        dao: &str,
        code_id: u64,
        msg: &M,
        label: &str,
    ) -> DeployResult<ContractRecord> {
        let instantiate = CosmosMsg::Wasm(WasmMsg::Instantiate {
            admin: Some(dao.to_string()),
            code_id,
            msg: to_json_binary(msg)?,
            funds: vec![],
            label: label.to_string(),
        });
        let title = format!("Instantiate {label}");
        let res = self
            .admin_exec(state, dao, &title, vec![instantiate])
            .await
            .map_err(|e| match e {
                DeployError::Execution { log, .. } => DeployError::Instantiation {
                    label: label.to_string(),
                    reason: log,
                },
                other => other,
            })?;
        Ok(ContractRecord {
            code_id,
            address: extract_address(&res, INSTANTIATE_EVENT, CONTRACT_ADDR_KEY)?,
            admin: Some(dao.to_string()),
        })
    }

    async fn remote_tunnel(
        &self,
        mut manifest: DeploymentManifest,
    ) -> DeployResult<DeploymentManifest> {
        let msg = RemoteTunnelInstantiateMsg {
            dao_config: DaoConfig {
                addr: manifest.dao()?.address.clone(),
                dao_tunnel_port_id: wasm_port_id(&manifest.dao_tunnel()?.address),
                connection_id: manifest.connection()?.remote_connection_id.clone(),
                dao_tunnel_channel: None,
            },
            chain_config: ChainConfig {
                remote_factory: None,
                denom: self.remote.fee_denom().to_string(),
            },
        };
        let remote_tunnel = self
            .deployer
            .instantiate(
                &self.remote,
                manifest.remote_code_id(artifacts::REMOTE_TUNNEL)?,
                &msg,
                "Vectis Remote Tunnel",
                Some(self.remote.signer_address().to_string()),
                vec![],
            )
            .await?;
        manifest.remote_tunnel = Some(remote_tunnel);
        Ok(manifest)
    }

    /// The dao-tunnel only accepts channels and packets from approved
    /// (connection, port) pairs, this approves the remote tunnel.
    async fn approve_tunnel(
        &self,
        manifest: DeploymentManifest,
        state: &mut RunState,
    ) -> DeployResult<DeploymentManifest> {
        let dao = manifest.dao()?.address.clone();
        let dao_tunnel = manifest.dao_tunnel()?.address.clone();
        let controller = (
            manifest.connection()?.host_connection_id.clone(),
            wasm_port_id(&manifest.remote_tunnel()?.address),
        );

        if self.controllers(&dao_tunnel).await?.contains(&controller) {
            info!(connection = %controller.0, port = %controller.1, "remote tunnel already approved");
            return Ok(manifest);
        }
        let msg = wasm_execute(
            &dao_tunnel,
            &DaoTunnelExecuteMsg::AddApprovedController {
                connection_id: controller.0.clone(),
                port_id: controller.1.clone(),
            },
        )?;
        self.admin_exec(state, &dao, "Approve remote tunnel", vec![msg])
            .await?;
        info!(connection = %controller.0, port = %controller.1, "approved remote tunnel");
        Ok(manifest)
    }

    async fn controllers(&self, dao_tunnel: &str) -> DeployResult<Vec<(String, String)>> {
        let res: RemoteTunnels = self
            .host
            .query(
                dao_tunnel,
                &DaoTunnelQueryMsg::Controllers {
                    start_after: None,
                    limit: None,
                },
            )
            .await?;
        Ok(res.tunnels)
    }

    async fn channels(
        &self,
        mut manifest: DeploymentManifest,
        state: &mut RunState,
    ) -> DeployResult<DeploymentManifest> {
        let app = ChannelSpec {
            host_port: wasm_port_id(&manifest.dao_tunnel()?.address),
            remote_port: wasm_port_id(&manifest.remote_tunnel()?.address),
            version: IBC_APP_VERSION.to_string(),
            order: APP_ORDER,
        };
        let transfer = ChannelSpec {
            host_port: ICS20_PORT.to_string(),
            remote_port: ICS20_PORT.to_string(),
            version: ICS20_VERSION.to_string(),
            order: ICS20_ORDER,
        };
        let link = self.link(state, &manifest).await?;
        let app_channel = link.open_channel(&app).await?;
        let transfer_channel = link.open_channel(&transfer).await?;
        manifest.app_channel = Some(app_channel);
        manifest.transfer_channel = Some(transfer_channel);
        Ok(manifest)
    }

    /// Proposes `InstantiateRemoteFactory` on the dao-tunnel, relays the packet
    /// and reads the factory address back from the remote tunnel.
    async fn remote_factory(
        &self,
        mut manifest: DeploymentManifest,
        state: &mut RunState,
    ) -> DeployResult<DeploymentManifest> {
        let remote_tunnel = manifest.remote_tunnel()?.address.clone();
        let channel = manifest.app_channel()?.clone();
        let code_id = manifest.remote_code_id(artifacts::REMOTE_FACTORY)?;
        let link = self.link(state, &manifest).await?;

        // a packet from an earlier attempt may still be in flight
        link.drain(&channel, &self.config.relay.drain).await?;
        let factory = match self.remote_factory_addr(&remote_tunnel).await? {
            Some(factory) => {
                info!(%factory, "remote factory already instantiated");
                factory
            }
            None => {
                let msg = DaoTunnelExecuteMsg::InstantiateRemoteFactory {
                    code_id,
                    msg: WalletFactoryInstantiateMsg {
                        proxy_code_id: manifest.remote_code_id(artifacts::PROXY)?,
                        proxy_multisig_code_id: manifest.remote_code_id(artifacts::MULTISIG)?,
                        addr_prefix: self.remote.addr_prefix().to_string(),
                        wallet_fee: self.config.remote_factory.wallet_fee.clone(),
                        claim_fee: self.config.remote_factory.claim_fee.clone(),
                        govec_minter: None,
                    },
                    channel_id: channel.channel_id_host.clone(),
                };
                let writer = self.dispatcher.writer(&manifest.proposal_module()?.address)?;
                let mut authorizer = GovernanceAuthorizer::new(writer);
                authorizer
                    .authorize(
                        &self.host,
                        &self.dispatcher,
                        "Instantiate remote factory",
                        vec![wasm_execute(&manifest.dao_tunnel()?.address, &msg)?],
                    )
                    .await?;
                let report = link.drain(&channel, &self.config.relay.drain).await?;
                debug!(rounds = report.rounds, received = report.relayed.received, "relayed factory packet");
                self.remote_factory_addr(&remote_tunnel)
                    .await?
                    .ok_or_else(|| DeployError::NotFound {
                        what: format!("remote factory on {remote_tunnel}"),
                    })?
            }
        };

        manifest.remote_factory = Some(ContractRecord {
            code_id,
            address: factory.to_string(),
            admin: Some(remote_tunnel),
        });
        Ok(manifest)
    }

    async fn remote_factory_addr(&self, remote_tunnel: &str) -> DeployResult<Option<Addr>> {
        self.remote
            .query(remote_tunnel, &RemoteTunnelQueryMsg::Factory {})
            .await
    }

    /// Hands every contract to the dao and removes the deployer's influence.
    ///
    /// Every step checks the chain first and is skipped when already applied,
    /// a transfer that already happened is logged and passed over.
    async fn finalize(
        &self,
        mut manifest: DeploymentManifest,
        state: &mut RunState,
    ) -> DeployResult<DeploymentManifest> {
        let dao = manifest.dao()?.address.clone();
        let govec = manifest.govec()?.address.clone();
        let factory = manifest.factory()?.address.clone();
        let dao_tunnel = manifest.dao_tunnel()?.address.clone();
        let staking = manifest.staking()?.address.clone();

        self.wire_govec(state, &manifest).await?;
        self.set_dao_items(state, &manifest).await?;

        let factory_govec: Option<Addr> = self
            .host
            .query(&factory, &WalletFactoryQueryMsg::GovecAddr {})
            .await?;
        if factory_govec.as_ref().map(Addr::as_str) != Some(govec.as_str()) {
            let msg = wasm_execute(
                &factory,
                &WalletFactoryExecuteMsg::UpdateGovecAddr {
                    addr: govec.clone(),
                },
            )?;
            self.admin_exec(state, &dao, "Set factory govec", vec![msg])
                .await?;
        }

        for contract in [&govec, &dao, &factory, &dao_tunnel] {
            benign(self.transfer_admin(&self.host, contract, &dao).await)?;
        }
        let remote_tunnel = manifest.remote_tunnel()?.address.clone();
        benign(
            self.transfer_admin(&self.remote, &remote_tunnel, &remote_tunnel)
                .await,
        )?;
        for record in [
            &mut manifest.govec,
            &mut manifest.dao,
            &mut manifest.factory,
            &mut manifest.dao_tunnel,
        ]
        .into_iter()
        .flatten()
        {
            record.admin = Some(dao.clone());
        }
        if let Some(record) = manifest.remote_tunnel.as_mut() {
            record.admin = Some(remote_tunnel.clone());
        }

        // govec stops accepting the deployer as dao from here
        let config: GovecConfigResponse = self.host.query(&govec, &GovecQueryMsg::Config {}).await?;
        match config.dao {
            Some(current) if current.as_str() == dao => {}
            Some(current) => {
                return Err(DeployError::ManifestInconsistency {
                    field: "govec.dao".to_string(),
                    expected: dao,
                    found: current.to_string(),
                })
            }
            None => {
                self.host
                    .execute(
                        &govec,
                        &GovecExecuteMsg::UpdateConfigAddr {
                            new_addr: UpdateAddrReq::Dao(dao.clone()),
                        },
                        vec![],
                        &FeeMode::Auto,
                    )
                    .await?;
            }
        }

        self.exit_genesis_stake(&govec, &staking, &manifest.deployer)
            .await?;
        self.renounce(state, &dao).await?;
        Ok(manifest)
    }

    /// govec learns the staking, factory and dao-tunnel addresses.
    /// The deployer may set them while govec has no dao yet, later only the dao can.
    async fn wire_govec(
        &self,
        state: &mut RunState,
        manifest: &DeploymentManifest,
    ) -> DeployResult<()> {
        let govec = manifest.govec()?.address.clone();
        let dao = manifest.dao()?.address.clone();
        let config: GovecConfigResponse = self.host.query(&govec, &GovecQueryMsg::Config {}).await?;
        let wanted: [(Option<Addr>, String, fn(String) -> UpdateAddrReq); 3] = [
            (config.staking, manifest.staking()?.address.clone(), UpdateAddrReq::Staking),
            (config.factory, manifest.factory()?.address.clone(), UpdateAddrReq::Factory),
            (
                config.dao_tunnel,
                manifest.dao_tunnel()?.address.clone(),
                UpdateAddrReq::DaoTunnel,
            ),
        ];
        for (current, target, req) in wanted {
            if current.as_ref().map(Addr::as_str) == Some(target.as_str()) {
                continue;
            }
            let msg = GovecExecuteMsg::UpdateConfigAddr {
                new_addr: req(target.clone()),
            };
            if config.dao.is_none() {
                self.host
                    .execute(&govec, &msg, vec![], &FeeMode::Auto)
                    .await?;
            } else {
                self.admin_exec(state, &dao, "Update govec config", vec![wasm_execute(&govec, &msg)?])
                    .await?;
            }
            debug!(%target, "govec config updated");
        }
        Ok(())
    }

    async fn set_dao_items(
        &self,
        state: &mut RunState,
        manifest: &DeploymentManifest,
    ) -> DeployResult<()> {
        let dao = manifest.dao()?.address.clone();
        let mut msgs = vec![];
        for (actor, addr) in dao_items(manifest)? {
            let item: GetItemResponse = self
                .host
                .query(&dao, &DaoQueryMsg::GetItem { key: actor.to_string() })
                .await?;
            if item.item.as_deref() != Some(addr.as_str()) {
                msgs.push(wasm_execute(
                    &dao,
                    &DaoExecuteMsg::SetItem {
                        key: actor.to_string(),
                        value: addr,
                    },
                )?);
            }
        }
        if msgs.is_empty() {
            return Ok(());
        }
        debug!(items = msgs.len(), "setting dao items");
        self.admin_exec(state, &dao, "Set dao items", msgs).await?;
        Ok(())
    }

    /// Moves the wasm admin of `contract` from the session signer to `new_admin`
    async fn transfer_admin(
        &self,
        session: &ChainSession,
        contract: &str,
        new_admin: &str,
    ) -> DeployResult<()> {
        let info = session.contract_info(contract).await?;
        match info.admin {
            Some(admin) if admin == new_admin => Err(DeployError::AdminAlreadyTransferred {
                contract: contract.to_string(),
                current: admin,
            }),
            Some(admin) if admin == session.signer_address() => {
                let msg = CosmosMsg::Wasm(WasmMsg::UpdateAdmin {
                    contract_addr: contract.to_string(),
                    admin: new_admin.to_string(),
                });
                session.submit_tx(vec![msg.into()], &FeeMode::Auto).await?;
                info!(contract, new_admin, "transferred wasm admin");
                Ok(())
            }
            Some(admin) => Err(DeployError::AdminAlreadyTransferred {
                contract: contract.to_string(),
                current: admin,
            }),
            None => Err(DeployError::AdminRenounced {
                contract: contract.to_string(),
            }),
        }
    }

    /// Unstakes, claims once the unbonding matured and burns the genesis govec
    async fn exit_genesis_stake(
        &self,
        govec: &str,
        staking: &str,
        deployer: &str,
    ) -> DeployResult<()> {
        let staked: StakedValueResponse = self
            .host
            .query(
                staking,
                &StakeQueryMsg::StakedValue {
                    address: deployer.to_string(),
                },
            )
            .await?;
        if !staked.value.is_zero() {
            self.host
                .execute(
                    staking,
                    &StakeExecuteMsg::Unstake {
                        amount: staked.value,
                    },
                    vec![],
                    &FeeMode::Auto,
                )
                .await?;
            info!(amount = %staked.value, "unstaked genesis govec");
        }

        let claims: ClaimsResponse = self
            .host
            .query(
                staking,
                &StakeQueryMsg::Claims {
                    address: deployer.to_string(),
                },
            )
            .await?;
        if !claims.claims.is_empty() {
            let release = claims
                .claims
                .iter()
                .map(|c| release_height(&c.release_at))
                .collect::<Option<Vec<u64>>>()
                .and_then(|heights| heights.into_iter().max())
                .ok_or_else(|| {
                    DeployError::Config(
                        "only height based unstaking durations are supported".to_string(),
                    )
                })?;
            poll_until(&self.config.governance.poll, "unstaked govec to unbond", |_| async move {
                let height = self.host.height().await?;
                Ok((height >= release).then_some(()))
            })
            .await?;
            self.host
                .execute(staking, &StakeExecuteMsg::Claim {}, vec![], &FeeMode::Auto)
                .await?;
            info!("claimed unbonded govec");
        }

        let balance: BalanceResponse = self
            .host
            .query(
                govec,
                &GovecQueryMsg::Balance {
                    address: deployer.to_string(),
                },
            )
            .await?;
        if !balance.balance.is_zero() {
            self.host
                .execute(
                    govec,
                    &GovecExecuteMsg::Burn { relayed_from: None },
                    vec![],
                    &FeeMode::Auto,
                )
                .await?;
            info!(amount = %balance.balance, "burnt genesis govec");
        }
        Ok(())
    }

    async fn renounce(&self, state: &mut RunState, dao: &str) -> DeployResult<()> {
        let admin = match state.admin.take() {
            Some(admin) => admin,
            None => match AdminAuthorizer::acquire(&self.host, &self.dispatcher, dao).await {
                Ok(admin) => admin,
                Err(e) if e.is_benign_on_resume() => {
                    info!(dao, reason = %e, "dao admin already renounced");
                    return Ok(());
                }
                Err(e) => return Err(e),
            },
        };
        admin.renounce(&self.host, &self.dispatcher).await?;
        Ok(())
    }

    /// Re-reads every contract and checks it against the manifest.
    /// Never mutates chain state.
    pub async fn verify(&self, manifest: &DeploymentManifest) -> DeployResult<()> {
        let dao = manifest.dao()?.address.clone();
        let govec = manifest.govec()?;
        let factory = manifest.factory()?;
        let dao_tunnel = manifest.dao_tunnel()?;
        let remote_tunnel = manifest.remote_tunnel()?;
        let remote_factory = manifest.remote_factory()?;
        let conn = manifest.connection()?;
        let app_channel = manifest.app_channel()?;

        let addresses = [
            &govec.address,
            &dao,
            &factory.address,
            &dao_tunnel.address,
            &manifest.proposal_module()?.address,
            &manifest.voting()?.address,
            &manifest.staking()?.address,
            &remote_tunnel.address,
            &remote_factory.address,
        ];
        let distinct: BTreeSet<_> = addresses.iter().collect();
        check("distinct addresses", addresses.len(), distinct.len())?;

        // code ids and wasm admins
        let host_records = [
            ("govec", govec),
            ("dao", manifest.dao()?),
            ("factory", factory),
            ("dao_tunnel", dao_tunnel),
        ];
        for (role, record) in host_records {
            self.check_record(&self.host, role, record, Some(&dao)).await?;
        }
        for (role, record) in [
            ("proposal_module", manifest.proposal_module()?),
            ("voting", manifest.voting()?),
            ("staking", manifest.staking()?),
        ] {
            self.check_record(&self.host, role, record, None).await?;
        }
        self.check_record(&self.remote, "remote_tunnel", remote_tunnel, Some(&remote_tunnel.address))
            .await?;
        self.check_record(&self.remote, "remote_factory", remote_factory, Some(&remote_tunnel.address))
            .await?;

        // govec
        let config: GovecConfigResponse = self.host.query(&govec.address, &GovecQueryMsg::Config {}).await?;
        check("govec.dao", Some(dao.clone()), config.dao.map(String::from))?;
        check(
            "govec.staking",
            Some(manifest.staking()?.address.clone()),
            config.staking.map(String::from),
        )?;
        check(
            "govec.factory",
            Some(factory.address.clone()),
            config.factory.map(String::from),
        )?;
        check(
            "govec.dao_tunnel",
            Some(dao_tunnel.address.clone()),
            config.dao_tunnel.map(String::from),
        )?;

        // dao core
        let admin = self.dispatcher.admin(&self.host, &dao).await?;
        check("dao.admin", None, admin.map(String::from))?;
        for (actor, addr) in dao_items(manifest)? {
            let item: GetItemResponse = self
                .host
                .query(&dao, &DaoQueryMsg::GetItem { key: actor.to_string() })
                .await?;
            check(&format!("dao.item.{actor}"), Some(addr), item.item)?;
        }
        let voting: Addr = self.host.query(&dao, &DaoQueryMsg::VotingModule {}).await?;
        check("dao.voting_module", manifest.voting()?.address.clone(), voting.to_string())?;
        let modules: Vec<ProposalModule> = self
            .host
            .query(
                &dao,
                &DaoQueryMsg::ProposalModules {
                    start_after: None,
                    limit: None,
                },
            )
            .await?;
        check(
            "dao.proposal_modules",
            vec![manifest.proposal_module()?.address.clone()],
            modules.into_iter().map(|m| m.address.to_string()).collect(),
        )?;
        let staking: Addr = self
            .host
            .query(voting.as_str(), &VotingQueryMsg::StakingContract {})
            .await?;
        check("voting.staking", manifest.staking()?.address.clone(), staking.to_string())?;

        // factories
        let factory_dao: Addr = self
            .host
            .query(&factory.address, &WalletFactoryQueryMsg::DaoAddr {})
            .await?;
        check("factory.dao", dao.clone(), factory_dao.to_string())?;
        let factory_govec: Option<Addr> = self
            .host
            .query(&factory.address, &WalletFactoryQueryMsg::GovecAddr {})
            .await?;
        check("factory.govec", Some(govec.address.clone()), factory_govec.map(String::from))?;
        let remote_factory_dao: Addr = self
            .remote
            .query(&remote_factory.address, &WalletFactoryQueryMsg::DaoAddr {})
            .await?;
        check(
            "remote_factory.dao",
            remote_tunnel.address.clone(),
            remote_factory_dao.to_string(),
        )?;

        // tunnels
        let controller = (conn.host_connection_id.clone(), wasm_port_id(&remote_tunnel.address));
        let controllers = self.controllers(&dao_tunnel.address).await?;
        check("dao_tunnel.controllers", true, controllers.contains(&controller))?;
        let factory_addr = self.remote_factory_addr(&remote_tunnel.address).await?;
        check(
            "remote_tunnel.factory",
            Some(remote_factory.address.clone()),
            factory_addr.map(String::from),
        )?;
        let channel: Option<String> = self
            .remote
            .query(&remote_tunnel.address, &RemoteTunnelQueryMsg::Channel {})
            .await?;
        check(
            "remote_tunnel.channel",
            Some(app_channel.channel_id_remote.clone()),
            channel,
        )?;
        let pending = self
            .relayer
            .pending_packets(app_channel)
            .await
            .map_err(|e| DeployError::Relay(e.to_string()))?;
        check("app_channel.pending_packets", 0, pending.len())?;

        // the deployer holds no influence
        let balance: BalanceResponse = self
            .host
            .query(
                &govec.address,
                &GovecQueryMsg::Balance {
                    address: manifest.deployer.clone(),
                },
            )
            .await?;
        check("deployer.govec_balance", Uint128::zero(), balance.balance)?;
        let staked: StakedValueResponse = self
            .host
            .query(
                &manifest.staking()?.address,
                &StakeQueryMsg::StakedValue {
                    address: manifest.deployer.clone(),
                },
            )
            .await?;
        check("deployer.staked", Uint128::zero(), staked.value)?;

        info!(dao = %dao, remote_factory = %remote_factory.address, "deployment verified");
        Ok(())
    }

    async fn check_record(
        &self,
        session: &ChainSession,
        role: &str,
        record: &ContractRecord,
        admin: Option<&String>,
    ) -> DeployResult<()> {
        let info = session.contract_info(&record.address).await?;
        check(&format!("{role}.code_id"), record.code_id, info.code_id)?;
        check(&format!("{role}.admin"), record.admin.clone(), info.admin.clone())?;
        if let Some(expected) = admin {
            check(&format!("{role}.admin"), Some(expected.clone()), info.admin)?;
        }
        Ok(())
    }
}

fn wasm_execute<M: Serialize>(contract: &str, msg: &M) -> DeployResult<CosmosMsg> {
    Ok(CosmosMsg::Wasm(WasmMsg::Execute {
        contract_addr: contract.to_string(),
        msg: to_json_binary(msg)?,
        funds: vec![],
    }))
}

fn dao_items(manifest: &DeploymentManifest) -> DeployResult<Vec<(VectisDaoActors, String)>> {
    VectisDaoActors::ALL
        .into_iter()
        .map(|actor| {
            let record = match actor {
                VectisDaoActors::Govec => manifest.govec()?,
                VectisDaoActors::Factory => manifest.factory()?,
                VectisDaoActors::DaoTunnel => manifest.dao_tunnel()?,
                VectisDaoActors::Staking => manifest.staking()?,
                VectisDaoActors::ProposalModule => manifest.proposal_module()?,
                VectisDaoActors::Voting => manifest.voting()?,
            };
            Ok((actor, record.address.clone()))
        })
        .collect()
}

/// `None` for expirations that are not height based
fn release_height(release_at: &Expiration) -> Option<u64> {
    match release_at {
        Expiration::AtHeight(height) => Some(*height),
        _ => None,
    }
}

/// Finalize steps that already ran on an earlier attempt are not failures
fn benign(res: DeployResult<()>) -> DeployResult<()> {
    match res {
        Err(e) if e.is_benign_on_resume() => {
            info!(reason = %e, "already done");
            Ok(())
        }
        other => other,
    }
}

fn check<T: PartialEq + Debug>(field: &str, expected: T, found: T) -> DeployResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(DeployError::ManifestInconsistency {
            field: field.to_string(),
            expected: format!("{expected:?}"),
            found: format!("{found:?}"),
        })
    }
}
