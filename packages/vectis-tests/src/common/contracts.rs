//! Simulated Vectis and dao-dao contracts.
//!
//! They keep the message and query surface the deployer talks to and the
//! authorization rules it depends on, nothing more.

use std::collections::BTreeMap;

use cosmwasm_std::{to_json_binary, Addr, Binary, Coin, CosmosMsg, Uint128};
use cw20::{BalanceResponse, Cw20ReceiveMsg};
use cw3::{Status, Vote};
use cw_utils::{Duration, Expiration};
use serde::{Deserialize, Serialize};
use vectis_wallet::{
    check_order, check_version, Admin, IbcError, ChainConfig, Claim, ClaimsResponse,
    CodeIdType, DaoConfig, DaoExecuteMsg, DaoInstantiateMsg, DaoQueryMsg, DaoTunnelExecuteMsg,
    DaoTunnelInstantiateMsg, DaoTunnelPacketMsg, DaoTunnelQueryMsg, FeesResponse,
    GetItemResponse, GovecConfigResponse, GovecExecuteMsg, GovecInstantiateMsg, GovecQueryMsg,
    ModuleInstantiateInfo, PacketMsg, PropInstantiateMsg, ProposalExecuteMsg,
    ProposalListResponse, ProposalModule, ProposalModuleStatus, ProposalQueryMsg,
    ProposalResponse, RemoteTunnelInstantiateMsg, RemoteTunnelQueryMsg, RemoteTunnels,
    StakeExecuteMsg, StakeInstantiateMsg, StakeQueryMsg, StakeReceiveMsg, StakedValueResponse,
    StakingInfo, StdAck, Threshold, TokenInfo, UpdateAddrReq, VoteInstantiateMsg,
    VotingPowerResponse, VotingQueryMsg, WalletFactoryExecuteMsg, WalletFactoryInstantiateMsg,
    WalletFactoryQueryMsg,
};

use super::chain::{err, parse, respond, ChannelInfo, Ctx, Deps, MockCode, MockResult, Packet};

fn ensure(cond: bool, msg: &str) -> MockResult<()> {
    if cond {
        Ok(())
    } else {
        Err(msg.to_string())
    }
}

fn height_of(duration: &Duration) -> MockResult<u64> {
    match duration {
        Duration::Height(blocks) => Ok(*blocks),
        Duration::Time(_) => Err("only height durations are supported".to_string()),
    }
}

#[derive(Serialize, Deserialize)]
struct GovecState {
    creator: String,
    dao: Option<String>,
    staking: Option<String>,
    factory: Option<String>,
    dao_tunnel: Option<String>,
    mint_amount: Uint128,
    balances: BTreeMap<String, Uint128>,
}

impl GovecState {
    fn debit(&mut self, owner: &str, amount: Uint128) -> MockResult<()> {
        let balance = self.balances.entry(owner.to_string()).or_default();
        *balance = balance
            .checked_sub(amount)
            .map_err(|_| "insufficient funds".to_string())?;
        Ok(())
    }

    fn credit(&mut self, owner: &str, amount: Uint128) {
        *self.balances.entry(owner.to_string()).or_default() += amount;
    }

    fn total_supply(&self) -> Uint128 {
        self.balances.values().copied().sum()
    }
}

/// cw20 governance token
pub struct Govec;

impl MockCode for Govec {
    fn instantiate(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let msg: GovecInstantiateMsg = parse(msg)?;
        let mut state = GovecState {
            creator: ctx.sender().to_string(),
            dao: None,
            staking: None,
            factory: None,
            dao_tunnel: None,
            mint_amount: msg.mint_amount,
            balances: BTreeMap::new(),
        };
        for coin in msg.initial_balances {
            state.credit(&coin.address, coin.amount);
        }
        ctx.save(&state)
    }

    fn execute(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let mut state: GovecState = ctx.load()?;
        let sender = ctx.sender().to_string();
        match parse(msg)? {
            GovecExecuteMsg::Transfer {
                recipient, amount, ..
            } => {
                state.debit(&sender, amount)?;
                state.credit(&recipient, amount);
                ctx.save(&state)
            }
            GovecExecuteMsg::Burn { .. } => {
                let balance = state.balances.remove(&sender).unwrap_or_default();
                ensure(!balance.is_zero(), "no balance to burn")?;
                ctx.attr("action", "burn");
                ctx.attr("amount", balance);
                ctx.save(&state)
            }
            GovecExecuteMsg::Send {
                contract,
                amount,
                msg,
                ..
            } => {
                state.debit(&sender, amount)?;
                state.credit(&contract, amount);
                ctx.save(&state)?;
                let receive = Cw20ReceiveMsg {
                    sender,
                    amount,
                    msg,
                }
                .into_cosmos_msg(contract)
                .map_err(err)?;
                ctx.dispatch(&receive)
            }
            GovecExecuteMsg::Mint { new_wallet } => {
                let minters = [&state.factory, &state.dao_tunnel];
                ensure(
                    minters.iter().any(|m| m.as_deref() == Some(sender.as_str())),
                    "unauthorized: not a minter",
                )?;
                let amount = state.mint_amount;
                state.credit(&new_wallet, amount);
                ctx.save(&state)
            }
            GovecExecuteMsg::UpdateConfigAddr { new_addr } => {
                let authorized = match &state.dao {
                    Some(dao) => dao == &sender,
                    None => state.creator == sender,
                };
                ensure(authorized, "unauthorized: dao only")?;
                match new_addr {
                    UpdateAddrReq::Dao(addr) => state.dao = Some(addr),
                    UpdateAddrReq::DaoTunnel(addr) => state.dao_tunnel = Some(addr),
                    UpdateAddrReq::Factory(addr) => state.factory = Some(addr),
                    UpdateAddrReq::Staking(addr) => state.staking = Some(addr),
                }
                ctx.save(&state)
            }
        }
    }

    fn query(&self, deps: &Deps, msg: &Binary) -> MockResult<Binary> {
        let state: GovecState = deps.load()?;
        match parse(msg)? {
            GovecQueryMsg::Balance { address } => respond(&BalanceResponse {
                balance: state.balances.get(&address).copied().unwrap_or_default(),
            }),
            GovecQueryMsg::Config {} => respond(&GovecConfigResponse {
                dao: state.dao.clone().map(Addr::unchecked),
                staking: state.staking.clone().map(Addr::unchecked),
                factory: state.factory.clone().map(Addr::unchecked),
                dao_tunnel: state.dao_tunnel.clone().map(Addr::unchecked),
                mint_amount: state.mint_amount,
                total_supply: state.total_supply(),
            }),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StakeState {
    token: String,
    unstaking_blocks: Option<u64>,
    staked: BTreeMap<String, Uint128>,
    claims: BTreeMap<String, Vec<Claim>>,
}

/// cw20 staking with height based unbonding
pub struct Stake;

impl MockCode for Stake {
    fn instantiate(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let msg: StakeInstantiateMsg = parse(msg)?;
        let unstaking_blocks = msg.unstaking_duration.as_ref().map(height_of).transpose()?;
        ctx.save(&StakeState {
            token: msg.token_address,
            unstaking_blocks,
            staked: BTreeMap::new(),
            claims: BTreeMap::new(),
        })
    }

    fn execute(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let mut state: StakeState = ctx.load()?;
        let sender = ctx.sender().to_string();
        match parse(msg)? {
            StakeExecuteMsg::Receive(receive) => {
                ensure(sender == state.token, "unauthorized: unknown token")?;
                let StakeReceiveMsg::Stake {} = parse(&receive.msg)?;
                *state.staked.entry(receive.sender).or_default() += receive.amount;
                ctx.save(&state)
            }
            StakeExecuteMsg::Unstake { amount } => {
                let staked = state.staked.entry(sender.clone()).or_default();
                *staked = staked
                    .checked_sub(amount)
                    .map_err(|_| "cannot unstake more than staked".to_string())?;
                match state.unstaking_blocks {
                    Some(blocks) => {
                        let release_at = Expiration::AtHeight(ctx.height() + blocks);
                        state
                            .claims
                            .entry(sender)
                            .or_default()
                            .push(Claim { amount, release_at });
                        ctx.save(&state)
                    }
                    None => {
                        let token = state.token.clone();
                        ctx.save(&state)?;
                        ctx.execute(
                            &token,
                            &GovecExecuteMsg::Transfer {
                                recipient: sender,
                                amount,
                                relayed_from: None,
                            },
                        )
                    }
                }
            }
            StakeExecuteMsg::Claim {} => {
                let height = ctx.height();
                let claims = state.claims.remove(&sender).unwrap_or_default();
                let (matured, pending): (Vec<Claim>, Vec<Claim>) =
                    claims.into_iter().partition(|c| match c.release_at {
                        Expiration::AtHeight(release) => release <= height,
                        _ => false,
                    });
                let amount: Uint128 = matured.iter().map(|c| c.amount).sum();
                ensure(!amount.is_zero(), "nothing to claim")?;
                if !pending.is_empty() {
                    state.claims.insert(sender.clone(), pending);
                }
                let token = state.token.clone();
                ctx.save(&state)?;
                ctx.execute(
                    &token,
                    &GovecExecuteMsg::Transfer {
                        recipient: sender,
                        amount,
                        relayed_from: None,
                    },
                )
            }
        }
    }

    fn query(&self, deps: &Deps, msg: &Binary) -> MockResult<Binary> {
        let state: StakeState = deps.load()?;
        match parse(msg)? {
            StakeQueryMsg::StakedValue { address } => respond(&StakedValueResponse {
                value: state.staked.get(&address).copied().unwrap_or_default(),
            }),
            StakeQueryMsg::Claims { address } => respond(&ClaimsResponse {
                claims: state.claims.get(&address).cloned().unwrap_or_default(),
            }),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct VotingState {
    token: String,
    staking: String,
}

/// Staked token voting module, instantiated by the dao core
pub struct Voting;

impl MockCode for Voting {
    fn instantiate(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let VoteInstantiateMsg {
            token_info: TokenInfo::Existing {
                address,
                staking_contract,
            },
        } = parse(msg)?;
        let dao = ctx.sender().to_string();
        let staking = match staking_contract {
            StakingInfo::Existing {
                staking_contract_address,
            } => staking_contract_address,
            StakingInfo::New {
                staking_code_id,
                unstaking_duration,
            } => ctx.instantiate(
                staking_code_id,
                &StakeInstantiateMsg {
                    token_address: address.clone(),
                    unstaking_duration,
                },
                Some(dao),
                "Vectis staking",
            )?,
        };
        ctx.save(&VotingState {
            token: address,
            staking,
        })
    }

    fn execute(&self, _ctx: &mut Ctx, _msg: &Binary) -> MockResult<()> {
        Err("voting module has no execute messages".to_string())
    }

    fn query(&self, deps: &Deps, msg: &Binary) -> MockResult<Binary> {
        let state: VotingState = deps.load()?;
        match parse(msg)? {
            VotingQueryMsg::StakingContract {} => respond(&Addr::unchecked(state.staking)),
            VotingQueryMsg::TokenContract {} => respond(&Addr::unchecked(state.token)),
            VotingQueryMsg::VotingPowerAtHeight { address, .. } => {
                let staked: StakedValueResponse =
                    deps.query(&state.staking, &StakeQueryMsg::StakedValue { address })?;
                respond(&VotingPowerResponse {
                    power: staked.value,
                    height: deps.height(),
                })
            }
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct StoredProposal {
    id: u64,
    title: String,
    description: String,
    msgs: Vec<CosmosMsg>,
    proposer: String,
    yes: Uint128,
    no: Uint128,
    voters: Vec<String>,
    expires_at: u64,
    executed: bool,
    closed: bool,
}

#[derive(Serialize, Deserialize)]
struct ProposalState {
    dao: String,
    threshold: Uint128,
    voting_blocks: u64,
    proposals: Vec<StoredProposal>,
}

impl ProposalState {
    fn status(&self, prop: &StoredProposal, height: u64) -> Status {
        if prop.executed {
            Status::Executed
        } else if prop.yes >= self.threshold {
            Status::Passed
        } else if prop.closed || height >= prop.expires_at {
            Status::Rejected
        } else {
            Status::Open
        }
    }

    fn response(&self, prop: &StoredProposal, height: u64) -> ProposalResponse {
        ProposalResponse {
            id: prop.id,
            title: prop.title.clone(),
            description: prop.description.clone(),
            msgs: prop.msgs.clone(),
            status: self.status(prop, height),
            proposer: Addr::unchecked(&prop.proposer),
            yes_votes: prop.yes,
            no_votes: prop.no,
            expires: Expiration::AtHeight(prop.expires_at),
        }
    }

    fn get(&self, id: u64) -> MockResult<&StoredProposal> {
        self.proposals
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| format!("proposal {id} not found"))
    }
}

fn voting_power(deps: &Deps, dao: &str, address: &str) -> MockResult<Uint128> {
    let voting: Addr = deps.query(dao, &DaoQueryMsg::VotingModule {})?;
    let res: VotingPowerResponse = deps.query(
        voting.as_str(),
        &VotingQueryMsg::VotingPowerAtHeight {
            address: address.to_string(),
            height: None,
        },
    )?;
    Ok(res.power)
}

/// Single choice proposals with an absolute yes threshold
pub struct Proposal;

impl MockCode for Proposal {
    fn instantiate(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let msg: PropInstantiateMsg = parse(msg)?;
        let Threshold::AbsoluteCount { threshold } = msg.threshold;
        ctx.save(&ProposalState {
            dao: ctx.sender().to_string(),
            threshold,
            voting_blocks: height_of(&msg.max_voting_period)?,
            proposals: vec![],
        })
    }

    fn execute(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let mut state: ProposalState = ctx.load()?;
        let sender = ctx.sender().to_string();
        let height = ctx.height();
        match parse(msg)? {
            ProposalExecuteMsg::Propose {
                title,
                description,
                msgs,
            } => {
                let power = voting_power(&ctx.deps(), &state.dao, &sender)?;
                ensure(!power.is_zero(), "unauthorized: proposer has no voting power")?;
                let id = state.proposals.last().map_or(1, |p| p.id + 1);
                state.proposals.push(StoredProposal {
                    id,
                    title,
                    description,
                    msgs,
                    proposer: sender,
                    yes: Uint128::zero(),
                    no: Uint128::zero(),
                    voters: vec![],
                    expires_at: height + state.voting_blocks,
                    executed: false,
                    closed: false,
                });
                ctx.attr("action", "propose");
                ctx.attr("proposal_id", id);
                ctx.save(&state)
            }
            ProposalExecuteMsg::Vote { proposal_id, vote } => {
                let prop = state.get(proposal_id)?;
                ensure(state.status(prop, height) == Status::Open, "proposal is not open for voting")?;
                ensure(!prop.voters.contains(&sender), "Already voted on this proposal")?;
                let power = voting_power(&ctx.deps(), &state.dao, &sender)?;
                ensure(!power.is_zero(), "unauthorized: no voting power")?;
                let prop = state
                    .proposals
                    .iter_mut()
                    .find(|p| p.id == proposal_id)
                    .ok_or("proposal vanished")?;
                match vote {
                    Vote::Yes => prop.yes += power,
                    Vote::No | Vote::Veto => prop.no += power,
                    Vote::Abstain => {}
                }
                prop.voters.push(sender);
                ctx.attr("action", "vote");
                ctx.attr("proposal_id", proposal_id);
                ctx.save(&state)
            }
            ProposalExecuteMsg::Execute { proposal_id } => {
                let prop = state.get(proposal_id)?;
                ensure(state.status(prop, height) == Status::Passed, "proposal is not passed")?;
                let power = voting_power(&ctx.deps(), &state.dao, &sender)?;
                ensure(!power.is_zero(), "unauthorized: only members execute")?;
                let msgs = prop.msgs.clone();
                if let Some(prop) = state.proposals.iter_mut().find(|p| p.id == proposal_id) {
                    prop.executed = true;
                }
                let dao = state.dao.clone();
                ctx.attr("action", "execute");
                ctx.attr("proposal_id", proposal_id);
                ctx.save(&state)?;
                ctx.execute(&dao, &DaoExecuteMsg::ExecuteProposalHook { msgs })
            }
            ProposalExecuteMsg::Close { proposal_id } => {
                let prop = state.get(proposal_id)?;
                ensure(
                    state.status(prop, height) == Status::Rejected,
                    "only rejected proposals can be closed",
                )?;
                if let Some(prop) = state.proposals.iter_mut().find(|p| p.id == proposal_id) {
                    prop.closed = true;
                }
                ctx.save(&state)
            }
        }
    }

    fn query(&self, deps: &Deps, msg: &Binary) -> MockResult<Binary> {
        let state: ProposalState = deps.load()?;
        let height = deps.height();
        match parse(msg)? {
            ProposalQueryMsg::Proposal { proposal_id } => {
                respond(&state.response(state.get(proposal_id)?, height))
            }
            ProposalQueryMsg::ReverseProposals {
                start_before,
                limit,
            } => {
                let proposals = state
                    .proposals
                    .iter()
                    .rev()
                    .filter(|p| start_before.map_or(true, |before| p.id < before))
                    .take(limit.unwrap_or(30) as usize)
                    .map(|p| state.response(p, height))
                    .collect();
                respond(&ProposalListResponse { proposals })
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DaoState {
    admin: Option<String>,
    voting: Option<String>,
    proposal_modules: Vec<String>,
    items: BTreeMap<String, String>,
}

/// dao-dao core: module registry, item store and the bootstrap admin
pub struct DaoCore;

impl DaoCore {
    fn instantiate_module(ctx: &mut Ctx, info: &ModuleInstantiateInfo) -> MockResult<String> {
        let admin = match &info.admin {
            Some(Admin::CoreModule {}) => Some(ctx.contract().to_string()),
            Some(Admin::Address { addr }) => Some(addr.clone()),
            None => None,
        };
        ctx.instantiate_raw(info.code_id, &info.msg, admin, &info.label)
    }
}

impl MockCode for DaoCore {
    fn instantiate(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let msg: DaoInstantiateMsg = parse(msg)?;
        let mut state = DaoState {
            admin: msg.admin,
            voting: None,
            proposal_modules: vec![],
            items: BTreeMap::new(),
        };
        ctx.save(&state)?;
        state.voting = Some(Self::instantiate_module(ctx, &msg.voting_module_instantiate_info)?);
        for info in &msg.proposal_modules_instantiate_info {
            state.proposal_modules.push(Self::instantiate_module(ctx, info)?);
        }
        ctx.save(&state)
    }

    fn execute(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let mut state: DaoState = ctx.load()?;
        let sender = ctx.sender().to_string();
        match parse(msg)? {
            DaoExecuteMsg::ExecuteAdminMsgs { msgs } => {
                ensure(state.admin.as_deref() == Some(sender.as_str()), "unauthorized: admin only")?;
                ctx.attr("action", "execute_admin_msgs");
                msgs.iter().try_for_each(|msg| ctx.dispatch(msg))
            }
            DaoExecuteMsg::ExecuteProposalHook { msgs } => {
                ensure(state.proposal_modules.contains(&sender), "unauthorized: proposal modules only")?;
                ctx.attr("action", "execute_proposal_hook");
                msgs.iter().try_for_each(|msg| ctx.dispatch(msg))
            }
            DaoExecuteMsg::SetItem { key, value } => {
                ensure(sender == ctx.contract(), "unauthorized: dao only")?;
                state.items.insert(key, value);
                ctx.save(&state)
            }
            DaoExecuteMsg::RemoveItem { key } => {
                ensure(sender == ctx.contract(), "unauthorized: dao only")?;
                state.items.remove(&key);
                ctx.save(&state)
            }
            DaoExecuteMsg::NominateAdmin { admin } => {
                ensure(state.admin.as_deref() == Some(sender.as_str()), "unauthorized: admin only")?;
                ctx.attr("action", "nominate_admin");
                ctx.attr("admin", admin.as_deref().unwrap_or("none"));
                state.admin = admin;
                ctx.save(&state)
            }
        }
    }

    fn query(&self, deps: &Deps, msg: &Binary) -> MockResult<Binary> {
        let state: DaoState = deps.load()?;
        match parse(msg)? {
            DaoQueryMsg::Admin {} => respond(&state.admin.map(Addr::unchecked)),
            DaoQueryMsg::VotingModule {} => {
                let voting = state.voting.ok_or("voting module not set")?;
                respond(&Addr::unchecked(voting))
            }
            DaoQueryMsg::ProposalModules { start_after, limit } => {
                let modules: Vec<ProposalModule> = state
                    .proposal_modules
                    .iter()
                    .filter(|m| start_after.as_ref().map_or(true, |after| *m > after))
                    .take(limit.unwrap_or(30) as usize)
                    .map(|m| ProposalModule {
                        address: Addr::unchecked(m),
                        prefix: "A".to_string(),
                        status: ProposalModuleStatus::Enabled,
                    })
                    .collect();
                respond(&modules)
            }
            DaoQueryMsg::GetItem { key } => respond(&GetItemResponse {
                item: state.items.get(&key).cloned(),
            }),
            DaoQueryMsg::ListItems { start_after, limit } => {
                let items: Vec<(String, String)> = state
                    .items
                    .into_iter()
                    .filter(|(k, _)| start_after.as_ref().map_or(true, |after| k > after))
                    .take(limit.unwrap_or(30) as usize)
                    .collect();
                respond(&items)
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct FactoryState {
    dao: String,
    proxy_code_id: u64,
    multisig_code_id: u64,
    wallet_fee: Coin,
    claim_fee: Coin,
    govec: Option<String>,
}

/// Wallet factory, the instantiator is its dao
pub struct Factory;

impl MockCode for Factory {
    fn instantiate(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let msg: WalletFactoryInstantiateMsg = parse(msg)?;
        ctx.save(&FactoryState {
            dao: ctx.sender().to_string(),
            proxy_code_id: msg.proxy_code_id,
            multisig_code_id: msg.proxy_multisig_code_id,
            wallet_fee: msg.wallet_fee,
            claim_fee: msg.claim_fee,
            govec: msg.govec_minter,
        })
    }

    fn execute(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let mut state: FactoryState = ctx.load()?;
        ensure(ctx.sender() == state.dao, "unauthorized: dao only")?;
        match parse(msg)? {
            WalletFactoryExecuteMsg::UpdateCodeId { ty, new_code_id } => match ty {
                CodeIdType::Proxy => state.proxy_code_id = new_code_id,
                CodeIdType::Multisig => state.multisig_code_id = new_code_id,
            },
            WalletFactoryExecuteMsg::UpdateGovecAddr { addr } => state.govec = Some(addr),
            WalletFactoryExecuteMsg::UpdateDao { addr } => state.dao = addr,
        }
        ctx.save(&state)
    }

    fn query(&self, deps: &Deps, msg: &Binary) -> MockResult<Binary> {
        let state: FactoryState = deps.load()?;
        match parse(msg)? {
            WalletFactoryQueryMsg::CodeId { ty } => respond(&match ty {
                CodeIdType::Proxy => state.proxy_code_id,
                CodeIdType::Multisig => state.multisig_code_id,
            }),
            WalletFactoryQueryMsg::Fees {} => respond(&FeesResponse {
                wallet_fee: state.wallet_fee,
                claim_fee: state.claim_fee,
            }),
            WalletFactoryQueryMsg::DaoAddr {} => respond(&Addr::unchecked(state.dao)),
            WalletFactoryQueryMsg::GovecAddr {} => respond(&state.govec.map(Addr::unchecked)),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DaoTunnelState {
    admin: String,
    govec: String,
    denom: String,
    controllers: Vec<(String, String)>,
    channels: Vec<String>,
    next_job_id: u64,
}

/// IBC endpoint of the dao, only talks to approved remote tunnels
pub struct DaoTunnel;

impl MockCode for DaoTunnel {
    fn instantiate(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let msg: DaoTunnelInstantiateMsg = parse(msg)?;
        ctx.save(&DaoTunnelState {
            admin: ctx.sender().to_string(),
            govec: msg.govec_minter,
            denom: msg.denom,
            controllers: vec![],
            channels: vec![],
            next_job_id: 0,
        })
    }

    fn execute(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let mut state: DaoTunnelState = ctx.load()?;
        ensure(ctx.sender() == state.admin, "unauthorized: dao only")?;
        let (channel_id, packet) = match parse(msg)? {
            DaoTunnelExecuteMsg::AddApprovedController {
                connection_id,
                port_id,
            } => {
                let controller = (connection_id, port_id);
                if !state.controllers.contains(&controller) {
                    state.controllers.push(controller);
                }
                return ctx.save(&state);
            }
            DaoTunnelExecuteMsg::RemoveApprovedController {
                connection_id,
                port_id,
            } => {
                state
                    .controllers
                    .retain(|c| c != &(connection_id.clone(), port_id.clone()));
                return ctx.save(&state);
            }
            DaoTunnelExecuteMsg::InstantiateRemoteFactory {
                code_id,
                msg,
                channel_id,
            } => (channel_id, DaoTunnelPacketMsg::InstantiateFactory { code_id, msg }),
            DaoTunnelExecuteMsg::UpdateRemoteTunnelChannel { channel_id } => {
                (channel_id, DaoTunnelPacketMsg::UpdateChannel)
            }
        };
        ensure(state.channels.contains(&channel_id), "unknown channel")?;
        let job_id = state.next_job_id;
        state.next_job_id += 1;
        let data = to_json_binary(&PacketMsg {
            sender: ctx.sender().to_string(),
            job_id,
            msg: to_json_binary(&packet).map_err(err)?,
        })
        .map_err(err)?;
        ctx.save(&state)?;
        ctx.send_packet(&channel_id, data)?;
        ctx.attr("job_id", job_id);
        Ok(())
    }

    fn query(&self, deps: &Deps, msg: &Binary) -> MockResult<Binary> {
        let state: DaoTunnelState = deps.load()?;
        match parse(msg)? {
            DaoTunnelQueryMsg::Controllers { start_after, limit } => {
                let tunnels = state
                    .controllers
                    .into_iter()
                    .filter(|c| start_after.as_ref().map_or(true, |after| c > after))
                    .take(limit.unwrap_or(30) as usize)
                    .collect();
                respond(&RemoteTunnels { tunnels })
            }
            DaoTunnelQueryMsg::Govec {} => respond(&Some(Addr::unchecked(state.govec))),
        }
    }

    fn channel_open(&self, ctx: &mut Ctx, channel: &ChannelInfo) -> MockResult<()> {
        check_order(&channel.order).map_err(err)?;
        check_version(&channel.version).map_err(err)?;
        let state: DaoTunnelState = ctx.load()?;
        let controller = (
            channel.connection_id.clone(),
            channel.counterparty_port_id.clone(),
        );
        if !state.controllers.contains(&controller) {
            return Err(err(IbcError::InvalidSrc));
        }
        Ok(())
    }

    fn channel_connect(&self, ctx: &mut Ctx, channel: &ChannelInfo) -> MockResult<()> {
        let mut state: DaoTunnelState = ctx.load()?;
        state.channels.push(channel.channel_id.clone());
        ctx.save(&state)
    }

    fn packet_ack(&self, ctx: &mut Ctx, _packet: &Packet, ack: &Binary) -> MockResult<()> {
        let ack = StdAck::parse(ack).map_err(err)?;
        ctx.attr("ack_success", ack.is_success());
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct RemoteTunnelState {
    dao_config: DaoConfig,
    chain_config: ChainConfig,
}

/// IBC endpoint on the remote chain, executes what the dao tunnel sends
pub struct RemoteTunnel;

impl MockCode for RemoteTunnel {
    fn instantiate(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let msg: RemoteTunnelInstantiateMsg = parse(msg)?;
        ctx.save(&RemoteTunnelState {
            dao_config: msg.dao_config,
            chain_config: msg.chain_config,
        })
    }

    fn execute(&self, _ctx: &mut Ctx, _msg: &Binary) -> MockResult<()> {
        Err("remote tunnel has no execute messages".to_string())
    }

    fn query(&self, deps: &Deps, msg: &Binary) -> MockResult<Binary> {
        let state: RemoteTunnelState = deps.load()?;
        match parse(msg)? {
            RemoteTunnelQueryMsg::Factory {} => {
                respond(&state.chain_config.remote_factory.map(Addr::unchecked))
            }
            RemoteTunnelQueryMsg::Channel {} => respond(&state.dao_config.dao_tunnel_channel),
            RemoteTunnelQueryMsg::DaoConfig {} => respond(&state.dao_config),
        }
    }

    fn channel_open(&self, ctx: &mut Ctx, channel: &ChannelInfo) -> MockResult<()> {
        check_order(&channel.order).map_err(err)?;
        check_version(&channel.version).map_err(err)?;
        let state: RemoteTunnelState = ctx.load()?;
        if channel.counterparty_port_id != state.dao_config.dao_tunnel_port_id {
            return Err(err(IbcError::InvalidPortId(state.dao_config.dao_tunnel_port_id)));
        }
        if channel.connection_id != state.dao_config.connection_id {
            return Err(err(IbcError::InvalidConnectionId(state.dao_config.connection_id)));
        }
        Ok(())
    }

    fn channel_connect(&self, ctx: &mut Ctx, channel: &ChannelInfo) -> MockResult<()> {
        let mut state: RemoteTunnelState = ctx.load()?;
        state.dao_config.dao_tunnel_channel = Some(channel.channel_id.clone());
        ctx.save(&state)
    }

    fn packet_receive(&self, ctx: &mut Ctx, packet: &Packet) -> MockResult<Binary> {
        let mut state: RemoteTunnelState = ctx.load()?;
        if state.dao_config.dao_tunnel_channel.as_deref() != Some(packet.dst_channel.as_str()) {
            return Err(err(IbcError::InvalidSrc));
        }
        let PacketMsg { job_id, msg, .. } = parse(&packet.data)?;
        match parse(&msg).map_err(|_| err(IbcError::InvalidPacket))? {
            DaoTunnelPacketMsg::InstantiateFactory { code_id, msg } => {
                let admin = Some(ctx.contract().to_string());
                let factory = ctx.instantiate(code_id, &msg, admin, "Vectis Remote Factory")?;
                ctx.attr("remote_factory", &factory);
                state.chain_config.remote_factory = Some(factory);
                ctx.save(&state)?;
            }
            DaoTunnelPacketMsg::UpdateChannel => {}
        }
        StdAck::success(job_id).map_err(err)
    }
}

/// Code without behaviour, stands in for wallet proxies and multisigs
pub struct Noop;

impl MockCode for Noop {
    fn instantiate(&self, _ctx: &mut Ctx, _msg: &Binary) -> MockResult<()> {
        Ok(())
    }

    fn execute(&self, _ctx: &mut Ctx, _msg: &Binary) -> MockResult<()> {
        Err("noop contract".to_string())
    }

    fn query(&self, _deps: &Deps, _msg: &Binary) -> MockResult<Binary> {
        Err("noop contract".to_string())
    }
}

/// Version of the [`Pinger`] channel
pub const PING_VERSION: &str = "ping-1";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PingerMsg {
    Ping { count: u32 },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PingerQuery {
    Counts {},
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct PingerCounts {
    pub sent: u64,
    pub received: u64,
    pub acked: u64,
}

#[derive(Serialize, Deserialize, Default)]
struct PingerState {
    channel: Option<String>,
    counts: PingerCounts,
}

/// Bare IBC contract for exercising the relay link in isolation
pub struct Pinger;

impl MockCode for Pinger {
    fn instantiate(&self, ctx: &mut Ctx, _msg: &Binary) -> MockResult<()> {
        ctx.save(&PingerState::default())
    }

    fn execute(&self, ctx: &mut Ctx, msg: &Binary) -> MockResult<()> {
        let mut state: PingerState = ctx.load()?;
        let PingerMsg::Ping { count } = parse(msg)?;
        let channel = state.channel.clone().ok_or("no channel")?;
        for n in 0..count {
            ctx.send_packet(&channel, to_json_binary(&n).map_err(err)?)?;
            state.counts.sent += 1;
        }
        ctx.save(&state)
    }

    fn query(&self, deps: &Deps, msg: &Binary) -> MockResult<Binary> {
        let state: PingerState = deps.load()?;
        let PingerQuery::Counts {} = parse(msg)?;
        respond(&state.counts)
    }

    fn channel_open(&self, _ctx: &mut Ctx, channel: &ChannelInfo) -> MockResult<()> {
        ensure(channel.version == PING_VERSION, "invalid ping version")
    }

    fn channel_connect(&self, ctx: &mut Ctx, channel: &ChannelInfo) -> MockResult<()> {
        let mut state: PingerState = ctx.load()?;
        state.channel = Some(channel.channel_id.clone());
        ctx.save(&state)
    }

    fn packet_receive(&self, ctx: &mut Ctx, packet: &Packet) -> MockResult<Binary> {
        let mut state: PingerState = ctx.load()?;
        state.counts.received += 1;
        ctx.save(&state)?;
        StdAck::success(packet.sequence).map_err(err)
    }

    fn packet_ack(&self, ctx: &mut Ctx, _packet: &Packet, _ack: &Binary) -> MockResult<()> {
        let mut state: PingerState = ctx.load()?;
        state.counts.acked += 1;
        ctx.save(&state)
    }
}
