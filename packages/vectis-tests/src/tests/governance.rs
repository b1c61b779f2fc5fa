use assert_matches::assert_matches;
use vectis_deployer::{AdminAuthorizer, Authorizer, GovernanceAuthorizer};
use vectis_wallet::{DaoExecuteMsg, GetItemResponse, ProposalListResponse};

use crate::common::common::*;

fn dispatcher() -> GovernanceDispatcher {
    GovernanceDispatcher::new(FeeMode::Auto, PollPolicy::fixed(1, 20))
}

fn set_item(dao: &str, key: &str, value: &str) -> CosmosMsg {
    CosmosMsg::Wasm(WasmMsg::Execute {
        contract_addr: dao.to_string(),
        msg: to_json_binary(&DaoExecuteMsg::SetItem {
            key: key.to_string(),
            value: value.to_string(),
        })
        .unwrap(),
        funds: vec![],
    })
}

async fn item(session: &ChainSession, dao: &str, key: &str) -> Option<String> {
    let res: GetItemResponse = session
        .query(dao, &DaoQueryMsg::GetItem { key: key.to_string() })
        .await
        .unwrap();
    res.item
}

#[tokio::test]
async fn proposal_ids_increase() -> Result<()> {
    let suite = DeploySuite::init();
    let session = suite.host_session().await?;
    let fx = suite.dao_fixture(&session, GENESIS_AMOUNT).await?;
    let dispatcher = dispatcher();

    let mut writer = dispatcher.writer(&fx.proposal)?;
    let first = dispatcher.propose(&session, &mut writer, "first", "", vec![]).await?;
    let second = dispatcher.propose(&session, &mut writer, "second", "", vec![]).await?;
    assert!(second > first);
    assert_eq!(writer.last_id(), Some(second));

    let prop = dispatcher.proposal(&session, &fx.proposal, second).await?;
    assert_eq!(prop.title, "second");
    assert_eq!(prop.status, Status::Open);
    Ok(())
}

#[tokio::test]
async fn one_writer_per_proposal_module() {
    let dispatcher = dispatcher();
    let writer = dispatcher.writer("juno1proposal").unwrap();
    assert_matches!(
        dispatcher.writer("juno1proposal"),
        Err(DeployError::WriterTaken(module)) if module == "juno1proposal"
    );
    // other modules are independent
    let _other = dispatcher.writer("juno1other").unwrap();

    drop(writer);
    dispatcher.writer("juno1proposal").unwrap();
}

#[tokio::test]
async fn execute_before_threshold_fails() -> Result<()> {
    let suite = DeploySuite::init();
    let session = suite.host_session().await?;
    let fx = suite.dao_fixture(&session, GENESIS_AMOUNT).await?;
    let dispatcher = dispatcher();

    let mut writer = dispatcher.writer(&fx.proposal)?;
    let id = dispatcher
        .propose(&session, &mut writer, "early", "", vec![set_item(&fx.dao, "k", "v")])
        .await?;
    assert_matches!(
        dispatcher.execute(&session, &fx.proposal, id).await,
        Err(DeployError::ThresholdNotMet { proposal_id, .. }) if proposal_id == id
    );
    assert_eq!(item(&session, &fx.dao, "k").await, None);
    Ok(())
}

#[tokio::test]
async fn second_vote_is_already_voted() -> Result<()> {
    let suite = DeploySuite::init();
    let session = suite.host_session().await?;
    // below the threshold so the proposal stays open after one vote
    let fx = suite.dao_fixture(&session, Uint128::new(10)).await?;
    let dispatcher = dispatcher();

    let mut writer = dispatcher.writer(&fx.proposal)?;
    let id = dispatcher.propose(&session, &mut writer, "vote twice", "", vec![]).await?;
    dispatcher.vote(&session, &fx.proposal, id, Vote::Yes).await?;
    assert_matches!(
        dispatcher.vote(&session, &fx.proposal, id, Vote::Yes).await,
        Err(DeployError::AlreadyVoted(proposal_id)) if proposal_id == id
    );

    let prop = dispatcher.proposal(&session, &fx.proposal, id).await?;
    assert_eq!(prop.yes_votes, Uint128::new(10));
    assert_matches!(
        dispatcher.execute(&session, &fx.proposal, id).await,
        Err(DeployError::ThresholdNotMet { .. })
    );
    Ok(())
}

#[tokio::test]
async fn voting_on_passed_proposal_is_closed() -> Result<()> {
    let suite = DeploySuite::init();
    let session = suite.host_session().await?;
    let fx = suite.dao_fixture(&session, GENESIS_AMOUNT).await?;
    let dispatcher = dispatcher();

    let mut writer = dispatcher.writer(&fx.proposal)?;
    let id = dispatcher.propose(&session, &mut writer, "passes", "", vec![]).await?;
    dispatcher.vote(&session, &fx.proposal, id, Vote::Yes).await?;
    assert_matches!(
        dispatcher.vote(&session, &fx.proposal, id, Vote::No).await,
        Err(DeployError::ProposalClosed { .. })
    );
    Ok(())
}

#[tokio::test]
async fn governance_authorizer_runs_full_cycle() -> Result<()> {
    let suite = DeploySuite::init();
    let session = suite.host_session().await?;
    let fx = suite.dao_fixture(&session, GENESIS_AMOUNT).await?;
    let dispatcher = dispatcher();

    let mut authorizer = GovernanceAuthorizer::new(dispatcher.writer(&fx.proposal)?);
    authorizer
        .authorize(&session, &dispatcher, "set item", vec![set_item(&fx.dao, "Govec", &fx.govec)])
        .await?;
    assert_eq!(item(&session, &fx.dao, "Govec").await, Some(fx.govec.clone()));

    let writer = authorizer.into_writer();
    let id = writer.last_id().expect("proposed");
    let prop = dispatcher.proposal(&session, &fx.proposal, id).await?;
    assert_eq!(prop.status, Status::Executed);
    assert_matches!(
        dispatcher.execute(&session, &fx.proposal, id).await,
        Err(DeployError::ProposalClosed { .. })
    );
    Ok(())
}

#[tokio::test]
async fn admin_is_unusable_after_renounce() -> Result<()> {
    let suite = DeploySuite::init();
    let session = suite.host_session().await?;
    let fx = suite.dao_fixture(&session, GENESIS_AMOUNT).await?;
    let dispatcher = dispatcher();

    let mut admin = AdminAuthorizer::acquire(&session, &dispatcher, &fx.dao).await?;
    admin
        .authorize(&session, &dispatcher, "set item", vec![set_item(&fx.dao, "k", "v")])
        .await?;
    assert_eq!(item(&session, &fx.dao, "k").await, Some("v".to_string()));

    admin.renounce(&session, &dispatcher).await?;
    assert_eq!(dispatcher.admin(&session, &fx.dao).await?, None);
    assert_matches!(
        AdminAuthorizer::acquire(&session, &dispatcher, &fx.dao).await,
        Err(DeployError::AdminRenounced { contract }) if contract == fx.dao
    );
    Ok(())
}

#[tokio::test]
async fn nested_instantiation_is_found_in_events() -> Result<()> {
    let suite = DeploySuite::init();
    let session = suite.host_session().await?;
    let fx = suite.dao_fixture(&session, GENESIS_AMOUNT).await?;
    let dispatcher = dispatcher();
    let proxy_code_id = ContractDeployer::default()
        .upload(&session, artifacts::PROXY, suite.artifacts.get(artifacts::PROXY)?)
        .await?;

    let mut admin = AdminAuthorizer::acquire(&session, &dispatcher, &fx.dao).await?;
    let res = admin
        .authorize(&session, &dispatcher, "set item", vec![set_item(&fx.dao, "k", "v")])
        .await?;
    assert_matches!(
        dispatcher.extract_address(&res, INSTANTIATE_EVENT, CONTRACT_ADDR_KEY),
        Err(DeployError::EventNotFound { event_type, .. }) if event_type == INSTANTIATE_EVENT
    );

    let instantiate = CosmosMsg::Wasm(WasmMsg::Instantiate {
        admin: Some(fx.dao.clone()),
        code_id: proxy_code_id,
        msg: to_json_binary(&Empty {})?,
        funds: vec![],
        label: "dao proxy".to_string(),
    });
    let res = admin
        .authorize(&session, &dispatcher, "instantiate", vec![instantiate])
        .await?;
    let proxy = dispatcher.extract_address(&res, INSTANTIATE_EVENT, CONTRACT_ADDR_KEY)?;
    let info = session.contract_info(&proxy).await?;
    assert_eq!(info.code_id, proxy_code_id);
    assert_eq!(info.creator, fx.dao);
    assert_eq!(info.admin, Some(fx.dao.clone()));
    Ok(())
}

async fn proposal_count(session: &ChainSession, module: &str) -> usize {
    let list: ProposalListResponse = session
        .query(
            module,
            &ProposalQueryMsg::ReverseProposals {
                start_before: None,
                limit: None,
            },
        )
        .await
        .unwrap();
    list.proposals.len()
}

#[tokio::test]
async fn interrupted_passed_proposal_is_executed_not_duplicated() -> Result<()> {
    let suite = DeploySuite::init();
    let session = suite.host_session().await?;
    let fx = suite.dao_fixture(&session, GENESIS_AMOUNT).await?;
    let dispatcher = dispatcher();
    let msgs = vec![set_item(&fx.dao, "k", "v")];

    // an earlier attempt passed the proposal but never got the execute in
    let id = {
        let mut writer = dispatcher.writer(&fx.proposal)?;
        let id = dispatcher.propose(&session, &mut writer, "set item", "", msgs.clone()).await?;
        dispatcher.vote(&session, &fx.proposal, id, Vote::Yes).await?;
        id
    };
    assert_eq!(dispatcher.proposal(&session, &fx.proposal, id).await?.status, Status::Passed);

    let mut authorizer = GovernanceAuthorizer::new(dispatcher.writer(&fx.proposal)?);
    authorizer.authorize(&session, &dispatcher, "set item", msgs).await?;
    assert_eq!(authorizer.into_writer().last_id(), Some(id));
    assert_eq!(proposal_count(&session, &fx.proposal).await, 1);
    assert_eq!(dispatcher.proposal(&session, &fx.proposal, id).await?.status, Status::Executed);
    assert_eq!(item(&session, &fx.dao, "k").await, Some("v".to_string()));
    Ok(())
}

#[tokio::test]
async fn interrupted_open_proposal_is_voted_and_executed() -> Result<()> {
    let suite = DeploySuite::init();
    let session = suite.host_session().await?;
    let fx = suite.dao_fixture(&session, GENESIS_AMOUNT).await?;
    let dispatcher = dispatcher();
    let msgs = vec![set_item(&fx.dao, "k", "v")];

    let id = {
        let mut writer = dispatcher.writer(&fx.proposal)?;
        dispatcher.propose(&session, &mut writer, "set item", "", msgs.clone()).await?
    };

    let mut authorizer = GovernanceAuthorizer::new(dispatcher.writer(&fx.proposal)?);
    authorizer.authorize(&session, &dispatcher, "set item", msgs).await?;
    assert_eq!(proposal_count(&session, &fx.proposal).await, 1);
    assert_eq!(dispatcher.proposal(&session, &fx.proposal, id).await?.status, Status::Executed);

    // different messages get a fresh proposal
    let other = vec![set_item(&fx.dao, "k", "other")];
    authorizer.authorize(&session, &dispatcher, "set other", other).await?;
    assert_eq!(proposal_count(&session, &fx.proposal).await, 2);
    assert_eq!(item(&session, &fx.dao, "k").await, Some("other".to_string()));
    Ok(())
}
