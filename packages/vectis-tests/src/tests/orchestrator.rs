use assert_matches::assert_matches;
use vectis_wallet::ProposalListResponse;

use crate::common::common::*;

async fn deployed(suite: &DeploySuite, store: &dyn ManifestStore) -> Result<DeploymentManifest> {
    let orchestrator = suite.orchestrator().await?;
    orchestrator.run(store).await.map_err(|e| anyhow!(e))
}

fn addresses(manifest: &DeploymentManifest) -> Vec<String> {
    [
        &manifest.govec,
        &manifest.dao,
        &manifest.proposal_module,
        &manifest.voting,
        &manifest.staking,
        &manifest.factory,
        &manifest.dao_tunnel,
        &manifest.remote_tunnel,
        &manifest.remote_factory,
    ]
    .into_iter()
    .map(|r| r.as_ref().expect("deployed").address.clone())
    .collect()
}

#[tokio::test]
async fn full_deployment_hands_control_to_dao() -> Result<()> {
    let suite = DeploySuite::init();
    let store = suite.manifest_store();
    let manifest = deployed(&suite, &store).await?;

    assert_eq!(manifest.completed, Phase::ALL.to_vec());
    let addrs = addresses(&manifest);
    let mut distinct = addrs.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), addrs.len());
    let (host, remote) = addrs.split_at(7);
    assert!(host.iter().all(|a| a.starts_with("juno1")));
    assert!(remote.iter().all(|a| a.starts_with("wasm1")));

    let dao = manifest.dao()?.address.clone();
    let govec = manifest.govec()?.address.clone();
    assert_eq!(suite.host.contract(&govec).unwrap().admin, Some(dao.clone()));
    let remote_tunnel = manifest.remote_tunnel()?.address.clone();
    let remote_factory = suite.remote.contract(&manifest.remote_factory()?.address).unwrap();
    assert_eq!(remote_factory.admin, Some(remote_tunnel));

    let session = suite.host_session().await?;
    let balance: BalanceResponse = session
        .query(
            &govec,
            &GovecQueryMsg::Balance {
                address: manifest.deployer.clone(),
            },
        )
        .await?;
    assert_eq!(balance.balance, Uint128::zero());
    let admin: Option<Addr> = session.query(&dao, &DaoQueryMsg::Admin {}).await?;
    assert_eq!(admin, None);
    let config: GovecConfigResponse = session.query(&govec, &GovecQueryMsg::Config {}).await?;
    assert_eq!(config.dao, Some(Addr::unchecked(&dao)));

    assert_eq!(store.load().await?, Some(manifest.clone()));
    let flat = store.export_flat(&manifest).await?;
    let flat: std::collections::BTreeMap<String, String> =
        serde_json::from_slice(&std::fs::read(flat)?)?;
    assert_eq!(flat.get("govecAddr"), Some(&govec));
    assert_eq!(flat.get("hostChainId").map(String::as_str), Some(HOST_CHAIN_ID));
    Ok(())
}

#[tokio::test]
async fn completed_run_is_a_no_op() -> Result<()> {
    let suite = DeploySuite::init();
    let store = suite.manifest_store();
    let first = deployed(&suite, &store).await?;
    let broadcasts = (suite.host.broadcasts(), suite.remote.broadcasts());

    let second = deployed(&suite, &store).await?;
    assert_eq!(first, second);
    assert_eq!((suite.host.broadcasts(), suite.remote.broadcasts()), broadcasts);
    assert_eq!(suite.relayer.connections_created(), 1);
    Ok(())
}

#[tokio::test]
async fn fresh_manifest_reuses_connection_and_code() -> Result<()> {
    let suite = DeploySuite::init();
    let first = deployed(&suite, &MemoryManifestStore::new()).await?;
    let codes = (suite.host.code_count(), suite.remote.code_count());

    let second = deployed(&suite, &MemoryManifestStore::new()).await?;
    assert_eq!(suite.relayer.connections_created(), 1);
    assert_eq!(first.connection, second.connection);
    assert_eq!(first.host_code_ids, second.host_code_ids);
    assert_eq!((suite.host.code_count(), suite.remote.code_count()), codes);
    assert_ne!(first.govec()?.address, second.govec()?.address);
    assert_ne!(first.app_channel, second.app_channel);
    assert_eq!(first.transfer_channel, second.transfer_channel);
    Ok(())
}

#[tokio::test]
async fn verify_reports_admin_drift() -> Result<()> {
    let suite = DeploySuite::init();
    let manifest = deployed(&suite, &MemoryManifestStore::new()).await?;
    let orchestrator = suite.orchestrator().await?;
    orchestrator.verify(&manifest).await?;

    let other = DeploySuite::other_address(HOST_PREFIX);
    suite
        .host
        .force_contract_admin(&manifest.govec()?.address, Some(other.clone()));
    assert_matches!(
        orchestrator.verify(&manifest).await,
        Err(DeployError::ManifestInconsistency { field, found, .. })
            if field == "govec.admin" && found.contains(&other)
    );
    Ok(())
}

#[tokio::test]
async fn verify_reports_code_id_mismatch() -> Result<()> {
    let suite = DeploySuite::init();
    let mut manifest = deployed(&suite, &MemoryManifestStore::new()).await?;
    let orchestrator = suite.orchestrator().await?;

    manifest.remote_factory.as_mut().unwrap().code_id += 1;
    assert_matches!(
        orchestrator.verify(&manifest).await,
        Err(DeployError::ManifestInconsistency { field, .. }) if field == "remote_factory.code_id"
    );
    Ok(())
}

#[tokio::test]
async fn finalize_reruns_without_side_effects() -> Result<()> {
    let suite = DeploySuite::init();
    let store = MemoryManifestStore::new();
    let mut manifest = deployed(&suite, &store).await?;

    // as if the process died after finalize applied its changes
    manifest
        .completed
        .retain(|phase| !matches!(phase, Phase::Finalize | Phase::Verify));
    store.set(Some(manifest)).await;
    let broadcasts = suite.host.broadcasts();

    let resumed = deployed(&suite, &store).await?;
    assert_eq!(resumed.completed, Phase::ALL.to_vec());
    assert_eq!(suite.host.broadcasts(), broadcasts);
    Ok(())
}

#[tokio::test]
async fn stalled_relayer_fails_remote_factory_and_resumes() -> Result<()> {
    let suite = DeploySuite::init();
    let store = MemoryManifestStore::new();
    suite.relayer.stall(true);

    let orchestrator = suite.orchestrator().await?;
    let err = orchestrator.run(&store).await.unwrap_err();
    assert_eq!(err.phase, Phase::RemoteFactory);
    assert!(err.is_transient());
    assert_matches!(err.source, DeployError::Timeout { .. });
    let partial = store.get().await.expect("saved");
    assert!(partial.is_completed(Phase::Channels));
    assert!(!partial.is_completed(Phase::RemoteFactory));

    suite.relayer.stall(false);
    let manifest = orchestrator.run(&store).await?;
    assert_eq!(manifest.completed, Phase::ALL.to_vec());

    // the packet of the first attempt was delivered, nothing was proposed twice
    let proposals: ProposalListResponse = orchestrator
        .host()
        .query(
            &manifest.proposal_module()?.address,
            &ProposalQueryMsg::ReverseProposals {
                start_before: None,
                limit: None,
            },
        )
        .await?;
    assert_eq!(proposals.proposals.len(), 1);
    assert_eq!(proposals.proposals[0].status, Status::Executed);
    Ok(())
}

#[tokio::test]
async fn manifest_of_another_deployer_is_rejected() -> Result<()> {
    let suite = DeploySuite::init();
    let store = MemoryManifestStore::new();
    let other = DeploySuite::other_address(HOST_PREFIX);
    store
        .set(Some(DeploymentManifest::new(HOST_CHAIN_ID, REMOTE_CHAIN_ID, &other)))
        .await;

    let err = suite.orchestrator().await?.run(&store).await.unwrap_err();
    assert_eq!(err.phase, Phase::Upload);
    assert_matches!(
        err.source,
        DeployError::ManifestInconsistency { field, found, .. } if field == "deployer" && found == other
    );
    assert_eq!(suite.host.broadcasts(), 0);
    Ok(())
}

#[tokio::test]
async fn broadcast_outage_fails_the_phase_transiently() -> Result<()> {
    let suite = DeploySuite::init();
    let store = MemoryManifestStore::new();
    let orchestrator = suite.orchestrator().await?;

    suite.host.fail_broadcasts(1);
    let err = orchestrator.run(&store).await.unwrap_err();
    assert_eq!(err.phase, Phase::Upload);
    assert!(err.is_transient());
    assert_eq!(store.get().await, None);

    let manifest = orchestrator.run(&store).await?;
    assert_eq!(manifest.completed, Phase::ALL.to_vec());
    Ok(())
}

#[tokio::test]
async fn resume_without_connection_store_keeps_recorded_connection() -> Result<()> {
    let suite = DeploySuite::init();
    let store = MemoryManifestStore::new();
    suite.relayer.stall(true);
    let orchestrator = suite.orchestrator().await?;
    let err = orchestrator.run(&store).await.unwrap_err();
    assert_eq!(err.phase, Phase::RemoteFactory);

    std::fs::remove_file(suite.connection_store_path())?;
    suite.relayer.stall(false);
    let manifest = suite.orchestrator().await?.run(&store).await?;
    assert_eq!(manifest.completed, Phase::ALL.to_vec());
    assert_eq!(suite.relayer.connections_created(), 1);

    // the recovered connection is written back for the next run
    let stored = ConnectionStore::new(suite.connection_store_path())
        .load(HOST_CHAIN_ID, REMOTE_CHAIN_ID)
        .await?;
    assert_eq!(stored, manifest.connection);
    Ok(())
}
