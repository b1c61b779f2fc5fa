use assert_matches::assert_matches;
use vectis_deployer::RelayBackend;

use crate::common::common::*;

async fn link(suite: &DeploySuite) -> RelayLink {
    RelayLink::establish(
        suite.relayer.clone(),
        &ConnectionStore::new(suite.connection_store_path()),
        HOST_CHAIN_ID,
        REMOTE_CHAIN_ID,
    )
    .await
    .unwrap()
}

fn transfer_spec() -> ChannelSpec {
    ChannelSpec {
        host_port: ICS20_PORT.to_string(),
        remote_port: ICS20_PORT.to_string(),
        version: ICS20_VERSION.to_string(),
        order: ICS20_ORDER,
    }
}

/// A pinger on each chain, returns (host pinger, remote pinger)
async fn pingers(suite: &DeploySuite) -> (String, String) {
    let deployer = ContractDeployer::default();
    let mut addrs = vec![];
    for session in [suite.host_session().await.unwrap(), suite.remote_session().await.unwrap()] {
        let code_id = deployer
            .upload(&session, PINGER, &wasm(PINGER))
            .await
            .unwrap();
        let pinger = deployer
            .instantiate(&session, code_id, &Empty {}, "pinger", None, vec![])
            .await
            .unwrap();
        addrs.push(pinger.address);
    }
    (addrs[0].clone(), addrs[1].clone())
}

fn ping_spec(host: &str, remote: &str) -> ChannelSpec {
    ChannelSpec {
        host_port: wasm_port_id(host),
        remote_port: wasm_port_id(remote),
        version: PING_VERSION.to_string(),
        order: APP_ORDER,
    }
}

#[tokio::test]
async fn stored_connection_is_reused() {
    let suite = DeploySuite::init();
    let first = link(&suite).await;
    let second = link(&suite).await;

    assert_eq!(first.connection(), second.connection());
    assert_eq!(suite.relayer.connections_created(), 1);
}

#[tokio::test]
async fn closed_connection_is_replaced() {
    let suite = DeploySuite::init();
    let first = link(&suite).await;
    suite.host.close_connection(&first.connection().host_connection_id);

    let second = link(&suite).await;
    assert_ne!(first.connection(), second.connection());
    assert_eq!(suite.relayer.connections_created(), 2);

    let stored = ConnectionStore::new(suite.connection_store_path())
        .load(HOST_CHAIN_ID, REMOTE_CHAIN_ID)
        .await
        .unwrap();
    assert_eq!(stored.as_ref(), Some(second.connection()));
}

#[tokio::test]
async fn matching_channel_is_opened_once() {
    let suite = DeploySuite::init();
    let link = link(&suite).await;

    let first = link.open_channel(&transfer_spec()).await.unwrap();
    let second = link.open_channel(&transfer_spec()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.version, ICS20_VERSION);

    let channels = suite.relayer.channels(link.connection()).await.unwrap();
    assert_eq!(channels.len(), 1);
}

#[tokio::test]
async fn rejected_version_is_a_handshake_error() {
    let suite = DeploySuite::init();
    let link = link(&suite).await;
    let (host, remote) = pingers(&suite).await;

    let mut spec = ping_spec(&host, &remote);
    spec.version = IBC_APP_VERSION.to_string();
    let err = link.open_channel(&spec).await.unwrap_err();
    assert_matches!(
        err,
        DeployError::ChannelHandshake { ref host_port, ref reason, .. }
            if host_port == &wasm_port_id(&host) && reason.contains("version")
    );

    let mut spec = transfer_spec();
    spec.version = "ics20-2".to_string();
    assert_matches!(
        link.open_channel(&spec).await,
        Err(DeployError::ChannelHandshake { .. })
    );
}

#[tokio::test]
async fn drain_relays_and_acknowledges_everything() {
    let suite = DeploySuite::init();
    let link = link(&suite).await;
    let (host, remote) = pingers(&suite).await;
    let channel = link.open_channel(&ping_spec(&host, &remote)).await.unwrap();

    suite
        .host_session()
        .await
        .unwrap()
        .execute(&host, &PingerMsg::Ping { count: 3 }, vec![], &FeeMode::Auto)
        .await
        .unwrap();
    assert_eq!(link.pending(&channel).await.unwrap().len(), 3);

    let report = link.drain(&channel, &suite.config.relay.drain).await.unwrap();
    assert_eq!(report.relayed.received, 3);
    assert_eq!(report.relayed.acknowledged, 3);
    assert!(link.pending(&channel).await.unwrap().is_empty());

    let sent: PingerCounts = suite.host.query(&host, &PingerQuery::Counts {}).unwrap();
    let received: PingerCounts = suite.remote.query(&remote, &PingerQuery::Counts {}).unwrap();
    assert_eq!(sent.sent, 3);
    assert_eq!(sent.acked, 3);
    assert_eq!(received.received, 3);

    // nothing in flight is a no-op
    let report = link.drain(&channel, &suite.config.relay.drain).await.unwrap();
    assert_eq!(report.rounds, 0);
}

#[tokio::test]
async fn stalled_relayer_times_out() {
    let suite = DeploySuite::init();
    let link = link(&suite).await;
    let (host, remote) = pingers(&suite).await;
    let channel = link.open_channel(&ping_spec(&host, &remote)).await.unwrap();
    suite
        .host_session()
        .await
        .unwrap()
        .execute(&host, &PingerMsg::Ping { count: 1 }, vec![], &FeeMode::Auto)
        .await
        .unwrap();

    suite.relayer.stall(true);
    let err = link
        .drain(&channel, &suite.config.relay.drain)
        .await
        .unwrap_err();
    assert_matches!(err, DeployError::Timeout { .. });
    assert!(err.is_transient());

    suite.relayer.stall(false);
    let report = link.drain(&channel, &suite.config.relay.drain).await.unwrap();
    assert_eq!(report.relayed.received, 1);
}

#[tokio::test]
async fn single_attempt_drain_succeeds() {
    let suite = DeploySuite::init();
    let link = link(&suite).await;
    let (host, remote) = pingers(&suite).await;
    let channel = link.open_channel(&ping_spec(&host, &remote)).await.unwrap();
    suite
        .host_session()
        .await
        .unwrap()
        .execute(&host, &PingerMsg::Ping { count: 1 }, vec![], &FeeMode::Auto)
        .await
        .unwrap();

    let report = link.drain(&channel, &PollPolicy::fixed(1, 1)).await.unwrap();
    assert_eq!(report.rounds, 1);
    assert_eq!(report.relayed.acknowledged, 1);
    assert!(link.pending(&channel).await.unwrap().is_empty());
}

#[tokio::test]
async fn recorded_connection_is_recovered_without_store() {
    let suite = DeploySuite::init();
    let first = link(&suite).await;
    std::fs::remove_file(suite.connection_store_path()).unwrap();

    let store = ConnectionStore::new(suite.connection_store_path());
    let recovered = RelayLink::recover(
        suite.relayer.clone(),
        &store,
        HOST_CHAIN_ID,
        REMOTE_CHAIN_ID,
        first.connection().clone(),
    )
    .await
    .unwrap();
    assert_eq!(recovered.connection(), first.connection());
    assert_eq!(suite.relayer.connections_created(), 1);
    assert_eq!(
        store.load(HOST_CHAIN_ID, REMOTE_CHAIN_ID).await.unwrap().as_ref(),
        Some(first.connection())
    );

    suite.host.close_connection(&first.connection().host_connection_id);
    assert_matches!(
        RelayLink::recover(
            suite.relayer.clone(),
            &store,
            HOST_CHAIN_ID,
            REMOTE_CHAIN_ID,
            first.connection().clone(),
        )
        .await
        .err(),
        Some(DeployError::ManifestInconsistency { field, .. }) if field == "connection"
    );
    assert_eq!(suite.relayer.connections_created(), 1);
}
