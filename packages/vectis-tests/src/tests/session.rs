use assert_matches::assert_matches;
use vectis_deployer::Msg;

use crate::common::common::*;

fn store_code(name: &str) -> Msg {
    Msg::StoreCode {
        wasm: Binary::from(wasm(name)),
    }
}

/// Instantiates a code id the chain never stored
fn unknown_code() -> Msg {
    CosmosMsg::Wasm(WasmMsg::Instantiate {
        admin: None,
        code_id: 99,
        msg: Binary::from(b"{}".as_slice()),
        funds: vec![],
        label: "missing".to_string(),
    })
    .into()
}

#[tokio::test]
async fn connect_rejects_endpoint_of_another_chain() {
    let suite = DeploySuite::init();
    let mut config = suite.config.host.clone();
    config.chain_id = "osmo-1".to_string();

    let err = ChainSession::connect(config, &suite.creds, Arc::new(suite.host.clone()))
        .await
        .unwrap_err();
    assert_matches!(err, DeployError::Connection { ref chain_id, .. } if chain_id == "osmo-1");
    assert!(err.is_transient());
}

#[tokio::test]
async fn connect_fails_on_unreachable_endpoint() {
    let suite = DeploySuite::init();
    suite.host.set_unreachable(true);
    assert_matches!(
        suite.host_session().await,
        Err(DeployError::Connection { .. })
    );
}

#[tokio::test]
async fn concurrent_submits_use_consecutive_sequences() {
    let suite = DeploySuite::init();
    let session = suite.host_session().await.unwrap();

    let (a, b) = tokio::join!(
        session.submit_tx(vec![store_code(artifacts::GOVEC)], &FeeMode::Auto),
        session.submit_tx(vec![store_code(artifacts::FACTORY)], &FeeMode::Auto),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.hash, b.hash);
    assert_eq!(suite.host.sequence(session.signer_address()), 2);
    assert_eq!(suite.host.code_count(), 2);
}

#[tokio::test]
async fn inclusion_wait_times_out() {
    let suite = DeploySuite::init();
    let session = suite.host_session().await.unwrap();
    suite.host.set_inclusion_delay(1_000);

    let err = session
        .submit_tx(vec![store_code(artifacts::GOVEC)], &FeeMode::Auto)
        .await
        .unwrap_err();
    assert_matches!(err, DeployError::Timeout { attempts: 10, .. });
    assert!(err.is_transient());
    // a timeout says nothing about the tx itself, it was accepted
    assert_eq!(suite.host.sequence(session.signer_address()), 1);
}

#[tokio::test]
async fn simulation_failure_carries_chain_log() {
    let suite = DeploySuite::init();
    let session = suite.host_session().await.unwrap();

    let err = session
        .submit_tx(vec![unknown_code()], &FeeMode::Auto)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        DeployError::Execution { ref hash, code: 5, ref log }
            if hash.is_empty() && log.contains("code 99 not found")
    );
    assert!(!err.is_transient());
    assert_eq!(suite.host.broadcasts(), 0);
}

#[tokio::test]
async fn delivered_failure_carries_hash_and_log() {
    let suite = DeploySuite::init();
    let session = suite.host_session().await.unwrap();
    let fee = FeeMode::Fixed {
        gas_limit: 200_000,
        amount: vec![coin(5_000, HOST_DENOM)],
    };

    let err = session
        .submit_tx(vec![store_code(artifacts::GOVEC), unknown_code()], &fee)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        DeployError::Execution { ref hash, code: 5, ref log }
            if !hash.is_empty() && log.contains("message index: 1")
    );
    // the whole tx reverted, the sequence was still consumed
    assert_eq!(suite.host.code_count(), 0);
    assert_eq!(suite.host.sequence(session.signer_address()), 1);
}

#[tokio::test]
async fn fee_in_wrong_denom_is_rejected() {
    let suite = DeploySuite::init();
    let session = suite.host_session().await.unwrap();
    let fee = FeeMode::Fixed {
        gas_limit: 200_000,
        amount: vec![coin(5_000, REMOTE_DENOM)],
    };

    assert_matches!(
        session.submit_tx(vec![store_code(artifacts::GOVEC)], &fee).await,
        Err(DeployError::Execution { code: 13, .. })
    );
}

#[tokio::test]
async fn broadcast_failure_is_transient_and_recoverable() {
    let suite = DeploySuite::init();
    let session = suite.host_session().await.unwrap();
    suite.host.fail_broadcasts(1);

    let err = session
        .submit_tx(vec![store_code(artifacts::GOVEC)], &FeeMode::Auto)
        .await
        .unwrap_err();
    assert_matches!(err, DeployError::Broadcast { ref chain_id, .. } if chain_id == HOST_CHAIN_ID);
    assert!(err.is_transient());

    let res = session
        .submit_tx(vec![store_code(artifacts::GOVEC)], &FeeMode::Auto)
        .await
        .unwrap();
    assert!(res.is_ok());
    assert_eq!(suite.host.sequence(session.signer_address()), 1);
}
