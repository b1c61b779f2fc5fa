use assert_matches::assert_matches;

use crate::common::common::*;

#[tokio::test]
async fn upload_reuses_stored_code() {
    let suite = DeploySuite::init();
    let session = suite.host_session().await.unwrap();
    let deployer = ContractDeployer::default();
    let govec = suite.artifacts.get(artifacts::GOVEC).unwrap();

    let first = deployer.upload(&session, artifacts::GOVEC, govec).await.unwrap();
    let second = deployer.upload(&session, artifacts::GOVEC, govec).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(suite.host.code_count(), 1);
    assert_eq!(suite.host.broadcasts(), 1);

    let factory = suite.artifacts.get(artifacts::FACTORY).unwrap();
    let third = deployer.upload(&session, artifacts::FACTORY, factory).await.unwrap();
    assert_eq!(third, first + 1);
}

#[tokio::test]
async fn unknown_bytecode_is_an_upload_error() {
    let suite = DeploySuite::init();
    let session = suite.host_session().await.unwrap();

    let err = ContractDeployer::default()
        .upload(&session, "broken", b"not wasm")
        .await
        .unwrap_err();
    assert_matches!(
        err,
        DeployError::Upload { ref contract, ref reason }
            if contract == "broken" && reason.contains("invalid wasm")
    );
}

#[tokio::test]
async fn instantiate_reads_address_from_events() {
    let suite = DeploySuite::init();
    let session = suite.host_session().await.unwrap();
    let deployer = ContractDeployer::default();
    let code_id = deployer
        .upload(&session, artifacts::PROXY, suite.artifacts.get(artifacts::PROXY).unwrap())
        .await
        .unwrap();

    let admin = Some(session.signer_address().to_string());
    let a = deployer
        .instantiate(&session, code_id, &Empty {}, "proxy a", admin.clone(), vec![])
        .await
        .unwrap();
    let b = deployer
        .instantiate(&session, code_id, &Empty {}, "proxy b", None, vec![])
        .await
        .unwrap();

    assert!(a.address.starts_with("juno1"));
    assert_ne!(a.address, b.address);
    assert_eq!(a.code_id, code_id);
    assert_eq!(a.admin, admin);

    let info = session.contract_info(&a.address).await.unwrap();
    assert_eq!(info.code_id, code_id);
    assert_eq!(info.admin, admin);
    assert_eq!(info.label, "proxy a");
    assert_eq!(session.contract_info(&b.address).await.unwrap().admin, None);
}

#[tokio::test]
async fn rejected_init_is_an_instantiation_error() {
    let suite = DeploySuite::init();
    let session = suite.host_session().await.unwrap();
    let deployer = ContractDeployer::default();
    let code_id = deployer
        .upload(&session, artifacts::GOVEC, suite.artifacts.get(artifacts::GOVEC).unwrap())
        .await
        .unwrap();

    let err = deployer
        .instantiate(&session, code_id, &"not a govec init", "Govec", None, vec![])
        .await
        .unwrap_err();
    assert_matches!(err, DeployError::Instantiation { ref label, .. } if label == "Govec");
}
