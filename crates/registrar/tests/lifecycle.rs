//! Account lifecycle scenarios end to end over HTTP.

mod common;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use acme_registrar::problem::{
    ACCOUNT_DOES_NOT_EXIST, EXTERNAL_ACCOUNT_REQUIRED, UNAUTHORIZED,
};
use acme_registrar::{
    AccountManager, AccountSpec, AccountStatus, AccountStore, ApplyOutcome, ClientError,
    ClientFactory, Deletion, ExternalAccountBinding, FileAccountStore, Reconciler, Refreshed,
    Registrar, RegistrarError,
};

use common::*;

fn spec(eab: Option<ExternalAccountBinding>) -> AccountSpec {
    AccountSpec::new(account_key(), "admin@example.com", eab)
}

#[tokio::test]
async fn test_create_then_refresh() {
    let server = MockServer::start().await;
    mount_directory(&server, false).await;
    mount_new_account(&server).await;
    Mock::given(method("POST"))
        .and(path(ACCOUNT_PATH))
        .and(PostAsGet)
        .respond_with(valid_account())
        .mount(&server)
        .await;

    let spec = spec(None);
    let client = factory(&server).build_client(spec.key(), None).await.unwrap();

    let record = Registrar::new(&client).create(spec).await.unwrap();
    assert_eq!(record.account_url(), account_url(&server));
    assert_eq!(record.spec().email(), "admin@example.com");

    let refreshed = Reconciler::new(&client)
        .refresh(record.account_url())
        .await
        .unwrap();
    match refreshed {
        Refreshed::Present(registration) => assert_eq!(registration.status, AccountStatus::Valid),
        Refreshed::Absent => panic!("account should be present"),
    }
}

#[tokio::test]
async fn test_refresh_of_unknown_account_is_absent() {
    let server = MockServer::start().await;
    mount_directory(&server, false).await;
    Mock::given(method("POST"))
        .and(path(ACCOUNT_PATH))
        .respond_with(problem(400, ACCOUNT_DOES_NOT_EXIST, "No account exists with the provided key"))
        .mount(&server)
        .await;

    let url = account_url(&server);
    let client = factory(&server)
        .build_client(&account_key(), Some(&url))
        .await
        .unwrap();

    let refreshed = Reconciler::new(&client).refresh(&url).await.unwrap();
    assert_eq!(refreshed, Refreshed::Absent);
}

#[tokio::test]
async fn test_refresh_surfaces_server_errors() {
    let server = MockServer::start().await;
    mount_directory(&server, false).await;
    Mock::given(method("POST"))
        .and(path(ACCOUNT_PATH))
        .respond_with(problem(500, "urn:ietf:params:acme:error:serverInternal", "boom"))
        .mount(&server)
        .await;

    let url = account_url(&server);
    let client = factory(&server)
        .build_client(&account_key(), Some(&url))
        .await
        .unwrap();

    let err = Reconciler::new(&client).refresh(&url).await.unwrap_err();
    assert!(matches!(err, RegistrarError::Refresh(_)));
}

#[tokio::test]
async fn test_refresh_of_malformed_account_object_is_fatal() {
    let bodies = [
        ResponseTemplate::new(200),
        ResponseTemplate::new(200).set_body_json(serde_json::json!({})),
    ];

    for body in bodies {
        let server = MockServer::start().await;
        mount_directory(&server, false).await;
        Mock::given(method("POST"))
            .and(path(ACCOUNT_PATH))
            .respond_with(body)
            .mount(&server)
            .await;

        let url = account_url(&server);
        let client = factory(&server)
            .build_client(&account_key(), Some(&url))
            .await
            .unwrap();

        let err = Reconciler::new(&client).refresh(&url).await.unwrap_err();
        assert!(matches!(
            err,
            RegistrarError::Refresh(ClientError::InvalidResponse(_))
        ));
    }
}

#[tokio::test]
async fn test_refresh_of_unrecognised_status_is_absent() {
    let server = MockServer::start().await;
    mount_directory(&server, false).await;
    Mock::given(method("POST"))
        .and(path(ACCOUNT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "archived"})),
        )
        .mount(&server)
        .await;

    let url = account_url(&server);
    let client = factory(&server)
        .build_client(&account_key(), Some(&url))
        .await
        .unwrap();

    let refreshed = Reconciler::new(&client).refresh(&url).await.unwrap();
    assert_eq!(refreshed, Refreshed::Absent);
}

#[tokio::test]
async fn test_malformed_refresh_keeps_stored_record() {
    let server = MockServer::start().await;
    mount_directory(&server, false).await;
    mount_new_account(&server).await;
    Mock::given(method("POST"))
        .and(path(ACCOUNT_PATH))
        .respond_with(valid_account())
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ACCOUNT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = FileAccountStore::new(dir.path()).unwrap();
    let manager = AccountManager::new(factory(&server), store);

    let outcome = manager.apply("primary", spec(None)).await.unwrap();
    assert!(matches!(outcome, ApplyOutcome::Created(_)));

    let err = manager.read("primary").await.unwrap_err();
    assert!(matches!(
        err,
        RegistrarError::Refresh(ClientError::InvalidResponse(_))
    ));
    let record = manager.store().load("primary").unwrap().unwrap();
    assert_eq!(record.account_url(), account_url(&server));
}

#[tokio::test]
async fn test_eab_required_ca() {
    let server = MockServer::start().await;
    mount_directory(&server, true).await;
    Mock::given(method("POST"))
        .and(path("/acme/new-acct"))
        .and(PayloadHas("externalAccountBinding"))
        .respond_with(created_account(&server))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/acme/new-acct"))
        .respond_with(problem(
            400,
            EXTERNAL_ACCOUNT_REQUIRED,
            "This CA requires external account binding",
        ))
        .mount(&server)
        .await;

    // without a binding the CA rejection comes back unchanged
    let plain = spec(None);
    let client = factory(&server).build_client(plain.key(), None).await.unwrap();
    let err = Registrar::new(&client).create(plain).await.unwrap_err();
    assert!(matches!(err, RegistrarError::Registration(_)));
    assert_eq!(
        err.problem().map(|p| p.problem_type.as_str()),
        Some(EXTERNAL_ACCOUNT_REQUIRED)
    );

    let bound = spec(Some(ExternalAccountBinding::new("K1", "aGVsbG8=")));
    let client = factory(&server).build_client(bound.key(), None).await.unwrap();
    let record = Registrar::new(&client).create(bound).await.unwrap();
    assert_eq!(record.account_url(), account_url(&server));
}

#[tokio::test]
async fn test_malformed_hmac_never_reaches_ca() {
    let server = MockServer::start().await;
    mount_directory(&server, true).await;
    mount_new_account(&server).await;

    let bound = spec(Some(ExternalAccountBinding::new("K1", "!!not base64!!")));
    let client = factory(&server).build_client(bound.key(), None).await.unwrap();
    let err = Registrar::new(&client).create(bound).await.unwrap_err();

    assert!(matches!(err, RegistrarError::InvalidExternalAccountBinding(_)));
    assert!(requests_to(&server, "/acme/new-acct").await.is_empty());
}

#[tokio::test]
async fn test_delete_twice_succeeds() {
    let server = MockServer::start().await;
    mount_directory(&server, false).await;
    Mock::given(method("POST"))
        .and(path(ACCOUNT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "deactivated"})),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ACCOUNT_PATH))
        .respond_with(problem(
            403,
            UNAUTHORIZED,
            "Account is not valid, has status \"deactivated\"",
        ))
        .mount(&server)
        .await;

    let url = account_url(&server);
    let client = factory(&server)
        .build_client(&account_key(), Some(&url))
        .await
        .unwrap();
    let registrar = Registrar::new(&client);

    assert_eq!(registrar.delete(&url).await.unwrap(), Deletion::Deactivated);
    assert_eq!(registrar.delete(&url).await.unwrap(), Deletion::AlreadyGone);
}

#[tokio::test]
async fn test_delete_surfaces_rate_limits() {
    let server = MockServer::start().await;
    mount_directory(&server, false).await;
    Mock::given(method("POST"))
        .and(path(ACCOUNT_PATH))
        .respond_with(problem(429, "urn:ietf:params:acme:error:rateLimited", "slow down"))
        .mount(&server)
        .await;

    let url = account_url(&server);
    let client = factory(&server)
        .build_client(&account_key(), Some(&url))
        .await
        .unwrap();

    let err = Registrar::new(&client).delete(&url).await.unwrap_err();
    assert!(matches!(err, RegistrarError::Deactivation(_)));
}

#[tokio::test]
async fn test_manager_with_file_store() {
    let server = MockServer::start().await;
    mount_directory(&server, false).await;
    mount_new_account(&server).await;
    Mock::given(method("POST"))
        .and(path(ACCOUNT_PATH))
        .and(PostAsGet)
        .respond_with(valid_account())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ACCOUNT_PATH))
        .and(PayloadHas("status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "deactivated"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = FileAccountStore::new(dir.path()).unwrap();
    let manager = AccountManager::new(factory(&server), store);

    let spec = spec(None);
    let key_pem = spec.key().pem().to_string();
    let outcome = manager.apply("primary", spec).await.unwrap();
    assert!(matches!(outcome, ApplyOutcome::Created(_)));
    assert_eq!(outcome.state().account_url, account_url(&server));
    assert!(dir.path().join("accounts/primary.json").exists());

    // same inputs: nothing to do beyond a refresh
    let again = AccountSpec::new(
        acme_registrar::AccountKey::from_pem(key_pem),
        "admin@example.com",
        None,
    );
    let outcome = manager.apply("primary", again).await.unwrap();
    assert!(matches!(outcome, ApplyOutcome::Unchanged(_)));
    assert_eq!(requests_to(&server, "/acme/new-acct").await.len(), 1);

    let state = manager.read("primary").await.unwrap().unwrap();
    assert_eq!(state.registration.status, AccountStatus::Valid);

    assert_eq!(
        manager.destroy("primary").await.unwrap(),
        Some(Deletion::Deactivated)
    );
    assert!(manager.store().load("primary").unwrap().is_none());
    assert!(!dir.path().join("accounts/primary.json").exists());
}
