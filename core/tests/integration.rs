//! End-to-end conditional caching against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives `BcxClient` with its
//! default `UreqTransport` over real HTTP. The server's per-method hit
//! counters show which round-trips actually reached the wire.

use std::net::SocketAddr;

use bcx_core::{BcxClient, ClientConfig, Credential, FetchError, Fetched};
use mock_server::{
    Method, MockApi, ACCESS_TOKEN, AUTH_CODE, BROKEN_PATH, CALENDARS_PATH, CLIENT_ID, CLIENT_SECRET, PEOPLE_PATH,
    PROJECTS_PATH, THROTTLED_PATH,
};
use serde_json::json;

fn start_server(api: MockApi) -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, api).await
        })
        .unwrap();
    });

    addr
}

fn config(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(CLIENT_ID, CLIENT_SECRET, "https://app.test/callback", "Integration (tests@app.test)")
        .with_token_url(format!("http://{addr}/authorization/token"))
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

#[test]
fn conditional_fetch_lifecycle() {
    let api = MockApi::default();
    let addr = start_server(api.clone());
    let mut client = BcxClient::new(config(addr)).unwrap();

    // Step 1: unauthenticated: rejected without touching the server.
    let err = client.get_json(&url(addr, PROJECTS_PATH)).unwrap_err();
    assert!(matches!(err, FetchError::Unauthorized));
    assert_eq!(api.hits(&Method::GET) + api.hits(&Method::HEAD), 0);

    // Step 2: exchange the authorization code.
    let credential = client.exchange_code(AUTH_CODE).unwrap();
    assert_eq!(credential.access_token(), Some(ACCESS_TOKEN));
    assert!(client.is_authenticated());
    assert_eq!(api.hits(&Method::POST), 1);

    // Step 3: cold fetch: one GET, response cached.
    let projects = url(addr, PROJECTS_PATH);
    let first = client.get_json(&projects).unwrap();
    assert!(!first.is_cached());
    assert_eq!(first.value()[0]["name"], "Launch");
    assert_eq!(api.hits(&Method::GET), 1);
    assert_eq!(api.hits(&Method::HEAD), 0);

    // Step 4: warm fetch: one HEAD answered with 304, no second GET.
    let second = client.get_json(&projects).unwrap();
    assert!(second.is_cached());
    assert_eq!(second.value(), first.value());
    assert_eq!(api.hits(&Method::GET), 1);
    assert_eq!(api.hits(&Method::HEAD), 1);

    // Step 5: server-side change: HEAD sees 200, GET fetches the new body.
    api.put_resource(PROJECTS_PATH, json!([{"id": 3, "name": "Relaunch"}]), Some("\"projects-v2\""), None);
    let third = client.get_json(&projects).unwrap();
    assert_eq!(third, Fetched::Network(json!([{"id": 3, "name": "Relaunch"}])));
    assert_eq!(api.hits(&Method::GET), 2);
    assert_eq!(api.hits(&Method::HEAD), 2);

    // Step 6: the new version is cached in turn.
    assert!(client.get_json(&projects).unwrap().is_cached());
    assert_eq!(api.hits(&Method::GET), 2);
}

#[test]
fn resource_without_validators_always_refetches() {
    let api = MockApi::default();
    let addr = start_server(api.clone());
    let client = BcxClient::new(config(addr))
        .unwrap()
        .with_credential(Credential::from_access_token(ACCESS_TOKEN));

    let people = url(addr, PEOPLE_PATH);
    for _ in 0..3 {
        assert!(!client.get_json(&people).unwrap().is_cached());
    }
    assert_eq!(api.hits(&Method::GET), 3);
    assert_eq!(api.hits(&Method::HEAD), 0);
}

#[test]
fn last_modified_revalidation() {
    let api = MockApi::default();
    let addr = start_server(api.clone());
    let client = BcxClient::new(config(addr))
        .unwrap()
        .with_credential(Credential::from_access_token(ACCESS_TOKEN));

    let calendars = url(addr, CALENDARS_PATH);
    client.get_json(&calendars).unwrap();
    let again = client.get_json(&calendars).unwrap();
    assert!(again.is_cached());
    assert_eq!(again.value()[0]["name"], "Releases");
    assert_eq!(api.hits(&Method::GET), 1);
    assert_eq!(api.hits(&Method::HEAD), 1);
}

#[test]
fn error_statuses_are_surfaced() {
    let api = MockApi::default();
    let addr = start_server(api.clone());
    let client = BcxClient::new(config(addr))
        .unwrap()
        .with_credential(Credential::from_access_token(ACCESS_TOKEN));

    let err = client.get_json(&url(addr, THROTTLED_PATH)).unwrap_err();
    assert!(matches!(err, FetchError::RateLimited { retry_after: Some(30) }));

    let err = client.get_json(&url(addr, BROKEN_PATH)).unwrap_err();
    assert!(matches!(err, FetchError::Api { status: 500, .. }));

    let err = client.get_json(&url(addr, "/999/api/v1/missing.json")).unwrap_err();
    assert!(matches!(err, FetchError::Api { status: 404, .. }));

    api.revoke_token(ACCESS_TOKEN);
    let err = client.get_json(&url(addr, PROJECTS_PATH)).unwrap_err();
    assert!(matches!(err, FetchError::Unauthorized));
}

#[test]
fn rejected_code_leaves_client_unauthenticated() {
    let api = MockApi::default();
    let addr = start_server(api.clone());
    let mut client = BcxClient::new(config(addr)).unwrap();

    assert!(matches!(client.exchange_code("not-a-code"), Err(FetchError::Unauthorized)));
    assert!(!client.is_authenticated());
    assert_eq!(api.hits(&Method::POST), 1);
}

#[test]
fn unreachable_server_is_a_transport_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let client = BcxClient::new(config(addr))
        .unwrap()
        .with_credential(Credential::from_access_token(ACCESS_TOKEN));

    let err = client.get_json(&url(addr, PROJECTS_PATH)).unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
}
