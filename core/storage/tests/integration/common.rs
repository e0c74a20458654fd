//! Shared helpers: a mock server plus a client wired to it on a manual clock.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dropmirror_common::Secret;
use dropmirror_storage::dropbox::{
    AppCredentials, DropboxClient, DropboxConfig, DropboxEndpoints, DropboxStore, ManualClock,
    PollPolicy, RestGateway, TokenManager,
};

pub const ACCESS_TOKEN: &str = "sl.test-access";
pub const START: i64 = 1_700_000_000;

pub struct Harness {
    pub server: MockServer,
    pub clock: Arc<ManualClock>,
    pub client: DropboxClient,
}

/// Start a mock server and a client whose refresh token is `refresh-1`.
pub async fn setup() -> Harness {
    let server = MockServer::start().await;
    let clock = Arc::new(ManualClock::new(START));
    let client = client_for(&server, clock.clone(), "refresh-1");
    Harness {
        server,
        clock,
        client,
    }
}

pub fn client_for(server: &MockServer, clock: Arc<ManualClock>, refresh: &str) -> DropboxClient {
    let endpoints = DropboxEndpoints::single_host(server.uri());
    let gateway = Arc::new(RestGateway::new(Duration::from_secs(10)).unwrap());
    let tokens = Arc::new(
        TokenManager::new(
            gateway.clone(),
            endpoints.clone(),
            AppCredentials::new("app-key", "app-secret"),
            Secret::new(refresh),
        )
        .with_clock(clock),
    );
    DropboxClient::new(gateway, tokens, endpoints)
}

/// A store over a fresh harness client that polls every 10ms.
pub fn fast_store(harness: Harness, max_polls: u32) -> (MockServer, DropboxStore) {
    let config = DropboxConfig {
        endpoints: DropboxEndpoints::single_host(harness.server.uri()),
        poll: PollPolicy {
            interval_ms: 10,
            max_polls,
            deadline_secs: None,
        },
        ..DropboxConfig::default()
    };
    let store = DropboxStore::from_client(harness.client, &config);
    (harness.server, store)
}

/// Mount the token endpoint handing out tokens valid for `expires_in` seconds.
pub async fn mount_token(server: &MockServer, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": ACCESS_TOKEN,
            "expires_in": expires_in,
            "token_type": "bearer"
        })))
        .mount(server)
        .await;
}

/// Number of requests the server received on `route`.
pub async fn hits(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

pub fn file_json(id: &str, path_display: &str, size: u64) -> serde_json::Value {
    let name = path_display.rsplit('/').next().unwrap_or_default();
    serde_json::json!({
        ".tag": "file",
        "id": id,
        "name": name,
        "path_display": path_display,
        "path_lower": path_display.to_lowercase(),
        "size": size,
        "rev": "0123456789abcdef",
        "content_hash": "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        "server_modified": "2024-03-01T12:00:00Z"
    })
}

pub fn folder_json(id: &str, path_display: &str) -> serde_json::Value {
    let name = path_display.rsplit('/').next().unwrap_or_default();
    serde_json::json!({
        ".tag": "folder",
        "id": id,
        "name": name,
        "path_display": path_display,
        "path_lower": path_display.to_lowercase()
    })
}
