//! Error envelope decoding and transport failures.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dropmirror_common::{Error, RemotePath};
use dropmirror_storage::dropbox::{ApiRequest, RestGateway};

use crate::common;

async fn failing_move(status: u16, body: ResponseTemplate) -> Error {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    Mock::given(method("POST"))
        .and(path("/2/files/move_v2"))
        .respond_with(body)
        .mount(&h.server)
        .await;

    let err = h
        .client
        .move_entry(
            &RemotePath::parse("/a").unwrap(),
            &RemotePath::parse("/b/a").unwrap(),
        )
        .await
        .unwrap_err();
    match &err {
        Error::Api { status: got, .. } => assert_eq!(*got, status),
        other => panic!("expected api error, got {:?}", other),
    }
    err
}

#[tokio::test]
async fn test_error_summary_is_preferred() {
    let err = failing_move(
        409,
        ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error_summary": "to/conflict/folder/..",
            "error": {".tag": "to", "to": {".tag": "conflict"}},
            "user_message": {"text": "There's already a folder there.", "locale": "en"}
        })),
    )
    .await;
    assert_eq!(err.to_string(), "to/conflict/folder/..");
}

#[tokio::test]
async fn test_error_and_description_without_summary() {
    let err = failing_move(
        400,
        ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_request",
            "error_description": "missing argument"
        })),
    )
    .await;
    assert_eq!(err.to_string(), "invalid_request missing argument");
}

#[tokio::test]
async fn test_raw_body_when_no_envelope() {
    let err = failing_move(
        503,
        ResponseTemplate::new(503).set_body_string("upstream unavailable"),
    )
    .await;
    assert_eq!(err.to_string(), "upstream unavailable");
}

#[tokio::test]
async fn test_transport_failure_is_network_error() {
    let server = MockServer::start().await;
    let url = format!("{}/2/files/delete_v2", server.uri());
    drop(server);

    let gateway = RestGateway::new(Duration::from_secs(5)).unwrap();
    let err = gateway.execute(ApiRequest::post(url)).await.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unexpected_success_body_is_serialization_error() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    Mock::given(method("POST"))
        .and(path("/2/files/delete_v2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&h.server)
        .await;

    let err = h
        .client
        .delete(&RemotePath::parse("/a").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
}
