//! Paginated listing through list_folder and list_folder/continue.

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use dropmirror_common::{Error, RemotePath};
use dropmirror_storage::dropbox::ListOptions;

use crate::common::{self, file_json, folder_json};

#[tokio::test]
async fn test_two_pages_yield_three_entries_in_order() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .and(header("authorization", "Bearer sl.test-access"))
        .and(body_partial_json(serde_json::json!({"path": "/Docs", "recursive": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [folder_json("id:a", "/Docs/A"), file_json("id:b", "/Docs/b.txt", 3)],
            "cursor": "c1",
            "has_more": true
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .and(body_partial_json(serde_json::json!({"cursor": "c1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [file_json("id:c", "/Docs/c.txt", 5)],
            "cursor": "c2",
            "has_more": false
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let entries = h
        .client
        .list_folder(&RemotePath::parse("/Docs").unwrap(), ListOptions::default())
        .await
        .unwrap();

    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["id:a", "id:b", "id:c"]);
    assert!(entries[0].is_folder());
    assert_eq!(entries[2].size(), 5);
    assert_eq!(common::hits(&h.server, "/2/files/list_folder").await, 1);
    assert_eq!(common::hits(&h.server, "/2/files/list_folder/continue").await, 1);
}

#[tokio::test]
async fn test_token_is_checked_before_every_page() {
    let h = common::setup().await;
    // A 10 second token is never inside the safety window.
    common::mount_token(&h.server, 10).await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [], "cursor": "c1", "has_more": true
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [], "cursor": "c2", "has_more": false
        })))
        .mount(&h.server)
        .await;

    h.client
        .list_folder(&RemotePath::root(), ListOptions::default())
        .await
        .unwrap();
    assert_eq!(common::hits(&h.server, "/oauth2/token").await, 2);
}

#[tokio::test]
async fn test_root_is_listed_as_empty_path() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .and(body_partial_json(serde_json::json!({"path": "", "recursive": true, "limit": 50})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [
                folder_json("id:a", "/A"),
                {".tag": "deleted", "name": "old", "path_display": "/old"}
            ],
            "cursor": "c1",
            "has_more": false
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let entries = h
        .client
        .list_folder(
            &RemotePath::root(),
            ListOptions {
                recursive: true,
                limit: 50,
            },
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_failed_page_discards_everything() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [file_json("id:a", "/a.txt", 1)], "cursor": "c1", "has_more": true
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error_summary": "reset/..",
            "error": {".tag": "reset"}
        })))
        .mount(&h.server)
        .await;

    let err = h
        .client
        .list_folder(&RemotePath::root(), ListOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 409, ref message } if message == "reset/.."));
}

#[tokio::test]
async fn test_reused_cursor_stops_the_listing() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [], "cursor": "c1", "has_more": true
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [], "cursor": "c1", "has_more": true
        })))
        .mount(&h.server)
        .await;

    let err = h
        .client
        .list_folder(&RemotePath::root(), ListOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(common::hits(&h.server, "/2/files/list_folder/continue").await, 1);
}
