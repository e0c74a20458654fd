//! Single-call endpoints: account, move, delete, create folder, upload.

use bytes::Bytes;
use wiremock::matchers::{body_bytes, body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

use dropmirror_common::{Error, RemotePath};
use dropmirror_storage::{WriteMode, MAX_UPLOAD_BYTES};

use crate::common::{self, file_json, folder_json};

#[tokio::test]
async fn test_current_account() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    Mock::given(method("POST"))
        .and(path("/2/users/get_current_account"))
        .and(header("authorization", "Bearer sl.test-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "account_id": "dbid:AAH4f99T0taONIb-OurWxbNQ6ywGRopQngc",
            "name": {"given_name": "Franz", "surname": "Ferdinand", "display_name": "Franz Ferdinand (Personal)"},
            "email": "franz@example.com",
            "country": "US",
            "profile_photo_url": "https://dl-web.dropbox.com/account_photo/get/x",
            "root_info": {".tag": "user", "root_namespace_id": "3235641", "home_namespace_id": "3235641"}
        })))
        .mount(&h.server)
        .await;

    let account = h.client.current_account().await.unwrap();
    assert_eq!(account.display_name, "Franz Ferdinand (Personal)");
    assert_eq!(account.email, "franz@example.com");
    assert_eq!(account.country.as_deref(), Some("US"));
    assert_eq!(account.home_namespace_id.as_deref(), Some("3235641"));
}

#[tokio::test]
async fn test_profile_photo_is_fetched_without_token() {
    let h = common::setup().await;
    Mock::given(method("GET"))
        .and(path("/photo.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xd8, 0xff]))
        .mount(&h.server)
        .await;

    let photo = h
        .client
        .fetch_profile_photo(&format!("{}/photo.jpg", h.server.uri()))
        .await
        .unwrap();
    assert_eq!(photo.as_ref(), &[0xff, 0xd8, 0xff]);
    assert_eq!(common::hits(&h.server, "/oauth2/token").await, 0);
}

#[tokio::test]
async fn test_move_returns_authoritative_metadata() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    Mock::given(method("POST"))
        .and(path("/2/files/move_v2"))
        .and(body_partial_json(serde_json::json!({
            "from_path": "/A/x.txt",
            "to_path": "/B/x.txt",
            "autorename": true,
            "allow_ownership_transfer": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": file_json("id:x", "/B/x.txt", 7)
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let entry = h
        .client
        .move_entry(
            &RemotePath::parse("/A/x.txt").unwrap(),
            &RemotePath::parse("/B/x.txt").unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(entry.id.as_str(), "id:x");
    assert_eq!(entry.path_display, "/B/x.txt");
}

#[tokio::test]
async fn test_create_folder_untagged_metadata() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    let mut folder = folder_json("id:new", "/Projects/New");
    folder.as_object_mut().unwrap().remove(".tag");
    Mock::given(method("POST"))
        .and(path("/2/files/create_folder_v2"))
        .and(body_partial_json(serde_json::json!({"path": "/Projects/New", "autorename": true})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"metadata": folder})),
        )
        .mount(&h.server)
        .await;

    let entry = h
        .client
        .create_folder(&RemotePath::parse("/Projects/New").unwrap())
        .await
        .unwrap();
    assert!(entry.is_folder());
    assert_eq!(entry.name, "New");
}

#[tokio::test]
async fn test_delete_single() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    Mock::given(method("POST"))
        .and(path("/2/files/delete_v2"))
        .and(body_partial_json(serde_json::json!({"path": "/a.txt"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": file_json("id:a", "/a.txt", 1)
        })))
        .mount(&h.server)
        .await;

    let entry = h
        .client
        .delete(&RemotePath::parse("/a.txt").unwrap())
        .await
        .unwrap();
    assert_eq!(entry.id.as_str(), "id:a");
}

#[tokio::test]
async fn test_upload_sends_argument_header_and_body() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .and(header("content-type", "application/octet-stream"))
        .and(header_exists("dropbox-api-arg"))
        .and(body_bytes(b"hello".to_vec()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(file_json("id:u", "/Docs/über.txt", 5)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let entry = h
        .client
        .upload(
            &RemotePath::parse("/Docs/über.txt").unwrap(),
            Bytes::from_static(b"hello"),
            WriteMode::Overwrite,
        )
        .await
        .unwrap();
    assert_eq!(entry.size(), 5);

    let requests = h.server.received_requests().await.unwrap();
    let upload = requests
        .iter()
        .find(|r| r.url.path() == "/2/files/upload")
        .unwrap();
    let arg = upload.headers.get("dropbox-api-arg").unwrap().to_str().unwrap();
    assert_eq!(
        arg,
        r#"{"path":"/Docs/\u00fcber.txt","mode":"overwrite","autorename":false,"mute":false}"#
    );
}

#[tokio::test]
async fn test_oversized_upload_makes_no_request() {
    let h = common::setup().await;
    Mock::given(method("POST"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .client
        .upload(
            &RemotePath::parse("/big.bin").unwrap(),
            Bytes::from(vec![0u8; MAX_UPLOAD_BYTES + 1]),
            WriteMode::Add,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_move_onto_taken_name_returns_service_choice() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    Mock::given(method("POST"))
        .and(path("/2/files/move_v2"))
        .and(body_partial_json(serde_json::json!({
            "to_path": "/B/x.txt",
            "autorename": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": file_json("id:x", "/B/x (1).txt", 7)
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let entry = h
        .client
        .move_entry(
            &RemotePath::parse("/A/x.txt").unwrap(),
            &RemotePath::parse("/B/x.txt").unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(entry.path_display, "/B/x (1).txt");
}
