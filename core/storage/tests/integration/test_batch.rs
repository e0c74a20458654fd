//! Batch delete submission and job polling.

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dropmirror_common::{Error, RemotePath};
use dropmirror_storage::{DeleteResult, RemoteStore};

use crate::common::{self, file_json, folder_json};

const CHECK: &str = "/2/files/delete_batch/check";

fn paths(raw: &[&str]) -> Vec<RemotePath> {
    raw.iter().map(|p| RemotePath::parse(p).unwrap()).collect()
}

async fn mount_launch(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/2/files/delete_batch"))
        .and(body_partial_json(serde_json::json!({
            "entries": [{"path": "/A"}, {"path": "/b.txt"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            ".tag": "async_job_id",
            "async_job_id": "dbjid:job-1"
        })))
        .mount(server)
        .await;
}

async fn mount_in_progress(server: &MockServer, times: Option<u64>) {
    let mock = Mock::given(method("POST"))
        .and(path(CHECK))
        .and(body_partial_json(serde_json::json!({"async_job_id": "dbjid:job-1"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({".tag": "in_progress"})),
        );
    match times {
        Some(n) => mock.up_to_n_times(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

fn complete_body() -> serde_json::Value {
    serde_json::json!({
        ".tag": "complete",
        "entries": [
            {".tag": "success", "metadata": folder_json("id:a", "/A")},
            {".tag": "failure", "failure": {".tag": "path_lookup", "path_lookup": {".tag": "not_found"}}}
        ]
    })
}

#[tokio::test]
async fn test_completes_after_two_in_progress_polls() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    let (server, store) = common::fast_store(h, 10);

    mount_launch(&server).await;
    mount_in_progress(&server, Some(2)).await;
    Mock::given(method("POST"))
        .and(path(CHECK))
        .respond_with(ResponseTemplate::new(200).set_body_json(complete_body()))
        .mount(&server)
        .await;

    let results = store
        .delete_batch(&paths(&["/A", "/b.txt"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(common::hits(&server, CHECK).await, 3);
    assert!(matches!(&results[0], DeleteResult::Deleted(e) if e.id.as_str() == "id:a"));
    assert_eq!(results[1], DeleteResult::Failed("path_lookup".to_string()));
}

#[tokio::test]
async fn test_times_out_after_ten_polls() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    let (server, store) = common::fast_store(h, 10);

    mount_launch(&server).await;
    mount_in_progress(&server, None).await;

    let err = store
        .delete_batch(&paths(&["/A", "/b.txt"]), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AsyncJobTimeout { polls: 10 }));
    assert_eq!(common::hits(&server, CHECK).await, 10);
}

#[tokio::test]
async fn test_failed_job() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    let (server, store) = common::fast_store(h, 10);

    mount_launch(&server).await;
    Mock::given(method("POST"))
        .and(path(CHECK))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            ".tag": "failed",
            "failed": {".tag": "too_many_write_operations"}
        })))
        .mount(&server)
        .await;

    let err = store
        .delete_batch(&paths(&["/A", "/b.txt"]), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AsyncJobFailed));
}

#[tokio::test]
async fn test_unknown_status_tag() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    let (server, store) = common::fast_store(h, 10);

    mount_launch(&server).await;
    Mock::given(method("POST"))
        .and(path(CHECK))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({".tag": "other"})),
        )
        .mount(&server)
        .await;

    let err = store
        .delete_batch(&paths(&["/A", "/b.txt"]), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AsyncJobUnknownStatus(tag) if tag == "other"));
}

#[tokio::test]
async fn test_synchronous_completion_skips_polling() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    let (server, store) = common::fast_store(h, 10);

    Mock::given(method("POST"))
        .and(path("/2/files/delete_batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            ".tag": "complete",
            "entries": [{".tag": "success", "metadata": file_json("id:b", "/b.txt", 1)}]
        })))
        .mount(&server)
        .await;

    let results = store
        .delete_batch(&paths(&["/b.txt"]), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(common::hits(&server, CHECK).await, 0);
}

#[tokio::test]
async fn test_cancel_stops_polling() {
    let h = common::setup().await;
    common::mount_token(&h.server, 14400).await;
    let (server, store) = common::fast_store(h, 1_000);

    mount_launch(&server).await;
    mount_in_progress(&server, None).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = store
        .delete_batch(&paths(&["/A", "/b.txt"]), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(common::hits(&server, CHECK).await < 1_000);
}
