//! Dropbox API client.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use dropmirror_common::{Error, RemotePath, Result};

use crate::entry::{Account, DeleteResult, Entry, WriteMode};
use crate::provider::MAX_UPLOAD_BYTES;

use super::auth::TokenManager;
use super::batch::{JobStatus, Submission};
use super::endpoints::DropboxEndpoints;
use super::gateway::{ApiRequest, RestGateway};
use super::wire::{
    AsyncJobArg, BatchEntryWire, BatchJobWire, CreateFolderArg, DeleteBatchArg, FolderResult,
    FullAccount, MetadataResult, PathArg, RelocationArg, UploadArg, WireFile, WireMetadata,
};

/// Dropbox API client.
///
/// Every authenticated call asks the [`TokenManager`] for a valid access
/// token first.
pub struct DropboxClient {
    gateway: Arc<RestGateway>,
    tokens: Arc<TokenManager>,
    endpoints: DropboxEndpoints,
}

impl DropboxClient {
    pub fn new(
        gateway: Arc<RestGateway>,
        tokens: Arc<TokenManager>,
        endpoints: DropboxEndpoints,
    ) -> Self {
        Self {
            gateway,
            tokens,
            endpoints,
        }
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn endpoints(&self) -> &DropboxEndpoints {
        &self.endpoints
    }

    /// Authenticated JSON call.
    pub(crate) async fn rpc<A: Serialize, T: DeserializeOwned>(
        &self,
        url: String,
        arg: &A,
    ) -> Result<T> {
        let token = self.tokens.ensure_valid_access_token().await?;
        let body = serde_json::to_value(arg)?;
        self.gateway
            .call(ApiRequest::post(url).bearer(token).json(body))
            .await
    }

    /// Describe the signed-in account.
    pub async fn current_account(&self) -> Result<Account> {
        let token = self.tokens.ensure_valid_access_token().await?;
        let account: FullAccount = self
            .gateway
            .call(ApiRequest::post(self.endpoints.current_account()).bearer(token))
            .await?;
        Ok(account.into())
    }

    /// Download a profile photo. The URL is public, no token is sent.
    pub async fn fetch_profile_photo(&self, url: &str) -> Result<Bytes> {
        self.gateway.execute(ApiRequest::get(url)).await
    }

    /// Move or rename an entry.
    ///
    /// A name taken at the destination is resolved by the service, which
    /// picks a free name; the returned metadata carries it.
    pub async fn move_entry(&self, from: &RemotePath, to: &RemotePath) -> Result<Entry> {
        let from_path = from.to_api_path();
        let to_path = to.to_api_path();
        debug!(from = %from_path, to = %to_path, "Moving entry");

        let result: MetadataResult = self
            .rpc(
                self.endpoints.move_entry(),
                &RelocationArg {
                    from_path: &from_path,
                    to_path: &to_path,
                    autorename: true,
                    allow_ownership_transfer: false,
                },
            )
            .await?;
        live_entry(result.metadata)
    }

    /// Delete one entry (folders recursively).
    pub async fn delete(&self, path: &RemotePath) -> Result<Entry> {
        let path = path.to_api_path();
        debug!(path = %path, "Deleting entry");

        let result: MetadataResult = self
            .rpc(self.endpoints.delete(), &PathArg { path: &path })
            .await?;
        live_entry(result.metadata)
    }

    /// Create a folder, renamed by the service if the name is taken.
    ///
    /// The service reports folders without a kind tag.
    pub async fn create_folder(&self, path: &RemotePath) -> Result<Entry> {
        let path = path.to_api_path();
        debug!(path = %path, "Creating folder");

        let result: FolderResult = self
            .rpc(
                self.endpoints.create_folder(),
                &CreateFolderArg {
                    path: &path,
                    autorename: true,
                },
            )
            .await?;
        result.metadata.into_entry()
    }

    /// Start a batch delete.
    pub async fn delete_batch_submit(
        &self,
        paths: &[RemotePath],
    ) -> Result<Submission<Vec<DeleteResult>>> {
        let api_paths: Vec<String> = paths.iter().map(RemotePath::to_api_path).collect();
        debug!(count = api_paths.len(), "Submitting batch delete");

        let arg = DeleteBatchArg {
            entries: api_paths.iter().map(|p| PathArg { path: p }).collect(),
        };
        let launch: BatchJobWire = self.rpc(self.endpoints.delete_batch(), &arg).await?;

        match launch.tag.as_str() {
            "async_job_id" => launch
                .async_job_id
                .filter(|id| !id.is_empty())
                .map(Submission::Pending)
                .ok_or_else(|| Error::Serialization("async_job_id tag without a job id".to_string())),
            "complete" => Ok(Submission::Complete(delete_results(launch.entries))),
            other => Err(Error::AsyncJobUnknownStatus(other.to_string())),
        }
    }

    /// Check a batch delete job once.
    pub async fn delete_batch_check(&self, job_id: &str) -> Result<JobStatus<Vec<DeleteResult>>> {
        let status: BatchJobWire = self
            .rpc(
                self.endpoints.delete_batch_check(),
                &AsyncJobArg {
                    async_job_id: job_id,
                },
            )
            .await?;

        Ok(match status.tag.as_str() {
            "in_progress" => JobStatus::InProgress,
            "complete" => JobStatus::Complete(delete_results(status.entries)),
            "failed" => JobStatus::Failed,
            other => JobStatus::Other(other.to_string()),
        })
    }

    /// Upload a complete payload in one request.
    ///
    /// # Errors
    /// - `InvalidInput` if the payload exceeds [`MAX_UPLOAD_BYTES`]; no request is made
    pub async fn upload(&self, path: &RemotePath, payload: Bytes, mode: WriteMode) -> Result<Entry> {
        if payload.len() > MAX_UPLOAD_BYTES {
            return Err(Error::InvalidInput(format!(
                "{} is {} bytes, above the {} byte upload limit",
                path,
                payload.len(),
                MAX_UPLOAD_BYTES
            )));
        }

        let api_path = path.to_api_path();
        debug!(path = %api_path, size = payload.len(), ?mode, "Uploading");

        let arg = serde_json::to_string(&UploadArg {
            path: &api_path,
            mode,
            autorename: false,
            mute: false,
        })?;

        let token = self.tokens.ensure_valid_access_token().await?;
        let file: WireFile = self
            .gateway
            .call(
                ApiRequest::post(self.endpoints.upload())
                    .bearer(token)
                    .header("Dropbox-API-Arg", header_safe_json(&arg))
                    .binary(payload),
            )
            .await?;
        file.into_entry()
    }
}

fn live_entry(metadata: WireMetadata) -> Result<Entry> {
    metadata
        .into_entry()?
        .ok_or_else(|| Error::Serialization("Service returned a deleted entry".to_string()))
}

fn delete_results(entries: Vec<BatchEntryWire>) -> Vec<DeleteResult> {
    entries
        .into_iter()
        .map(|entry| match (entry.tag.as_str(), entry.metadata) {
            ("success", Some(metadata)) => match metadata.into_entry() {
                Ok(Some(deleted)) => DeleteResult::Deleted(deleted),
                Ok(None) => DeleteResult::Failed("no metadata for deleted entry".to_string()),
                Err(e) => DeleteResult::Failed(e.to_string()),
            },
            (tag, _) => DeleteResult::Failed(failure_reason(tag, entry.failure)),
        })
        .collect()
}

fn failure_reason(tag: &str, failure: Option<serde_json::Value>) -> String {
    match failure {
        Some(serde_json::Value::Object(map)) => map
            .get(".tag")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| serde_json::Value::Object(map).to_string()),
        Some(other) => other.to_string(),
        None => tag.to_string(),
    }
}

/// HTTP headers must be ASCII; everything else is written as a `\uXXXX` escape.
fn header_safe_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}
