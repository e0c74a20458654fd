//! Dropbox storage provider implementation.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use dropmirror_common::{RemotePath, Result, Secret};

use crate::entry::{Account, DeleteResult, Entry, WriteMode};
use crate::provider::RemoteStore;

use super::auth::{AppCredentials, TokenManager};
use super::batch::{BatchJobPoller, PollPolicy};
use super::client::DropboxClient;
use super::endpoints::DropboxEndpoints;
use super::gateway::RestGateway;
use super::listing::{ListOptions, DEFAULT_PAGE_LIMIT};

/// Dropbox provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropboxConfig {
    pub endpoints: DropboxEndpoints,
    /// Entries requested per listing page.
    pub page_limit: u32,
    /// Batch job polling.
    pub poll: PollPolicy,
    /// Per-request transport timeout.
    pub request_timeout_secs: u64,
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            endpoints: DropboxEndpoints::default(),
            page_limit: DEFAULT_PAGE_LIMIT,
            poll: PollPolicy::default(),
            request_timeout_secs: 60,
        }
    }
}

/// Dropbox storage provider.
///
/// Implements the RemoteStore trait for the Dropbox backend.
pub struct DropboxStore {
    client: DropboxClient,
    poller: BatchJobPoller,
    page_limit: u32,
}

impl DropboxStore {
    /// Create a provider with its own gateway and token manager.
    ///
    /// # Errors
    /// - `Network` if the HTTP client cannot be created
    pub fn new(
        config: &DropboxConfig,
        credentials: AppCredentials,
        refresh_token: Secret,
    ) -> Result<Self> {
        let gateway = Arc::new(RestGateway::new(Duration::from_secs(
            config.request_timeout_secs,
        ))?);
        let tokens = Arc::new(TokenManager::new(
            gateway.clone(),
            config.endpoints.clone(),
            credentials,
            refresh_token,
        ));
        let client = DropboxClient::new(gateway, tokens, config.endpoints.clone());
        Ok(Self::from_client(client, config))
    }

    /// Wrap an existing client, e.g. one whose token manager runs on a test clock.
    pub fn from_client(client: DropboxClient, config: &DropboxConfig) -> Self {
        Self {
            client,
            poller: BatchJobPoller::new(config.poll),
            page_limit: config.page_limit,
        }
    }

    pub fn client(&self) -> &DropboxClient {
        &self.client
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        self.client.token_manager()
    }
}

#[async_trait]
impl RemoteStore for DropboxStore {
    fn name(&self) -> &str {
        "dropbox"
    }

    async fn current_account(&self) -> Result<Account> {
        self.client.current_account().await
    }

    async fn list_folder(&self, path: &RemotePath, recursive: bool) -> Result<Vec<Entry>> {
        self.client
            .list_folder(
                path,
                ListOptions {
                    recursive,
                    limit: self.page_limit,
                },
            )
            .await
    }

    async fn move_entry(&self, from: &RemotePath, to: &RemotePath) -> Result<Entry> {
        self.client.move_entry(from, to).await
    }

    async fn create_folder(&self, path: &RemotePath) -> Result<Entry> {
        self.client.create_folder(path).await
    }

    async fn delete(&self, path: &RemotePath) -> Result<Entry> {
        self.client.delete(path).await
    }

    async fn delete_batch(
        &self,
        paths: &[RemotePath],
        cancel: &CancellationToken,
    ) -> Result<Vec<DeleteResult>> {
        let submission = self.client.delete_batch_submit(paths).await?;
        let results = self
            .poller
            .drive(submission, cancel, |job_id| async move {
                self.client.delete_batch_check(&job_id).await
            })
            .await?;

        info!(
            submitted = paths.len(),
            deleted = results
                .iter()
                .filter(|r| matches!(r, DeleteResult::Deleted(_)))
                .count(),
            "Batch delete finished"
        );
        Ok(results)
    }

    async fn upload(&self, path: &RemotePath, payload: Bytes, mode: WriteMode) -> Result<Entry> {
        self.client.upload(path, payload, mode).await
    }
}
