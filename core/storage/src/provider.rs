//! Remote store trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use dropmirror_common::{RemotePath, Result};

use crate::entry::{Account, DeleteResult, Entry, WriteMode};

/// Largest payload a single upload call accepts.
pub const MAX_UPLOAD_BYTES: usize = 150 * 1024 * 1024;

/// Remote file service as seen by the tree controller.
///
/// Implementations handle their own authentication; every call that needs a
/// credential must make sure it is fresh before the request goes out.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Get the store name (e.g., "dropbox", "memory").
    fn name(&self) -> &str;

    /// Describe the signed-in account.
    async fn current_account(&self) -> Result<Account>;

    /// List a folder completely.
    ///
    /// # Postconditions
    /// - All pages have been fetched; entries are in server order
    ///
    /// # Errors
    /// - Any failed page discards everything fetched so far
    async fn list_folder(&self, path: &RemotePath, recursive: bool) -> Result<Vec<Entry>>;

    /// Move or rename an entry.
    ///
    /// # Returns
    /// The authoritative metadata at the new location.
    async fn move_entry(&self, from: &RemotePath, to: &RemotePath) -> Result<Entry>;

    /// Create a folder at `path`.
    async fn create_folder(&self, path: &RemotePath) -> Result<Entry>;

    /// Delete a single entry (folders recursively).
    async fn delete(&self, path: &RemotePath) -> Result<Entry>;

    /// Delete many entries in one server-side job.
    ///
    /// # Returns
    /// One result per submitted path, in submission order.
    ///
    /// # Errors
    /// - `AsyncJobFailed`, `AsyncJobTimeout`, `AsyncJobUnknownStatus` from the job
    /// - `Cancelled` if `cancel` fires while waiting
    async fn delete_batch(
        &self,
        paths: &[RemotePath],
        cancel: &CancellationToken,
    ) -> Result<Vec<DeleteResult>>;

    /// Upload a complete payload of at most [`MAX_UPLOAD_BYTES`].
    async fn upload(&self, path: &RemotePath, payload: Bytes, mode: WriteMode) -> Result<Entry>;
}
