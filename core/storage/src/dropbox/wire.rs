//! Request and response shapes of the Dropbox API.
//!
//! Nothing here leaves the `dropbox` module; responses are converted into
//! [`Entry`] and [`Account`] at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dropmirror_common::{EntryId, Result};

use crate::entry::{Account, Entry, EntryKind, WriteMode};

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path_display: String,
    pub size: u64,
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub server_modified: Option<DateTime<Utc>>,
}

impl WireFile {
    pub fn into_entry(self) -> Result<Entry> {
        Ok(Entry {
            id: EntryId::new(self.id)?,
            name: self.name,
            path_display: self.path_display,
            kind: EntryKind::File {
                size: self.size,
                content_hash: self.content_hash,
                rev: self.rev,
            },
            server_modified: self.server_modified,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFolder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path_display: String,
}

impl WireFolder {
    pub fn into_entry(self) -> Result<Entry> {
        Ok(Entry::folder(EntryId::new(self.id)?, self.name, self.path_display))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireDeleted {
    #[serde(default)]
    pub path_display: String,
}

/// Metadata discriminated by the service's `.tag` field.
#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "lowercase")]
pub(crate) enum WireMetadata {
    File(WireFile),
    Folder(WireFolder),
    Deleted(WireDeleted),
}

impl WireMetadata {
    /// Convert to an entry; tombstones have none.
    pub fn into_entry(self) -> Result<Option<Entry>> {
        match self {
            WireMetadata::File(file) => file.into_entry().map(Some),
            WireMetadata::Folder(folder) => folder.into_entry().map(Some),
            WireMetadata::Deleted(_) => Ok(None),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ListFolderArg<'a> {
    pub path: &'a str,
    pub recursive: bool,
    pub include_deleted: bool,
    pub limit: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct CursorArg<'a> {
    pub cursor: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListFolderResult {
    pub entries: Vec<WireMetadata>,
    pub cursor: String,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct RelocationArg<'a> {
    pub from_path: &'a str,
    pub to_path: &'a str,
    pub autorename: bool,
    pub allow_ownership_transfer: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct PathArg<'a> {
    pub path: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteBatchArg<'a> {
    pub entries: Vec<PathArg<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateFolderArg<'a> {
    pub path: &'a str,
    pub autorename: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct AsyncJobArg<'a> {
    pub async_job_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadArg<'a> {
    pub path: &'a str,
    pub mode: WriteMode,
    pub autorename: bool,
    pub mute: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetadataResult {
    pub metadata: WireMetadata,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FolderResult {
    pub metadata: WireFolder,
}

/// Launch or status answer of a batch job.
#[derive(Debug, Deserialize)]
pub(crate) struct BatchJobWire {
    #[serde(rename = ".tag")]
    pub tag: String,
    #[serde(default)]
    pub async_job_id: Option<String>,
    #[serde(default)]
    pub entries: Vec<BatchEntryWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchEntryWire {
    #[serde(rename = ".tag")]
    pub tag: String,
    #[serde(default)]
    pub metadata: Option<WireMetadata>,
    #[serde(default)]
    pub failure: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountName {
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RootInfo {
    #[serde(default)]
    pub home_namespace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FullAccount {
    pub account_id: String,
    pub name: AccountName,
    pub email: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub profile_photo_url: Option<String>,
    #[serde(default)]
    pub root_info: Option<RootInfo>,
}

impl From<FullAccount> for Account {
    fn from(account: FullAccount) -> Self {
        Account {
            account_id: account.account_id,
            display_name: account.name.display_name,
            email: account.email,
            country: account.country,
            profile_photo_url: account.profile_photo_url,
            home_namespace_id: account.root_info.and_then(|r| r.home_namespace_id),
        }
    }
}
