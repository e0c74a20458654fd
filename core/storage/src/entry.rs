//! Remote entry descriptors shared by every backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dropmirror_common::{EntryId, RemotePath, Result};

/// Kind of a remote entry, with the fields only that kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntryKind {
    File {
        /// Size in bytes.
        size: u64,
        /// Two-level block hash computed by the server.
        content_hash: Option<String>,
        /// Revision identifier.
        rev: Option<String>,
    },
    Folder,
}

/// A remote file or folder.
///
/// Identity is `id`, which is stable across moves and renames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub name: String,
    /// Path with the casing the user chose.
    pub path_display: String,
    pub kind: EntryKind,
    pub server_modified: Option<DateTime<Utc>>,
}

impl Entry {
    /// Create a folder entry.
    pub fn folder(id: EntryId, name: impl Into<String>, path_display: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            path_display: path_display.into(),
            kind: EntryKind::Folder,
            server_modified: None,
        }
    }

    /// Create a file entry.
    pub fn file(
        id: EntryId,
        name: impl Into<String>,
        path_display: impl Into<String>,
        size: u64,
        content_hash: Option<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            path_display: path_display.into(),
            kind: EntryKind::File {
                size,
                content_hash,
                rev: None,
            },
            server_modified: None,
        }
    }

    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, EntryKind::Folder)
    }

    /// Size in bytes; folders report zero.
    pub fn size(&self) -> u64 {
        match &self.kind {
            EntryKind::File { size, .. } => *size,
            EntryKind::Folder => 0,
        }
    }

    /// Server content hash, files only.
    pub fn content_hash(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::File { content_hash, .. } => content_hash.as_deref(),
            EntryKind::Folder => None,
        }
    }

    /// Revision, files only.
    pub fn revision(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::File { rev, .. } => rev.as_deref(),
            EntryKind::Folder => None,
        }
    }

    /// Parse `path_display` into a [`RemotePath`].
    pub fn path(&self) -> Result<RemotePath> {
        RemotePath::parse(&self.path_display)
    }
}

/// The signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub display_name: String,
    pub email: String,
    pub country: Option<String>,
    pub profile_photo_url: Option<String>,
    pub home_namespace_id: Option<String>,
}

/// How an upload treats an existing file at the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Fail if something already exists.
    Add,
    /// Replace the existing file.
    Overwrite,
}

/// Per-path result of a batch delete, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResult {
    /// The entry the server removed.
    Deleted(Entry),
    /// The server refused this path.
    Failed(String),
}
