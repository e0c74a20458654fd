//! Paginated folder enumeration.

use std::collections::HashSet;
use tracing::debug;

use dropmirror_common::{Error, RemotePath, Result};

use crate::entry::Entry;

use super::client::DropboxClient;
use super::wire::{CursorArg, ListFolderArg, ListFolderResult};

/// Largest page the service hands out.
pub const DEFAULT_PAGE_LIMIT: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub recursive: bool,
    /// Page size hint; the server may return fewer entries.
    pub limit: u32,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct ListPage {
    /// Live entries of the page; tombstones are dropped.
    pub entries: Vec<Entry>,
    pub cursor: String,
    pub has_more: bool,
}

impl ListPage {
    fn from_wire(result: ListFolderResult) -> Result<Self> {
        let mut entries = Vec::with_capacity(result.entries.len());
        for metadata in result.entries {
            if let Some(entry) = metadata.into_entry()? {
                entries.push(entry);
            }
        }
        Ok(Self {
            entries,
            cursor: result.cursor,
            has_more: result.has_more,
        })
    }
}

impl DropboxClient {
    /// Fetch the first page of a listing.
    pub async fn list_folder_page(&self, path: &RemotePath, options: ListOptions) -> Result<ListPage> {
        let path = path.to_api_path();
        let result: ListFolderResult = self
            .rpc(
                self.endpoints().list_folder(),
                &ListFolderArg {
                    path: &path,
                    recursive: options.recursive,
                    include_deleted: false,
                    limit: options.limit.clamp(1, DEFAULT_PAGE_LIMIT),
                },
            )
            .await?;
        ListPage::from_wire(result)
    }

    /// Fetch the page following `cursor`.
    pub async fn list_folder_continue(&self, cursor: &str) -> Result<ListPage> {
        let result: ListFolderResult = self
            .rpc(self.endpoints().list_folder_continue(), &CursorArg { cursor })
            .await?;
        ListPage::from_wire(result)
    }

    /// List a folder completely, in server order.
    ///
    /// The token is checked before every page since a long enumeration can
    /// outlive it. A failure on any page discards what was fetched.
    ///
    /// # Errors
    /// - `InvalidInput` if the server hands back a cursor that was already consumed
    pub async fn list_folder(&self, path: &RemotePath, options: ListOptions) -> Result<Vec<Entry>> {
        let mut page = self.list_folder_page(path, options).await?;
        let mut entries = std::mem::take(&mut page.entries);
        let mut consumed = HashSet::new();
        let mut pages = 1u32;

        while page.has_more {
            if !consumed.insert(page.cursor.clone()) {
                return Err(Error::InvalidInput(format!(
                    "Listing of {} returned a cursor that was already consumed",
                    path
                )));
            }
            page = self.list_folder_continue(&page.cursor).await?;
            entries.append(&mut page.entries);
            pages += 1;
        }

        debug!(path = %path, entries = entries.len(), pages, "Listed folder");
        Ok(entries)
    }
}
