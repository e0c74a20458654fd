//! Service base URLs and routes.

use serde::{Deserialize, Serialize};

use dropmirror_common::{Error, Result};

/// RPC endpoints base URL.
const API_BASE: &str = "https://api.dropboxapi.com";
/// Content upload/download base URL.
const CONTENT_BASE: &str = "https://content.dropboxapi.com";
/// Browser authorization page.
const AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";

/// Where the backend sends its requests.
///
/// Overridable so tests and staging setups can point at another server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropboxEndpoints {
    pub api_base: String,
    pub content_base: String,
    pub authorize_url: String,
}

impl Default for DropboxEndpoints {
    fn default() -> Self {
        Self {
            api_base: API_BASE.to_string(),
            content_base: CONTENT_BASE.to_string(),
            authorize_url: AUTHORIZE_URL.to_string(),
        }
    }
}

impl DropboxEndpoints {
    /// Point every base at one server (e.g. a mock).
    pub fn single_host(base: impl Into<String>) -> Self {
        let base = base.into();
        let base = base.trim_end_matches('/').to_string();
        Self {
            authorize_url: format!("{}/oauth2/authorize", base),
            api_base: base.clone(),
            content_base: base,
        }
    }

    pub fn token(&self) -> String {
        self.rpc("/oauth2/token")
    }

    pub fn current_account(&self) -> String {
        self.rpc("/2/users/get_current_account")
    }

    pub fn list_folder(&self) -> String {
        self.rpc("/2/files/list_folder")
    }

    pub fn list_folder_continue(&self) -> String {
        self.rpc("/2/files/list_folder/continue")
    }

    pub fn move_entry(&self) -> String {
        self.rpc("/2/files/move_v2")
    }

    pub fn delete(&self) -> String {
        self.rpc("/2/files/delete_v2")
    }

    pub fn delete_batch(&self) -> String {
        self.rpc("/2/files/delete_batch")
    }

    pub fn delete_batch_check(&self) -> String {
        self.rpc("/2/files/delete_batch/check")
    }

    pub fn create_folder(&self) -> String {
        self.rpc("/2/files/create_folder_v2")
    }

    pub fn upload(&self) -> String {
        format!("{}/2/files/upload", self.content_base.trim_end_matches('/'))
    }

    /// Parse the authorize page URL.
    ///
    /// # Errors
    /// - `InvalidInput` if the configured value is not a URL
    pub fn authorize(&self) -> Result<url::Url> {
        url::Url::parse(&self.authorize_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid authorize URL: {}", e)))
    }

    fn rpc(&self, route: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), route)
    }
}
