//! Sync policy and the persisted client settings document.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use dropmirror_common::{Error, Result, Secret};
use dropmirror_storage::dropbox::{AppCredentials, DropboxConfig};

/// Settings file name inside the per-user configuration directory.
const SETTINGS_FILE: &str = "settings.json";
/// Application directory name.
const APP_DIR: &str = "dropmirror";

/// Tunables of the tree controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    /// Selections at least this large are deleted through a batch job.
    pub batch_delete_threshold: usize,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            batch_delete_threshold: 10,
        }
    }
}

/// What an upload does when the target name already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingFilesStrategy {
    /// Leave the existing entry alone.
    Skip,
    /// Overwrite unless the content hash already matches.
    #[default]
    Update,
}

/// Last window geometry of a graphical front end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Everything a front end persists between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub window_rect: Option<WindowRect>,
    pub credentials: AppCredentials,
    /// Empty until an authorization code has been exchanged.
    pub refresh_token: Secret,
    pub dropbox: DropboxConfig,
    pub policy: SyncPolicy,
    pub existing_files: ExistingFilesStrategy,
}

impl ClientSettings {
    /// `<config_dir>/dropmirror/settings.json`.
    ///
    /// # Errors
    /// - `NotFound` if the platform has no per-user configuration directory
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
            .ok_or_else(|| Error::NotFound("No user configuration directory".to_string()))
    }

    /// Read settings from `path`.
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    /// - `Serialization` if it is not a settings document
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Read settings, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Write settings to `path`, creating the directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_json()?)?;

        // Owner read/write only, the file holds secrets.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %path.display(), "Settings saved");
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// App key and secret are present.
    pub fn is_configured(&self) -> bool {
        self.credentials.is_configured()
    }

    /// A refresh token is present.
    pub fn is_authorized(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}
