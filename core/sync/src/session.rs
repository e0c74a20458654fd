//! Wiring from persisted settings to a ready controller.

use std::sync::Arc;
use tracing::info;

use dropmirror_common::{Error, Result};
use dropmirror_storage::dropbox::{DropboxStore, TokenManager};

use crate::config::ClientSettings;
use crate::controller::TreeSyncController;

/// A connected client: the Dropbox store and the controller over it.
pub struct Session {
    store: Arc<DropboxStore>,
    controller: TreeSyncController<DropboxStore>,
}

impl Session {
    /// Build gateway, token manager, store and controller from `settings`.
    ///
    /// No request is made; the first call that needs a token will fetch one.
    ///
    /// # Errors
    /// - `Auth` if the app key or secret is missing
    pub fn connect(settings: &ClientSettings) -> Result<Self> {
        if !settings.is_configured() {
            return Err(Error::Auth(
                "App key and secret are not configured".to_string(),
            ));
        }

        let store = Arc::new(DropboxStore::new(
            &settings.dropbox,
            settings.credentials.clone(),
            settings.refresh_token.clone(),
        )?);
        let controller = TreeSyncController::new(store.clone(), settings.policy);

        info!(authorized = settings.is_authorized(), "Session connected");
        Ok(Self { store, controller })
    }

    pub fn store(&self) -> &Arc<DropboxStore> {
        &self.store
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        self.store.token_manager()
    }

    pub fn controller(&mut self) -> &mut TreeSyncController<DropboxStore> {
        &mut self.controller
    }
}
