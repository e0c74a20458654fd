//! Access token lifecycle for the Dropbox backend.

use oauth2::{basic::BasicClient, AuthUrl, ClientId, CsrfToken};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use dropmirror_common::{Error, Result, Secret};

use super::endpoints::DropboxEndpoints;
use super::gateway::{ApiRequest, RestGateway};
use super::wire::TokenResponse;

/// Seconds before expiry at which a token is already treated as stale.
pub const SAFETY_THRESHOLD_SECS: i64 = 10;

/// Application identity registered with the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCredentials {
    pub client_key: String,
    pub client_secret: Secret,
}

impl AppCredentials {
    pub fn new(client_key: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            client_secret: Secret::new(client_secret),
        }
    }

    /// Both halves are present.
    pub fn is_configured(&self) -> bool {
        !self.client_key.is_empty() && !self.client_secret.is_empty()
    }
}

/// Short-lived bearer credential. Never persisted.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: Secret,
    pub expires_in: i64,
    /// Unix seconds at which the token was received.
    pub fetched_at: i64,
}

impl AccessToken {
    /// Valid iff `now < fetched_at + expires_in - SAFETY_THRESHOLD_SECS`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        now < self
            .fetched_at
            .saturating_add(self.expires_in)
            .saturating_sub(SAFETY_THRESHOLD_SECS)
    }
}

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Owns the access token and renews it from the refresh token.
///
/// Renewal is single-flight: concurrent callers that find the token stale
/// queue on the write lock and all but the first observe the fresh token.
pub struct TokenManager {
    gateway: Arc<RestGateway>,
    endpoints: DropboxEndpoints,
    credentials: AppCredentials,
    refresh_token: RwLock<Secret>,
    access: tokio::sync::RwLock<Option<AccessToken>>,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    /// Create a token manager on the wall clock.
    pub fn new(
        gateway: Arc<RestGateway>,
        endpoints: DropboxEndpoints,
        credentials: AppCredentials,
        refresh_token: Secret,
    ) -> Self {
        Self {
            gateway,
            endpoints,
            credentials,
            refresh_token: RwLock::new(refresh_token),
            access: tokio::sync::RwLock::new(None),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Return an access token that is valid now, renewing it if necessary.
    ///
    /// # Errors
    /// - `Auth` if no refresh token is set, or the exchange fails for any reason
    pub async fn ensure_valid_access_token(&self) -> Result<Secret> {
        let access = self.access.read().await;
        if let Some(token) = access.as_ref().filter(|t| t.is_valid_at(self.clock.now())) {
            return Ok(token.value.clone());
        }
        drop(access);

        let mut access = self.access.write().await;

        // Another caller may have renewed while we waited.
        if let Some(token) = access.as_ref().filter(|t| t.is_valid_at(self.clock.now())) {
            return Ok(token.value.clone());
        }

        let refresh_token = self.refresh_token();
        if refresh_token.is_empty() {
            return Err(Error::Auth(
                "No refresh token. Authorize the application first.".to_string(),
            ));
        }

        info!("Refreshing access token");
        let request = ApiRequest::post(self.endpoints.token())
            .basic(
                self.credentials.client_key.clone(),
                self.credentials.client_secret.clone(),
            )
            .form([
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose()),
            ]);

        let response: TokenResponse = self.gateway.call(request).await.map_err(|e| {
            warn!(error = %e, "Access token refresh failed");
            Error::Auth(format!("Token refresh failed: {}", e))
        })?;

        let token = AccessToken {
            value: Secret::new(response.access_token),
            expires_in: response.expires_in,
            fetched_at: self.clock.now(),
        };
        debug!(expires_in = token.expires_in, "Access token renewed");

        let value = token.value.clone();
        *access = Some(token);
        Ok(value)
    }

    /// Exchange a one-time authorization code for a refresh token.
    ///
    /// The refresh token is kept for subsequent renewals and returned so the
    /// caller can persist it. The cached access token is left alone.
    ///
    /// # Errors
    /// - `Auth` if the exchange fails or returns no refresh token
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<Secret> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::Auth("Authorization code is empty".to_string()));
        }

        let request = ApiRequest::post(self.endpoints.token())
            .basic(
                self.credentials.client_key.clone(),
                self.credentials.client_secret.clone(),
            )
            .form([("code", code), ("grant_type", "authorization_code")]);

        let response: TokenResponse = self
            .gateway
            .call(request)
            .await
            .map_err(|e| Error::Auth(format!("Code exchange failed: {}", e)))?;

        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .map(Secret::new)
            .ok_or_else(|| {
                Error::Auth("No refresh token received. Ensure offline access was requested.".to_string())
            })?;

        info!(account_id = response.account_id.as_deref().unwrap_or(""), "Authorization code exchanged");
        self.set_refresh_token(refresh_token.clone());
        Ok(refresh_token)
    }

    /// Start a new authorization flow.
    ///
    /// Invalidates both tokens and returns the page the user must visit to
    /// obtain an authorization code.
    pub async fn begin_authorization(&self) -> Result<String> {
        self.set_refresh_token(Secret::default());
        *self.access.write().await = None;
        self.authorization_url()
    }

    /// Authorization page URL requesting offline access.
    ///
    /// # Errors
    /// - `InvalidInput` if the configured authorize URL is malformed
    pub fn authorization_url(&self) -> Result<String> {
        let auth_url = AuthUrl::from_url(self.endpoints.authorize()?);

        let client =
            BasicClient::new(ClientId::new(self.credentials.client_key.clone())).set_auth_uri(auth_url);
        let (url, _csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_extra_param("token_access_type", "offline")
            .url();

        Ok(url.to_string())
    }

    /// Replace the refresh token.
    pub fn set_refresh_token(&self, token: Secret) {
        *self
            .refresh_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Current refresh token; empty if authorization is pending.
    pub fn refresh_token(&self) -> Secret {
        self.refresh_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cached access token, if any.
    pub async fn access_token(&self) -> Option<AccessToken> {
        self.access.read().await.clone()
    }

    pub fn credentials(&self) -> &AppCredentials {
        &self.credentials
    }
}
