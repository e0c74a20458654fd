//! Dropbox storage backend for dropmirror.
//!
//! This module provides a storage backend using the Dropbox HTTP API v2 with:
//! - Refresh-token authentication with single-flight access token renewal
//! - A REST gateway that decodes the service's error envelope
//! - Paginated folder listing that re-checks the token on every page
//! - Async batch jobs driven by a cancellable poller
//! - Full RemoteStore trait implementation

pub mod auth;
pub mod batch;
pub mod client;
pub mod endpoints;
pub mod gateway;
pub mod listing;
pub mod provider;
mod wire;

pub use auth::{AccessToken, AppCredentials, Clock, ManualClock, SystemClock, TokenManager};
pub use batch::{BatchJobPoller, JobStatus, PollPolicy, Submission};
pub use client::DropboxClient;
pub use endpoints::DropboxEndpoints;
pub use gateway::{ApiRequest, Authorization, Payload, RestGateway};
pub use listing::{ListOptions, ListPage};
pub use provider::{DropboxConfig, DropboxStore};
