//! Common error types for dropmirror.

use thiserror::Error;

/// Top-level error type for dropmirror operations.
///
/// Every engine operation returns this type unmodified to its caller; the
/// message text is what a user-facing dialog should show.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure, no response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// Token exchange or refresh was rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The remote service answered with a structured business error.
    #[error("{message}")]
    Api {
        /// HTTP status of the failed call.
        status: u16,
        /// Error summary, `error description` pair, or raw body.
        message: String,
    },

    /// An asynchronous server job reported failure.
    #[error("async job failed")]
    AsyncJobFailed,

    /// An asynchronous server job did not finish within the poll budget.
    #[error("async job timed out after {polls} polls")]
    AsyncJobTimeout { polls: u32 },

    /// An asynchronous server job reported a status this client does not know.
    #[error("async job returned unknown status: {0}")]
    AsyncJobUnknownStatus(String),

    /// A user-supplied name contains reserved characters.
    #[error("Invalid name: {0}")]
    Validation(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation was abandoned by its caller.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the error came from the credential layer.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// Whether repeating the same call later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::AsyncJobTimeout { .. } | Error::Cancelled
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
