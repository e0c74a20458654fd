//! Common utilities and types shared across dropmirror modules.
//!
//! This module provides foundational types that are used throughout the codebase:
//! the error taxonomy surfaced to callers, stable entry identifiers, remote paths
//! and secret wrappers for credentials.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{validate_name, EntryId, RemotePath, Secret, RESERVED_NAME_CHARS};
