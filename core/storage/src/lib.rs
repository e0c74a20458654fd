//! Remote storage access for dropmirror.
//!
//! This module provides a trait-based interface over the remote file service
//! and two implementations of it:
//! - `dropbox`: the HTTP backend (token lifecycle, REST gateway, paginated
//!   listing, async batch jobs)
//! - `memory`: an in-process store used by tests and offline demos
//!
//! # Design Principles
//! - Provider isolation: no service-specific wire types leak past `dropbox`
//! - Async operations: every remote call is async and cancellable at its await points
//! - Unified error semantics: all backends report through `dropmirror_common::Error`

pub mod content_hash;
pub mod dropbox;
pub mod entry;
pub mod memory;
pub mod provider;

pub use content_hash::{compute_hash, ContentHasher, BLOCK_SIZE};
pub use dropbox::{DropboxConfig, DropboxStore};
pub use entry::{Account, DeleteResult, Entry, EntryKind, WriteMode};
pub use memory::{MemoryStore, Operation, RemoteCall};
pub use provider::{RemoteStore, MAX_UPLOAD_BYTES};
