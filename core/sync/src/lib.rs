//! dropmirror sync engine
//!
//! This module keeps an in-memory mirror of the remote folder tree, including:
//! - Arena-backed tree cache with id-keyed parent links
//! - Optimistic move with exact rollback through move transactions
//! - Folder creation with name validation
//! - Single or batch delete chosen by policy, confirmed per entry id
//! - Uploads that skip unchanged content
//! - Expansion of local folders into the folders and files to upload
//! - Persisted client settings and session wiring

pub mod config;
pub mod controller;
pub mod local;
pub mod session;
pub mod transaction;
pub mod tree;

// Re-export main types
pub use config::{ClientSettings, ExistingFilesStrategy, SyncPolicy, WindowRect};
pub use controller::{DeleteReport, DeleteStrategy, MoveOutcome, TreeSyncController, UploadOutcome};
pub use local::{expand_selection, LocalItem, LocalSelection};
pub use session::Session;
pub use transaction::{MoveTransaction, Placement};
pub use tree::{TreeCache, TreeNode};
