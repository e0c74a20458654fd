//! In-memory remote store for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use dropmirror_common::{EntryId, Error, RemotePath, Result};

use crate::content_hash::compute_hash;
use crate::entry::{Account, DeleteResult, Entry, EntryKind, WriteMode};
use crate::provider::{RemoteStore, MAX_UPLOAD_BYTES};

/// Kind of call made against a [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CurrentAccount,
    ListFolder,
    Move,
    CreateFolder,
    Delete,
    DeleteBatch,
    Upload,
}

/// A recorded call, with its arguments in API path form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    CurrentAccount,
    ListFolder { path: String, recursive: bool },
    Move { from: String, to: String },
    CreateFolder(String),
    Delete(String),
    DeleteBatch(Vec<String>),
    Upload { path: String, mode: WriteMode },
}

impl RemoteCall {
    /// The operation this call belongs to.
    pub fn operation(&self) -> Operation {
        match self {
            RemoteCall::CurrentAccount => Operation::CurrentAccount,
            RemoteCall::ListFolder { .. } => Operation::ListFolder,
            RemoteCall::Move { .. } => Operation::Move,
            RemoteCall::CreateFolder(_) => Operation::CreateFolder,
            RemoteCall::Delete(_) => Operation::Delete,
            RemoteCall::DeleteBatch(_) => Operation::DeleteBatch,
            RemoteCall::Upload { .. } => Operation::Upload,
        }
    }
}

#[derive(Debug, Clone)]
struct Stored {
    entry: Entry,
    data: Option<Vec<u8>>,
}

/// In-memory remote store.
///
/// Paths are matched case-insensitively, like the real service. Every call is
/// recorded, and failures can be injected per operation, which makes it the
/// backend of choice for controller tests. All data is lost on drop.
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Stored>>,
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<HashMap<Operation, VecDeque<Error>>>,
    refused: Mutex<HashSet<String>>,
    account: Account,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            refused: Mutex::new(HashSet::new()),
            account: Account {
                account_id: "dbid:memory".to_string(),
                display_name: "Memory Store".to_string(),
                email: "memory@localhost".to_string(),
                country: None,
                profile_photo_url: None,
                home_namespace_id: None,
            },
        }
    }

    /// Seed a folder without recording a call.
    pub fn add_folder(&self, path: &str) -> Result<Entry> {
        let path = RemotePath::parse(path)?;
        self.check_parent(&path)?;
        let entry = Entry::folder(new_id()?, entry_name(&path)?, path.to_api_path());
        self.write_entries()
            .insert(key(&path), Stored { entry: entry.clone(), data: None });
        Ok(entry)
    }

    /// Seed a file without recording a call.
    pub fn add_file(&self, path: &str, data: &[u8]) -> Result<Entry> {
        let path = RemotePath::parse(path)?;
        self.check_parent(&path)?;
        let entry = file_entry(new_id()?, &path, data)?;
        self.write_entries().insert(
            key(&path),
            Stored {
                entry: entry.clone(),
                data: Some(data.to_vec()),
            },
        );
        Ok(entry)
    }

    /// Make the next call of `operation` fail with `error`.
    ///
    /// Queued failures are consumed in order, one per call.
    pub fn fail_next(&self, operation: Operation, error: Error) {
        lock(&self.failures)
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Make every delete of `path` fail, singly or inside a batch.
    pub fn refuse_delete(&self, path: &str) -> Result<()> {
        let path = RemotePath::parse(path)?;
        lock(&self.refused).insert(key(&path));
        Ok(())
    }

    /// All calls recorded so far, oldest first.
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls of one operation.
    pub fn calls_to(&self, operation: Operation) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Check if a path exists.
    pub fn contains(&self, path: &str) -> bool {
        RemotePath::parse(path)
            .map(|p| self.read_entries().contains_key(&key(&p)))
            .unwrap_or(false)
    }

    /// Current metadata at a path.
    pub fn entry(&self, path: &str) -> Option<Entry> {
        let path = RemotePath::parse(path).ok()?;
        self.read_entries().get(&key(&path)).map(|s| s.entry.clone())
    }

    /// Stored bytes of a file.
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        let path = RemotePath::parse(path).ok()?;
        self.read_entries().get(&key(&path)).and_then(|s| s.data.clone())
    }

    fn begin(&self, call: RemoteCall) -> Result<()> {
        let operation = call.operation();
        lock(&self.calls).push(call);
        match lock(&self.failures).get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_parent(&self, path: &RemotePath) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Err(Error::InvalidInput("Cannot replace the root".to_string()));
        };
        if parent.is_root() {
            return Ok(());
        }
        match self.read_entries().get(&key(&parent)) {
            Some(stored) if stored.entry.is_folder() => Ok(()),
            Some(_) => Err(api_error("path/conflict/file")),
            None => Err(api_error("path/not_found")),
        }
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Stored>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Stored>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn delete_now(&self, path: &RemotePath) -> Result<Entry> {
        let target = key(path);
        if lock(&self.refused).contains(&target) {
            return Err(api_error("path_write/disallowed_name"));
        }

        let mut entries = self.write_entries();
        let removed = entries
            .remove(&target)
            .ok_or_else(|| api_error("path_lookup/not_found"))?;

        let prefix = format!("{}/", target);
        entries.retain(|k, _| !k.starts_with(&prefix));
        Ok(removed.entry)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn current_account(&self) -> Result<Account> {
        self.begin(RemoteCall::CurrentAccount)?;
        Ok(self.account.clone())
    }

    async fn list_folder(&self, path: &RemotePath, recursive: bool) -> Result<Vec<Entry>> {
        self.begin(RemoteCall::ListFolder {
            path: path.to_api_path(),
            recursive,
        })?;

        let folder = key(path);
        let entries = self.read_entries();
        if !path.is_root() && !entries.get(&folder).is_some_and(|s| s.entry.is_folder()) {
            return Err(api_error("path/not_found"));
        }

        let prefix = format!("{}/", folder);
        Ok(entries
            .iter()
            .filter(|(k, _)| {
                k.strip_prefix(&prefix)
                    .is_some_and(|rest| recursive || !rest.contains('/'))
            })
            .map(|(_, stored)| stored.entry.clone())
            .collect())
    }

    async fn move_entry(&self, from: &RemotePath, to: &RemotePath) -> Result<Entry> {
        self.begin(RemoteCall::Move {
            from: from.to_api_path(),
            to: to.to_api_path(),
        })?;
        self.check_parent(to)?;

        let source = key(from);
        let source_prefix = format!("{}/", source);
        if key(to).starts_with(&source_prefix) {
            return Err(api_error("to/cant_move_folder_into_itself"));
        }

        let mut entries = self.write_entries();
        let stored_display = match entries.get(&source) {
            Some(stored) => stored.entry.path_display.clone(),
            None => return Err(api_error("from_lookup/not_found")),
        };

        let to = if key(to) != source && entries.contains_key(&key(to)) {
            free_path(&entries, to)?
        } else {
            to.clone()
        };
        let target = key(&to);
        let to_display = to.to_api_path();

        let moving: Vec<String> = entries
            .keys()
            .filter(|k| **k == source || k.starts_with(&source_prefix))
            .cloned()
            .collect();

        let mut moved_root = None;
        for old_key in moving {
            if let Some(mut stored) = entries.remove(&old_key) {
                let suffix = stored
                    .entry
                    .path_display
                    .get(stored_display.len()..)
                    .unwrap_or_default()
                    .to_string();
                stored.entry.path_display = format!("{}{}", to_display, suffix);
                if old_key == source {
                    stored.entry.name = entry_name(&to)?;
                    stored.entry.server_modified = Some(Utc::now());
                    moved_root = Some(stored.entry.clone());
                }
                let new_key = format!("{}{}", target, &old_key[source.len()..]);
                entries.insert(new_key, stored);
            }
        }

        moved_root.ok_or_else(|| api_error("from_lookup/not_found"))
    }

    async fn create_folder(&self, path: &RemotePath) -> Result<Entry> {
        self.begin(RemoteCall::CreateFolder(path.to_api_path()))?;
        self.check_parent(path)?;

        let mut entries = self.write_entries();
        let path = if entries.contains_key(&key(path)) {
            free_path(&entries, path)?
        } else {
            path.clone()
        };
        let entry = Entry::folder(new_id()?, entry_name(&path)?, path.to_api_path());
        entries.insert(key(&path), Stored { entry: entry.clone(), data: None });
        Ok(entry)
    }

    async fn delete(&self, path: &RemotePath) -> Result<Entry> {
        self.begin(RemoteCall::Delete(path.to_api_path()))?;
        self.delete_now(path)
    }

    async fn delete_batch(
        &self,
        paths: &[RemotePath],
        cancel: &CancellationToken,
    ) -> Result<Vec<DeleteResult>> {
        self.begin(RemoteCall::DeleteBatch(
            paths.iter().map(RemotePath::to_api_path).collect(),
        ))?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        Ok(paths
            .iter()
            .map(|path| match self.delete_now(path) {
                Ok(entry) => DeleteResult::Deleted(entry),
                Err(err) => DeleteResult::Failed(err.to_string()),
            })
            .collect())
    }

    async fn upload(&self, path: &RemotePath, payload: Bytes, mode: WriteMode) -> Result<Entry> {
        self.begin(RemoteCall::Upload {
            path: path.to_api_path(),
            mode,
        })?;
        if payload.len() > MAX_UPLOAD_BYTES {
            return Err(Error::InvalidInput("payload exceeds the upload limit".to_string()));
        }
        self.check_parent(path)?;

        let mut entries = self.write_entries();
        let id = match entries.get(&key(path)) {
            Some(stored) if stored.entry.is_folder() => {
                return Err(api_error("path/conflict/folder"));
            }
            Some(_) if mode == WriteMode::Add => return Err(api_error("path/conflict/file")),
            Some(stored) => stored.entry.id.clone(),
            None => new_id()?,
        };

        let entry = file_entry(id, path, &payload)?;
        entries.insert(
            key(path),
            Stored {
                entry: entry.clone(),
                data: Some(payload.to_vec()),
            },
        );
        Ok(entry)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key(path: &RemotePath) -> String {
    path.to_api_path().to_lowercase()
}

fn new_id() -> Result<EntryId> {
    EntryId::new(format!("id:{}", Uuid::new_v4().simple()))
}

fn entry_name(path: &RemotePath) -> Result<String> {
    path.name()
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput("The root has no name".to_string()))
}

fn file_entry(id: EntryId, path: &RemotePath, data: &[u8]) -> Result<Entry> {
    Ok(Entry {
        id,
        name: entry_name(path)?,
        path_display: path.to_api_path(),
        kind: EntryKind::File {
            size: data.len() as u64,
            content_hash: Some(compute_hash(data)),
            rev: Some(Uuid::new_v4().simple().to_string()[..16].to_string()),
        },
        server_modified: Some(Utc::now()),
    })
}

/// First free sibling of `path`, numbered the way the service renames on
/// conflict: `report.txt` becomes `report (1).txt`.
fn free_path(entries: &BTreeMap<String, Stored>, path: &RemotePath) -> Result<RemotePath> {
    let name = entry_name(path)?;
    let parent = path.parent().unwrap_or_default();
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name.as_str(), ""),
    };

    let mut n = 1u32;
    loop {
        let candidate = parent.join(&format!("{} ({}){}", stem, n, extension))?;
        if !entries.contains_key(&key(&candidate)) {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Endpoint-specific errors come back as 409 with a summary like the real service.
fn api_error(summary: &str) -> Error {
    Error::Api {
        status: 409,
        message: format!("{}/..", summary),
    }
}
