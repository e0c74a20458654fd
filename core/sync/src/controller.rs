//! In-memory mirror of the remote hierarchy with optimistic mutations.

use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dropmirror_common::{validate_name, EntryId, Error, RemotePath, Result};
use dropmirror_storage::{
    compute_hash, Account, DeleteResult, Entry, RemoteStore, WriteMode, MAX_UPLOAD_BYTES,
};

use crate::config::{ExistingFilesStrategy, SyncPolicy};
use crate::transaction::MoveTransaction;
use crate::tree::TreeCache;

/// Result of a move request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The service confirmed the move; this is its metadata.
    Moved(Entry),
    /// Source and destination paths are identical; nothing was sent.
    Unchanged,
}

/// How a selection is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStrategy {
    /// One request per entry.
    Single,
    /// One batch job for the whole selection.
    Batch,
}

impl DeleteStrategy {
    /// Batch if any entry is a folder or there are at least `threshold` entries.
    pub fn choose<'a>(entries: impl IntoIterator<Item = &'a Entry>, threshold: usize) -> Self {
        let mut count = 0;
        for entry in entries {
            if entry.is_folder() {
                return DeleteStrategy::Batch;
            }
            count += 1;
        }
        if count >= threshold {
            DeleteStrategy::Batch
        } else {
            DeleteStrategy::Single
        }
    }
}

/// Outcome of a delete; a batch may succeed only in part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Requested ids the service confirmed, now gone from the tree.
    pub deleted: Vec<EntryId>,
    /// Requested ids without confirmation, still in the tree.
    pub failed: Vec<EntryId>,
    /// Failure reasons reported by the service.
    pub reasons: Vec<String>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of an upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded(Entry),
    /// An entry of that name exists and was left alone.
    Skipped(EntryId),
}

/// Keeps the cached tree consistent with the remote service.
///
/// Mutations are applied to the cache first and undone if the service
/// rejects them, so a caller never observes a half-applied change. All
/// mutating operations take `&mut self`, which serializes them.
pub struct TreeSyncController<S: RemoteStore + ?Sized> {
    store: Arc<S>,
    tree: TreeCache,
    selection: Vec<EntryId>,
    policy: SyncPolicy,
}

impl<S: RemoteStore + ?Sized> TreeSyncController<S> {
    pub fn new(store: Arc<S>, policy: SyncPolicy) -> Self {
        Self {
            store,
            tree: TreeCache::new(),
            selection: Vec::new(),
            policy,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn tree(&self) -> &TreeCache {
        &self.tree
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Describe the signed-in account.
    pub async fn current_account(&self) -> Result<Account> {
        self.store.current_account().await
    }

    /// List the top level into root nodes.
    pub async fn load_roots(&mut self) -> Result<Vec<EntryId>> {
        let entries = self.store.list_folder(&RemotePath::root(), false).await?;
        self.tree.replace_children(None, entries)?;
        self.prune_selection();
        Ok(self.tree.roots().to_vec())
    }

    /// Drop the cache and the selection, then reload the top level.
    pub async fn refresh(&mut self) -> Result<Vec<EntryId>> {
        self.tree.clear();
        self.selection.clear();
        self.load_roots().await
    }

    /// Make sure a folder's children are cached.
    ///
    /// Lists the folder only the first time; files have no children.
    pub async fn open(&mut self, id: &EntryId) -> Result<Vec<EntryId>> {
        let node = self
            .tree
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("{} is not in the tree", id)))?;

        if node.is_folder() && !node.loaded {
            let path = node.entry.path()?;
            debug!(path = %path, "Opening folder");
            let entries = self.store.list_folder(&path, false).await?;
            self.tree.replace_children(Some(id), entries)?;
            self.prune_selection();
        }
        Ok(self.tree.children_of(Some(id)).to_vec())
    }

    /// Resolve a path to a cached node, opening folders along the way.
    ///
    /// Names match case-insensitively, as on the service.
    ///
    /// # Returns
    /// `None` for the root.
    pub async fn locate(&mut self, path: &RemotePath) -> Result<Option<EntryId>> {
        if !self.tree.roots_loaded() {
            self.load_roots().await?;
        }

        let mut current: Option<EntryId> = None;
        for name in path.components() {
            if let Some(folder) = &current {
                self.open(folder).await?;
            }
            let next = self
                .tree
                .find_child_by_name(current.as_ref(), name)
                .cloned()
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
            current = Some(next);
        }
        Ok(current)
    }

    /// Move a node under `new_parent` (the top level for `None`).
    ///
    /// # Errors
    /// - `InvalidInput` if the target is a file, the node itself or one of its descendants
    /// - Any store error, after the cache has been restored
    pub async fn move_node(
        &mut self,
        id: &EntryId,
        new_parent: Option<&EntryId>,
    ) -> Result<MoveOutcome> {
        let node = self
            .tree
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("{} is not in the tree", id)))?;
        let from = node.entry.path()?;
        let name = node.entry.name.clone();

        if let Some(target) = new_parent {
            if target == id || self.tree.is_ancestor(id, target) {
                return Err(Error::InvalidInput(format!(
                    "Cannot move {} into itself",
                    from
                )));
            }
        }
        let to = self.tree.folder_path(new_parent)?.join(&name)?;

        if from == to {
            debug!(path = %from, "Move source and destination are identical");
            return Ok(MoveOutcome::Unchanged);
        }

        let transaction = MoveTransaction::apply(&mut self.tree, id, new_parent)?;
        match self.store.move_entry(&from, &to).await {
            Ok(entry) => {
                transaction.commit();
                if let Err(err) = self.tree.update_entry(id, entry.clone()) {
                    warn!(
                        node = %id,
                        path = %entry.path_display,
                        error = %err,
                        "Moved remotely but the cached metadata could not be updated"
                    );
                    return Err(err);
                }
                info!(from = %from, to = %entry.path_display, "Moved");
                Ok(MoveOutcome::Moved(entry))
            }
            Err(err) => {
                warn!(from = %from, to = %to, error = %err, "Move rejected");
                transaction.rollback(&mut self.tree)?;
                Err(err)
            }
        }
    }

    /// Move several nodes in order, stopping at the first failure.
    ///
    /// Moves before the failing one stay committed.
    pub async fn move_nodes(
        &mut self,
        ids: &[EntryId],
        new_parent: Option<&EntryId>,
    ) -> Result<Vec<MoveOutcome>> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            outcomes.push(self.move_node(id, new_parent).await?);
        }
        Ok(outcomes)
    }

    /// Create a folder under `parent` (the top level for `None`).
    ///
    /// # Errors
    /// - `Validation` if `name` contains a reserved character; nothing is sent
    pub async fn create_folder(&mut self, parent: Option<&EntryId>, name: &str) -> Result<EntryId> {
        validate_name(name)?;
        let path = self.tree.folder_path(parent)?.join(name)?;

        let entry = self.store.create_folder(&path).await?;
        let id = entry.id.clone();
        self.tree.insert(parent, Some(0), entry)?;
        info!(path = %path, "Folder created");
        Ok(id)
    }

    /// Resolve `relative` below `parent`, creating missing folders.
    ///
    /// Existing folders are reused by case-insensitive name. Names come from
    /// local folders and are not checked against the reserved characters.
    ///
    /// # Returns
    /// The folder node, or `parent` itself for an empty path.
    ///
    /// # Errors
    /// - `InvalidInput` if a file holds one of the names
    pub async fn ensure_folder_path(
        &mut self,
        parent: Option<&EntryId>,
        relative: &RemotePath,
    ) -> Result<Option<EntryId>> {
        let mut current = parent.cloned();
        for name in relative.components() {
            match &current {
                Some(id) => {
                    self.open(id).await?;
                }
                None if !self.tree.roots_loaded() => {
                    self.load_roots().await?;
                }
                None => {}
            }

            let existing = self
                .tree
                .find_child_by_name(current.as_ref(), name)
                .and_then(|id| self.tree.get(id));
            let next = match existing {
                Some(node) if node.is_folder() => node.entry.id.clone(),
                Some(node) => {
                    return Err(Error::InvalidInput(format!(
                        "{} is a file",
                        node.entry.path_display
                    )));
                }
                None => {
                    let path = self.tree.folder_path(current.as_ref())?.join(name)?;
                    let entry = self.store.create_folder(&path).await?;
                    let id = entry.id.clone();
                    self.tree.insert(current.as_ref(), Some(0), entry)?;
                    info!(path = %path, "Folder created");
                    id
                }
            };
            current = Some(next);
        }
        Ok(current)
    }

    /// Delete nodes.
    ///
    /// Nodes below another requested folder are covered by it and not sent
    /// separately. A node leaves the tree only once the service confirms its
    /// id. Cancelling a batch leaves the tree untouched.
    ///
    /// # Errors
    /// - Any store error; nodes confirmed before it stay deleted
    pub async fn delete(
        &mut self,
        ids: &[EntryId],
        cancel: &CancellationToken,
    ) -> Result<DeleteReport> {
        let targets = self.delete_targets(ids)?;
        if targets.is_empty() {
            return Ok(DeleteReport::default());
        }

        let entries: Vec<Entry> = targets
            .iter()
            .filter_map(|id| self.tree.get(id).map(|n| n.entry.clone()))
            .collect();
        let paths = entries
            .iter()
            .map(Entry::path)
            .collect::<Result<Vec<RemotePath>>>()?;

        let strategy = DeleteStrategy::choose(&entries, self.policy.batch_delete_threshold);
        debug!(count = entries.len(), ?strategy, "Deleting");

        let mut report = DeleteReport::default();
        let requested: HashSet<&EntryId> = targets.iter().collect();

        match strategy {
            DeleteStrategy::Single => {
                for (id, path) in targets.iter().zip(&paths) {
                    let confirmed = self.store.delete(path).await?;
                    if confirmed.id == *id {
                        self.tree.remove(id)?;
                        report.deleted.push(id.clone());
                    } else {
                        report
                            .reasons
                            .push(format!("{} confirmed a different entry", path));
                    }
                }
            }
            DeleteStrategy::Batch => {
                for result in self.store.delete_batch(&paths, cancel).await? {
                    match result {
                        DeleteResult::Deleted(entry) if requested.contains(&entry.id) => {
                            if self.tree.contains(&entry.id) {
                                self.tree.remove(&entry.id)?;
                            }
                            report.deleted.push(entry.id);
                        }
                        DeleteResult::Deleted(entry) => report
                            .reasons
                            .push(format!("{} was not requested", entry.path_display)),
                        DeleteResult::Failed(reason) => report.reasons.push(reason),
                    }
                }
            }
        }

        let deleted: HashSet<&EntryId> = report.deleted.iter().collect();
        report.failed = targets
            .iter()
            .filter(|id| !deleted.contains(id))
            .cloned()
            .collect();
        self.prune_selection();

        if report.is_complete() {
            info!(deleted = report.deleted.len(), "Deleted");
        } else {
            warn!(
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "Delete partially failed"
            );
        }
        Ok(report)
    }

    /// Upload a payload as `name` under `parent`.
    ///
    /// The parent is listed first so an existing entry of that name is known.
    ///
    /// # Errors
    /// - `InvalidInput` if the payload is above the per-call maximum, or a
    ///   folder holds the name; nothing is sent
    pub async fn upload(
        &mut self,
        parent: Option<&EntryId>,
        name: &str,
        payload: Bytes,
        strategy: ExistingFilesStrategy,
    ) -> Result<UploadOutcome> {
        if payload.len() > MAX_UPLOAD_BYTES {
            return Err(Error::InvalidInput(format!(
                "{} is {} bytes, above the {} byte upload limit",
                name,
                payload.len(),
                MAX_UPLOAD_BYTES
            )));
        }
        let path = self.tree.folder_path(parent)?.join(name)?;

        match parent {
            Some(id) => {
                self.open(id).await?;
            }
            None if !self.tree.roots_loaded() => {
                self.load_roots().await?;
            }
            None => {}
        }

        let existing = self
            .tree
            .find_child_by_name(parent, name)
            .and_then(|id| self.tree.get(id))
            .map(|node| node.entry.clone());

        let mode = match (&existing, strategy) {
            (Some(entry), _) if entry.is_folder() => {
                return Err(Error::InvalidInput(format!(
                    "{} is a folder",
                    entry.path_display
                )));
            }
            (Some(entry), ExistingFilesStrategy::Skip) => {
                debug!(path = %path, "Exists, skipping");
                return Ok(UploadOutcome::Skipped(entry.id.clone()));
            }
            (Some(entry), ExistingFilesStrategy::Update) => {
                if entry.content_hash() == Some(compute_hash(&payload).as_str()) {
                    debug!(path = %path, "Content unchanged, skipping");
                    return Ok(UploadOutcome::Skipped(entry.id.clone()));
                }
                WriteMode::Overwrite
            }
            (None, _) => WriteMode::Add,
        };

        let uploaded = self.store.upload(&path, payload, mode).await?;

        if let Some(old) = existing.filter(|e| e.id != uploaded.id) {
            if self.tree.contains(&old.id) {
                self.tree.remove(&old.id)?;
            }
        }
        if self.tree.contains(&uploaded.id) {
            self.tree.update_entry(&uploaded.id, uploaded.clone())?;
        } else {
            self.tree.insert(parent, None, uploaded.clone())?;
        }
        self.prune_selection();

        info!(path = %uploaded.path_display, size = uploaded.size(), ?mode, "Uploaded");
        Ok(UploadOutcome::Uploaded(uploaded))
    }

    /// Replace the selection; ids not in the tree are ignored.
    pub fn set_selection(&mut self, ids: impl IntoIterator<Item = EntryId>) {
        let mut seen = HashSet::new();
        self.selection = ids
            .into_iter()
            .filter(|id| self.tree.contains(id) && seen.insert(id.clone()))
            .collect();
    }

    pub fn selection(&self) -> &[EntryId] {
        &self.selection
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Delete the current selection.
    pub async fn delete_selection(&mut self, cancel: &CancellationToken) -> Result<DeleteReport> {
        let selection = self.selection.clone();
        self.delete(&selection, cancel).await
    }

    /// Deduplicate, check and drop ids already covered by a requested ancestor.
    fn delete_targets(&self, ids: &[EntryId]) -> Result<Vec<EntryId>> {
        let mut unique: Vec<EntryId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !self.tree.contains(id) {
                return Err(Error::NotFound(format!("{} is not in the tree", id)));
            }
            if !unique.contains(id) {
                unique.push(id.clone());
            }
        }

        Ok(unique
            .iter()
            .filter(|id| !unique.iter().any(|other| self.tree.is_ancestor(other, id)))
            .cloned()
            .collect())
    }

    fn prune_selection(&mut self) {
        let tree = &self.tree;
        self.selection.retain(|id| tree.contains(id));
    }
}
