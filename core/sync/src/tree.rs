//! Arena-backed cache of the remote folder hierarchy.
//!
//! Nodes live in a map keyed by [`EntryId`]. A node owns the ordered list of
//! its children's ids and refers to its parent by id only, so relocating a
//! subtree never touches more than the two sibling lists involved.

use std::collections::{HashMap, HashSet};

use dropmirror_common::{EntryId, Error, RemotePath, Result};
use dropmirror_storage::Entry;

use crate::transaction::Placement;

/// A cached remote entry and its edges.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub entry: Entry,
    /// `None` for top-level entries.
    pub parent: Option<EntryId>,
    pub children: Vec<EntryId>,
    /// Children have been listed at least once.
    pub loaded: bool,
}

impl TreeNode {
    fn new(entry: Entry, parent: Option<EntryId>) -> Self {
        Self {
            entry,
            parent,
            children: Vec::new(),
            loaded: false,
        }
    }

    pub fn id(&self) -> &EntryId {
        &self.entry.id
    }

    pub fn is_folder(&self) -> bool {
        self.entry.is_folder()
    }
}

/// The cached hierarchy.
#[derive(Debug, Default)]
pub struct TreeCache {
    nodes: HashMap<EntryId, TreeNode>,
    roots: Vec<EntryId>,
    roots_loaded: bool,
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.roots_loaded = false;
    }

    pub fn get(&self, id: &EntryId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn roots(&self) -> &[EntryId] {
        &self.roots
    }

    /// Whether the top level has been listed.
    pub fn roots_loaded(&self) -> bool {
        self.roots_loaded
    }

    /// Whether the children of `parent` (the top level for `None`) have been listed.
    pub fn is_loaded(&self, parent: Option<&EntryId>) -> bool {
        match parent {
            None => self.roots_loaded,
            Some(id) => self.nodes.get(id).is_some_and(|n| n.loaded),
        }
    }

    /// Ordered children of `parent`; the roots for `None`.
    pub fn children_of(&self, parent: Option<&EntryId>) -> &[EntryId] {
        match parent {
            None => &self.roots,
            Some(id) => self
                .nodes
                .get(id)
                .map(|n| n.children.as_slice())
                .unwrap_or(&[]),
        }
    }

    pub fn parent_of(&self, id: &EntryId) -> Option<&EntryId> {
        self.nodes.get(id).and_then(|n| n.parent.as_ref())
    }

    /// Path of a folder, or the root path for `None`.
    ///
    /// # Errors
    /// - `NotFound` if `parent` is not cached
    /// - `InvalidInput` if `parent` is a file
    pub fn folder_path(&self, parent: Option<&EntryId>) -> Result<RemotePath> {
        match parent {
            None => Ok(RemotePath::root()),
            Some(id) => {
                let node = self.node(id)?;
                if !node.is_folder() {
                    return Err(Error::InvalidInput(format!(
                        "{} is not a folder",
                        node.entry.path_display
                    )));
                }
                node.entry.path()
            }
        }
    }

    /// Child of `parent` whose name matches case-insensitively.
    pub fn find_child_by_name(&self, parent: Option<&EntryId>, name: &str) -> Option<&EntryId> {
        let wanted = name.to_lowercase();
        self.children_of(parent).iter().find(|id| {
            self.nodes
                .get(*id)
                .is_some_and(|n| n.entry.name.to_lowercase() == wanted)
        })
    }

    /// True if `ancestor` lies on the parent chain of `id`.
    pub fn is_ancestor(&self, ancestor: &EntryId, id: &EntryId) -> bool {
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_of(parent);
        }
        false
    }

    /// Add a new node under `parent` at `index` (appended when `None` or out of range).
    ///
    /// # Errors
    /// - `InvalidInput` if the id is already cached or `parent` is a file
    /// - `NotFound` if `parent` is not cached
    pub fn insert(
        &mut self,
        parent: Option<&EntryId>,
        index: Option<usize>,
        entry: Entry,
    ) -> Result<()> {
        if self.nodes.contains_key(&entry.id) {
            return Err(Error::InvalidInput(format!(
                "{} is already in the tree",
                entry.id
            )));
        }
        self.check_folder(parent)?;

        let id = entry.id.clone();
        self.nodes
            .insert(id.clone(), TreeNode::new(entry, parent.cloned()));
        let siblings = self.siblings_mut(parent)?;
        let index = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(index, id);
        Ok(())
    }

    /// Unlink a node from its parent's list, keeping it and its subtree cached.
    ///
    /// # Returns
    /// Where the node was, for a later [`TreeCache::attach`].
    pub fn detach(&mut self, id: &EntryId) -> Result<Placement> {
        let parent = self.node(id)?.parent.clone();
        let siblings = self.siblings_mut(parent.as_ref())?;
        let index = siblings.iter().position(|s| s == id).ok_or_else(|| {
            Error::InvalidInput(format!("{} is not linked to its parent", id))
        })?;
        siblings.remove(index);
        Ok(Placement { parent, index })
    }

    /// Link a detached node at `placement`.
    pub fn attach(&mut self, id: &EntryId, placement: Placement) -> Result<()> {
        self.node(id)?;
        self.check_folder(placement.parent.as_ref())?;

        let siblings = self.siblings_mut(placement.parent.as_ref())?;
        if siblings.contains(id) {
            return Err(Error::InvalidInput(format!("{} is already attached", id)));
        }
        let index = placement.index.min(siblings.len());
        siblings.insert(index, id.clone());

        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = placement.parent;
        }
        Ok(())
    }

    /// Remove a node and its whole subtree.
    ///
    /// # Returns
    /// The removed ids, the node itself first.
    pub fn remove(&mut self, id: &EntryId) -> Result<Vec<EntryId>> {
        self.detach(id)?;

        let mut removed = Vec::new();
        let mut pending = vec![id.clone()];
        while let Some(next) = pending.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                pending.extend(node.children);
                removed.push(next);
            }
        }
        Ok(removed)
    }

    /// Replace the children of `parent` with a fresh listing and mark it loaded.
    ///
    /// Nodes that are still present keep their own subtrees; nodes that
    /// disappeared are dropped with theirs. Listing order is kept.
    pub fn replace_children(&mut self, parent: Option<&EntryId>, entries: Vec<Entry>) -> Result<()> {
        self.check_folder(parent)?;

        let listed: HashSet<EntryId> = entries.iter().map(|e| e.id.clone()).collect();
        let stale: Vec<EntryId> = self
            .children_of(parent)
            .iter()
            .filter(|id| !listed.contains(*id))
            .cloned()
            .collect();
        for id in stale {
            self.remove(&id)?;
        }

        let mut order = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry.id.clone();
            if self.nodes.contains_key(&id) {
                // Known node, possibly cached elsewhere after a remote move.
                self.detach(&id)?;
                self.update_entry(&id, entry)?;
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.parent = parent.cloned();
                }
            } else {
                self.nodes
                    .insert(id.clone(), TreeNode::new(entry, parent.cloned()));
            }
            order.push(id);
        }

        *self.siblings_mut(parent)? = order;
        match parent {
            None => self.roots_loaded = true,
            Some(id) => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.loaded = true;
                }
            }
        }
        Ok(())
    }

    /// Store fresh metadata for a node.
    ///
    /// When a folder's path changes, descendant paths are rewritten to the
    /// new prefix.
    pub fn update_entry(&mut self, id: &EntryId, entry: Entry) -> Result<()> {
        if entry.id != *id {
            return Err(Error::InvalidInput(format!(
                "metadata for {} does not belong to {}",
                entry.id, id
            )));
        }

        let node = self.node_mut(id)?;
        let old_prefix = node.entry.path_display.clone();
        let new_prefix = entry.path_display.clone();
        node.entry = entry;

        if old_prefix != new_prefix {
            let mut pending: Vec<EntryId> = self.children_of(Some(id)).to_vec();
            while let Some(next) = pending.pop() {
                if let Some(child) = self.nodes.get_mut(&next) {
                    if let Some(rest) = child.entry.path_display.strip_prefix(&old_prefix) {
                        child.entry.path_display = format!("{}{}", new_prefix, rest);
                    }
                    pending.extend(child.children.iter().cloned());
                }
            }
        }
        Ok(())
    }

    /// Every node in display order with its depth.
    pub fn depth_first(&self) -> Vec<(usize, &TreeNode)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, &EntryId)> = self.roots.iter().rev().map(|id| (0, id)).collect();
        while let Some((depth, id)) = stack.pop() {
            if let Some(node) = self.nodes.get(id) {
                out.push((depth, node));
                stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
            }
        }
        out
    }

    fn node(&self, id: &EntryId) -> Result<&TreeNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("{} is not in the tree", id)))
    }

    fn node_mut(&mut self, id: &EntryId) -> Result<&mut TreeNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("{} is not in the tree", id)))
    }

    fn check_folder(&self, parent: Option<&EntryId>) -> Result<()> {
        self.folder_path(parent).map(|_| ())
    }

    fn siblings_mut(&mut self, parent: Option<&EntryId>) -> Result<&mut Vec<EntryId>> {
        match parent {
            None => Ok(&mut self.roots),
            Some(id) => Ok(&mut self.node_mut(id)?.children),
        }
    }
}
