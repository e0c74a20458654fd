//! Undo records for optimistic tree mutations.

use tracing::warn;

use dropmirror_common::{EntryId, Result};

use crate::tree::TreeCache;

/// Position of a node inside its parent's children list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// `None` for the top level.
    pub parent: Option<EntryId>,
    pub index: usize,
}

/// A relocation applied to the cache ahead of remote confirmation.
///
/// Holds the minimal pre-state needed to put the node back exactly where it
/// was: the old parent and the old index.
#[derive(Debug)]
#[must_use = "a move must be either committed or rolled back"]
pub struct MoveTransaction {
    node: EntryId,
    origin: Placement,
    target: Placement,
}

impl MoveTransaction {
    /// Detach `node` and attach it at the front of `new_parent`.
    ///
    /// If attaching fails the node is put back before the error is returned.
    pub fn apply(tree: &mut TreeCache, node: &EntryId, new_parent: Option<&EntryId>) -> Result<Self> {
        let origin = tree.detach(node)?;
        let target = Placement {
            parent: new_parent.cloned(),
            index: 0,
        };

        if let Err(err) = tree.attach(node, target.clone()) {
            tree.attach(node, origin)?;
            return Err(err);
        }

        Ok(Self {
            node: node.clone(),
            origin,
            target,
        })
    }

    pub fn node(&self) -> &EntryId {
        &self.node
    }

    pub fn origin(&self) -> &Placement {
        &self.origin
    }

    pub fn target(&self) -> &Placement {
        &self.target
    }

    /// Keep the move.
    pub fn commit(self) -> EntryId {
        self.node
    }

    /// Remove the node from the new parent's list and reinsert it into the
    /// old parent's list at its old index.
    pub fn rollback(self, tree: &mut TreeCache) -> Result<()> {
        warn!(node = %self.node, "Rolling back move");
        tree.detach(&self.node)?;
        tree.attach(&self.node, self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropmirror_storage::Entry;

    fn id(s: &str) -> EntryId {
        EntryId::new(s).unwrap()
    }

    fn tree() -> TreeCache {
        let mut tree = TreeCache::new();
        tree.replace_children(
            None,
            vec![
                Entry::folder(id("a"), "A", "/A"),
                Entry::folder(id("b"), "B", "/B"),
            ],
        )
        .unwrap();
        tree.replace_children(
            Some(&id("a")),
            vec![
                Entry::file(id("w"), "w", "/A/w", 1, None),
                Entry::file(id("x"), "x", "/A/x", 1, None),
            ],
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_apply_relocates_once() {
        let mut tree = tree();
        let tx = MoveTransaction::apply(&mut tree, &id("x"), Some(&id("b"))).unwrap();

        assert_eq!(tx.origin(), &Placement { parent: Some(id("a")), index: 1 });
        assert_eq!(tree.children_of(Some(&id("a"))), &[id("w")]);
        assert_eq!(tree.children_of(Some(&id("b"))), &[id("x")]);
        assert_eq!(tree.parent_of(&id("x")), Some(&id("b")));
        assert_eq!(tx.commit(), id("x"));
    }

    #[test]
    fn test_rollback_restores_exact_position() {
        let mut tree = tree();
        let tx = MoveTransaction::apply(&mut tree, &id("x"), None).unwrap();
        assert_eq!(tree.roots(), &[id("x"), id("a"), id("b")]);

        tx.rollback(&mut tree).unwrap();
        assert_eq!(tree.roots(), &[id("a"), id("b")]);
        assert_eq!(tree.children_of(Some(&id("a"))), &[id("w"), id("x")]);
        assert_eq!(tree.parent_of(&id("x")), Some(&id("a")));
    }

    #[test]
    fn test_failed_attach_leaves_tree_untouched() {
        let mut tree = tree();
        let err = MoveTransaction::apply(&mut tree, &id("x"), Some(&id("w")));
        assert!(err.is_err());
        assert_eq!(tree.children_of(Some(&id("a"))), &[id("w"), id("x")]);
    }
}
