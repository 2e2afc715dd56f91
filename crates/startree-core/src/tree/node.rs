//! Tree vertices.
//!
//! A node is either a leaf owning a record store or an internal node split on
//! one dimension. Internal nodes own their concrete children (the long-tail
//! child included, under [`OTHER`]) and exactly one star child.

use std::collections::BTreeMap;

use uuid::Uuid;

use super::insert::BuildContext;
use crate::error::Result;
use crate::record::{OTHER, STAR};
use crate::store::{LeafContext, RecordStore};

/// Node payload; leaf and internal states are exclusive.
#[derive(Debug)]
pub(crate) enum NodeKind {
    Leaf {
        store: Box<dyn RecordStore>,
    },
    Internal {
        split_dimension: String,
        /// Concrete children keyed by split value, [`OTHER`] included.
        children: BTreeMap<String, StarTreeNode>,
        star: Box<StarTreeNode>,
    },
}

/// A vertex of the star tree.
#[derive(Debug)]
pub struct StarTreeNode {
    id: Uuid,
    dimension_name: Option<String>,
    dimension_value: String,
    pub(crate) path: Vec<(String, String)>,
    pub(crate) kind: NodeKind,
}

impl StarTreeNode {
    /// Creates a leaf and its record store, opening the store if the tree is open.
    pub(crate) fn new_leaf(
        dimension_name: Option<&str>,
        dimension_value: &str,
        path: Vec<(String, String)>,
        ctx: &BuildContext<'_>,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let mut store = ctx.factory.create_store(&LeafContext {
            node_id: id,
            path: &path,
            config: ctx.config,
        })?;
        if ctx.open_stores {
            store.open()?;
        }
        Ok(Self {
            id,
            dimension_name: dimension_name.map(str::to_string),
            dimension_value: dimension_value.to_string(),
            path,
            kind: NodeKind::Leaf { store },
        })
    }

    /// Creates the root leaf.
    pub(crate) fn new_root(ctx: &BuildContext<'_>) -> Result<Self> {
        Self::new_leaf(None, STAR, Vec::new(), ctx)
    }

    /// Unique node identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Dimension the parent split on; `None` for the root.
    #[must_use]
    pub fn dimension_name(&self) -> Option<&str> {
        self.dimension_name.as_deref()
    }

    /// Value of the parent's split dimension leading here (`*` for star children and the root).
    #[must_use]
    pub fn dimension_value(&self) -> &str {
        &self.dimension_value
    }

    /// `(dimension, value)` pairs from the root to this node.
    #[must_use]
    pub fn path(&self) -> &[(String, String)] {
        &self.path
    }

    /// Distance from the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Returns true for leaves.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Returns true for the star child of its parent.
    #[must_use]
    pub fn is_star(&self) -> bool {
        self.dimension_name.is_some() && self.dimension_value == STAR
    }

    /// Returns true for the long-tail child of its parent.
    #[must_use]
    pub fn is_other(&self) -> bool {
        self.dimension_name.is_some() && self.dimension_value == OTHER
    }

    /// Dimension an internal node splits on.
    #[must_use]
    pub fn split_dimension(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Internal {
                split_dimension, ..
            } => Some(split_dimension),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Concrete children in value order, the long-tail child included.
    pub fn children(&self) -> impl Iterator<Item = &StarTreeNode> + '_ {
        let children = match &self.kind {
            NodeKind::Internal { children, .. } => Some(children.values()),
            NodeKind::Leaf { .. } => None,
        };
        children.into_iter().flatten()
    }

    /// Child for an exact split value.
    #[must_use]
    pub fn child(&self, value: &str) -> Option<&StarTreeNode> {
        match &self.kind {
            NodeKind::Internal { children, .. } => children.get(value),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Long-tail child, if one was created.
    #[must_use]
    pub fn other_child(&self) -> Option<&StarTreeNode> {
        self.child(OTHER)
    }

    /// Star child of an internal node.
    #[must_use]
    pub fn star_child(&self) -> Option<&StarTreeNode> {
        match &self.kind {
            NodeKind::Internal { star, .. } => Some(&**star),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Number of concrete children, the long-tail child excluded.
    #[must_use]
    pub fn concrete_child_count(&self) -> usize {
        match &self.kind {
            NodeKind::Internal { children, .. } => {
                children.keys().filter(|k| k.as_str() != OTHER).count()
            }
            NodeKind::Leaf { .. } => 0,
        }
    }

    /// Record store of a leaf.
    #[must_use]
    pub fn record_store(&self) -> Option<&dyn RecordStore> {
        match &self.kind {
            NodeKind::Leaf { store } => Some(store.as_ref()),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Visits every node of the subtree, parents before children, star child last.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a StarTreeNode)) {
        visit(self);
        if let NodeKind::Internal { children, star, .. } = &self.kind {
            for child in children.values() {
                child.walk(visit);
            }
            star.walk(visit);
        }
    }

    /// Every leaf of the subtree.
    #[must_use]
    pub fn leaves(&self) -> Vec<&StarTreeNode> {
        let mut leaves = Vec::new();
        self.walk(&mut |node| {
            if node.is_leaf() {
                leaves.push(node);
            }
        });
        leaves
    }

    /// Applies `f` to every leaf store of the subtree, stopping at the first error.
    pub(crate) fn try_for_each_store(
        &mut self,
        f: &mut dyn FnMut(&mut dyn RecordStore) -> Result<()>,
    ) -> Result<()> {
        match &mut self.kind {
            NodeKind::Leaf { store } => f(store.as_mut()),
            NodeKind::Internal { children, star, .. } => {
                for child in children.values_mut() {
                    child.try_for_each_store(f)?;
                }
                star.try_for_each_store(f)
            }
        }
    }

    /// Destroys every store of a subtree about to be dropped.
    ///
    /// Failures are logged; the subtree is unreachable afterwards either way.
    pub(crate) fn destroy(&mut self) {
        let id = self.id;
        let _ = self.try_for_each_store(&mut |store| {
            if let Err(e) = store.destroy() {
                tracing::warn!(node = %id, error = %e, "Failed to destroy record store");
            }
            Ok(())
        });
    }
}

/// Extends `path` by one `(dimension, value)` step.
pub(crate) fn child_path(
    path: &[(String, String)],
    dimension: &str,
    value: &str,
) -> Vec<(String, String)> {
    let mut child = Vec::with_capacity(path.len() + 1);
    child.extend_from_slice(path);
    child.push((dimension.to_string(), value.to_string()));
    child
}
