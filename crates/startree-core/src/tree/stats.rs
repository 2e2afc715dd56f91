//! Tree shape and ingestion counters.

use serde::{Deserialize, Serialize};

use super::node::StarTreeNode;
use crate::record::TimeBucket;

/// Read-only snapshot of a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarTreeStats {
    /// Nodes, internal and leaf.
    pub node_count: usize,
    /// Leaves.
    pub leaf_count: usize,
    /// Depth of the deepest leaf (the root is at depth 0).
    pub max_depth: usize,
    /// Distinct dimension keys held across all leaf stores, star copies included.
    pub entry_count: usize,
    /// Records accepted by `add`.
    pub record_count: u64,
    /// Leaf splits committed.
    pub split_count: u64,
    /// Smallest time bucket seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_time: Option<TimeBucket>,
    /// Largest time bucket seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time: Option<TimeBucket>,
}

impl StarTreeStats {
    pub(crate) fn collect(
        root: &StarTreeNode,
        record_count: u64,
        split_count: u64,
        min_time: Option<TimeBucket>,
        max_time: Option<TimeBucket>,
    ) -> Self {
        let mut stats = Self {
            record_count,
            split_count,
            min_time,
            max_time,
            ..Self::default()
        };
        root.walk(&mut |node| {
            stats.node_count += 1;
            if let Some(store) = node.record_store() {
                stats.leaf_count += 1;
                stats.max_depth = stats.max_depth.max(node.depth());
                stats.entry_count += store.entry_count();
            }
        });
        stats
    }

    /// Internal nodes.
    #[must_use]
    pub fn internal_count(&self) -> usize {
        self.node_count - self.leaf_count
    }
}
