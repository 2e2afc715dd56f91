//! Insertion and leaf splitting.
//!
//! # Split
//!
//! When a leaf's store holds more than `max_record_store_entries` distinct
//! dimension keys, the leaf splits on the next dimension in config order. The
//! drained records are re-inserted into fresh concrete children and, with the
//! split dimension set to `*`, into a fresh star child. The new subtree is
//! built detached; the leaf only becomes internal once every re-insert
//! succeeded. On failure the detached subtree is destroyed and the leaf keeps
//! its store. The record that triggered the split is already stored, so the
//! split is retried by the next insert reaching the leaf.
//!
//! # Partial inserts
//!
//! Below an internal node a record goes to a concrete child first and then,
//! wildcarded, to the star child. If the second insert fails the first one
//! cannot be undone; `BuildContext::torn` reports it so the tree can refuse
//! further use.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use super::admission::{Admission, AdmissionPhase, AdmissionRequest, ChildAdmission};
use super::node::{child_path, NodeKind, StarTreeNode};
use crate::config::StarTreeConfig;
use crate::error::Result;
use crate::record::{StarTreeRecord, OTHER, STAR};
use crate::store::RecordStoreFactory;

/// Everything node creation needs from the owning tree.
pub(crate) struct BuildContext<'a> {
    pub(crate) config: &'a StarTreeConfig,
    pub(crate) factory: &'a dyn RecordStoreFactory,
    pub(crate) admission: &'a dyn ChildAdmission,
    /// Open new stores right away (tree is open).
    pub(crate) open_stores: bool,
    /// Splits committed during this build.
    pub(crate) splits: u64,
    /// A record reached some stores of the live tree but not all of them.
    pub(crate) torn: bool,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(
        config: &'a StarTreeConfig,
        factory: &'a dyn RecordStoreFactory,
        admission: &'a dyn ChildAdmission,
        open_stores: bool,
    ) -> Self {
        Self {
            config,
            factory,
            admission,
            open_stores,
            splits: 0,
            torn: false,
        }
    }
}

impl StarTreeNode {
    /// Inserts a normalized record standing for `count` raw records.
    pub(crate) fn insert(
        &mut self,
        record: &StarTreeRecord,
        count: u64,
        ctx: &mut BuildContext<'_>,
    ) -> Result<()> {
        let entries = match &mut self.kind {
            NodeKind::Leaf { store } => {
                store.add_counted(record, count)?;
                store.entry_count()
            }
            NodeKind::Internal {
                split_dimension,
                children,
                star,
            } => {
                return insert_internal(
                    &self.path,
                    split_dimension,
                    children,
                    star,
                    record,
                    count,
                    ctx,
                );
            }
        };

        let config = ctx.config;
        if entries > config.max_record_store_entries() {
            if let Some(dimension) = config.dimension_names().get(self.depth()) {
                if let Err(e) = self.split(dimension, ctx) {
                    tracing::warn!(
                        node = %self.id(),
                        dimension = dimension.as_str(),
                        entries,
                        error = %e,
                        "Split failed, leaf keeps its records until the next insert"
                    );
                }
            }
        }
        Ok(())
    }

    /// Turns this leaf into an internal node split on `dimension`.
    fn split(&mut self, dimension: &str, ctx: &mut BuildContext<'_>) -> Result<()> {
        let records = match &self.kind {
            NodeKind::Leaf { store } => store.counted_records()?,
            NodeKind::Internal { .. } => return Ok(()),
        };

        let assignment = assign_children(dimension, &records, ctx.admission);
        let mut children = BTreeMap::new();
        let mut star = StarTreeNode::new_leaf(
            Some(dimension),
            STAR,
            child_path(&self.path, dimension, STAR),
            ctx,
        )?;

        let committed = (ctx.splits, ctx.torn);
        if let Err(e) = self.fill_split(dimension, &records, &assignment, &mut children, &mut star, ctx)
        {
            (ctx.splits, ctx.torn) = committed;
            for child in children.values_mut() {
                child.destroy();
            }
            star.destroy();
            return Err(e);
        }

        let child_count = children.len();
        let old = std::mem::replace(
            &mut self.kind,
            NodeKind::Internal {
                split_dimension: dimension.to_string(),
                children,
                star: Box::new(star),
            },
        );
        if let NodeKind::Leaf { mut store } = old {
            if let Err(e) = store.destroy() {
                tracing::warn!(node = %self.id(), error = %e, "Failed to release split leaf store");
            }
        }
        ctx.splits += 1;

        tracing::debug!(
            node = %self.id(),
            dimension,
            depth = self.depth(),
            children = child_count,
            records = records.len(),
            "Split leaf"
        );
        Ok(())
    }

    /// Re-inserts drained records into the detached children.
    fn fill_split(
        &self,
        dimension: &str,
        records: &[(StarTreeRecord, u64)],
        assignment: &FxHashMap<&str, &str>,
        children: &mut BTreeMap<String, StarTreeNode>,
        star: &mut StarTreeNode,
        ctx: &mut BuildContext<'_>,
    ) -> Result<()> {
        for (record, count) in records {
            let value = record.dimension(dimension).unwrap_or(OTHER);
            let key = assignment.get(value).copied().unwrap_or(OTHER);
            let child = match children.entry(key.to_string()) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(StarTreeNode::new_leaf(
                    Some(dimension),
                    key,
                    child_path(&self.path, dimension, key),
                    ctx,
                )?),
            };
            child.insert(record, *count, ctx)?;
            star.insert(&record.with_dimension(dimension, STAR), *count, ctx)?;
        }
        Ok(())
    }
}

/// Routes one record through an internal node.
fn insert_internal(
    path: &[(String, String)],
    split_dimension: &str,
    children: &mut BTreeMap<String, StarTreeNode>,
    star: &mut StarTreeNode,
    record: &StarTreeRecord,
    count: u64,
    ctx: &mut BuildContext<'_>,
) -> Result<()> {
    let value = record.dimension(split_dimension).unwrap_or(OTHER);
    let key = if children.contains_key(value) || value == OTHER {
        value
    } else {
        let request = AdmissionRequest {
            dimension: split_dimension,
            value,
            concrete_children: children.keys().filter(|k| k.as_str() != OTHER).count(),
            phase: AdmissionPhase::Insert,
        };
        match ctx.admission.admit(&request) {
            Admission::NewChild => value,
            Admission::Other => OTHER,
        }
    };

    let mut created = false;
    let child = match children.entry(key.to_string()) {
        Entry::Occupied(e) => e.into_mut(),
        Entry::Vacant(e) => {
            created = true;
            tracing::debug!(dimension = split_dimension, value = key, "Creating child");
            e.insert(StarTreeNode::new_leaf(
                Some(split_dimension),
                key,
                child_path(path, split_dimension, key),
                ctx,
            )?)
        }
    };

    if let Err(e) = child.insert(record, count, ctx) {
        if created {
            if let Some(mut orphan) = children.remove(key) {
                tracing::warn!(
                    dimension = split_dimension,
                    value = key,
                    error = %e,
                    "Insert failed, removing newly created child"
                );
                orphan.destroy();
            }
        }
        return Err(e);
    }

    if let Err(e) = star.insert(&record.with_dimension(split_dimension, STAR), count, ctx) {
        ctx.torn = true;
        tracing::warn!(
            dimension = split_dimension,
            value = key,
            error = %e,
            "Star insert failed after the concrete insert"
        );
        return Err(e);
    }
    Ok(())
}

/// Decides, per distinct value of the drained batch, which child key it lands under.
///
/// Values are weighted by the raw records they stand for and admitted most
/// frequent first so caps keep the heavy hitters.
fn assign_children<'r>(
    dimension: &str,
    records: &'r [(StarTreeRecord, u64)],
    admission: &dyn ChildAdmission,
) -> FxHashMap<&'r str, &'r str> {
    let mut counts: FxHashMap<&str, u64> = FxHashMap::default();
    for (record, count) in records {
        *counts
            .entry(record.dimension(dimension).unwrap_or(OTHER))
            .or_default() += count;
    }

    let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let total: u64 = records.iter().map(|(_, count)| count).sum();
    let mut concrete = 0usize;
    let mut assignment = FxHashMap::default();
    for (value, count) in ranked {
        if value == OTHER {
            assignment.insert(value, OTHER);
            continue;
        }
        let request = AdmissionRequest {
            dimension,
            value,
            concrete_children: concrete,
            phase: AdmissionPhase::Split { count, total },
        };
        match admission.admit(&request) {
            Admission::NewChild => {
                concrete += 1;
                assignment.insert(value, value);
            }
            Admission::Other => {
                assignment.insert(value, OTHER);
            }
        }
    }
    assignment
}
