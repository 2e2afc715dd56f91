//! Query routing: resolving a partially wildcarded query to tree nodes.
//!
//! At an internal node split on dimension `d`:
//!
//! | query value for `d`         | `find`               | `find_all`             |
//! |-----------------------------|----------------------|------------------------|
//! | value with a child          | that child           | that child             |
//! | value without a child       | `?` child, else `*`  | `?` child, else `*`    |
//! | `*`                         | `*` child            | `*` child              |
//! | unconstrained               | `*` child            | every concrete child   |
//!
//! `find_all` never adds the star child next to the concrete children: it
//! holds copies of their records and would double count.

use std::collections::{BTreeMap, BTreeSet};

use super::node::{NodeKind, StarTreeNode};
use super::StarTree;
use crate::error::{Error, Result};
use crate::query::{DimensionSpec, RecordFilter, StarTreeQuery};
use crate::record::OTHER;

impl StarTree {
    /// Returns the single leaf answering `query`.
    ///
    /// Unconstrained dimensions are treated as `*`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDimension`] for dimensions outside the config,
    /// [`Error::Closed`] after `close()` or [`Error::Inconsistent`] on a failed tree.
    pub fn find(&self, query: &StarTreeQuery) -> Result<&StarTreeNode> {
        self.ensure_usable()?;
        query.validate(self.config())?;
        Ok(find_leaf(self.root(), query))
    }

    /// Returns every leaf whose records together answer `query`.
    ///
    /// # Errors
    ///
    /// Same as [`StarTree::find`].
    pub fn find_all(&self, query: &StarTreeQuery) -> Result<Vec<&StarTreeNode>> {
        self.ensure_usable()?;
        query.validate(self.config())?;
        let mut leaves = Vec::new();
        collect_leaves(self.root(), query, &mut leaves);
        Ok(leaves)
    }

    /// Distinct concrete values of `dimension` among records matching `fixed`.
    ///
    /// Never returns `*` or `?`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDimension`] if `dimension` or a key of `fixed`
    /// is outside the config, or a storage error.
    pub fn dimension_values(
        &self,
        dimension: &str,
        fixed: &BTreeMap<String, String>,
    ) -> Result<BTreeSet<String>> {
        self.ensure_usable()?;
        let config = self.config();
        if let Some(unknown) = std::iter::once(dimension)
            .chain(fixed.keys().map(String::as_str))
            .find(|d| !config.has_dimension(d))
        {
            return Err(Error::UnknownDimension(unknown.to_string()));
        }
        let mut values = BTreeSet::new();
        collect_values(self.root(), dimension, fixed, &mut values)?;
        Ok(values)
    }
}

/// Child serving a concrete value that may have no dedicated child.
fn route_value<'a>(
    children: &'a BTreeMap<String, StarTreeNode>,
    star: &'a StarTreeNode,
    value: &str,
) -> &'a StarTreeNode {
    children
        .get(value)
        .or_else(|| children.get(OTHER))
        .unwrap_or(star)
}

pub(crate) fn find_leaf<'a>(root: &'a StarTreeNode, query: &StarTreeQuery) -> &'a StarTreeNode {
    let mut node = root;
    while let NodeKind::Internal {
        split_dimension,
        children,
        star,
    } = &node.kind
    {
        node = match query.spec(split_dimension) {
            Some(DimensionSpec::Value(value)) => route_value(children, star, value),
            Some(DimensionSpec::Star) | None => &**star,
        };
    }
    node
}

pub(crate) fn collect_leaves<'a>(
    node: &'a StarTreeNode,
    query: &StarTreeQuery,
    out: &mut Vec<&'a StarTreeNode>,
) {
    match &node.kind {
        NodeKind::Leaf { .. } => out.push(node),
        NodeKind::Internal {
            split_dimension,
            children,
            star,
        } => match query.spec(split_dimension) {
            Some(DimensionSpec::Value(value)) => {
                collect_leaves(route_value(children, star, value), query, out);
            }
            Some(DimensionSpec::Star) => collect_leaves(star, query, out),
            None => {
                for child in children.values() {
                    collect_leaves(child, query, out);
                }
            }
        },
    }
}

fn collect_values(
    node: &StarTreeNode,
    dimension: &str,
    fixed: &BTreeMap<String, String>,
    out: &mut BTreeSet<String>,
) -> Result<()> {
    match &node.kind {
        NodeKind::Leaf { store } => {
            let filter = RecordFilter::residual(
                fixed.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                node.path(),
                None,
            );
            out.extend(store.dimension_values(dimension, &filter)?);
            Ok(())
        }
        NodeKind::Internal {
            split_dimension,
            children,
            ..
        } if split_dimension == dimension => match fixed.get(dimension) {
            Some(value) => match children.get(value).or_else(|| children.get(OTHER)) {
                Some(child) => collect_values(child, dimension, fixed, out),
                None => Ok(()),
            },
            // A child key only counts if its subtree holds a record matching
            // the fixed values of deeper dimensions.
            None => children
                .values()
                .try_for_each(|child| collect_values(child, dimension, fixed, out)),
        },
        NodeKind::Internal {
            split_dimension,
            children,
            star,
        } => match fixed.get(split_dimension.as_str()) {
            Some(value) => match children.get(value).or_else(|| children.get(OTHER)) {
                Some(child) => collect_values(child, dimension, fixed, out),
                None => Ok(()),
            },
            None => collect_values(star, dimension, fixed, out),
        },
    }
}
