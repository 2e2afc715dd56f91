//! Thread-safe handle to a [`StarTree`].
//!
//! Writers hold the write lock for a whole `add`, so readers never observe a
//! split half-done. Queries share the read lock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use super::{StarTree, StarTreeStats, TreeState};
use crate::error::Result;
use crate::query::StarTreeQuery;
use crate::record::StarTreeRecord;

/// Cloneable, shareable star tree.
#[derive(Debug, Clone)]
pub struct ConcurrentStarTree {
    inner: Arc<RwLock<StarTree>>,
}

impl ConcurrentStarTree {
    /// Wraps a tree.
    #[must_use]
    pub fn new(tree: StarTree) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    /// Opens the tree's stores.
    ///
    /// # Errors
    ///
    /// Same as [`StarTree::open`].
    pub fn open(&self) -> Result<()> {
        self.inner.write().open()
    }

    /// Closes the tree's stores.
    ///
    /// # Errors
    ///
    /// Same as [`StarTree::close`].
    pub fn close(&self) -> Result<()> {
        self.inner.write().close()
    }

    /// Inserts one record under the write lock.
    ///
    /// # Errors
    ///
    /// Same as [`StarTree::add`].
    pub fn add(&self, record: StarTreeRecord) -> Result<()> {
        self.inner.write().add(record)
    }

    /// Inserts a batch under a single write lock.
    ///
    /// # Errors
    ///
    /// Same as [`StarTree::add_all`].
    pub fn add_all<I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = StarTreeRecord>,
    {
        self.inner.write().add_all(records)
    }

    /// See [`StarTree::aggregate`].
    ///
    /// # Errors
    ///
    /// Same as [`StarTree::aggregate`].
    pub fn aggregate(&self, query: &StarTreeQuery) -> Result<StarTreeRecord> {
        self.inner.read().aggregate(query)
    }

    /// See [`StarTree::time_series`].
    ///
    /// # Errors
    ///
    /// Same as [`StarTree::time_series`].
    pub fn time_series(&self, query: &StarTreeQuery) -> Result<Vec<StarTreeRecord>> {
        self.inner.read().time_series(query)
    }

    /// See [`StarTree::dimension_values`].
    ///
    /// # Errors
    ///
    /// Same as [`StarTree::dimension_values`].
    pub fn dimension_values(
        &self,
        dimension: &str,
        fixed: &BTreeMap<String, String>,
    ) -> Result<BTreeSet<String>> {
        self.inner.read().dimension_values(dimension, fixed)
    }

    /// Path of the leaf [`StarTree::find`] returns.
    ///
    /// # Errors
    ///
    /// Same as [`StarTree::find`].
    pub fn find_path(&self, query: &StarTreeQuery) -> Result<Vec<(String, String)>> {
        Ok(self.inner.read().find(query)?.path().to_vec())
    }

    /// Snapshot of the tree's counters.
    #[must_use]
    pub fn stats(&self) -> StarTreeStats {
        self.inner.read().stats()
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> TreeState {
        self.inner.read().state()
    }

    /// Read access for operations returning borrowed nodes.
    pub fn read(&self) -> RwLockReadGuard<'_, StarTree> {
        self.inner.read()
    }
}

impl From<StarTree> for ConcurrentStarTree {
    fn from(tree: StarTree) -> Self {
        Self::new(tree)
    }
}
