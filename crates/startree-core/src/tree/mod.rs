//! The star tree: insertion, routing, aggregation and lifecycle.
//!
//! # Layout
//!
//! The root starts as a single leaf. A leaf splits on the next dimension in
//! config order once its record store holds more than
//! `max_record_store_entries` distinct dimension keys. Every internal node
//! keeps one child per observed value of its split dimension, optionally a
//! long-tail child (`?`), and a star child (`*`) holding the same records with
//! that dimension rolled up.
//!
//! # Lifecycle
//!
//! `Created → Open → Closed`. Memory-backed trees accept records before
//! `open()`; stores that need resources (the log store) do not. A tree whose
//! insert failed after reaching some but not all of its stores moves to
//! `Failed` and can only be closed.

mod admission;
mod aggregate;
mod concurrent;
mod insert;
mod node;
mod router;
mod stats;

#[cfg(test)]
mod insert_tests;

use std::sync::Arc;

use crate::config::StarTreeConfig;
use crate::error::{Error, Result};
use crate::record::{Metrics, StarTreeRecord, TimeBucket, OTHER, STAR};
use crate::store::{build_factory, RecordStoreFactory};

use insert::BuildContext;

pub use admission::{
    admission_from_config, Admission, AdmissionPhase, AdmissionRequest, AdmitAll,
    CardinalityCap, ChildAdmission, FrequencyThreshold,
};
pub use aggregate::MAX_DENSE_BUCKETS;
pub use concurrent::ConcurrentStarTree;
pub use node::StarTreeNode;
pub use stats::StarTreeStats;

/// Lifecycle state of a [`StarTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
    /// Built, stores not opened yet.
    Created,
    /// Stores opened.
    Open,
    /// Stores closed; every operation fails.
    Closed,
    /// A failed insert reached the concrete side of a split but not its star
    /// child. Rollups no longer add up, so everything but `close()` fails.
    Failed,
}

/// Multi-dimensional rollup index.
///
/// Mutation takes `&mut self`, queries take `&self`. Wrap the tree in a
/// [`ConcurrentStarTree`] to share it between threads.
#[derive(Debug)]
pub struct StarTree {
    config: Arc<StarTreeConfig>,
    factory: Arc<dyn RecordStoreFactory>,
    admission: Arc<dyn ChildAdmission>,
    root: StarTreeNode,
    state: TreeState,
    failure: Option<String>,
    records_added: u64,
    split_count: u64,
    min_time: Option<TimeBucket>,
    max_time: Option<TimeBucket>,
}

impl StarTree {
    /// Creates a tree using the record store and long-tail policy named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root record store cannot be created.
    pub fn new(config: StarTreeConfig) -> Result<Self> {
        let factory = build_factory(config.record_store());
        let admission = admission_from_config(config.long_tail());
        Self::with_components(config, factory, admission)
    }

    /// Creates a tree with an explicit record store factory.
    ///
    /// # Errors
    ///
    /// Returns an error if the root record store cannot be created.
    pub fn with_factory(
        config: StarTreeConfig,
        factory: Arc<dyn RecordStoreFactory>,
    ) -> Result<Self> {
        let admission = admission_from_config(config.long_tail());
        Self::with_components(config, factory, admission)
    }

    /// Creates a tree with an explicit factory and admission policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the root record store cannot be created.
    pub fn with_components(
        config: StarTreeConfig,
        factory: Arc<dyn RecordStoreFactory>,
        admission: Arc<dyn ChildAdmission>,
    ) -> Result<Self> {
        let root = {
            let ctx = BuildContext::new(&config, factory.as_ref(), admission.as_ref(), false);
            StarTreeNode::new_root(&ctx)?
        };
        tracing::debug!(
            collection = config.collection(),
            store = factory.id(),
            dimensions = config.dimension_names().len(),
            "Created star tree"
        );
        Ok(Self {
            config: Arc::new(config),
            factory,
            admission,
            root,
            state: TreeState::Created,
            failure: None,
            records_added: 0,
            split_count: 0,
            min_time: None,
            max_time: None,
        })
    }

    /// Tree configuration.
    #[must_use]
    pub fn config(&self) -> &StarTreeConfig {
        &self.config
    }

    /// Factory creating every leaf's record store.
    #[must_use]
    pub fn record_store_factory(&self) -> &Arc<dyn RecordStoreFactory> {
        &self.factory
    }

    /// Long-tail admission policy.
    #[must_use]
    pub fn admission(&self) -> &Arc<dyn ChildAdmission> {
        &self.admission
    }

    /// Root node.
    #[must_use]
    pub fn root(&self) -> &StarTreeNode {
        &self.root
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> TreeState {
        self.state
    }

    /// Opens every leaf store. Opening an open tree is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] on a closed tree, [`Error::Inconsistent`] on
    /// a failed one, or the first store error.
    pub fn open(&mut self) -> Result<()> {
        match self.state {
            TreeState::Open => return Ok(()),
            TreeState::Closed | TreeState::Failed => return Err(self.unusable()),
            TreeState::Created => {}
        }
        self.root.try_for_each_store(&mut |store| store.open())?;
        self.state = TreeState::Open;
        tracing::info!(
            collection = self.config.collection(),
            store = self.factory.id(),
            "Opened star tree"
        );
        Ok(())
    }

    /// Closes every leaf store. Closing a closed tree is a no-op.
    ///
    /// Every store is closed even if one fails; the first failure is returned
    /// and the tree is closed regardless.
    ///
    /// # Errors
    ///
    /// Returns the first store error.
    pub fn close(&mut self) -> Result<()> {
        if self.state == TreeState::Closed {
            return Ok(());
        }
        let mut first_error = None;
        let _ = self.root.try_for_each_store(&mut |store| {
            if let Err(e) = store.close() {
                tracing::warn!(error = %e, "Failed to close record store");
                first_error.get_or_insert(e);
            }
            Ok(())
        });
        self.state = TreeState::Closed;
        tracing::info!(
            collection = self.config.collection(),
            records = self.records_added,
            "Closed star tree"
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Inserts one record.
    ///
    /// Dimensions the record leaves out are stored as `?`; metrics are
    /// coerced to their configured types.
    ///
    /// # Errors
    ///
    /// - [`Error::Closed`] after `close()`
    /// - [`Error::Inconsistent`] once an earlier insert failed half way
    /// - [`Error::UnknownDimension`] / [`Error::UnknownMetric`] for names outside the config
    /// - [`Error::InvalidRecord`] for a `*` value or a metric of the wrong kind
    /// - storage errors from the record stores; if the record was already
    ///   stored under a concrete child the tree moves to [`TreeState::Failed`]
    ///
    /// A leaf split that fails after the record was stored is not an error:
    /// the leaf keeps its records and the split is retried on the next insert.
    pub fn add(&mut self, record: StarTreeRecord) -> Result<()> {
        self.ensure_usable()?;
        let record = self.normalize(record)?;

        let mut ctx = BuildContext::new(
            &self.config,
            self.factory.as_ref(),
            self.admission.as_ref(),
            self.state == TreeState::Open,
        );
        let result = self.root.insert(&record, 1, &mut ctx);
        let torn = ctx.torn;
        self.split_count += ctx.splits;
        if let Err(e) = result {
            if torn {
                tracing::error!(
                    collection = self.config.collection(),
                    error = %e,
                    "Insert stopped half way, star tree is no longer usable"
                );
                self.failure = Some(e.to_string());
                self.state = TreeState::Failed;
            }
            return Err(e);
        }

        self.records_added += 1;
        if let Some(time) = record.time() {
            self.min_time = Some(self.min_time.map_or(time, |t| t.min(time)));
            self.max_time = Some(self.max_time.map_or(time, |t| t.max(time)));
        }
        Ok(())
    }

    /// Inserts records in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Same as [`StarTree::add`].
    pub fn add_all<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = StarTreeRecord>,
    {
        for record in records {
            self.add(record)?;
        }
        Ok(())
    }

    /// Snapshot of the tree's shape and counters.
    #[must_use]
    pub fn stats(&self) -> StarTreeStats {
        StarTreeStats::collect(
            &self.root,
            self.records_added,
            self.split_count,
            self.min_time,
            self.max_time,
        )
    }

    pub(crate) fn ensure_usable(&self) -> Result<()> {
        match self.state {
            TreeState::Closed | TreeState::Failed => Err(self.unusable()),
            TreeState::Created | TreeState::Open => Ok(()),
        }
    }

    fn unusable(&self) -> Error {
        match &self.failure {
            Some(cause) if self.state == TreeState::Failed => Error::Inconsistent(cause.clone()),
            _ => Error::Closed,
        }
    }

    /// Validates a raw record against the config and fills in defaults.
    fn normalize(&self, record: StarTreeRecord) -> Result<StarTreeRecord> {
        let (mut dimensions, raw_metrics, time) = record.into_parts();

        if let Some(unknown) = dimensions.keys().find(|d| !self.config.has_dimension(d)) {
            return Err(Error::UnknownDimension(unknown.clone()));
        }
        if let Some((name, _)) = dimensions.iter().find(|(_, v)| v.as_str() == STAR) {
            return Err(Error::InvalidRecord(format!(
                "dimension {name} carries the reserved value {STAR}"
            )));
        }
        for name in self.config.dimension_names() {
            dimensions
                .entry(name.clone())
                .or_insert_with(|| OTHER.to_string());
        }

        let mut metrics = Metrics::new();
        for (name, value) in raw_metrics.iter() {
            let metric_type = self
                .config
                .metric_type(name)
                .ok_or_else(|| Error::UnknownMetric(name.to_string()))?;
            let coerced = value.coerce(metric_type).ok_or_else(|| {
                Error::InvalidRecord(format!("metric {name} value {value} is not {metric_type}"))
            })?;
            metrics.insert(name, coerced);
        }

        Ok(StarTreeRecord::new(dimensions, metrics, time))
    }
}
