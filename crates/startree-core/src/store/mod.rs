//! Pluggable per-leaf record storage.
//!
//! The tree never constructs storage directly: every leaf asks a
//! [`RecordStoreFactory`] for a [`RecordStore`] once, when the leaf is created.
//!
//! # Implementations
//!
//! - [`MemoryRecordStore`]: nested in-memory buffer, pre-aggregated per
//!   dimension key and time bucket.
//! - [`LogRecordStore`]: append-only, CRC32-protected log file per leaf.

mod log_store;
mod memory;


use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::{MetricType, RecordStoreConfig, StarTreeConfig};
use crate::error::Result;
use crate::query::RecordFilter;
use crate::record::{Metrics, StarTreeRecord, TimeBucket, OTHER, STAR};

pub use log_store::{LogRecordStore, LogRecordStoreFactory};
pub use memory::{MemoryRecordStore, MemoryRecordStoreFactory};

/// Per-time-bucket metric sums, ordered by bucket.
pub type TimeSeriesMap = BTreeMap<TimeBucket, Metrics>;

/// What a factory knows about the leaf it creates a store for.
#[derive(Debug, Clone, Copy)]
pub struct LeafContext<'a> {
    /// Identifier of the leaf node.
    pub node_id: Uuid,
    /// `(dimension, value)` pairs from the root to the leaf.
    pub path: &'a [(String, String)],
    /// Tree configuration.
    pub config: &'a StarTreeConfig,
}

impl LeafContext<'_> {
    /// Dimension names in split order.
    #[must_use]
    pub fn dimension_names(&self) -> &[String] {
        self.config.dimension_names()
    }

    /// `(metric name, metric type)` pairs.
    #[must_use]
    pub fn metrics(&self) -> Vec<(String, MetricType)> {
        self.config
            .metrics()
            .map(|(name, ty)| (name.to_string(), ty))
            .collect()
    }
}

/// Storage owned by one leaf.
///
/// `entry_count` is the number of distinct dimension keys held; the tree
/// compares it against `max_record_store_entries` to decide when to split.
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Acquires the store's resources.
    fn open(&mut self) -> Result<()>;

    /// Releases the store's resources.
    fn close(&mut self) -> Result<()>;

    /// Returns true between `open()` and `close()`.
    fn is_open(&self) -> bool;

    /// Appends one record.
    fn add(&mut self, record: &StarTreeRecord) -> Result<()>;

    /// Appends one record standing for `count` raw records.
    ///
    /// Splits re-insert what [`RecordStore::counted_records`] returned. A
    /// store that merges records must override both methods; one that keeps
    /// every record as added is only ever given a count of 1.
    fn add_counted(&mut self, record: &StarTreeRecord, _count: u64) -> Result<()> {
        self.add(record)
    }

    /// Number of distinct dimension keys held.
    fn entry_count(&self) -> usize;

    /// Number of records appended since the store was created or cleared.
    fn record_count(&self) -> u64;

    /// All records, merged per dimension key and time bucket.
    fn records(&self) -> Result<Vec<StarTreeRecord>>;

    /// Same as [`RecordStore::records`], each paired with the number of raw
    /// records merged into it.
    fn counted_records(&self) -> Result<Vec<(StarTreeRecord, u64)>> {
        Ok(self.records()?.into_iter().map(|record| (record, 1)).collect())
    }

    /// Drops every record.
    fn clear(&mut self) -> Result<()>;

    /// Drops every record and releases the store for good.
    fn destroy(&mut self) -> Result<()> {
        self.clear()?;
        self.close()
    }

    /// Sums the metrics of every record matching `filter`.
    fn aggregate(&self, filter: &RecordFilter) -> Result<Metrics> {
        let mut totals = Metrics::new();
        for record in self.records()? {
            if filter.matches(&record) {
                totals.merge(record.metrics());
            }
        }
        Ok(totals)
    }

    /// Sums the metrics of every timed record matching `filter`, per bucket.
    fn time_series(&self, filter: &RecordFilter) -> Result<TimeSeriesMap> {
        let mut series = TimeSeriesMap::new();
        for record in self.records()? {
            if let Some(time) = record.time() {
                if filter.matches(&record) {
                    series.entry(time).or_default().merge(record.metrics());
                }
            }
        }
        Ok(series)
    }

    /// Distinct concrete values of `dimension` among records matching `filter`.
    fn dimension_values(&self, dimension: &str, filter: &RecordFilter) -> Result<BTreeSet<String>> {
        let mut values = BTreeSet::new();
        for record in self.records()? {
            if filter.matches_dimensions(record.dimensions()) {
                if let Some(value) = record.dimension(dimension) {
                    if is_concrete(value) {
                        values.insert(value.to_string());
                    }
                }
            }
        }
        Ok(values)
    }
}

/// Creates one [`RecordStore`] per leaf.
pub trait RecordStoreFactory: Send + Sync + fmt::Debug {
    /// Stable identifier of the implementation.
    fn id(&self) -> &'static str;

    /// Creates the store for a new leaf. The store is not opened.
    fn create_store(&self, context: &LeafContext<'_>) -> Result<Box<dyn RecordStore>>;
}

/// Builds the factory selected by a record store config.
#[must_use]
pub fn build_factory(config: &RecordStoreConfig) -> Arc<dyn RecordStoreFactory> {
    match config {
        RecordStoreConfig::Memory => Arc::new(MemoryRecordStoreFactory),
        RecordStoreConfig::Log { root_dir } => {
            Arc::new(LogRecordStoreFactory::new(root_dir.clone()))
        }
    }
}

/// Returns true for values that are neither [`STAR`] nor [`OTHER`].
#[must_use]
pub fn is_concrete(value: &str) -> bool {
    value != STAR && value != OTHER
}
