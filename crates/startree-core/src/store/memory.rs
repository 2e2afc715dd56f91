//! In-memory record store.
//!
//! Records are pre-aggregated on insert: one metric map per distinct
//! dimension key and time bucket, together with the number of records merged
//! into it. Nothing survives `close()`.

use std::collections::{BTreeMap, BTreeSet};

use super::{is_concrete, LeafContext, RecordStore, RecordStoreFactory, TimeSeriesMap};
use crate::error::{Error, Result};
use crate::query::RecordFilter;
use crate::record::{Metrics, StarTreeRecord, TimeBucket, OTHER};

type DimensionKey = BTreeMap<String, String>;

/// Metric sums of one dimension key and time bucket.
#[derive(Debug, Default)]
struct Bucket {
    metrics: Metrics,
    records: u64,
}

/// Nested in-memory buffer: dimension key -> time bucket -> metric sums.
///
/// Usable as soon as it is created; `open()` is a no-op and `close()` drops
/// the buffer.
#[derive(Debug)]
pub struct MemoryRecordStore {
    dimension_names: Vec<String>,
    entries: BTreeMap<DimensionKey, BTreeMap<Option<TimeBucket>, Bucket>>,
    record_count: u64,
    closed: bool,
}

impl MemoryRecordStore {
    /// Creates an empty store keyed on `dimension_names`.
    #[must_use]
    pub fn new(dimension_names: Vec<String>) -> Self {
        Self {
            dimension_names,
            entries: BTreeMap::new(),
            record_count: 0,
            closed: false,
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.closed {
            return Err(Error::StoreNotOpen("memory record store is closed".into()));
        }
        Ok(())
    }

    fn key_of(&self, record: &StarTreeRecord) -> DimensionKey {
        self.dimension_names
            .iter()
            .map(|name| {
                let value = record.dimension(name).unwrap_or(OTHER);
                (name.clone(), value.to_string())
            })
            .collect()
    }
}

impl RecordStore for MemoryRecordStore {
    fn open(&mut self) -> Result<()> {
        self.ensure_usable()
    }

    fn close(&mut self) -> Result<()> {
        self.entries.clear();
        self.record_count = 0;
        self.closed = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed
    }

    fn add(&mut self, record: &StarTreeRecord) -> Result<()> {
        self.add_counted(record, 1)
    }

    fn add_counted(&mut self, record: &StarTreeRecord, count: u64) -> Result<()> {
        self.ensure_usable()?;
        let key = self.key_of(record);
        let bucket = self
            .entries
            .entry(key)
            .or_default()
            .entry(record.time())
            .or_default();
        bucket.metrics.merge(record.metrics());
        bucket.records += count;
        self.record_count += count;
        Ok(())
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn record_count(&self) -> u64 {
        self.record_count
    }

    fn records(&self) -> Result<Vec<StarTreeRecord>> {
        Ok(self
            .counted_records()?
            .into_iter()
            .map(|(record, _)| record)
            .collect())
    }

    fn counted_records(&self) -> Result<Vec<(StarTreeRecord, u64)>> {
        self.ensure_usable()?;
        let mut records = Vec::new();
        for (dimensions, buckets) in &self.entries {
            for (time, bucket) in buckets {
                let record =
                    StarTreeRecord::new(dimensions.clone(), bucket.metrics.clone(), *time);
                records.push((record, bucket.records));
            }
        }
        Ok(records)
    }

    fn clear(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.entries.clear();
        self.record_count = 0;
        Ok(())
    }

    fn aggregate(&self, filter: &RecordFilter) -> Result<Metrics> {
        self.ensure_usable()?;
        let mut totals = Metrics::new();
        for (dimensions, buckets) in &self.entries {
            if !filter.matches_dimensions(dimensions) {
                continue;
            }
            for (time, bucket) in buckets {
                if filter.matches_time(*time) {
                    totals.merge(&bucket.metrics);
                }
            }
        }
        Ok(totals)
    }

    fn time_series(&self, filter: &RecordFilter) -> Result<TimeSeriesMap> {
        self.ensure_usable()?;
        let mut series = TimeSeriesMap::new();
        for (dimensions, buckets) in &self.entries {
            if !filter.matches_dimensions(dimensions) {
                continue;
            }
            for (time, bucket) in buckets {
                if let Some(t) = *time {
                    if filter.matches_time(Some(t)) {
                        series.entry(t).or_default().merge(&bucket.metrics);
                    }
                }
            }
        }
        Ok(series)
    }

    fn dimension_values(&self, dimension: &str, filter: &RecordFilter) -> Result<BTreeSet<String>> {
        self.ensure_usable()?;
        Ok(self
            .entries
            .keys()
            .filter(|dimensions| filter.matches_dimensions(dimensions))
            .filter_map(|dimensions| dimensions.get(dimension))
            .filter(|value| is_concrete(value))
            .cloned()
            .collect())
    }
}

/// Factory for [`MemoryRecordStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryRecordStoreFactory;

impl RecordStoreFactory for MemoryRecordStoreFactory {
    fn id(&self) -> &'static str {
        "memory"
    }

    fn create_store(&self, context: &LeafContext<'_>) -> Result<Box<dyn RecordStore>> {
        Ok(Box::new(MemoryRecordStore::new(
            context.dimension_names().to_vec(),
        )))
    }
}
