//! Aggregation over the leaves a query routes to.

use std::collections::BTreeMap;

use super::node::StarTreeNode;
use super::router::{collect_leaves, find_leaf};
use super::StarTree;
use crate::error::{Error, Result};
use crate::query::{RecordFilter, StarTreeQuery, TimeRange, TimeSeriesFill};
use crate::record::{Metrics, StarTreeRecord, TimeBucket, STAR};
use crate::store::TimeSeriesMap;

/// Upper bound on buckets a dense time series may synthesize.
pub const MAX_DENSE_BUCKETS: u32 = 1_000_000;

impl StarTree {
    /// Sums every configured metric over the records matching `query`.
    ///
    /// The result holds the query's fixed values, `*` for every other
    /// dimension, and a zero for metrics no matching record carries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDimension`], [`Error::Closed`] or a storage error.
    pub fn aggregate(&self, query: &StarTreeQuery) -> Result<StarTreeRecord> {
        self.ensure_usable()?;
        query.validate(self.config())?;

        let leaves = self.route(query);
        let mut totals = Metrics::zeroed(self.config().metrics());
        for leaf in &leaves {
            if let Some(store) = leaf.record_store() {
                totals.merge(&store.aggregate(&RecordFilter::for_path(query, leaf.path()))?);
            }
        }

        tracing::debug!(
            collection = self.config().collection(),
            leaves = leaves.len(),
            "Aggregated star tree query"
        );
        Ok(StarTreeRecord::new(self.result_dimensions(query), totals, None))
    }

    /// Sums every configured metric per time bucket, in ascending bucket order.
    ///
    /// Records without a time are left out. With [`TimeSeriesFill::Dense`],
    /// missing buckets between the range bounds (or the first and last
    /// observed bucket) are returned with zero metrics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDimension`], [`Error::InvalidQuery`] for an
    /// oversized dense fill, [`Error::Closed`] or a storage error.
    pub fn time_series(&self, query: &StarTreeQuery) -> Result<Vec<StarTreeRecord>> {
        self.ensure_usable()?;
        query.validate(self.config())?;

        let leaves = self.route(query);
        let mut series = TimeSeriesMap::new();
        for leaf in &leaves {
            if let Some(store) = leaf.record_store() {
                let filter = RecordFilter::for_path(query, leaf.path());
                for (time, metrics) in store.time_series(&filter)? {
                    series.entry(time).or_default().merge(&metrics);
                }
            }
        }

        if let TimeSeriesFill::Dense { step } = query.fill() {
            for time in dense_buckets(&series, query.time_range(), step)? {
                series.entry(time).or_default();
            }
        }

        let dimensions = self.result_dimensions(query);
        let zero = Metrics::zeroed(self.config().metrics());
        Ok(series
            .into_iter()
            .map(|(time, metrics)| {
                let mut totals = zero.clone();
                totals.merge(&metrics);
                StarTreeRecord::new(dimensions.clone(), totals, Some(time))
            })
            .collect())
    }

    /// Leaves answering `query`: one leaf when every dimension is constrained.
    fn route(&self, query: &StarTreeQuery) -> Vec<&StarTreeNode> {
        if query.has_unconstrained(self.config().dimension_names()) {
            let mut leaves = Vec::new();
            collect_leaves(self.root(), query, &mut leaves);
            leaves
        } else {
            vec![find_leaf(self.root(), query)]
        }
    }

    fn result_dimensions(&self, query: &StarTreeQuery) -> BTreeMap<String, String> {
        self.config()
            .dimension_names()
            .iter()
            .map(|name| {
                let value = query.spec(name).map_or(STAR, |spec| spec.as_str());
                (name.clone(), value.to_string())
            })
            .collect()
    }
}

/// Grid buckets a dense series must contain.
fn dense_buckets(
    series: &TimeSeriesMap,
    range: Option<TimeRange>,
    step: TimeBucket,
) -> Result<Vec<TimeBucket>> {
    let (start, end) = match range {
        Some(range) => (range.start(), range.end()),
        None => match (series.keys().next(), series.keys().next_back()) {
            (Some(&first), Some(&last)) => (first, last.saturating_add(1)),
            _ => return Ok(Vec::new()),
        },
    };

    let span = i128::from(end) - i128::from(start);
    let buckets = (span + i128::from(step) - 1) / i128::from(step);
    if buckets > i128::from(MAX_DENSE_BUCKETS) {
        return Err(Error::InvalidQuery(format!(
            "dense fill would produce {buckets} buckets (max {MAX_DENSE_BUCKETS})"
        )));
    }

    let mut times = Vec::new();
    let mut time = start;
    while time < end {
        times.push(time);
        time = match time.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(times)
}
