//! Query input and the per-leaf record filter derived from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::StarTreeConfig;
use crate::error::{Error, Result};
use crate::record::{StarTreeRecord, TimeBucket, OTHER, STAR};

/// Constraint on one dimension of a query.
///
/// A dimension absent from the query is unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionSpec {
    /// Exactly this value.
    Value(String),
    /// Wildcard: rolled up across all values.
    Star,
}

impl DimensionSpec {
    /// Builds a spec from a raw value, mapping `"*"` to [`DimensionSpec::Star`].
    #[must_use]
    pub fn from_value(value: impl Into<String>) -> Self {
        let value = value.into();
        if value == STAR {
            Self::Star
        } else {
            Self::Value(value)
        }
    }

    /// Value as it appears in a result record.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Value(v) => v,
            Self::Star => STAR,
        }
    }
}

/// Half-open range of time buckets `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    start: TimeBucket,
    end: TimeBucket,
}

impl TimeRange {
    /// Creates a range; `start` must be strictly less than `end`.
    pub fn new(start: TimeBucket, end: TimeBucket) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidQuery(format!(
                "empty time range [{start}, {end})"
            )));
        }
        Ok(Self { start, end })
    }

    /// First bucket included.
    #[must_use]
    pub fn start(&self) -> TimeBucket {
        self.start
    }

    /// First bucket excluded.
    #[must_use]
    pub fn end(&self) -> TimeBucket {
        self.end
    }

    /// Returns true if `time` falls inside the range.
    #[must_use]
    pub fn contains(&self, time: TimeBucket) -> bool {
        time >= self.start && time < self.end
    }
}

/// How `time_series` treats buckets no record was observed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimeSeriesFill {
    /// Only buckets holding at least one record are returned.
    #[default]
    Observed,
    /// Every `step`-th bucket across the range is returned, zero-filled when empty.
    Dense {
        /// Distance between consecutive buckets.
        step: TimeBucket,
    },
}

/// A rollup or time-series query over the tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StarTreeQuery {
    dimensions: BTreeMap<String, DimensionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_range: Option<TimeRange>,
    #[serde(default)]
    fill: TimeSeriesFill,
}

impl StarTreeQuery {
    /// Starts building a query.
    #[must_use]
    pub fn builder() -> StarTreeQueryBuilder {
        StarTreeQueryBuilder::default()
    }

    /// Builds a query from raw values, `"*"` meaning wildcard.
    #[must_use]
    pub fn from_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            dimensions: values
                .into_iter()
                .map(|(k, v)| (k.into(), DimensionSpec::from_value(v)))
                .collect(),
            ..Self::default()
        }
    }

    /// Constraint on a dimension; `None` means unconstrained.
    #[must_use]
    pub fn spec(&self, dimension: &str) -> Option<&DimensionSpec> {
        self.dimensions.get(dimension)
    }

    /// All constrained dimensions.
    #[must_use]
    pub fn dimensions(&self) -> &BTreeMap<String, DimensionSpec> {
        &self.dimensions
    }

    /// Time range restriction, if any.
    #[must_use]
    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }

    /// Missing-bucket policy for time series.
    #[must_use]
    pub fn fill(&self) -> TimeSeriesFill {
        self.fill
    }

    /// Returns a copy with the time range replaced.
    #[must_use]
    pub fn with_time_range(mut self, range: Option<TimeRange>) -> Self {
        self.time_range = range;
        self
    }

    /// Concrete values fixed by the query.
    pub fn fixed_values(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.dimensions.iter().filter_map(|(k, spec)| match spec {
            DimensionSpec::Value(v) => Some((k.as_str(), v.as_str())),
            DimensionSpec::Star => None,
        })
    }

    /// Returns true if any of `dimensions` is absent from the query.
    #[must_use]
    pub fn has_unconstrained(&self, dimensions: &[String]) -> bool {
        dimensions.iter().any(|d| !self.dimensions.contains_key(d))
    }

    /// Rejects dimensions the tree was not configured with.
    pub fn validate(&self, config: &StarTreeConfig) -> Result<()> {
        if let Some(unknown) = self.dimensions.keys().find(|d| !config.has_dimension(d)) {
            return Err(Error::UnknownDimension(unknown.clone()));
        }
        if let TimeSeriesFill::Dense { step } = self.fill {
            if step <= 0 {
                return Err(Error::InvalidQuery(format!(
                    "dense fill step must be positive, got {step}"
                )));
            }
        }
        Ok(())
    }
}

/// Fluent builder for [`StarTreeQuery`].
#[derive(Debug, Clone, Default)]
pub struct StarTreeQueryBuilder {
    query: StarTreeQuery,
}

impl StarTreeQueryBuilder {
    /// Fixes a dimension to a value (`"*"` is treated as wildcard).
    #[must_use]
    pub fn value(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.query
            .dimensions
            .insert(dimension.into(), DimensionSpec::from_value(value));
        self
    }

    /// Sets a dimension to the wildcard.
    #[must_use]
    pub fn star(mut self, dimension: impl Into<String>) -> Self {
        self.query
            .dimensions
            .insert(dimension.into(), DimensionSpec::Star);
        self
    }

    /// Restricts the query to a time range.
    #[must_use]
    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.query.time_range = Some(range);
        self
    }

    /// Zero-fills missing time buckets every `step` buckets.
    #[must_use]
    pub fn dense(mut self, step: TimeBucket) -> Self {
        self.query.fill = TimeSeriesFill::Dense { step };
        self
    }

    /// Builds the query.
    #[must_use]
    pub fn build(self) -> StarTreeQuery {
        self.query
    }
}

/// Residual constraints a leaf record store applies to its own records.
///
/// Holds the query values for dimensions the path to the leaf did not already
/// resolve, plus the time range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    dimensions: BTreeMap<String, String>,
    time_range: Option<TimeRange>,
}

impl RecordFilter {
    /// A filter matching every record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a filter from explicit constraints.
    #[must_use]
    pub fn new(dimensions: BTreeMap<String, String>, time_range: Option<TimeRange>) -> Self {
        Self {
            dimensions,
            time_range,
        }
    }

    /// Derives the filter for a leaf reached through `path`.
    ///
    /// A fixed query value is dropped when the path already pins that
    /// dimension to the same value; otherwise the leaf must check it.
    #[must_use]
    pub fn for_path(query: &StarTreeQuery, path: &[(String, String)]) -> Self {
        Self::residual(query.fixed_values(), path, query.time_range())
    }

    /// Keeps the `fixed` pairs `path` does not already pin to the same value.
    #[must_use]
    pub fn residual<'a>(
        fixed: impl IntoIterator<Item = (&'a str, &'a str)>,
        path: &[(String, String)],
        time_range: Option<TimeRange>,
    ) -> Self {
        let dimensions = fixed
            .into_iter()
            .filter(|(dim, value)| {
                !path
                    .iter()
                    .any(|(pd, pv)| pd.as_str() == *dim && pv.as_str() == *value)
            })
            .map(|(dim, value)| (dim.to_string(), value.to_string()))
            .collect();
        Self {
            dimensions,
            time_range,
        }
    }

    /// Dimension constraints.
    #[must_use]
    pub fn dimensions(&self) -> &BTreeMap<String, String> {
        &self.dimensions
    }

    /// Time range constraint.
    #[must_use]
    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }

    /// Returns true if the dimension values satisfy the filter.
    ///
    /// Absent dimensions compare as [`OTHER`].
    #[must_use]
    pub fn matches_dimensions(&self, dimensions: &BTreeMap<String, String>) -> bool {
        self.dimensions.iter().all(|(name, value)| {
            dimensions.get(name).map_or(OTHER, String::as_str) == value.as_str()
        })
    }

    /// Returns true if the time bucket satisfies the filter.
    ///
    /// Records without a time only match when no range is set.
    #[must_use]
    pub fn matches_time(&self, time: Option<TimeBucket>) -> bool {
        match (self.time_range, time) {
            (None, _) => true,
            (Some(range), Some(t)) => range.contains(t),
            (Some(_), None) => false,
        }
    }

    /// Returns true if the record satisfies the filter.
    #[must_use]
    pub fn matches(&self, record: &StarTreeRecord) -> bool {
        self.matches_time(record.time()) && self.matches_dimensions(record.dimensions())
    }
}
