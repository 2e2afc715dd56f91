//! Records, metric values and the reserved dimension sentinels.
//!
//! A [`StarTreeRecord`] is one fact: a value per dimension, a value per metric
//! and an optional time bucket. Raw input records and synthesized aggregates
//! share the same type.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::MetricType;

/// Wildcard dimension value: "aggregate across every value of this dimension".
pub const STAR: &str = "*";

/// Long-tail dimension value: key of the shared "other" child, and the value
/// assigned to a dimension a raw record leaves out.
pub const OTHER: &str = "?";

/// Time bucket of a record (caller-defined unit, e.g. hours since epoch).
pub type TimeBucket = i64;

/// A single metric value.
///
/// Integer metric types are carried as `Int`, floating types as `Float`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Integer metric (`SHORT`, `INT`, `LONG`).
    Int(i64),
    /// Floating metric (`FLOAT`, `DOUBLE`).
    Float(f64),
}

impl MetricValue {
    /// Additive identity for a metric type.
    #[must_use]
    pub fn zero(metric_type: MetricType) -> Self {
        if metric_type.is_integral() {
            Self::Int(0)
        } else {
            Self::Float(0.0)
        }
    }

    /// Sums two values. Integer sums saturate; mixing in a float yields a float.
    #[must_use]
    pub fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Self::Int(a.saturating_add(b)),
            (a, b) => Self::Float(a.as_f64() + b.as_f64()),
        }
    }

    /// Returns the value as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Reason: metric sums beyond 2^53 are approximated
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Returns the integer value, or `None` for a float.
    #[must_use]
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(v),
            Self::Float(_) => None,
        }
    }

    /// Converts the value to the representation of `metric_type`.
    ///
    /// Returns `None` when a float with a fractional part (or out of range)
    /// is given for an integer metric.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Reason: fract() == 0 and range checked above
    #[allow(clippy::cast_precision_loss)]
    pub fn coerce(self, metric_type: MetricType) -> Option<Self> {
        match (self, metric_type.is_integral()) {
            (Self::Int(v), true) => Some(Self::Int(v)),
            (Self::Int(v), false) => Some(Self::Float(v as f64)),
            (Self::Float(v), false) => Some(Self::Float(v)),
            (Self::Float(v), true) => {
                if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                    Some(Self::Int(v as i64))
                } else {
                    None
                }
            }
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for MetricValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Metric name to value map with additive merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metrics(BTreeMap<String, MetricValue>);

impl Metrics {
    /// Creates an empty metric map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map holding the zero value of every given metric.
    #[must_use]
    pub fn zeroed<'a>(metrics: impl IntoIterator<Item = (&'a str, MetricType)>) -> Self {
        Self(
            metrics
                .into_iter()
                .map(|(name, ty)| (name.to_string(), MetricValue::zero(ty)))
                .collect(),
        )
    }

    /// Returns the value of a metric.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.0.get(name).copied()
    }

    /// Sets the value of a metric, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Adds `value` to the metric, starting from the value itself if absent.
    pub fn accumulate(&mut self, name: &str, value: MetricValue) {
        match self.0.get_mut(name) {
            Some(current) => *current = current.add(value),
            None => {
                self.0.insert(name.to_string(), value);
            }
        }
    }

    /// Sums every metric of `other` into `self`.
    pub fn merge(&mut self, other: &Metrics) {
        for (name, value) in &other.0 {
            self.accumulate(name, *value);
        }
    }

    /// Iterates metrics in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, MetricValue)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of metrics present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no metric is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<MetricValue>> FromIterator<(K, V)> for Metrics {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One fact in the tree: dimension values, metric values and a time bucket.
///
/// Immutable once built; use [`StarTreeRecord::with_dimension`] to derive a
/// modified copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarTreeRecord {
    dimensions: BTreeMap<String, String>,
    metrics: Metrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<TimeBucket>,
}

impl StarTreeRecord {
    /// Creates a record from its parts.
    #[must_use]
    pub fn new(
        dimensions: BTreeMap<String, String>,
        metrics: Metrics,
        time: Option<TimeBucket>,
    ) -> Self {
        Self {
            dimensions,
            metrics,
            time,
        }
    }

    /// Starts building a record.
    #[must_use]
    pub fn builder() -> StarTreeRecordBuilder {
        StarTreeRecordBuilder::default()
    }

    /// All dimension values, keyed by dimension name.
    #[must_use]
    pub fn dimensions(&self) -> &BTreeMap<String, String> {
        &self.dimensions
    }

    /// Value of one dimension.
    #[must_use]
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions.get(name).map(String::as_str)
    }

    /// All metric values.
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Value of one metric.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<MetricValue> {
        self.metrics.get(name)
    }

    /// Time bucket, if any.
    #[must_use]
    pub fn time(&self) -> Option<TimeBucket> {
        self.time
    }

    /// Returns a copy with `name` set to `value`.
    #[must_use]
    pub fn with_dimension(&self, name: &str, value: &str) -> Self {
        let mut dimensions = self.dimensions.clone();
        dimensions.insert(name.to_string(), value.to_string());
        Self {
            dimensions,
            metrics: self.metrics.clone(),
            time: self.time,
        }
    }

    /// Dimension values in the given order, `OTHER` for absent dimensions.
    ///
    /// Used by record stores as the distinct-entry key.
    #[must_use]
    pub fn dimension_key(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .map(|name| self.dimension(name).unwrap_or(OTHER).to_string())
            .collect()
    }

    pub(crate) fn into_parts(self) -> (BTreeMap<String, String>, Metrics, Option<TimeBucket>) {
        (self.dimensions, self.metrics, self.time)
    }
}

/// Fluent builder for [`StarTreeRecord`].
#[derive(Debug, Clone, Default)]
pub struct StarTreeRecordBuilder {
    dimensions: BTreeMap<String, String>,
    metrics: Metrics,
    time: Option<TimeBucket>,
}

impl StarTreeRecordBuilder {
    /// Sets a dimension value.
    #[must_use]
    pub fn dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(name.into(), value.into());
        self
    }

    /// Sets a metric value.
    #[must_use]
    pub fn metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name, value);
        self
    }

    /// Sets the time bucket.
    #[must_use]
    pub fn time(mut self, time: TimeBucket) -> Self {
        self.time = Some(time);
        self
    }

    /// Builds the record.
    #[must_use]
    pub fn build(self) -> StarTreeRecord {
        StarTreeRecord {
            dimensions: self.dimensions,
            metrics: self.metrics,
            time: self.time,
        }
    }
}
