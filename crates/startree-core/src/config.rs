//! Star tree configuration.
//!
//! A [`StarTreeConfig`] is immutable and validated once, when it is built.
//! It can be assembled with [`StarTreeConfig::builder`], parsed from JSON or
//! TOML, or loaded from a TOML file layered with `STARTREE_*` environment
//! variables.
//!
//! # Example
//!
//! ```rust
//! use startree_core::config::{MetricType, StarTreeConfig};
//!
//! let config = StarTreeConfig::builder()
//!     .collection("page_views")
//!     .dimension_names(["country", "browser", "device"])
//!     .metric_names(["views"])
//!     .metric_types([MetricType::Long])
//!     .max_record_store_entries(1000)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.dimension_names().len(), 3);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum number of distinct entries a leaf holds before it splits.
pub const DEFAULT_MAX_RECORD_STORE_ENTRIES: usize = 10_000;

/// Default name of the time column.
pub const DEFAULT_TIME_COLUMN_NAME: &str = "time";

/// Prefix of environment variables overriding file configuration.
pub const ENV_PREFIX: &str = "STARTREE_";

/// Configuration error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field was provided with an invalid value.
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A metric type name is not recognized.
    #[error("Unknown metric type: {0}")]
    UnknownMetricType(String),

    /// The configuration source could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Numeric type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    /// 16-bit integer.
    Short,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
}

impl MetricType {
    /// Returns true for integer types.
    #[must_use]
    pub fn is_integral(self) -> bool {
        matches!(self, Self::Short | Self::Int | Self::Long)
    }

    /// Canonical upper-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "SHORT",
            Self::Int => "INT",
            Self::Long => "LONG",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
        }
    }
}

impl FromStr for MetricType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHORT" => Ok(Self::Short),
            "INT" | "INTEGER" => Ok(Self::Int),
            "LONG" => Ok(Self::Long),
            "FLOAT" => Ok(Self::Float),
            "DOUBLE" => Ok(Self::Double),
            _ => Err(ConfigError::UnknownMetricType(s.to_string())),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects the record store implementation created for every leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordStoreConfig {
    /// In-memory buffer per leaf.
    #[default]
    Memory,
    /// Append-only log file per leaf under `root_dir`.
    Log {
        /// Directory holding one sub-directory per leaf.
        root_dir: PathBuf,
    },
}

impl RecordStoreConfig {
    /// Stable identifier of the factory this config selects.
    #[must_use]
    pub fn factory_id(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Log { .. } => "log",
        }
    }
}

/// Long-tail ("other" bucket) admission policy applied when children are created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum LongTailConfig {
    /// Every observed value gets its own child.
    #[default]
    Disabled,
    /// At most `max_children` concrete children per split node; the rest share `OTHER`.
    CardinalityCap {
        /// Maximum concrete children per node.
        max_children: usize,
    },
    /// Only values holding at least `min_fraction` of a leaf's records when it
    /// splits get their own child; later values share `OTHER`.
    FrequencyThreshold {
        /// Minimum share of the drained records, in `(0, 1]`.
        min_fraction: f64,
        /// Optional cap on concrete children.
        #[serde(default)]
        max_children: Option<usize>,
    },
}

/// Raw, unvalidated configuration as read from a file, JSON or the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StarTreeConfigFile {
    collection: Option<String>,
    #[serde(alias = "dimensionNames")]
    dimension_names: Option<Vec<String>>,
    #[serde(alias = "metricNames")]
    metric_names: Option<Vec<String>>,
    #[serde(alias = "metricTypes")]
    metric_types: Option<Vec<String>>,
    #[serde(alias = "timeColumnName")]
    time_column_name: Option<String>,
    #[serde(alias = "maxRecordStoreEntries")]
    max_record_store_entries: Option<usize>,
    #[serde(alias = "recordStore")]
    record_store: Option<RecordStoreConfig>,
    #[serde(alias = "longTail")]
    long_tail: Option<LongTailConfig>,
}

impl TryFrom<StarTreeConfigFile> for StarTreeConfig {
    type Error = ConfigError;

    fn try_from(file: StarTreeConfigFile) -> Result<Self, Self::Error> {
        let metric_types = file
            .metric_types
            .map(|types| {
                types
                    .iter()
                    .map(|t| t.parse::<MetricType>())
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        StarTreeConfigBuilder {
            collection: file.collection,
            dimension_names: file.dimension_names,
            metric_names: file.metric_names,
            metric_types,
            time_column_name: file.time_column_name,
            max_record_store_entries: file.max_record_store_entries,
            record_store: file.record_store,
            long_tail: file.long_tail,
        }
        .build()
    }
}

/// Validated, immutable star tree configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StarTreeConfigFile")]
pub struct StarTreeConfig {
    collection: String,
    dimension_names: Vec<String>,
    metric_names: Vec<String>,
    metric_types: Vec<MetricType>,
    time_column_name: String,
    max_record_store_entries: usize,
    record_store: RecordStoreConfig,
    long_tail: LongTailConfig,
}

impl StarTreeConfig {
    /// Starts building a configuration.
    #[must_use]
    pub fn builder() -> StarTreeConfigBuilder {
        StarTreeConfigBuilder::default()
    }

    /// Parses and validates a JSON configuration.
    ///
    /// Accepts both `snake_case` and `camelCase` field names.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: StarTreeConfigFile =
            serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
        file.try_into()
    }

    /// Parses and validates a TOML configuration.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let file: StarTreeConfigFile =
            toml::from_str(source).map_err(|e| ConfigError::Load(e.to_string()))?;
        file.try_into()
    }

    /// Loads a TOML file, overridden by `STARTREE_*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `STARTREE_RECORD_STORE__TYPE=log`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Extracts and validates a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let file: StarTreeConfigFile = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        file.try_into()
    }

    /// Serializes the configuration to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Dimension names in split order.
    #[must_use]
    pub fn dimension_names(&self) -> &[String] {
        &self.dimension_names
    }

    /// Metric names, parallel to [`Self::metric_types`].
    #[must_use]
    pub fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    /// Metric types, parallel to [`Self::metric_names`].
    #[must_use]
    pub fn metric_types(&self) -> &[MetricType] {
        &self.metric_types
    }

    /// Iterates `(metric name, metric type)` pairs.
    pub fn metrics(&self) -> impl Iterator<Item = (&str, MetricType)> + '_ {
        self.metric_names
            .iter()
            .map(String::as_str)
            .zip(self.metric_types.iter().copied())
    }

    /// Type of a metric, if configured.
    #[must_use]
    pub fn metric_type(&self, name: &str) -> Option<MetricType> {
        self.metrics().find(|(n, _)| *n == name).map(|(_, t)| t)
    }

    /// Name of the time column.
    #[must_use]
    pub fn time_column_name(&self) -> &str {
        &self.time_column_name
    }

    /// Maximum distinct entries per leaf before a split is considered.
    #[must_use]
    pub fn max_record_store_entries(&self) -> usize {
        self.max_record_store_entries
    }

    /// Record store selection.
    #[must_use]
    pub fn record_store(&self) -> &RecordStoreConfig {
        &self.record_store
    }

    /// Long-tail admission policy.
    #[must_use]
    pub fn long_tail(&self) -> &LongTailConfig {
        &self.long_tail
    }

    /// Position of a dimension in the split order.
    #[must_use]
    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.dimension_names.iter().position(|d| d == name)
    }

    /// Returns true if `name` is a configured dimension.
    #[must_use]
    pub fn has_dimension(&self, name: &str) -> bool {
        self.dimension_index(name).is_some()
    }
}

/// Fluent builder for [`StarTreeConfig`].
///
/// Collection, dimension names and metric names are required; everything
/// else has a default.
#[derive(Debug, Clone, Default)]
pub struct StarTreeConfigBuilder {
    collection: Option<String>,
    dimension_names: Option<Vec<String>>,
    metric_names: Option<Vec<String>>,
    metric_types: Option<Vec<MetricType>>,
    time_column_name: Option<String>,
    max_record_store_entries: Option<usize>,
    record_store: Option<RecordStoreConfig>,
    long_tail: Option<LongTailConfig>,
}

impl StarTreeConfigBuilder {
    /// Sets the collection name.
    #[must_use]
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets the dimension names in split order.
    #[must_use]
    pub fn dimension_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimension_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the metric names.
    #[must_use]
    pub fn metric_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metric_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the metric types, parallel to the metric names.
    #[must_use]
    pub fn metric_types(mut self, types: impl IntoIterator<Item = MetricType>) -> Self {
        self.metric_types = Some(types.into_iter().collect());
        self
    }

    /// Sets the time column name.
    #[must_use]
    pub fn time_column_name(mut self, name: impl Into<String>) -> Self {
        self.time_column_name = Some(name.into());
        self
    }

    /// Sets the split threshold.
    #[must_use]
    pub fn max_record_store_entries(mut self, max: usize) -> Self {
        self.max_record_store_entries = Some(max);
        self
    }

    /// Selects the record store implementation.
    #[must_use]
    pub fn record_store(mut self, record_store: RecordStoreConfig) -> Self {
        self.record_store = Some(record_store);
        self
    }

    /// Selects the long-tail admission policy.
    #[must_use]
    pub fn long_tail(mut self, long_tail: LongTailConfig) -> Self {
        self.long_tail = Some(long_tail);
        self
    }

    /// Clears the collection name.
    #[must_use]
    pub fn clear_collection(mut self) -> Self {
        self.collection = None;
        self
    }

    /// Clears the dimension names.
    #[must_use]
    pub fn clear_dimension_names(mut self) -> Self {
        self.dimension_names = None;
        self
    }

    /// Clears the metric names.
    #[must_use]
    pub fn clear_metric_names(mut self) -> Self {
        self.metric_names = None;
        self
    }

    /// Validates the fields and builds the configuration.
    pub fn build(&self) -> Result<StarTreeConfig, ConfigError> {
        let collection = self
            .collection
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(ConfigError::MissingField("collection"))?
            .to_string();

        let dimension_names = self
            .dimension_names
            .clone()
            .filter(|d| !d.is_empty())
            .ok_or(ConfigError::MissingField("dimension_names"))?;

        let metric_names = self
            .metric_names
            .clone()
            .filter(|m| !m.is_empty())
            .ok_or(ConfigError::MissingField("metric_names"))?;

        validate_names("dimension_names", &dimension_names)?;
        validate_names("metric_names", &metric_names)?;
        if let Some(shared) = dimension_names.iter().find(|d| metric_names.contains(d)) {
            return Err(ConfigError::invalid(
                "metric_names",
                format!("'{shared}' is also a dimension"),
            ));
        }

        let metric_types = match &self.metric_types {
            Some(types) if types.len() != metric_names.len() => {
                return Err(ConfigError::invalid(
                    "metric_types",
                    format!(
                        "expected {} types to match metric_names, got {}",
                        metric_names.len(),
                        types.len()
                    ),
                ));
            }
            Some(types) => types.clone(),
            None => vec![MetricType::Int; metric_names.len()],
        };

        let time_column_name = self
            .time_column_name
            .clone()
            .unwrap_or_else(|| DEFAULT_TIME_COLUMN_NAME.to_string());
        if time_column_name.trim().is_empty() {
            return Err(ConfigError::invalid("time_column_name", "must not be empty"));
        }

        let max_record_store_entries = self
            .max_record_store_entries
            .unwrap_or(DEFAULT_MAX_RECORD_STORE_ENTRIES);
        if max_record_store_entries == 0 {
            return Err(ConfigError::invalid(
                "max_record_store_entries",
                "must be greater than 0",
            ));
        }

        let long_tail = self.long_tail.clone().unwrap_or_default();
        validate_long_tail(&long_tail)?;

        Ok(StarTreeConfig {
            collection,
            dimension_names,
            metric_names,
            metric_types,
            time_column_name,
            max_record_store_entries,
            record_store: self.record_store.clone().unwrap_or_default(),
            long_tail,
        })
    }
}

fn validate_names(field: &'static str, names: &[String]) -> Result<(), ConfigError> {
    for (i, name) in names.iter().enumerate() {
        if name.trim().is_empty() {
            return Err(ConfigError::invalid(field, "names must not be empty"));
        }
        if names[..i].contains(name) {
            return Err(ConfigError::invalid(field, format!("duplicate name '{name}'")));
        }
    }
    Ok(())
}

fn validate_long_tail(long_tail: &LongTailConfig) -> Result<(), ConfigError> {
    match long_tail {
        LongTailConfig::Disabled => Ok(()),
        LongTailConfig::CardinalityCap { max_children } => {
            if *max_children == 0 {
                return Err(ConfigError::invalid(
                    "long_tail.max_children",
                    "must be greater than 0",
                ));
            }
            Ok(())
        }
        LongTailConfig::FrequencyThreshold {
            min_fraction,
            max_children,
        } => {
            if !(*min_fraction > 0.0 && *min_fraction <= 1.0) {
                return Err(ConfigError::invalid(
                    "long_tail.min_fraction",
                    format!("{min_fraction} is outside (0, 1]"),
                ));
            }
            if *max_children == Some(0) {
                return Err(ConfigError::invalid(
                    "long_tail.max_children",
                    "must be greater than 0",
                ));
            }
            Ok(())
        }
    }
}
