//! Error types for the star tree.

use thiserror::Error;

use crate::config::ConfigError;

/// Star tree error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A query or record references a dimension the tree was not configured with.
    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),

    /// A record carries a metric the tree was not configured with.
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// A query is malformed (bad time range, bad fill step).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A record cannot be inserted as given.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// IO error from a record store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted record store data failed an integrity check.
    #[error("Corrupted record store: {0}")]
    Corruption(String),

    /// A record store was used before `open()` or after `close()`.
    #[error("Record store is not open: {0}")]
    StoreNotOpen(String),

    /// The tree has been closed; no further operations are allowed.
    #[error("Star tree is closed")]
    Closed,

    /// A failed insert left part of the record in the tree; only `close()` is allowed.
    #[error("Star tree is inconsistent after a failed insert: {0}")]
    Inconsistent(String),
}

/// Result type alias for star tree operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if the error originates from the storage layer.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Serialization(_) | Self::Corruption(_) | Self::StoreNotOpen(_)
        )
    }
}
