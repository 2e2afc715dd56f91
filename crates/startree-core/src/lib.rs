//! # `StarTree` Core
//!
//! Multi-dimensional rollup index answering aggregate and time-series queries
//! without scanning raw records.
//!
//! Records carry a value per categorical dimension, additive metrics and an
//! optional time bucket. The tree splits full leaves on the next dimension in
//! config order and keeps a star (`*`) child per split holding the same
//! records with that dimension rolled up, so wildcard queries resolve to a
//! single pre-aggregated leaf.
//!
//! ## Features
//!
//! - **Incremental**: records are inserted one by one; leaves split on demand
//! - **Wildcard Queries**: `*` and unconstrained dimensions, fixed values anywhere
//! - **Time Series**: per-bucket sums, observed or zero-filled
//! - **Long Tail**: optional cap folding rare values into a shared `?` child
//! - **Pluggable Storage**: in-memory or append-only log per leaf
//!
//! ## Quick Start
//!
//! ```rust
//! use startree_core::{StarTree, StarTreeConfig, StarTreeQuery, StarTreeRecord};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StarTreeConfig::builder()
//!         .collection("clicks")
//!         .dimension_names(["country", "browser"])
//!         .metric_names(["count"])
//!         .build()?;
//!
//!     let mut tree = StarTree::new(config)?;
//!     tree.open()?;
//!     tree.add(
//!         StarTreeRecord::builder()
//!             .dimension("country", "fr")
//!             .dimension("browser", "firefox")
//!             .metric("count", 3)
//!             .time(1)
//!             .build(),
//!     )?;
//!
//!     let query = StarTreeQuery::builder().value("country", "fr").build();
//!     let total = tree.aggregate(&query)?;
//!     assert_eq!(total.metric("count").and_then(|m| m.as_i64()), Some(3));
//!
//!     tree.close()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
// Clippy lints configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(
    test,
    allow(
        clippy::doc_markdown,
        clippy::uninlined_format_args,
        clippy::single_match_else,
        clippy::cast_lossless,
        clippy::manual_assert
    )
)]

pub mod config;
pub mod error;
pub mod query;
pub mod record;
pub mod store;
pub mod tree;

pub use config::{
    ConfigError, LongTailConfig, MetricType, RecordStoreConfig, StarTreeConfig,
    StarTreeConfigBuilder,
};
pub use error::{Error, Result};
pub use query::{DimensionSpec, RecordFilter, StarTreeQuery, TimeRange, TimeSeriesFill};
pub use record::{MetricValue, Metrics, StarTreeRecord, TimeBucket, OTHER, STAR};
pub use store::{
    build_factory, LeafContext, LogRecordStore, LogRecordStoreFactory, MemoryRecordStore,
    MemoryRecordStoreFactory, RecordStore, RecordStoreFactory,
};
pub use tree::{
    Admission, AdmissionPhase, AdmissionRequest, AdmitAll, CardinalityCap, ChildAdmission,
    ConcurrentStarTree, FrequencyThreshold, StarTree, StarTreeNode, StarTreeStats, TreeState,
};
