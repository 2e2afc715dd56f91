//! End-to-end scenario tests for the star tree.
//!
//! Each submodule drives the public API only: build a config, insert records,
//! query. Together they cover the rollup, time-series, long-tail and
//! persistent-store paths.

mod helpers;

mod config_loading;
mod log_store;
mod long_tail;
mod rollup;
mod time_series;
