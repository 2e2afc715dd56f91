//! Time-series queries under both fill policies.

use startree_core::{StarTree, StarTreeQuery, TimeRange};

use crate::helpers::{abc_at, abc_config, generated_records, metric_m};

fn sparse_tree() -> StarTree {
    let mut tree = StarTree::new(abc_config(2)).unwrap();
    tree.add(abc_at("x", "p", "k", 1, 10)).unwrap();
    tree.add(abc_at("x", "q", "k", 2, 10)).unwrap();
    tree.add(abc_at("x", "r", "k", 3, 13)).unwrap();
    tree.add(abc_at("y", "p", "k", 4, 14)).unwrap();
    tree
}

#[test]
fn test_observed_series_merges_per_bucket() {
    let tree = sparse_tree();
    let query = StarTreeQuery::builder().value("A", "x").build();
    let series = tree.time_series(&query).unwrap();

    let points: Vec<(i64, i64)> = series
        .iter()
        .map(|r| (r.time().unwrap(), metric_m(r)))
        .collect();
    assert_eq!(points, vec![(10, 3), (13, 3)]);
}

#[test]
fn test_dense_series_zero_fills_observed_span() {
    let tree = sparse_tree();
    let query = StarTreeQuery::builder().value("A", "x").dense(1).build();
    let series = tree.time_series(&query).unwrap();

    let points: Vec<(i64, i64)> = series
        .iter()
        .map(|r| (r.time().unwrap(), metric_m(r)))
        .collect();
    assert_eq!(points, vec![(10, 3), (11, 0), (12, 0), (13, 3)]);
}

#[test]
fn test_dense_series_spans_requested_range() {
    let tree = sparse_tree();
    let query = StarTreeQuery::builder()
        .star("A")
        .dense(1)
        .time_range(TimeRange::new(12, 16).unwrap())
        .build();
    let series = tree.time_series(&query).unwrap();

    let points: Vec<(i64, i64)> = series
        .iter()
        .map(|r| (r.time().unwrap(), metric_m(r)))
        .collect();
    assert_eq!(points, vec![(12, 0), (13, 3), (14, 4), (15, 0)]);
}

#[test]
fn test_empty_series() {
    let tree = sparse_tree();
    let query = StarTreeQuery::builder().value("A", "missing").dense(1).build();
    assert!(tree.time_series(&query).unwrap().is_empty());
}

#[test]
fn test_series_sums_to_aggregate() {
    let mut tree = StarTree::new(abc_config(3)).unwrap();
    tree.add_all(generated_records(150, 3)).unwrap();

    let query = StarTreeQuery::builder().value("B", "b1").build();
    let series_total: i64 = tree.time_series(&query).unwrap().iter().map(metric_m).sum();
    let total = metric_m(&tree.aggregate(&query).unwrap());
    assert_eq!(series_total, total);
}
