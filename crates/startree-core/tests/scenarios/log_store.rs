//! Trees backed by the append-only log record store.

use std::fs;

use tempfile::TempDir;

use startree_core::{RecordStoreConfig, StarTree, StarTreeConfig, StarTreeQuery};

use crate::helpers::{generated_records, metric_m, sum_m};

fn log_tree(root: &std::path::Path) -> StarTree {
    let config = StarTreeConfig::builder()
        .collection("persistent")
        .dimension_names(["A", "B", "C"])
        .metric_names(["M"])
        .max_record_store_entries(5)
        .record_store(RecordStoreConfig::Log {
            root_dir: root.to_path_buf(),
        })
        .build()
        .unwrap();
    StarTree::new(config).unwrap()
}

#[test]
fn test_log_backed_tree_matches_memory_tree() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let records = generated_records(120, 19);

    let mut persistent = log_tree(temp.path());
    persistent.open().unwrap();
    persistent.add_all(records.clone()).unwrap();

    let mut memory = StarTree::new(crate::helpers::abc_config(5)).unwrap();
    memory.add_all(records).unwrap();

    for query in [
        StarTreeQuery::default(),
        StarTreeQuery::from_values([("A", "a1")]),
        StarTreeQuery::from_values([("A", "*"), ("B", "b2")]),
        StarTreeQuery::from_values([("C", "c0"), ("A", "a3")]),
    ] {
        assert_eq!(sum_m(&persistent, &query), sum_m(&memory, &query), "{query:?}");
    }
    assert_eq!(persistent.stats().split_count, memory.stats().split_count);

    persistent.close().unwrap();
}

#[test]
fn test_one_directory_per_leaf() {
    let temp = TempDir::new().unwrap();
    let mut tree = log_tree(temp.path());
    tree.open().unwrap();
    tree.add_all(generated_records(60, 2)).unwrap();

    let dirs = fs::read_dir(temp.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .count();
    // Split leaves release their directories
    assert_eq!(dirs, tree.stats().leaf_count);

    for leaf in tree.root().leaves() {
        assert!(temp.path().join(leaf.id().to_string()).exists());
    }

    let series = tree.time_series(&StarTreeQuery::default()).unwrap();
    let total: i64 = series.iter().map(metric_m).sum();
    assert_eq!(total, sum_m(&tree, &StarTreeQuery::default()));
    tree.close().unwrap();
}
