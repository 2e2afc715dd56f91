//! Building trees from configuration files and the environment.

use std::fs;

use tempfile::TempDir;

use startree_core::{
    ConfigError, LongTailConfig, MetricType, RecordStoreConfig, StarTree, StarTreeConfig,
    StarTreeQuery,
};

use crate::helpers::{ab, sum_m};

#[test]
fn test_tree_from_toml_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("startree.toml");
    fs::write(
        &path,
        r#"
collection = "events"
dimension_names = ["A", "B"]
metric_names = ["M"]
metric_types = ["LONG"]
max_record_store_entries = 2

[long_tail]
policy = "cardinality_cap"
max_children = 8
"#,
    )
    .unwrap();

    let config = StarTreeConfig::load(&path).unwrap();
    assert_eq!(config.metric_type("M"), Some(MetricType::Long));
    assert_eq!(
        config.long_tail(),
        &LongTailConfig::CardinalityCap { max_children: 8 }
    );
    assert_eq!(config.record_store(), &RecordStoreConfig::Memory);

    let mut tree = StarTree::new(config).unwrap();
    tree.add(ab("x", "p", 1)).unwrap();
    tree.add(ab("x", "q", 2)).unwrap();
    tree.add(ab("y", "p", 4)).unwrap();
    assert_eq!(sum_m(&tree, &StarTreeQuery::from_values([("B", "p")])), 5);
}

#[test]
fn test_tree_from_json() {
    let json = r#"{
        "collection": "events",
        "dimensionNames": ["A", "B"],
        "metricNames": ["M"],
        "maxRecordStoreEntries": 3
    }"#;
    let config = StarTreeConfig::from_json(json).unwrap();
    assert_eq!(config.max_record_store_entries(), 3);
    assert_eq!(config.time_column_name(), "time");
    assert!(StarTree::new(config).is_ok());
}

#[test]
fn test_missing_required_fields_fail_every_time() {
    for json in [
        r#"{}"#,
        r#"{"collection": "c"}"#,
        r#"{"collection": "c", "dimension_names": ["A"]}"#,
        r#"{"dimension_names": ["A"], "metric_names": ["M"]}"#,
        r#"{"collection": "c", "metric_names": ["M"]}"#,
    ] {
        for _ in 0..2 {
            assert!(
                matches!(
                    StarTreeConfig::from_json(json),
                    Err(ConfigError::MissingField(_))
                ),
                "{json}"
            );
        }
    }
}
