//! Rollup queries over a split tree.

use std::collections::BTreeMap;

use startree_core::{RecordFilter, StarTree, StarTreeNode, StarTreeQuery, STAR};

use crate::helpers::{ab, abc_config, generated_records, metric_m, sum_m};

/// Sum of `M` under `node`, counting each record once (star children skipped).
fn subtree_total(node: &StarTreeNode) -> i64 {
    match node.record_store() {
        Some(store) => {
            let totals = store.aggregate(&RecordFilter::all()).expect("aggregate");
            totals.get("M").and_then(|m| m.as_i64()).unwrap_or(0)
        }
        None => node.children().map(subtree_total).sum(),
    }
}

#[test]
fn test_documented_scenario() {
    let mut tree = StarTree::new(abc_config(2)).expect("tree");
    tree.add(ab("x", "p", 1)).unwrap();
    tree.add(ab("x", "q", 2)).unwrap();
    tree.add(ab("x", "r", 3)).unwrap();

    let rollup = StarTreeQuery::from_values([("A", "x"), ("B", STAR)]);
    let result = tree.aggregate(&rollup).unwrap();
    assert_eq!(metric_m(&result), 6);
    assert_eq!(result.dimension("B"), Some(STAR));

    let point = StarTreeQuery::from_values([("A", "x"), ("B", "p")]);
    assert_eq!(sum_m(&tree, &point), 1);
}

#[test]
fn test_star_child_equals_sum_of_concrete_children() {
    let mut tree = StarTree::new(abc_config(4)).unwrap();
    tree.add_all(generated_records(300, 7)).unwrap();

    let mut checked = 0;
    tree.root().walk(&mut |node| {
        if let Some(star) = node.star_child() {
            let concrete: i64 = node.children().map(subtree_total).sum();
            assert_eq!(subtree_total(star), concrete, "split at {:?}", node.path());
            checked += 1;
        }
    });
    assert!(checked > 1);
}

#[test]
fn test_wildcard_completeness() {
    let records = generated_records(200, 11);
    let expected: i64 = records.iter().map(metric_m).sum();

    let mut tree = StarTree::new(abc_config(3)).unwrap();
    tree.add_all(records).unwrap();
    assert!(!tree.root().is_leaf());

    let leaves = tree.find_all(&StarTreeQuery::default()).unwrap();
    let merged: i64 = leaves.iter().copied().map(subtree_total).sum();
    assert_eq!(merged, expected);

    let all_star = StarTreeQuery::from_values([("A", STAR), ("B", STAR), ("C", STAR)]);
    assert_eq!(sum_m(&tree, &all_star), expected);
    assert_eq!(sum_m(&tree, &StarTreeQuery::default()), expected);
}

#[test]
fn test_every_point_query_matches_brute_force() {
    let records = generated_records(250, 23);
    let mut tree = StarTree::new(abc_config(3)).unwrap();
    tree.add_all(records.clone()).unwrap();

    let mut brute: BTreeMap<(String, String), i64> = BTreeMap::new();
    for record in &records {
        let key = (
            record.dimension("A").unwrap().to_string(),
            record.dimension("B").unwrap().to_string(),
        );
        *brute.entry(key).or_default() += metric_m(record);
    }

    for ((a, b), expected) in brute {
        let query = StarTreeQuery::from_values([("A", a.as_str()), ("B", b.as_str())]);
        assert_eq!(sum_m(&tree, &query), expected, "A={a} B={b}");

        let starred = StarTreeQuery::from_values([("A", STAR), ("B", b.as_str())]);
        let by_b: i64 = records
            .iter()
            .filter(|r| r.dimension("B") == Some(b.as_str()))
            .map(metric_m)
            .sum();
        assert_eq!(sum_m(&tree, &starred), by_b, "A=* B={b}");
    }
}

#[test]
fn test_dimension_values_after_split() {
    let mut tree = StarTree::new(abc_config(3)).unwrap();
    tree.add_all(generated_records(100, 5)).unwrap();

    let values = tree.dimension_values("C", &BTreeMap::new()).unwrap();
    let expected: Vec<String> = (0..3).map(|i| format!("c{i}")).collect();
    assert_eq!(values.into_iter().collect::<Vec<_>>(), expected);
}
