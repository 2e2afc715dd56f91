//! Long-tail bounding of fan-out.

use std::collections::BTreeMap;

use startree_core::{LongTailConfig, StarTree, StarTreeConfig, StarTreeQuery, OTHER};

use crate::helpers::{ab, sum_m};

fn capped_tree(max_children: usize) -> StarTree {
    let config = StarTreeConfig::builder()
        .collection("long-tail")
        .dimension_names(["A", "B"])
        .metric_names(["M"])
        .max_record_store_entries(4)
        .long_tail(LongTailConfig::CardinalityCap { max_children })
        .build()
        .unwrap();
    StarTree::new(config).unwrap()
}

#[test]
fn test_children_never_exceed_cap() {
    let mut tree = capped_tree(3);
    for i in 0..50 {
        tree.add(ab(&format!("v{i}"), "p", 1)).unwrap();
    }

    tree.root().walk(&mut |node| {
        assert!(node.concrete_child_count() <= 3, "at {:?}", node.path());
    });
    assert_eq!(tree.root().concrete_child_count(), 3);
    assert_eq!(
        tree.root().other_child().map(|o| o.dimension_value()),
        Some(OTHER)
    );
}

#[test]
fn test_other_bucket_answers_stay_exact() {
    let mut tree = capped_tree(2);
    for i in 0..20 {
        tree.add(ab(&format!("v{i}"), "p", i)).unwrap();
    }

    for i in 0..20 {
        let query = StarTreeQuery::from_values([("A", format!("v{i}"))]);
        assert_eq!(sum_m(&tree, &query), i, "A=v{i}");
    }
    assert_eq!(sum_m(&tree, &StarTreeQuery::default()), (0..20).sum::<i64>());

    let values = tree.dimension_values("A", &BTreeMap::new()).unwrap();
    assert_eq!(values.len(), 20);
}
