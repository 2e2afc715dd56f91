//! Tests for insertion and leaf splitting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{StarTree, TreeState};
use crate::config::{LongTailConfig, StarTreeConfig};
use crate::error::{Error, Result};
use crate::query::StarTreeQuery;
use crate::record::{MetricValue, StarTreeRecord, OTHER, STAR};
use crate::store::{
    LeafContext, MemoryRecordStore, MemoryRecordStoreFactory, RecordStore, RecordStoreFactory,
};

// -------------------------------------------------------------------------
// Helper functions
// -------------------------------------------------------------------------

fn config(max_entries: usize) -> StarTreeConfig {
    StarTreeConfig::builder()
        .collection("test")
        .dimension_names(["A", "B", "C"])
        .metric_names(["M"])
        .max_record_store_entries(max_entries)
        .build()
        .expect("valid config")
}

fn record(a: &str, b: &str, m: i64) -> StarTreeRecord {
    StarTreeRecord::builder()
        .dimension("A", a)
        .dimension("B", b)
        .metric("M", m)
        .build()
}

fn total_m(tree: &StarTree) -> Option<MetricValue> {
    tree.aggregate(&StarTreeQuery::default()).unwrap().metric("M")
}

fn scenario_tree() -> StarTree {
    let mut tree = StarTree::new(config(2)).unwrap();
    tree.add(record("x", "p", 1)).unwrap();
    tree.add(record("x", "q", 2)).unwrap();
    tree.add(record("x", "r", 3)).unwrap();
    tree
}

/// Factory that refuses to create stores once its budget is spent.
#[derive(Debug)]
struct BudgetFactory {
    remaining: AtomicUsize,
}

impl RecordStoreFactory for BudgetFactory {
    fn id(&self) -> &'static str {
        "budget"
    }

    fn create_store(&self, context: &LeafContext<'_>) -> Result<Box<dyn RecordStore>> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return Err(Error::Io(std::io::Error::other("store budget exhausted")));
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        MemoryRecordStoreFactory.create_store(context)
    }
}

type Rejects = fn(&StarTreeRecord) -> bool;

fn rejects_boom(record: &StarTreeRecord) -> bool {
    record.dimension("A") == Some("boom")
}

fn rejects_bad_star_copy(record: &StarTreeRecord) -> bool {
    record.dimension("A") == Some(STAR) && record.dimension("B") == Some("bad")
}

/// Memory store refusing the records its predicate matches.
#[derive(Debug)]
struct PickyStore {
    inner: MemoryRecordStore,
    rejects: Rejects,
}

impl RecordStore for PickyStore {
    fn open(&mut self) -> Result<()> {
        self.inner.open()
    }
    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
    fn add(&mut self, record: &StarTreeRecord) -> Result<()> {
        if (self.rejects)(record) {
            return Err(Error::Corruption("refused".into()));
        }
        self.inner.add(record)
    }
    fn entry_count(&self) -> usize {
        self.inner.entry_count()
    }
    fn record_count(&self) -> u64 {
        self.inner.record_count()
    }
    fn records(&self) -> Result<Vec<StarTreeRecord>> {
        self.inner.records()
    }
    fn clear(&mut self) -> Result<()> {
        self.inner.clear()
    }
}

#[derive(Debug)]
struct PickyFactory(Rejects);

impl RecordStoreFactory for PickyFactory {
    fn id(&self) -> &'static str {
        "picky"
    }

    fn create_store(&self, context: &LeafContext<'_>) -> Result<Box<dyn RecordStore>> {
        Ok(Box::new(PickyStore {
            inner: MemoryRecordStore::new(context.dimension_names().to_vec()),
            rejects: self.0,
        }))
    }
}

// -------------------------------------------------------------------------
// Split behavior
// -------------------------------------------------------------------------

#[test]
fn test_leaf_stays_leaf_within_bound() {
    let mut tree = StarTree::new(config(2)).unwrap();
    tree.add(record("x", "p", 1)).unwrap();
    tree.add(record("x", "q", 1)).unwrap();
    tree.add(record("x", "q", 1)).unwrap();

    assert!(tree.root().is_leaf());
    assert_eq!(tree.stats().split_count, 0);
}

#[test]
fn test_scenario_splits_in_dimension_order() {
    let tree = scenario_tree();
    let root = tree.root();

    assert_eq!(root.split_dimension(), Some("A"));
    let x = root.child("x").expect("child for A=x");
    assert_eq!(x.split_dimension(), Some("B"));
    assert_eq!(x.path(), &[("A".to_string(), "x".to_string())]);

    let values: Vec<&str> = x.children().map(|c| c.dimension_value()).collect();
    assert_eq!(values, vec!["p", "q", "r"]);

    let star = root.star_child().expect("star child");
    assert!(star.is_star());
    assert_eq!(star.dimension_value(), STAR);
    assert_eq!(star.split_dimension(), Some("B"));

    let stats = tree.stats();
    assert_eq!(stats.split_count, 3);
    assert_eq!(stats.node_count, 11);
    assert_eq!(stats.leaf_count, 8);
    assert_eq!(stats.max_depth, 2);
    assert_eq!(stats.record_count, 3);
}

#[test]
fn test_star_child_holds_wildcarded_copies() {
    let tree = scenario_tree();
    let x_star = tree
        .root()
        .child("x")
        .and_then(|x| x.star_child())
        .expect("star child of A=x");

    let store = x_star.record_store().expect("leaf");
    let records = store.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].dimension("A"), Some("x"));
    assert_eq!(records[0].dimension("B"), Some(STAR));
    assert_eq!(records[0].metric("M"), Some(MetricValue::Int(6)));
}

#[test]
fn test_exhausted_dimensions_keep_soft_bound() {
    let config = StarTreeConfig::builder()
        .collection("test")
        .dimension_names(["A"])
        .metric_names(["M"])
        .max_record_store_entries(1)
        .long_tail(LongTailConfig::CardinalityCap { max_children: 1 })
        .build()
        .unwrap();
    let mut tree = StarTree::new(config).unwrap();
    for value in ["a", "b", "c"] {
        tree.add(
            StarTreeRecord::builder()
                .dimension("A", value)
                .metric("M", 1)
                .build(),
        )
        .unwrap();
    }

    // b and c share the long-tail leaf, which has no dimension left to split on
    let other = tree.root().other_child().expect("other child");
    assert!(other.is_leaf());
    assert_eq!(other.record_store().unwrap().entry_count(), 2);
    assert_eq!(tree.stats().split_count, 1);
}

#[test]
fn test_inserts_after_split_reach_child_and_star() {
    let mut tree = scenario_tree();
    tree.add(record("y", "p", 10)).unwrap();

    let y = tree.root().child("y").expect("new child created");
    assert!(y.is_leaf());
    assert_eq!(y.record_store().unwrap().record_count(), 1);

    let star = tree.root().star_child().unwrap();
    let star_p = star.child("p").expect("B=p under A=*");
    let records = star_p.record_store().unwrap().records().unwrap();
    assert_eq!(records[0].metric("M"), Some(MetricValue::Int(11)));
}

#[test]
fn test_missing_dimension_is_stored_as_other() {
    let mut tree = scenario_tree();
    tree.add(
        StarTreeRecord::builder()
            .dimension("B", "p")
            .metric("M", 4)
            .build(),
    )
    .unwrap();

    let other = tree.root().other_child().expect("other child");
    assert!(other.is_other());
    let records = other.record_store().unwrap().records().unwrap();
    assert_eq!(records[0].dimension("A"), Some(OTHER));
    assert_eq!(records[0].dimension("C"), Some(OTHER));
}

// -------------------------------------------------------------------------
// Record validation
// -------------------------------------------------------------------------

#[test]
fn test_add_rejects_unknown_names_and_star() {
    let mut tree = StarTree::new(config(10)).unwrap();

    let unknown_dim = StarTreeRecord::builder().dimension("Z", "v").build();
    assert!(matches!(tree.add(unknown_dim), Err(Error::UnknownDimension(d)) if d == "Z"));

    let unknown_metric = StarTreeRecord::builder().metric("N", 1).build();
    assert!(matches!(tree.add(unknown_metric), Err(Error::UnknownMetric(m)) if m == "N"));

    let star = StarTreeRecord::builder().dimension("A", STAR).build();
    assert!(matches!(tree.add(star), Err(Error::InvalidRecord(_))));

    let fractional = StarTreeRecord::builder().metric("M", 1.5).build();
    assert!(matches!(tree.add(fractional), Err(Error::InvalidRecord(_))));

    assert_eq!(tree.stats().record_count, 0);
}

#[test]
fn test_add_coerces_integral_floats() {
    let mut tree = StarTree::new(config(10)).unwrap();
    tree.add(StarTreeRecord::builder().dimension("A", "x").metric("M", 2.0).build())
        .unwrap();

    let records = tree.root().record_store().unwrap().records().unwrap();
    assert_eq!(records[0].metric("M"), Some(MetricValue::Int(2)));
}

// -------------------------------------------------------------------------
// Failure handling
// -------------------------------------------------------------------------

#[test]
fn test_failed_split_keeps_record_and_retries() {
    let factory = Arc::new(BudgetFactory {
        remaining: AtomicUsize::new(1),
    });
    let mut tree = StarTree::with_factory(config(1), factory.clone()).unwrap();
    tree.add(record("x", "p", 1)).unwrap();
    tree.add(record("y", "p", 2)).unwrap();
    tree.add(record("y", "p", 2)).unwrap();

    let root = tree.root();
    assert!(root.is_leaf());
    assert_eq!(root.record_store().unwrap().entry_count(), 2);
    let stats = tree.stats();
    assert_eq!(stats.record_count, 3);
    assert_eq!(stats.split_count, 0);
    assert_eq!(stats.node_count, 1);
    assert_eq!(total_m(&tree), Some(MetricValue::Int(5)));

    // Root on A, A=x on B, A=* on B
    factory.remaining.store(10, Ordering::SeqCst);
    tree.add(record("x", "q", 4)).unwrap();
    assert_eq!(tree.root().split_dimension(), Some("A"));
    let stats = tree.stats();
    assert_eq!(stats.record_count, 4);
    assert_eq!(stats.split_count, 3);
    assert_eq!(total_m(&tree), Some(MetricValue::Int(9)));

    let y = StarTreeQuery::builder().value("A", "y").build();
    assert_eq!(
        tree.aggregate(&y).unwrap().metric("M"),
        Some(MetricValue::Int(4))
    );
}

#[test]
fn test_failed_star_insert_marks_tree_failed() {
    let mut tree =
        StarTree::with_factory(config(1), Arc::new(PickyFactory(rejects_bad_star_copy))).unwrap();
    tree.add(record("x", "p", 1)).unwrap();
    tree.add(record("y", "p", 2)).unwrap();
    assert_eq!(tree.root().split_dimension(), Some("A"));

    // Stored under A=x, refused by the A=* copy
    let result = tree.add(record("x", "bad", 4));
    assert!(matches!(result, Err(Error::Corruption(_))));
    assert_eq!(tree.state(), TreeState::Failed);

    assert!(matches!(
        tree.aggregate(&StarTreeQuery::default()),
        Err(Error::Inconsistent(_))
    ));
    assert!(matches!(
        tree.find(&StarTreeQuery::default()),
        Err(Error::Inconsistent(_))
    ));
    assert!(matches!(
        tree.add(record("z", "p", 1)),
        Err(Error::Inconsistent(_))
    ));
    assert!(matches!(tree.open(), Err(Error::Inconsistent(_))));

    tree.close().unwrap();
    assert_eq!(tree.state(), TreeState::Closed);
    assert!(matches!(
        tree.aggregate(&StarTreeQuery::default()),
        Err(Error::Closed)
    ));
}

#[test]
fn test_failed_insert_removes_new_child() {
    let mut tree = StarTree::with_factory(config(1), Arc::new(PickyFactory(rejects_boom))).unwrap();
    tree.add(record("x", "p", 1)).unwrap();
    tree.add(record("y", "p", 1)).unwrap();
    assert_eq!(tree.root().split_dimension(), Some("A"));

    let result = tree.add(record("boom", "p", 1));
    assert!(matches!(result, Err(Error::Corruption(_))));
    assert!(tree.root().child("boom").is_none());
    assert_eq!(tree.root().concrete_child_count(), 2);

    // Nothing was stored, so the tree stays usable
    assert_eq!(tree.state(), TreeState::Created);
    assert_eq!(total_m(&tree), Some(MetricValue::Int(2)));
}

#[test]
fn test_stores_created_while_open_are_opened() {
    let mut tree = StarTree::new(config(1)).unwrap();
    tree.open().unwrap();
    tree.add(record("x", "p", 1)).unwrap();
    tree.add(record("y", "p", 1)).unwrap();

    assert_eq!(tree.state(), TreeState::Open);
    for leaf in tree.root().leaves() {
        assert!(leaf.record_store().unwrap().is_open());
    }
}
