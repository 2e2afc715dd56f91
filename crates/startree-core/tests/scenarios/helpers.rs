//! Shared helpers for scenario tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use startree_core::{MetricValue, StarTree, StarTreeConfig, StarTreeQuery, StarTreeRecord};

/// Config over dimensions `[A, B, C]` with one `INT` metric `M`.
pub fn abc_config(max_entries: usize) -> StarTreeConfig {
    StarTreeConfig::builder()
        .collection("scenario")
        .dimension_names(["A", "B", "C"])
        .metric_names(["M"])
        .max_record_store_entries(max_entries)
        .build()
        .expect("valid config")
}

/// Record over `A` and `B` with metric `M`, untimed.
pub fn ab(a: &str, b: &str, m: i64) -> StarTreeRecord {
    StarTreeRecord::builder()
        .dimension("A", a)
        .dimension("B", b)
        .metric("M", m)
        .build()
}

/// Record over `A`, `B`, `C` with metric `M` at `time`.
pub fn abc_at(a: &str, b: &str, c: &str, m: i64, time: i64) -> StarTreeRecord {
    StarTreeRecord::builder()
        .dimension("A", a)
        .dimension("B", b)
        .dimension("C", c)
        .metric("M", m)
        .time(time)
        .build()
}

/// Value of metric `M` as an integer.
pub fn metric_m(record: &StarTreeRecord) -> i64 {
    record
        .metric("M")
        .and_then(MetricValue::as_i64)
        .expect("integral metric M")
}

/// Sum of `M` over the records matching `query`.
pub fn sum_m(tree: &StarTree, query: &StarTreeQuery) -> i64 {
    metric_m(&tree.aggregate(query).expect("aggregate"))
}

/// Seeded random records spread over a few values per dimension.
pub fn generated_records(count: usize, seed: u64) -> Vec<StarTreeRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let a = format!("a{}", rng.gen_range(0..5));
            let b = format!("b{}", rng.gen_range(0..4));
            let c = format!("c{}", rng.gen_range(0..3));
            abc_at(&a, &b, &c, rng.gen_range(0..100), rng.gen_range(0..10))
        })
        .collect()
}
