//! Long-tail admission policies.
//!
//! Whenever the tree is about to create a new concrete child it asks a
//! [`ChildAdmission`] whether the value deserves its own child or should be
//! folded into the shared [`OTHER`](crate::record::OTHER) child.

use std::fmt;
use std::sync::Arc;

use crate::config::LongTailConfig;

/// Answer of an admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Create a dedicated child for the value.
    NewChild,
    /// Route the value to the long-tail child.
    Other,
}

/// When the request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPhase {
    /// A leaf is splitting; `count` of the `total` drained records carry the value.
    Split {
        /// Drained records carrying the value.
        count: u64,
        /// All drained records.
        total: u64,
    },
    /// An internal node sees the value for the first time.
    Insert,
}

/// Question asked to an admission policy.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionRequest<'a> {
    /// Dimension the node splits on.
    pub dimension: &'a str,
    /// Candidate value.
    pub value: &'a str,
    /// Concrete children the node already has, the long-tail child excluded.
    pub concrete_children: usize,
    /// Split or insert time.
    pub phase: AdmissionPhase,
}

/// Strategy deciding whether a value gets its own child.
pub trait ChildAdmission: Send + Sync + fmt::Debug {
    /// Decides for one value.
    fn admit(&self, request: &AdmissionRequest<'_>) -> Admission;
}

/// Every value gets its own child.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl ChildAdmission for AdmitAll {
    fn admit(&self, _request: &AdmissionRequest<'_>) -> Admission {
        Admission::NewChild
    }
}

/// At most `max_children` concrete children per node; later values go to `OTHER`.
#[derive(Debug, Clone, Copy)]
pub struct CardinalityCap {
    max_children: usize,
}

impl CardinalityCap {
    /// Creates the policy.
    #[must_use]
    pub fn new(max_children: usize) -> Self {
        Self { max_children }
    }
}

impl ChildAdmission for CardinalityCap {
    fn admit(&self, request: &AdmissionRequest<'_>) -> Admission {
        if request.concrete_children < self.max_children {
            Admission::NewChild
        } else {
            Admission::Other
        }
    }
}

/// Admits at split time only values frequent enough in the drained batch.
///
/// Values first seen after the split always go to `OTHER`.
#[derive(Debug, Clone, Copy)]
pub struct FrequencyThreshold {
    min_fraction: f64,
    max_children: Option<usize>,
}

impl FrequencyThreshold {
    /// Creates the policy.
    #[must_use]
    pub fn new(min_fraction: f64, max_children: Option<usize>) -> Self {
        Self {
            min_fraction,
            max_children,
        }
    }
}

impl ChildAdmission for FrequencyThreshold {
    #[allow(clippy::cast_precision_loss)] // Reason: ratios of batch sizes
    fn admit(&self, request: &AdmissionRequest<'_>) -> Admission {
        let AdmissionPhase::Split { count, total } = request.phase else {
            return Admission::Other;
        };
        if self
            .max_children
            .is_some_and(|max| request.concrete_children >= max)
        {
            return Admission::Other;
        }
        if total > 0 && count as f64 / total as f64 >= self.min_fraction {
            Admission::NewChild
        } else {
            Admission::Other
        }
    }
}

/// Builds the policy selected by a long-tail config.
#[must_use]
pub fn admission_from_config(config: &LongTailConfig) -> Arc<dyn ChildAdmission> {
    match *config {
        LongTailConfig::Disabled => Arc::new(AdmitAll),
        LongTailConfig::CardinalityCap { max_children } => {
            Arc::new(CardinalityCap::new(max_children))
        }
        LongTailConfig::FrequencyThreshold {
            min_fraction,
            max_children,
        } => Arc::new(FrequencyThreshold::new(min_fraction, max_children)),
    }
}
