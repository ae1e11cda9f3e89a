//! Operation tags and the run-level ledger of executed operations.
//!
//! An operation tag is a semantic label for a category of analysis work
//! ("normalize", "cluster", ...). The ledger accumulates tags as steps
//! complete and derives the coverage flag from them. Both only ever grow
//! within a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Default number of core tags that must be observed before the analysis is
/// considered fully covered.
pub const DEFAULT_COVERAGE_THRESHOLD: usize = 6;

/// Category of domain work detected in code or in a step description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationTag {
    DataLoad,
    QualityControl,
    Normalize,
    FeatureSelection,
    DimensionalityReduction,
    Integration,
    Cluster,
    DifferentialAnalysis,
    Annotation,
    Visualize,
    Persist,
}

impl OperationTag {
    /// Every tag, in taxonomy order.
    pub const ALL: [OperationTag; 11] = [
        Self::DataLoad,
        Self::QualityControl,
        Self::Normalize,
        Self::FeatureSelection,
        Self::DimensionalityReduction,
        Self::Integration,
        Self::Cluster,
        Self::DifferentialAnalysis,
        Self::Annotation,
        Self::Visualize,
        Self::Persist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataLoad => "data_load",
            Self::QualityControl => "quality_control",
            Self::Normalize => "normalize",
            Self::FeatureSelection => "feature_selection",
            Self::DimensionalityReduction => "dimensionality_reduction",
            Self::Integration => "integration",
            Self::Cluster => "cluster",
            Self::DifferentialAnalysis => "differential_analysis",
            Self::Annotation => "annotation",
            Self::Visualize => "visualize",
            Self::Persist => "persist",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let needle = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|tag| tag.as_str() == needle)
    }

    /// Whether the tag belongs to the core vocabulary that drives coverage.
    pub fn is_core(&self) -> bool {
        !matches!(self, Self::Persist)
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a tag set as a comma separated list (or "none").
pub fn format_operations(ops: &BTreeSet<OperationTag>) -> String {
    if ops.is_empty() {
        return "none".to_string();
    }
    ops.iter().map(OperationTag::as_str).collect::<Vec<_>>().join(", ")
}

/// Monotonic set of operations executed during a run, plus the coverage flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLedger {
    executed: BTreeSet<OperationTag>,
    fully_covered: bool,
    threshold: usize,
}

impl OperationLedger {
    pub fn new(threshold: usize) -> Self {
        Self {
            executed: BTreeSet::new(),
            fully_covered: false,
            threshold,
        }
    }

    /// Fold a set of operations into the ledger.
    ///
    /// Returns the tags that were not present before. The coverage flag is
    /// re-evaluated and can only move from `false` to `true`.
    pub fn record<'a, I>(&mut self, ops: I) -> BTreeSet<OperationTag>
    where
        I: IntoIterator<Item = &'a OperationTag>,
    {
        let added: BTreeSet<OperationTag> = ops
            .into_iter()
            .filter(|tag| self.executed.insert(**tag))
            .copied()
            .collect();

        if !self.fully_covered && self.core_count() >= self.threshold {
            self.fully_covered = true;
        }
        added
    }

    /// True when every tag in `ops` has already been executed (vacuously true
    /// for an empty set).
    pub fn covers(&self, ops: &BTreeSet<OperationTag>) -> bool {
        ops.is_subset(&self.executed)
    }

    /// Number of core-vocabulary tags executed so far.
    pub fn core_count(&self) -> usize {
        self.executed.iter().filter(|tag| tag.is_core()).count()
    }

    pub fn is_fully_covered(&self) -> bool {
        self.fully_covered
    }

    pub fn executed(&self) -> &BTreeSet<OperationTag> {
        &self.executed
    }

    /// Forget everything. Only called when a new run begins.
    pub fn reset(&mut self) {
        self.executed.clear();
        self.fully_covered = false;
    }
}

impl Default for OperationLedger {
    fn default() -> Self {
        Self::new(DEFAULT_COVERAGE_THRESHOLD)
    }
}
