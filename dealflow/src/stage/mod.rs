//! Stage identities and the stage dependency graph.
//!
//! The acquisition lifecycle is a closed set of seven phases. Each phase is
//! declared with its dependencies and an optional human checkpoint; together
//! they form a DAG that is validated once, at construction.

mod graph;

pub use graph::{StageGraph, StageGraphBuilder};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One phase of the acquisition lifecycle.
///
/// Declaration order is the canonical order: it breaks ties between stages
/// at equal dependency depth, making scheduling deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Acquisition strategy development.
    Strategy,
    /// Target sourcing and screening.
    Sourcing,
    /// Financial and operational data collection.
    DataCollection,
    /// Target valuation.
    Valuation,
    /// Due diligence review.
    DueDiligence,
    /// Negotiation planning.
    Negotiation,
    /// Legal and regulatory review.
    Legal,
}

impl StageId {
    /// All stages in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Strategy,
        Self::Sourcing,
        Self::DataCollection,
        Self::Valuation,
        Self::DueDiligence,
        Self::Negotiation,
        Self::Legal,
    ];

    /// The snake_case name used in events, logs and serialized artifacts.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strategy => "strategy",
            Self::Sourcing => "sourcing",
            Self::DataCollection => "data_collection",
            Self::Valuation => "valuation",
            Self::DueDiligence => "due_diligence",
            Self::Negotiation => "negotiation",
            Self::Legal => "legal",
        }
    }

    /// Position in declaration order, used for deterministic tie-breaking.
    #[must_use]
    pub fn ordinal(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or(Self::ALL.len())
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a single stage within the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    /// The stage identity.
    pub id: StageId,
    /// Stages whose artifacts must be committed before this stage may run.
    pub dependencies: BTreeSet<StageId>,
    /// Whether the stage's artifact must pass a human checkpoint before
    /// it becomes visible to dependents.
    pub requires_checkpoint: bool,
}

impl StageSpec {
    /// Creates an ungated stage spec.
    #[must_use]
    pub fn new(id: StageId) -> Self {
        Self {
            id,
            dependencies: BTreeSet::new(),
            requires_checkpoint: false,
        }
    }

    /// Adds dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = StageId>) -> Self {
        self.dependencies.extend(deps);
        self
    }

    /// Marks the stage as requiring a human checkpoint.
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.requires_checkpoint = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id_display() {
        assert_eq!(StageId::DataCollection.to_string(), "data_collection");
        assert_eq!(StageId::Legal.to_string(), "legal");
    }

    #[test]
    fn test_stage_id_ordinal_follows_declaration() {
        assert_eq!(StageId::Strategy.ordinal(), 0);
        assert_eq!(StageId::Legal.ordinal(), 6);
        for window in StageId::ALL.windows(2) {
            assert!(window[0].ordinal() < window[1].ordinal());
        }
    }

    #[test]
    fn test_stage_id_serde_snake_case() {
        let json = serde_json::to_string(&StageId::DueDiligence).unwrap();
        assert_eq!(json, "\"due_diligence\"");
        let back: StageId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StageId::DueDiligence);
    }

    #[test]
    fn test_stage_spec_builder() {
        let spec = StageSpec::new(StageId::Valuation)
            .with_dependencies([StageId::DataCollection])
            .gated();

        assert_eq!(spec.id, StageId::Valuation);
        assert!(spec.dependencies.contains(&StageId::DataCollection));
        assert!(spec.requires_checkpoint);
    }
}
