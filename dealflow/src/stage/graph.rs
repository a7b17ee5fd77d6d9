//! Validated stage dependency graph.
//!
//! Construction rejects cycles, unknown dependencies and duplicates, so the
//! scheduler can rely on the graph being a closed DAG. The graph also fixes
//! the topological priority used to order ready stages deterministically.

use super::{StageId, StageSpec};
use crate::errors::GraphValidationError;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Builder for a validated [`StageGraph`].
///
/// Dependencies must reference stages declared earlier, which keeps the
/// declaration order itself topological and makes misdeclarations fail at
/// the offending line.
#[derive(Debug, Clone, Default)]
pub struct StageGraphBuilder {
    specs: Vec<StageSpec>,
    declared: BTreeSet<StageId>,
}

impl StageGraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an ungated stage.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate stages, self-dependencies, or
    /// dependencies on undeclared stages.
    pub fn stage(
        self,
        id: StageId,
        dependencies: &[StageId],
    ) -> Result<Self, GraphValidationError> {
        self.add(StageSpec::new(id).with_dependencies(dependencies.iter().copied()))
    }

    /// Declares a stage whose artifact requires a human checkpoint.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::stage`].
    pub fn gated_stage(
        self,
        id: StageId,
        dependencies: &[StageId],
    ) -> Result<Self, GraphValidationError> {
        self.add(
            StageSpec::new(id)
                .with_dependencies(dependencies.iter().copied())
                .gated(),
        )
    }

    /// Declares a stage from a prepared spec.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate stages, self-dependencies, or
    /// dependencies on undeclared stages.
    pub fn add(mut self, spec: StageSpec) -> Result<Self, GraphValidationError> {
        if self.declared.contains(&spec.id) {
            return Err(GraphValidationError::DuplicateStage { stage: spec.id });
        }
        if spec.dependencies.contains(&spec.id) {
            return Err(GraphValidationError::SelfDependency { stage: spec.id });
        }
        for dep in &spec.dependencies {
            if !self.declared.contains(dep) {
                return Err(GraphValidationError::UnknownDependency {
                    stage: spec.id,
                    dependency: *dep,
                });
            }
        }

        self.declared.insert(spec.id);
        self.specs.push(spec);
        Ok(self)
    }

    /// Validates and builds the graph.
    ///
    /// # Errors
    ///
    /// Returns [`GraphValidationError::Empty`] for a graph with no stages,
    /// or [`GraphValidationError::Cycle`] if a cycle slipped past the
    /// incremental checks (possible only via [`StageSpec`] mutation).
    pub fn build(self) -> Result<StageGraph, GraphValidationError> {
        StageGraph::from_specs(self.specs)
    }
}

/// An immutable, validated DAG of lifecycle stages.
#[derive(Debug, Clone)]
pub struct StageGraph {
    specs: BTreeMap<StageId, StageSpec>,
    /// Stages ordered by (dependency depth, declaration order).
    priority: Vec<StageId>,
    depths: HashMap<StageId, usize>,
}

impl StageGraph {
    /// Builds a graph from stage specs, validating acyclicity and closure.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec set is empty, references unknown
    /// stages, or contains a cycle.
    pub fn from_specs(
        specs: impl IntoIterator<Item = StageSpec>,
    ) -> Result<Self, GraphValidationError> {
        let mut map: BTreeMap<StageId, StageSpec> = BTreeMap::new();
        for spec in specs {
            if spec.dependencies.contains(&spec.id) {
                return Err(GraphValidationError::SelfDependency { stage: spec.id });
            }
            if map.insert(spec.id, spec.clone()).is_some() {
                return Err(GraphValidationError::DuplicateStage { stage: spec.id });
            }
        }
        if map.is_empty() {
            return Err(GraphValidationError::Empty);
        }
        for spec in map.values() {
            for dep in &spec.dependencies {
                if !map.contains_key(dep) {
                    return Err(GraphValidationError::UnknownDependency {
                        stage: spec.id,
                        dependency: *dep,
                    });
                }
            }
        }

        let depths = compute_depths(&map)?;

        let mut priority: Vec<StageId> = map.keys().copied().collect();
        priority.sort_by_key(|id| (depths[id], id.ordinal()));

        Ok(Self {
            specs: map,
            priority,
            depths,
        })
    }

    /// The default lifecycle: every stage depends on the previous one, no
    /// checkpoints. Gates are added per deployment via the builder.
    #[must_use]
    pub fn sequential_lifecycle() -> Self {
        let mut builder = StageGraphBuilder::new();
        let mut prev: Option<StageId> = None;
        for id in StageId::ALL {
            let deps: Vec<StageId> = prev.into_iter().collect();
            // Infallible: declaration order is itself topological.
            builder = match builder.stage(id, &deps) {
                Ok(b) => b,
                Err(_) => unreachable!("sequential lifecycle is always valid"),
            };
            prev = Some(id);
        }
        match builder.build() {
            Ok(graph) => graph,
            Err(_) => unreachable!("sequential lifecycle is always valid"),
        }
    }

    /// Number of stages in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if the graph has no stages (never true post-build).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// The spec for a stage, if it is part of the graph.
    #[must_use]
    pub fn spec(&self, id: StageId) -> Option<&StageSpec> {
        self.specs.get(&id)
    }

    /// Whether the stage's artifact requires a human checkpoint.
    #[must_use]
    pub fn requires_checkpoint(&self, id: StageId) -> bool {
        self.specs.get(&id).is_some_and(|s| s.requires_checkpoint)
    }

    /// Declared dependencies of a stage.
    #[must_use]
    pub fn dependencies(&self, id: StageId) -> BTreeSet<StageId> {
        self.specs
            .get(&id)
            .map(|s| s.dependencies.clone())
            .unwrap_or_default()
    }

    /// Stages in deterministic topological priority order: dependency depth
    /// first, declaration order among equals.
    #[must_use]
    pub fn priority_order(&self) -> &[StageId] {
        &self.priority
    }

    /// Dependency depth of a stage (0 for roots).
    #[must_use]
    pub fn depth(&self, id: StageId) -> Option<usize> {
        self.depths.get(&id).copied()
    }

    /// Stages whose dependencies are all in `committed` and which are not
    /// themselves in `committed`, in priority order.
    #[must_use]
    pub fn ready_stages(&self, committed: &BTreeSet<StageId>) -> Vec<StageId> {
        self.priority
            .iter()
            .copied()
            .filter(|id| !committed.contains(id))
            .filter(|id| {
                self.specs[id]
                    .dependencies
                    .iter()
                    .all(|dep| committed.contains(dep))
            })
            .collect()
    }

    /// Iterates over all stage specs.
    pub fn specs(&self) -> impl Iterator<Item = &StageSpec> {
        self.specs.values()
    }
}

/// Longest-path depth per stage; errors with the cycle path if one exists.
fn compute_depths(
    specs: &BTreeMap<StageId, StageSpec>,
) -> Result<HashMap<StageId, usize>, GraphValidationError> {
    let mut depths: HashMap<StageId, usize> = HashMap::new();
    let mut in_progress: HashSet<StageId> = HashSet::new();

    fn visit(
        id: StageId,
        specs: &BTreeMap<StageId, StageSpec>,
        depths: &mut HashMap<StageId, usize>,
        in_progress: &mut HashSet<StageId>,
        trail: &mut Vec<StageId>,
    ) -> Result<usize, GraphValidationError> {
        if let Some(&d) = depths.get(&id) {
            return Ok(d);
        }
        if !in_progress.insert(id) {
            let start = trail.iter().position(|s| *s == id).unwrap_or(0);
            let mut path: Vec<StageId> = trail[start..].to_vec();
            path.push(id);
            return Err(GraphValidationError::Cycle { path });
        }
        trail.push(id);

        let mut depth = 0;
        for dep in &specs[&id].dependencies {
            depth = depth.max(visit(*dep, specs, depths, in_progress, trail)? + 1);
        }

        trail.pop();
        in_progress.remove(&id);
        depths.insert(id, depth);
        Ok(depth)
    }

    for id in specs.keys() {
        let mut trail = Vec::new();
        visit(*id, specs, &mut depths, &mut in_progress, &mut trail)?;
    }
    Ok(depths)
}
