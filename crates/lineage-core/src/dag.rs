//! # Version History DAG
//!
//! The in-memory version graph of one Item.
//!
//! The DAG stores identifiers only. Each edge `from -> to` records that
//! `to` directly succeeds `from`; `VersionId::EMPTY` is the implicit origin
//! of every history and is never stored as a node.
//!
//! All maps are `BTreeMap`, so every view iterates deterministically.
//! Leaves keep the order in which their incoming edges were first seen.

use crate::{EdgeId, ItemId, LineageError, VersionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// VERSION SUCCESSOR
// =============================================================================

/// A directed succession edge: `to_id` directly succeeds `from_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionSuccessor {
    pub id: EdgeId,
    pub from_id: VersionId,
    pub to_id: VersionId,
}

impl VersionSuccessor {
    /// Create a new successor edge value.
    #[must_use]
    pub const fn new(id: EdgeId, from_id: VersionId, to_id: VersionId) -> Self {
        Self { id, from_id, to_id }
    }
}

// =============================================================================
// VERSION HISTORY DAG
// =============================================================================

/// The full version history of one Item.
///
/// A value returned from storage is a snapshot: later writes by other
/// callers are not reflected until the DAG is retrieved again.
#[derive(Debug, Clone)]
pub struct VersionHistoryDag {
    item_id: ItemId,
    /// Edges in insertion order.
    edges: Vec<VersionSuccessor>,
    edge_ids: BTreeSet<EdgeId>,
    /// to_id -> from_ids, in edge order
    parents: BTreeMap<VersionId, Vec<VersionId>>,
    /// from_id -> to_ids, in edge order
    children: BTreeMap<VersionId, Vec<VersionId>>,
    leaves: Vec<VersionId>,
}

impl VersionHistoryDag {
    /// Create the empty history of a fresh Item.
    #[must_use]
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            edges: Vec::new(),
            edge_ids: BTreeSet::new(),
            parents: BTreeMap::new(),
            children: BTreeMap::new(),
            leaves: Vec::new(),
        }
    }

    /// Build a DAG from an edge set, typically one read back from storage.
    ///
    /// Edges may come in any order. The set is rejected if it contains a
    /// duplicate edge ID, an edge into EMPTY, a self-loop, an edge whose
    /// source is neither EMPTY nor the target of another edge, or a cycle.
    pub fn construct(
        item_id: ItemId,
        edges: impl IntoIterator<Item = VersionSuccessor>,
    ) -> Result<Self, LineageError> {
        let mut dag = Self::new(item_id);

        for edge in edges {
            dag.check_edge_shape(&edge)?;
            dag.link(edge);
        }

        // Every source must be EMPTY or a recorded version.
        for edge in &dag.edges {
            if !edge.from_id.is_empty_sentinel() && !dag.parents.contains_key(&edge.from_id) {
                return Err(LineageError::InvariantViolation(format!(
                    "edge {} starts at {}, which is not part of item {}",
                    edge.id, edge.from_id, item_id
                )));
            }
        }

        dag.check_acyclic()?;

        let mut leaves = Vec::new();
        for edge in &dag.edges {
            if !dag.children.contains_key(&edge.to_id) && !leaves.contains(&edge.to_id) {
                leaves.push(edge.to_id);
            }
        }
        dag.leaves = leaves;

        Ok(dag)
    }

    /// Insert one edge into the in-memory view and update the leaf set.
    ///
    /// `from_id` must be EMPTY or already recorded in this DAG.
    pub fn add_edge(
        &mut self,
        from_id: VersionId,
        to_id: VersionId,
        edge_id: EdgeId,
    ) -> Result<(), LineageError> {
        let edge = VersionSuccessor::new(edge_id, from_id, to_id);
        self.check_edge_shape(&edge)?;

        if !self.contains(from_id) && !from_id.is_empty_sentinel() {
            return Err(LineageError::InvariantViolation(format!(
                "version {} is not part of item {}",
                from_id, self.item_id
            )));
        }
        if self.parents.contains_key(&to_id) && self.reaches(to_id, from_id) {
            return Err(LineageError::InvariantViolation(format!(
                "edge {} -> {} would close a cycle",
                from_id, to_id
            )));
        }

        self.link(edge);

        self.leaves.retain(|leaf| *leaf != from_id);
        if !self.children.contains_key(&to_id) && !self.leaves.contains(&to_id) {
            self.leaves.push(to_id);
        }
        Ok(())
    }

    // =========================================================================
    // READ VIEWS
    // =========================================================================

    #[must_use]
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// All edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[VersionSuccessor] {
        &self.edges
    }

    /// All edge IDs in insertion order.
    #[must_use]
    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.iter().map(|e| e.id).collect()
    }

    /// Current heads: versions with no outgoing edge.
    ///
    /// Ordered by when each head first received an incoming edge.
    /// An empty history has no leaves.
    #[must_use]
    pub fn leaves(&self) -> &[VersionId] {
        &self.leaves
    }

    #[must_use]
    pub fn is_leaf(&self, version: VersionId) -> bool {
        self.leaves.contains(&version)
    }

    /// Check whether a version is part of this history.
    ///
    /// EMPTY is a member as soon as the history has any edge.
    #[must_use]
    pub fn contains(&self, version: VersionId) -> bool {
        if version.is_empty_sentinel() {
            !self.edges.is_empty()
        } else {
            self.parents.contains_key(&version)
        }
    }

    /// Direct parents of a version, in edge order.
    ///
    /// A direct child of EMPTY has no parents. A version that is not part of
    /// the history is `VersionNotFound`.
    pub fn parents_of(&self, version: VersionId) -> Result<Vec<VersionId>, LineageError> {
        if !self.contains(version) {
            return Err(LineageError::VersionNotFound(version));
        }
        Ok(self
            .parents
            .get(&version)
            .map(|froms| {
                froms
                    .iter()
                    .copied()
                    .filter(|v| !v.is_empty_sentinel())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// All transitive parents of a version, nearest first, EMPTY excluded.
    pub fn ancestors(&self, version: VersionId) -> Result<Vec<VersionId>, LineageError> {
        if !self.contains(version) {
            return Err(LineageError::VersionNotFound(version));
        }

        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        let mut ancestors = Vec::new();
        queue.push_back(version);

        while let Some(current) = queue.pop_front() {
            for &parent in self.parents.get(&current).into_iter().flatten() {
                if parent.is_empty_sentinel() || !visited.insert(parent) {
                    continue;
                }
                ancestors.push(parent);
                queue.push_back(parent);
            }
        }
        Ok(ancestors)
    }

    /// Number of edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn check_edge_shape(&self, edge: &VersionSuccessor) -> Result<(), LineageError> {
        if self.edge_ids.contains(&edge.id) {
            return Err(LineageError::InvariantViolation(format!(
                "duplicate edge id {} in item {}",
                edge.id, self.item_id
            )));
        }
        if edge.to_id.is_empty_sentinel() {
            return Err(LineageError::InvariantViolation(format!(
                "edge {} points into EMPTY",
                edge.id
            )));
        }
        if edge.from_id == edge.to_id {
            return Err(LineageError::InvariantViolation(format!(
                "edge {} is a self-loop on {}",
                edge.id, edge.to_id
            )));
        }
        Ok(())
    }

    fn link(&mut self, edge: VersionSuccessor) {
        self.edge_ids.insert(edge.id);
        self.parents.entry(edge.to_id).or_default().push(edge.from_id);
        self.children.entry(edge.from_id).or_default().push(edge.to_id);
        self.edges.push(edge);
    }

    /// Whether `target` is reachable from `start` along edges.
    fn reaches(&self, start: VersionId, target: VersionId) -> bool {
        let mut visited = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.children.get(&current).into_iter().flatten().copied());
        }
        false
    }

    /// Kahn's algorithm over every endpoint.
    fn check_acyclic(&self) -> Result<(), LineageError> {
        let mut in_degree: BTreeMap<VersionId, usize> = BTreeMap::new();
        for edge in &self.edges {
            in_degree.entry(edge.from_id).or_insert(0);
            *in_degree.entry(edge.to_id).or_insert(0) += 1;
        }

        let mut ready: VecDeque<VersionId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(v, _)| *v)
            .collect();
        let mut visited = 0usize;

        while let Some(current) = ready.pop_front() {
            visited += 1;
            for child in self.children.get(&current).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(child) {
                    *d = d.saturating_sub(1);
                    if *d == 0 {
                        ready.push_back(*child);
                    }
                }
            }
        }

        if visited < in_degree.len() {
            return Err(LineageError::InvariantViolation(format!(
                "cycle detected in history of item {}",
                self.item_id
            )));
        }
        Ok(())
    }
}

impl PartialEq for VersionHistoryDag {
    /// Same item, same edge set regardless of order, same leaves in order.
    fn eq(&self, other: &Self) -> bool {
        let mine: BTreeSet<&VersionSuccessor> = self.edges.iter().collect();
        let theirs: BTreeSet<&VersionSuccessor> = other.edges.iter().collect();
        self.item_id == other.item_id && mine == theirs && self.leaves == other.leaves
    }
}

impl Eq for VersionHistoryDag {}

// =============================================================================
// TESTS
// =============================================================================
