//! # Graph-Native In-Memory Storage
//!
//! An in-process property graph. Item and version rows become labelled
//! nodes; `version_successor` rows become `VersionSuccessor` relationships
//! between version IDs, each owned by one item once its
//! `item_version_successor` link is inserted.
//!
//! Writers are serialized by one mutex. A transaction mutates a private copy
//! of the graph that replaces the shared state only on commit.

use super::{
    BackendKind, Predicate, Row, StorageAdapter, StorageTransaction, Table, storage_failure,
};
use crate::primitives::SUCCESSOR_LABEL;
use crate::{ItemId, LineageError};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// A labelled, directed relationship between two version nodes.
#[derive(Debug, Clone)]
struct Relationship {
    id: u64,
    label: &'static str,
    from: u64,
    to: u64,
    /// Item whose history this relationship belongs to.
    owner: Option<u64>,
}

impl Relationship {
    fn successor_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("from_id", self.from)
            .with("to_id", self.to)
    }
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    /// Node rows per label, in insertion order.
    nodes: BTreeMap<Table, Vec<Row>>,
    /// Relationships in insertion order.
    relationships: Vec<Relationship>,
}

impl GraphState {
    fn insert_node(&mut self, table: Table, row: Row) -> Result<(), LineageError> {
        let rows = self.nodes.entry(table).or_default();
        if rows.iter().any(|r| r.same_key(&row, table.primary_key())) {
            return Err(LineageError::StorageFailure(format!(
                "duplicate key in {}",
                table
            )));
        }
        rows.push(row);
        Ok(())
    }

    fn insert_relationship(&mut self, row: &Row) -> Result<(), LineageError> {
        let id = row.id("id")?;
        if self.relationships.iter().any(|r| r.id == id) {
            return Err(LineageError::StorageFailure(format!(
                "duplicate relationship {}",
                id
            )));
        }
        self.relationships.push(Relationship {
            id,
            label: SUCCESSOR_LABEL,
            from: row.id("from_id")?,
            to: row.id("to_id")?,
            owner: None,
        });
        Ok(())
    }

    fn attach_owner(&mut self, row: &Row) -> Result<(), LineageError> {
        let item_id = row.id("item_id")?;
        let successor_id = row.id("successor_id")?;
        let relationship = self
            .relationships
            .iter_mut()
            .find(|r| r.id == successor_id)
            .ok_or_else(|| {
                LineageError::StorageFailure(format!("no relationship {}", successor_id))
            })?;
        if relationship.owner.is_some() {
            return Err(LineageError::StorageFailure(format!(
                "relationship {} already belongs to an item",
                successor_id
            )));
        }
        relationship.owner = Some(item_id);
        Ok(())
    }

    fn rows(&self, table: Table) -> Vec<Row> {
        match table {
            Table::VersionSuccessor => self
                .relationships
                .iter()
                .filter(|r| r.label == SUCCESSOR_LABEL)
                .map(Relationship::successor_row)
                .collect(),
            Table::ItemVersionSuccessor => self
                .relationships
                .iter()
                .filter_map(|r| {
                    r.owner.map(|owner| {
                        Row::new()
                            .with("item_id", owner)
                            .with("successor_id", r.id)
                    })
                })
                .collect(),
            _ => self.nodes.get(&table).cloned().unwrap_or_default(),
        }
    }
}

/// Graph-native store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<GraphState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&self) -> Result<MemoryTransaction<'_>, LineageError> {
        let guard = self.state.lock().map_err(storage_failure)?;
        let working = guard.clone();
        Ok(MemoryTransaction { guard, working })
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }
}

/// Transaction over a private copy of the graph.
pub struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, GraphState>,
    working: GraphState,
}

impl StorageTransaction for MemoryTransaction<'_> {
    fn insert(&mut self, table: Table, row: Row) -> Result<(), LineageError> {
        table.validate(&row)?;
        match table {
            Table::VersionSuccessor => self.working.insert_relationship(&row),
            Table::ItemVersionSuccessor => self.working.attach_owner(&row),
            _ => self.working.insert_node(table, row),
        }
    }

    fn equality_select(
        &self,
        table: Table,
        predicates: &[Predicate],
    ) -> Result<Vec<Row>, LineageError> {
        let rows: Vec<Row> = self
            .working
            .rows(table)
            .into_iter()
            .filter(|row| row.matches(predicates))
            .collect();
        if rows.is_empty() {
            return Err(LineageError::EmptyResult(table.name()));
        }
        Ok(rows)
    }

    fn descendant_edges_by_label(
        &self,
        item_id: ItemId,
        label: &str,
    ) -> Result<Option<Vec<Row>>, LineageError> {
        Ok(Some(
            self.working
                .relationships
                .iter()
                .filter(|r| r.owner == Some(item_id.0) && r.label == label)
                .map(Relationship::successor_row)
                .collect(),
        ))
    }

    fn commit(mut self) -> Result<(), LineageError> {
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }

    fn abort(self) -> Result<(), LineageError> {
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
