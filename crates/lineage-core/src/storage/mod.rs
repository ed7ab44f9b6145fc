//! # Storage Adapters
//!
//! The contract every physical backend implements, and the logical schema
//! they all share.
//!
//! A backend exposes three primitives inside a scoped transaction:
//! key-based `insert`, `equality_select`, and `commit`/`abort`. Graph-native
//! backends additionally answer `descendant_edges_by_label`.
//!
//! ## Backends
//!
//! - `MemoryStore`: graph-native, in-process (nodes + labelled relationships)
//! - `RedbStore`: wide-column, rows partitioned by their first column
//! - `SqliteStore`: relational, one SQL table per logical table

pub mod memory;
pub mod redb_store;
pub mod sqlite;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use sqlite::SqliteStore;

use crate::{EdgeId, ItemId, LineageError, VersionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// BACKEND SELECTION
// =============================================================================

/// Which physical backend a catalog runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Redb,
    Sqlite,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Redb => "redb",
            Self::Sqlite => "sqlite",
        })
    }
}

impl FromStr for BackendKind {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "redb" => Ok(Self::Redb),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(LineageError::ConfigError(format!(
                "Unknown storage backend: {} (expected memory, redb or sqlite)",
                other
            ))),
        }
    }
}

// =============================================================================
// LOGICAL SCHEMA
// =============================================================================

/// Physical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Unsigned 64-bit identifier.
    Id,
    /// UTF-8 string.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn id(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Id,
    }
}

const fn text(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Text,
    }
}

const ITEM_COLUMNS: &[Column] = &[id("id"), text("kind")];
const VERSION_COLUMNS: &[Column] = &[id("id")];
const VERSION_SUCCESSOR_COLUMNS: &[Column] = &[id("id"), id("from_id"), id("to_id")];
const ITEM_VERSION_SUCCESSOR_COLUMNS: &[Column] = &[id("item_id"), id("successor_id")];
const NODE_VERSION_COLUMNS: &[Column] = &[id("id"), id("node_id")];
const EDGE_VERSION_COLUMNS: &[Column] = &[
    id("id"),
    id("edge_id"),
    id("from_node_version_id"),
    id("to_node_version_id"),
];
const STRUCTURE_VERSION_COLUMNS: &[Column] = &[id("id"), id("structure_id")];
const STRUCTURE_VERSION_ATTRIBUTE_COLUMNS: &[Column] =
    &[id("structure_version_id"), text("key"), text("type")];

/// A logical table (or node/relationship label on graph backends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Item,
    Version,
    VersionSuccessor,
    ItemVersionSuccessor,
    NodeVersion,
    EdgeVersion,
    StructureVersion,
    StructureVersionAttribute,
}

impl Table {
    pub const ALL: [Self; 8] = [
        Self::Item,
        Self::Version,
        Self::VersionSuccessor,
        Self::ItemVersionSuccessor,
        Self::NodeVersion,
        Self::EdgeVersion,
        Self::StructureVersion,
        Self::StructureVersionAttribute,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Version => "version",
            Self::VersionSuccessor => "version_successor",
            Self::ItemVersionSuccessor => "item_version_successor",
            Self::NodeVersion => "node_version",
            Self::EdgeVersion => "edge_version",
            Self::StructureVersion => "structure_version",
            Self::StructureVersionAttribute => "structure_version_attribute",
        }
    }

    /// Declared columns. The first column is the partition key.
    #[must_use]
    pub const fn columns(self) -> &'static [Column] {
        match self {
            Self::Item => ITEM_COLUMNS,
            Self::Version => VERSION_COLUMNS,
            Self::VersionSuccessor => VERSION_SUCCESSOR_COLUMNS,
            Self::ItemVersionSuccessor => ITEM_VERSION_SUCCESSOR_COLUMNS,
            Self::NodeVersion => NODE_VERSION_COLUMNS,
            Self::EdgeVersion => EDGE_VERSION_COLUMNS,
            Self::StructureVersion => STRUCTURE_VERSION_COLUMNS,
            Self::StructureVersionAttribute => STRUCTURE_VERSION_ATTRIBUTE_COLUMNS,
        }
    }

    /// Columns whose combined values identify a row.
    #[must_use]
    pub const fn primary_key(self) -> &'static [&'static str] {
        match self {
            Self::ItemVersionSuccessor => &["item_id", "successor_id"],
            Self::StructureVersionAttribute => &["structure_version_id", "key"],
            _ => &["id"],
        }
    }

    /// Name of the partition (first) column.
    #[must_use]
    pub fn partition_column(self) -> &'static str {
        self.columns().first().map_or("id", |c| c.name)
    }

    /// Check that a row carries exactly the declared columns with the right kinds.
    pub fn validate(self, row: &Row) -> Result<(), LineageError> {
        for column in self.columns() {
            match (column.kind, row.get(column.name)) {
                (ColumnKind::Id, Some(Datum::Id(_)))
                | (ColumnKind::Text, Some(Datum::Text(_))) => {}
                (_, Some(_)) => {
                    return Err(LineageError::StorageFailure(format!(
                        "column {}.{} has the wrong type",
                        self.name(),
                        column.name
                    )));
                }
                (_, None) => {
                    return Err(LineageError::StorageFailure(format!(
                        "missing column {}.{}",
                        self.name(),
                        column.name
                    )));
                }
            }
        }
        if row.len() != self.columns().len() {
            return Err(LineageError::StorageFailure(format!(
                "row has columns not declared by {}",
                self.name()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// ROWS & PREDICATES
// =============================================================================

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Datum {
    Id(u64),
    Text(String),
}

impl From<u64> for Datum {
    fn from(v: u64) -> Self {
        Self::Id(v)
    }
}

impl From<ItemId> for Datum {
    fn from(v: ItemId) -> Self {
        Self::Id(v.0)
    }
}

impl From<VersionId> for Datum {
    fn from(v: VersionId) -> Self {
        Self::Id(v.0)
    }
}

impl From<EdgeId> for Datum {
    fn from(v: EdgeId) -> Self {
        Self::Id(v.0)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A stored row: column name -> value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row(BTreeMap<String, Datum>);

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column assignment.
    #[must_use]
    pub fn with(mut self, column: &str, value: impl Into<Datum>) -> Self {
        self.0.insert(column.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Datum> {
        self.0.get(column)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read an id column.
    pub fn id(&self, column: &str) -> Result<u64, LineageError> {
        match self.0.get(column) {
            Some(Datum::Id(v)) => Ok(*v),
            _ => Err(LineageError::SerializationError(format!(
                "expected id column {}",
                column
            ))),
        }
    }

    /// Read a text column.
    pub fn text(&self, column: &str) -> Result<&str, LineageError> {
        match self.0.get(column) {
            Some(Datum::Text(v)) => Ok(v),
            _ => Err(LineageError::SerializationError(format!(
                "expected text column {}",
                column
            ))),
        }
    }

    /// Check every predicate against this row.
    #[must_use]
    pub fn matches(&self, predicates: &[Predicate]) -> bool {
        predicates
            .iter()
            .all(|p| self.0.get(p.column) == Some(&p.value))
    }

    /// Check whether two rows agree on all the given columns.
    #[must_use]
    pub fn same_key(&self, other: &Self, columns: &[&str]) -> bool {
        columns.iter().all(|c| self.0.get(*c) == other.0.get(*c))
    }
}

/// `column = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub column: &'static str,
    pub value: Datum,
}

impl Predicate {
    #[must_use]
    pub fn eq(column: &'static str, value: impl Into<Datum>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }
}

// =============================================================================
// ADAPTER CONTRACT
// =============================================================================

/// One physical storage backend.
///
/// The transaction returned by `begin` is owned by a single logical
/// operation and is never shared. Dropping it without `commit` aborts it.
pub trait StorageAdapter {
    type Transaction<'a>: StorageTransaction
    where
        Self: 'a;

    /// Open a scoped transaction.
    fn begin(&self) -> Result<Self::Transaction<'_>, LineageError>;

    /// Which backend this is.
    fn backend(&self) -> BackendKind;

    /// Largest identifier persisted in any item, version or successor row.
    ///
    /// Returns 0 for an empty store.
    fn high_water_mark(&self) -> Result<u64, LineageError> {
        let txn = self.begin()?;
        let mut max = 0;
        for table in [Table::Item, Table::Version, Table::VersionSuccessor] {
            let rows = match txn.equality_select(table, &[]) {
                Ok(rows) => rows,
                Err(LineageError::EmptyResult(_)) => continue,
                Err(e) => return Err(e),
            };
            for row in rows {
                max = max.max(row.id("id")?);
            }
        }
        txn.abort()?;
        Ok(max)
    }
}

/// Primitives available inside one transaction.
pub trait StorageTransaction {
    /// Insert a row. Rows must match the table's declared columns, and a
    /// duplicate primary key is a `StorageFailure`.
    fn insert(&mut self, table: Table, row: Row) -> Result<(), LineageError>;

    /// Select rows whose columns equal every predicate, in ascending key
    /// order. Allocator-issued keys ascend, so this is also insertion order.
    ///
    /// Fails with `EmptyResult` when nothing matches. An empty predicate
    /// list selects every row.
    fn equality_select(
        &self,
        table: Table,
        predicates: &[Predicate],
    ) -> Result<Vec<Row>, LineageError>;

    /// Relationship scan for graph-native backends.
    ///
    /// Returns the item's `version_successor` rows carrying `label`, or
    /// `None` when the backend has no relationship index.
    fn descendant_edges_by_label(
        &self,
        _item_id: ItemId,
        _label: &str,
    ) -> Result<Option<Vec<Row>>, LineageError> {
        Ok(None)
    }

    fn commit(self) -> Result<(), LineageError>
    where
        Self: Sized;

    fn abort(self) -> Result<(), LineageError>
    where
        Self: Sized;
}

/// Run `op` inside a scoped transaction.
///
/// Commits when `op` succeeds. On failure the transaction is aborted before
/// the original error is returned.
pub fn with_transaction<'s, S, T, F>(storage: &'s S, op: F) -> Result<T, LineageError>
where
    S: StorageAdapter,
    F: FnOnce(&mut S::Transaction<'s>) -> Result<T, LineageError>,
{
    let mut txn = storage.begin()?;
    match op(&mut txn) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(abort_error) = txn.abort() {
                tracing::warn!(backend = %storage.backend(), error = %abort_error, "abort failed");
            }
            tracing::warn!(backend = %storage.backend(), error = %e, "transaction aborted");
            Err(e)
        }
    }
}

/// Run a read-only `op` inside a scoped transaction that is always aborted.
pub fn read_only<'s, S, T, F>(storage: &'s S, op: F) -> Result<T, LineageError>
where
    S: StorageAdapter,
    F: FnOnce(&S::Transaction<'s>) -> Result<T, LineageError>,
{
    let txn = storage.begin()?;
    let value = op(&txn)?;
    txn.abort()?;
    Ok(value)
}

/// Map any backend error into a `StorageFailure`.
pub(crate) fn storage_failure(e: impl fmt::Display) -> LineageError {
    LineageError::StorageFailure(e.to_string())
}

// =============================================================================
// TESTS
// =============================================================================
