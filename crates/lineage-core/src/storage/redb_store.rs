//! # Wide-Column Storage on redb
//!
//! Each logical table is a redb table keyed by `(partition, clustering)`:
//!
//! - the partition key is the row's first column;
//! - the clustering key is the second id column for link tables, `0` for
//!   tables keyed by their own `id`, or a per-partition ordinal otherwise.
//!
//! Values are postcard-encoded rows. An equality predicate on the partition
//! column becomes a range scan over that partition; every other predicate
//! filters the scanned rows.
//!
//! redb provides the ACID guarantees: every transaction is a write
//! transaction, and dropping one without commit discards it.

use super::{
    BackendKind, Datum, Predicate, Row, StorageAdapter, StorageTransaction, Table,
    storage_failure,
};
use crate::LineageError;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use std::path::Path;

type WideTable = TableDefinition<'static, (u64, u64), &'static [u8]>;

const ITEM: WideTable = TableDefinition::new("item");
const VERSION: WideTable = TableDefinition::new("version");
const VERSION_SUCCESSOR: WideTable = TableDefinition::new("version_successor");
const ITEM_VERSION_SUCCESSOR: WideTable = TableDefinition::new("item_version_successor");
const NODE_VERSION: WideTable = TableDefinition::new("node_version");
const EDGE_VERSION: WideTable = TableDefinition::new("edge_version");
const STRUCTURE_VERSION: WideTable = TableDefinition::new("structure_version");
const STRUCTURE_VERSION_ATTRIBUTE: WideTable =
    TableDefinition::new("structure_version_attribute");

fn definition(table: Table) -> WideTable {
    match table {
        Table::Item => ITEM,
        Table::Version => VERSION,
        Table::VersionSuccessor => VERSION_SUCCESSOR,
        Table::ItemVersionSuccessor => ITEM_VERSION_SUCCESSOR,
        Table::NodeVersion => NODE_VERSION,
        Table::EdgeVersion => EDGE_VERSION,
        Table::StructureVersion => STRUCTURE_VERSION,
        Table::StructureVersionAttribute => STRUCTURE_VERSION_ATTRIBUTE,
    }
}

/// How the clustering half of a key is derived.
enum Clustering {
    /// The partition column alone is unique.
    None,
    /// A second id column completes the key.
    Column(&'static str),
    /// Next free slot within the partition.
    Ordinal,
}

fn clustering(table: Table) -> Clustering {
    match table {
        Table::ItemVersionSuccessor => Clustering::Column("successor_id"),
        Table::StructureVersionAttribute => Clustering::Ordinal,
        _ => Clustering::None,
    }
}

/// A wide-column store backed by a redb database file.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LineageError> {
        let db = Database::create(path.as_ref()).map_err(storage_failure)?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(storage_failure)?;
        for table in Table::ALL {
            let _ = write_txn
                .open_table(definition(table))
                .map_err(storage_failure)?;
        }
        write_txn.commit().map_err(storage_failure)?;

        Ok(Self { db })
    }
}

impl StorageAdapter for RedbStore {
    type Transaction<'a> = RedbTransaction;

    fn begin(&self) -> Result<RedbTransaction, LineageError> {
        let txn = self.db.begin_write().map_err(storage_failure)?;
        Ok(RedbTransaction { txn })
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Redb
    }
}

/// A redb write transaction.
pub struct RedbTransaction {
    txn: WriteTransaction,
}

impl RedbTransaction {
    fn scan(
        &self,
        table: Table,
        partition: Option<u64>,
    ) -> Result<Vec<((u64, u64), Row)>, LineageError> {
        let handle = self
            .txn
            .open_table(definition(table))
            .map_err(storage_failure)?;
        let range = match partition {
            Some(p) => handle.range((p, 0u64)..=(p, u64::MAX)),
            None => handle.iter(),
        }
        .map_err(storage_failure)?;

        let mut rows = Vec::new();
        for entry in range {
            let (key, value) = entry.map_err(storage_failure)?;
            let row: Row = postcard::from_bytes(value.value())
                .map_err(|e| LineageError::SerializationError(e.to_string()))?;
            rows.push((key.value(), row));
        }
        Ok(rows)
    }
}

impl StorageTransaction for RedbTransaction {
    fn insert(&mut self, table: Table, row: Row) -> Result<(), LineageError> {
        table.validate(&row)?;
        let partition = row.id(table.partition_column())?;

        let key = match clustering(table) {
            Clustering::None => (partition, 0),
            Clustering::Column(column) => (partition, row.id(column)?),
            Clustering::Ordinal => {
                let existing = self.scan(table, Some(partition))?;
                if existing
                    .iter()
                    .any(|(_, r)| r.same_key(&row, table.primary_key()))
                {
                    return Err(LineageError::StorageFailure(format!(
                        "duplicate key in {}",
                        table
                    )));
                }
                let next = existing
                    .last()
                    .map_or(0, |((_, slot), _)| slot.saturating_add(1));
                (partition, next)
            }
        };

        let bytes = postcard::to_allocvec(&row)
            .map_err(|e| LineageError::SerializationError(e.to_string()))?;

        let mut handle = self
            .txn
            .open_table(definition(table))
            .map_err(storage_failure)?;
        if handle.get(key).map_err(storage_failure)?.is_some() {
            return Err(LineageError::StorageFailure(format!(
                "duplicate key in {}",
                table
            )));
        }
        handle
            .insert(key, bytes.as_slice())
            .map_err(storage_failure)?;
        Ok(())
    }

    fn equality_select(
        &self,
        table: Table,
        predicates: &[Predicate],
    ) -> Result<Vec<Row>, LineageError> {
        let partition_column = table.partition_column();
        let partition = predicates.iter().find_map(|p| match p.value {
            Datum::Id(v) if p.column == partition_column => Some(v),
            _ => None,
        });

        let rows: Vec<Row> = self
            .scan(table, partition)?
            .into_iter()
            .map(|(_, row)| row)
            .filter(|row| row.matches(predicates))
            .collect();
        if rows.is_empty() {
            return Err(LineageError::EmptyResult(table.name()));
        }
        Ok(rows)
    }

    fn commit(self) -> Result<(), LineageError> {
        self.txn.commit().map_err(storage_failure)
    }

    fn abort(self) -> Result<(), LineageError> {
        self.txn.abort().map_err(storage_failure)
    }
}

// =============================================================================
// TESTS
// =============================================================================
