//! # Relational Storage on SQLite
//!
//! One SQL table per logical table, created on open. Identifier columns are
//! `INTEGER`, text columns `TEXT`. Selects return rows in rowid order; for
//! tables keyed by a single `id` the rowid is that id. A transaction is `BEGIN IMMEDIATE` on a
//! connection held under a mutex, so writers are serialized.

use super::{
    BackendKind, ColumnKind, Datum, Predicate, Row, StorageAdapter, StorageTransaction, Table,
    storage_failure,
};
use crate::LineageError;
use rusqlite::Connection;
use rusqlite::types::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Relational store over a single SQLite connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LineageError> {
        let conn = Connection::open(path.as_ref()).map_err(storage_failure)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(storage_failure)?;
        Self::with_schema(conn)
    }

    /// Create a private in-memory database (for testing).
    pub fn in_memory() -> Result<Self, LineageError> {
        let conn = Connection::open_in_memory().map_err(storage_failure)?;
        Self::with_schema(conn)
    }

    fn with_schema(conn: Connection) -> Result<Self, LineageError> {
        conn.execute_batch(&schema_sql()).map_err(storage_failure)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// DDL for every logical table plus the lookup indexes.
fn schema_sql() -> String {
    let mut sql = String::new();
    for table in Table::ALL {
        let columns: Vec<String> = table
            .columns()
            .iter()
            .map(|c| {
                let kind = match c.kind {
                    ColumnKind::Id => "INTEGER",
                    ColumnKind::Text => "TEXT",
                };
                format!("\"{}\" {} NOT NULL", c.name, kind)
            })
            .collect();
        let key: Vec<String> = table
            .primary_key()
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect();
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({}, PRIMARY KEY ({}));\n",
            table.name(),
            columns.join(", "),
            key.join(", ")
        ));
    }
    sql.push_str(
        "CREATE INDEX IF NOT EXISTS idx_ivs_item ON \"item_version_successor\"(\"item_id\");\n\
         CREATE INDEX IF NOT EXISTS idx_sva_version ON \"structure_version_attribute\"(\"structure_version_id\");\n",
    );
    sql
}

fn to_sql(datum: &Datum) -> Result<Value, LineageError> {
    match datum {
        Datum::Id(v) => i64::try_from(*v)
            .map(Value::Integer)
            .map_err(|_| LineageError::StorageFailure(format!("id {} exceeds INTEGER range", v))),
        Datum::Text(s) => Ok(Value::Text(s.clone())),
    }
}

fn from_sql(table: Table, values: Vec<Value>) -> Result<Row, LineageError> {
    let mut row = Row::new();
    for (column, value) in table.columns().iter().zip(values) {
        row = match (column.kind, value) {
            (ColumnKind::Id, Value::Integer(i)) => {
                let id = u64::try_from(i).map_err(|_| {
                    LineageError::SerializationError(format!(
                        "negative id in {}.{}",
                        table, column.name
                    ))
                })?;
                row.with(column.name, id)
            }
            (ColumnKind::Text, Value::Text(s)) => row.with(column.name, s),
            _ => {
                return Err(LineageError::SerializationError(format!(
                    "unexpected value in {}.{}",
                    table, column.name
                )));
            }
        };
    }
    Ok(row)
}

impl StorageAdapter for SqliteStore {
    type Transaction<'a> = SqliteTransaction<'a>;

    fn begin(&self) -> Result<SqliteTransaction<'_>, LineageError> {
        let conn = self.conn.lock().map_err(storage_failure)?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(storage_failure)?;
        Ok(SqliteTransaction {
            conn,
            finished: false,
        })
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }
}

/// An open `BEGIN IMMEDIATE` transaction. Rolled back on drop unless committed.
pub struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl StorageTransaction for SqliteTransaction<'_> {
    fn insert(&mut self, table: Table, row: Row) -> Result<(), LineageError> {
        table.validate(&row)?;

        let mut names = Vec::new();
        let mut values = Vec::new();
        for column in table.columns() {
            let datum = row.get(column.name).ok_or_else(|| {
                LineageError::StorageFailure(format!("missing column {}.{}", table, column.name))
            })?;
            names.push(format!("\"{}\"", column.name));
            values.push(to_sql(datum)?);
        }
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            table.name(),
            names.join(", "),
            placeholders.join(", ")
        );

        self.conn
            .execute(&sql, rusqlite::params_from_iter(values.iter()))
            .map_err(storage_failure)?;
        Ok(())
    }

    fn equality_select(
        &self,
        table: Table,
        predicates: &[Predicate],
    ) -> Result<Vec<Row>, LineageError> {
        let mut conditions = Vec::new();
        let mut values = Vec::new();
        for predicate in predicates {
            let declared = table
                .columns()
                .iter()
                .find(|c| c.name == predicate.column);
            let comparable = matches!(
                (declared.map(|c| c.kind), &predicate.value),
                (Some(ColumnKind::Id), Datum::Id(_)) | (Some(ColumnKind::Text), Datum::Text(_))
            );
            if !comparable {
                // Unknown column or mismatched type never equals anything.
                return Err(LineageError::EmptyResult(table.name()));
            }
            values.push(to_sql(&predicate.value)?);
            conditions.push(format!("\"{}\" = ?{}", predicate.column, values.len()));
        }

        let where_clause = if conditions.is_empty() {
            "1=1".to_string()
        } else {
            conditions.join(" AND ")
        };
        let names: Vec<String> = table
            .columns()
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .collect();
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE {} ORDER BY rowid",
            names.join(", "),
            table.name(),
            where_clause
        );

        let width = table.columns().len();
        let mut stmt = self.conn.prepare(&sql).map_err(storage_failure)?;
        let raw = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |r| {
                (0..width)
                    .map(|i| r.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })
            .map_err(storage_failure)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_failure)?;

        if raw.is_empty() {
            return Err(LineageError::EmptyResult(table.name()));
        }
        raw.into_iter().map(|values| from_sql(table, values)).collect()
    }

    // A failed COMMIT can leave the transaction open; `finished` stays unset
    // so that Drop rolls it back.
    fn commit(mut self) -> Result<(), LineageError> {
        self.conn.execute_batch("COMMIT").map_err(storage_failure)?;
        self.finished = true;
        Ok(())
    }

    fn abort(mut self) -> Result<(), LineageError> {
        self.conn.execute_batch("ROLLBACK").map_err(storage_failure)?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "rollback on drop failed");
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn successor(id: u64, from: u64, to: u64) -> Row {
        Row::new()
            .with("id", id)
            .with("from_id", from)
            .with("to_id", to)
    }

    #[test]
    fn schema_declares_every_table() {
        let sql = schema_sql();
        for table in Table::ALL {
            assert!(sql.contains(&format!("\"{}\" (", table.name())));
        }
    }

    #[test]
    fn insert_and_select_in_key_order() {
        let store = SqliteStore::in_memory().expect("open");
        let mut txn = store.begin().expect("begin");
        for (id, from, to) in [(3u64, 0u64, 1u64), (5, 1, 2), (9, 0, 4)] {
            txn.insert(Table::VersionSuccessor, successor(id, from, to))
                .expect("insert");
        }
        let rows = txn
            .equality_select(Table::VersionSuccessor, &[Predicate::eq("from_id", 0u64)])
            .expect("select");
        assert_eq!(rows, vec![successor(3, 0, 1), successor(9, 0, 4)]);
        txn.commit().expect("commit");
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let store = SqliteStore::in_memory().expect("open");
        {
            let mut txn = store.begin().expect("begin");
            txn.insert(Table::Version, Row::new().with("id", 7u64))
                .expect("insert");
        }
        let txn = store.begin().expect("begin");
        assert!(matches!(
            txn.equality_select(Table::Version, &[]),
            Err(LineageError::EmptyResult("version"))
        ));
    }

    #[test]
    fn failed_commit_rolls_back_and_frees_connection() {
        let store = SqliteStore::in_memory().expect("open");
        store
            .conn
            .lock()
            .expect("lock")
            .execute_batch(
                "PRAGMA foreign_keys=ON;
                 CREATE TABLE owner (id INTEGER PRIMARY KEY);
                 CREATE TABLE owned (
                     owner_id INTEGER REFERENCES owner(id) DEFERRABLE INITIALLY DEFERRED
                 );",
            )
            .expect("schema");

        let mut txn = store.begin().expect("begin");
        txn.insert(Table::Version, Row::new().with("id", 1u64))
            .expect("insert");
        txn.conn
            .execute("INSERT INTO owned (owner_id) VALUES (42)", [])
            .expect("deferred violation");
        assert!(matches!(
            txn.commit(),
            Err(LineageError::StorageFailure(_))
        ));

        let txn = store.begin().expect("begin after failed commit");
        assert!(matches!(
            txn.equality_select(Table::Version, &[]),
            Err(LineageError::EmptyResult("version"))
        ));
        let owned: i64 = txn
            .conn
            .query_row("SELECT COUNT(*) FROM owned", [], |r| r.get(0))
            .expect("count");
        assert_eq!(owned, 0);
    }

    #[test]
    fn duplicate_primary_key_is_storage_failure() {
        let store = SqliteStore::in_memory().expect("open");
        let mut txn = store.begin().expect("begin");
        let attr = Row::new()
            .with("structure_version_id", 1u64)
            .with("key", "name")
            .with("type", "string");
        txn.insert(Table::StructureVersionAttribute, attr.clone())
            .expect("insert");
        assert!(matches!(
            txn.insert(Table::StructureVersionAttribute, attr),
            Err(LineageError::StorageFailure(_))
        ));
    }

    #[test]
    fn mismatched_predicate_selects_nothing() {
        let store = SqliteStore::in_memory().expect("open");
        let mut txn = store.begin().expect("begin");
        txn.insert(Table::Item, Row::new().with("id", 1u64).with("kind", "node"))
            .expect("insert");
        assert!(
            txn.equality_select(Table::Item, &[Predicate::eq("kind", 1u64)])
                .is_err()
        );
        assert!(
            txn.equality_select(Table::Item, &[Predicate::eq("nope", "node")])
                .is_err()
        );
        assert_eq!(
            txn.equality_select(Table::Item, &[Predicate::eq("kind", "node")])
                .expect("select")
                .len(),
            1
        );
    }

    #[test]
    fn file_database_survives_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.sqlite");
        {
            let store = SqliteStore::open(&db_path).expect("open");
            let mut txn = store.begin().expect("begin");
            txn.insert(Table::Version, Row::new().with("id", 9u64))
                .expect("insert");
            txn.commit().expect("commit");
        }
        let store = SqliteStore::open(&db_path).expect("reopen");
        assert_eq!(store.high_water_mark().expect("hwm"), 9);
    }
}
