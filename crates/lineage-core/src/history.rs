//! # DAG Retrieval
//!
//! Rebuilds an Item's `VersionHistoryDag` from persisted edges.
//!
//! Graph-native backends answer with a relationship scan; the others go
//! through the `item_version_successor` link rows and resolve each edge by
//! ID. No edges at all is an empty history, not an error.

use crate::dag::{VersionHistoryDag, VersionSuccessor};
use crate::primitives::SUCCESSOR_LABEL;
use crate::storage::{Predicate, StorageAdapter, StorageTransaction, Table, read_only};
use crate::{EdgeId, ItemId, LineageError, successor};

/// Retrieve the full history of `item_id` within an open transaction.
pub fn retrieve<T: StorageTransaction>(
    txn: &T,
    item_id: ItemId,
) -> Result<VersionHistoryDag, LineageError> {
    let edges = match txn.descendant_edges_by_label(item_id, SUCCESSOR_LABEL)? {
        Some(rows) => rows
            .iter()
            .map(successor::from_row)
            .collect::<Result<Vec<VersionSuccessor>, _>>()?,
        None => linked_edges(txn, item_id)?,
    };

    tracing::debug!(item = %item_id, edges = edges.len(), "history retrieved");
    VersionHistoryDag::construct(item_id, edges)
}

/// Retrieve the history of `item_id` in its own scoped transaction.
pub fn retrieve_dag<S: StorageAdapter>(
    storage: &S,
    item_id: ItemId,
) -> Result<VersionHistoryDag, LineageError> {
    read_only(storage, |txn| retrieve(txn, item_id))
}

fn linked_edges<T: StorageTransaction>(
    txn: &T,
    item_id: ItemId,
) -> Result<Vec<VersionSuccessor>, LineageError> {
    let links = match txn.equality_select(
        Table::ItemVersionSuccessor,
        &[Predicate::eq("item_id", item_id)],
    ) {
        Ok(rows) => rows,
        Err(LineageError::EmptyResult(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    links
        .iter()
        .map(|link| successor::retrieve(txn, EdgeId(link.id("successor_id")?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VersionId;
    use crate::ids::IdGenerator;
    use crate::storage::{MemoryStore, RedbStore, SqliteStore};

    fn write_chain<S: StorageAdapter>(storage: &S) -> Vec<VersionSuccessor> {
        let ids = IdGenerator::single();
        let mut txn = storage.begin().expect("begin");
        let a = successor::create(&mut txn, &ids, ItemId(1), VersionId::EMPTY, VersionId(10))
            .expect("a");
        let b = successor::create(&mut txn, &ids, ItemId(1), VersionId(10), VersionId(11))
            .expect("b");
        successor::create(&mut txn, &ids, ItemId(2), VersionId::EMPTY, VersionId(20))
            .expect("other item");
        txn.commit().expect("commit");
        vec![a, b]
    }

    #[test]
    fn empty_history_is_not_an_error() {
        let store = MemoryStore::new();
        let dag = retrieve_dag(&store, ItemId(9)).expect("retrieve");
        assert!(dag.is_empty());
        assert!(dag.leaves().is_empty());
    }

    #[test]
    fn relationship_scan_and_link_rows_agree() {
        let memory = MemoryStore::new();
        let sqlite = SqliteStore::in_memory().expect("sqlite");
        let temp = tempfile::tempdir().expect("temp dir");
        let redb = RedbStore::open(temp.path().join("test.redb")).expect("redb");

        let expected = write_chain(&memory);
        write_chain(&sqlite);
        write_chain(&redb);

        let from_memory = retrieve_dag(&memory, ItemId(1)).expect("memory");
        let from_sqlite = retrieve_dag(&sqlite, ItemId(1)).expect("sqlite");
        let from_redb = retrieve_dag(&redb, ItemId(1)).expect("redb");

        assert_eq!(from_memory.edges(), expected.as_slice());
        assert_eq!(from_memory, from_sqlite);
        assert_eq!(from_memory, from_redb);
        assert_eq!(from_memory.leaves(), &[VersionId(11)]);
    }

    #[test]
    fn repeated_reads_are_equal() {
        let store = SqliteStore::in_memory().expect("sqlite");
        write_chain(&store);
        let first = retrieve_dag(&store, ItemId(1)).expect("first");
        let second = retrieve_dag(&store, ItemId(1)).expect("second");
        assert_eq!(first, second);
    }
}
