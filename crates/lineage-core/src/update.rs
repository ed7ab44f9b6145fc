//! # Item Update Engine
//!
//! Extends an Item's history with a new child version.
//!
//! Zero parents makes the child a direct successor of EMPTY. One parent
//! extends a chain; several parents merge heads into the child. Parents may
//! be any recorded version of the Item, not only current leaves, so a caller
//! can branch from an earlier point in history.
//!
//! Every check runs before the first write. The edge rows and the DAG
//! snapshot are produced inside one scoped transaction: a failure anywhere
//! aborts it and no partial edge set is ever committed.

use crate::dag::VersionHistoryDag;
use crate::ids::IdGenerator;
use crate::primitives::MAX_PARENTS_PER_UPDATE;
use crate::storage::{Predicate, StorageAdapter, StorageTransaction, Table, with_transaction};
use crate::{ItemId, LineageError, VersionId, history, successor, versions};

/// Add `child` as a successor of `parents` in its own scoped transaction.
///
/// Returns the updated history snapshot.
pub fn update<S: StorageAdapter>(
    storage: &S,
    ids: &IdGenerator,
    item_id: ItemId,
    child: VersionId,
    parents: &[VersionId],
) -> Result<VersionHistoryDag, LineageError> {
    with_transaction(storage, |txn| update_in(txn, ids, item_id, child, parents))
}

/// Add `child` as a successor of `parents` inside an open transaction.
///
/// The caller commits or aborts.
pub fn update_in<T: StorageTransaction>(
    txn: &mut T,
    ids: &IdGenerator,
    item_id: ItemId,
    child: VersionId,
    parents: &[VersionId],
) -> Result<VersionHistoryDag, LineageError> {
    versions::find_item(txn, item_id)?;

    if child.is_empty_sentinel() {
        return Err(LineageError::InvariantViolation(
            "EMPTY cannot be added as a version".to_string(),
        ));
    }
    if parents.len() > MAX_PARENTS_PER_UPDATE {
        return Err(LineageError::InvariantViolation(format!(
            "{} parents exceed the limit of {}",
            parents.len(),
            MAX_PARENTS_PER_UPDATE
        )));
    }
    ensure_version(txn, child)?;

    let mut dag = history::retrieve(txn, item_id)?;
    if dag.contains(child) {
        return Err(LineageError::InvariantViolation(format!(
            "version {} is already part of item {}",
            child, item_id
        )));
    }
    for &parent in parents {
        if parent.is_empty_sentinel() || !dag.contains(parent) {
            return Err(LineageError::InvalidParent {
                item: item_id,
                parent,
            });
        }
    }

    let sources: &[VersionId] = if parents.is_empty() {
        &[VersionId::EMPTY]
    } else {
        parents
    };
    for &from_id in sources {
        let edge = successor::create(txn, ids, item_id, from_id, child)?;
        dag.add_edge(edge.from_id, edge.to_id, edge.id)?;
    }

    tracing::info!(
        item = %item_id,
        child = %child,
        parents = parents.len(),
        leaves = dag.leaves().len(),
        "item updated"
    );
    Ok(dag)
}

fn ensure_version<T: StorageTransaction>(txn: &T, version: VersionId) -> Result<(), LineageError> {
    match txn.equality_select(Table::Version, &[Predicate::eq("id", version)]) {
        Ok(_) => Ok(()),
        Err(LineageError::EmptyResult(_)) => Err(LineageError::VersionNotFound(version)),
        Err(e) => Err(e),
    }
}

// =============================================================================
// TESTS
// =============================================================================
