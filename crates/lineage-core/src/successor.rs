//! # Version Successor Store
//!
//! Persists individual succession edges. Each edge is one
//! `version_successor` row plus one `item_version_successor` row that ties
//! it to the Item whose history it belongs to.

use crate::dag::VersionSuccessor;
use crate::ids::IdGenerator;
use crate::storage::{Predicate, Row, StorageTransaction, Table};
use crate::{EdgeId, ItemId, LineageError, VersionId};

/// Allocate a fresh edge ID and persist `from -> to` for `item_id`.
///
/// Repeated calls with the same pair create distinct edges.
pub fn create<T: StorageTransaction>(
    txn: &mut T,
    ids: &IdGenerator,
    item_id: ItemId,
    from_id: VersionId,
    to_id: VersionId,
) -> Result<VersionSuccessor, LineageError> {
    let successor = VersionSuccessor::new(ids.generate_successor_id()?, from_id, to_id);

    txn.insert(
        Table::VersionSuccessor,
        Row::new()
            .with("id", successor.id)
            .with("from_id", successor.from_id)
            .with("to_id", successor.to_id),
    )?;
    txn.insert(
        Table::ItemVersionSuccessor,
        Row::new()
            .with("item_id", item_id)
            .with("successor_id", successor.id),
    )?;

    tracing::debug!(
        item = %item_id,
        edge = %successor.id,
        from = %from_id,
        to = %to_id,
        "successor created"
    );
    Ok(successor)
}

/// Resolve a persisted edge ID back to its edge.
pub fn retrieve<T: StorageTransaction>(
    txn: &T,
    edge_id: EdgeId,
) -> Result<VersionSuccessor, LineageError> {
    let rows = match txn.equality_select(Table::VersionSuccessor, &[Predicate::eq("id", edge_id)]) {
        Ok(rows) => rows,
        Err(LineageError::EmptyResult(_)) => return Err(LineageError::SuccessorNotFound(edge_id)),
        Err(e) => return Err(e),
    };
    let row = rows
        .first()
        .ok_or(LineageError::SuccessorNotFound(edge_id))?;
    from_row(row)
}

pub(crate) fn from_row(row: &Row) -> Result<VersionSuccessor, LineageError> {
    Ok(VersionSuccessor::new(
        EdgeId(row.id("id")?),
        VersionId(row.id("from_id")?),
        VersionId(row.id("to_id")?),
    ))
}
