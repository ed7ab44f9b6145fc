//! # Version Entities
//!
//! Items, bare versions and the typed version payloads attached to
//! DAG nodes:
//!
//! - `NodeVersion`: one version of a provenance-graph node.
//! - `EdgeVersion`: one version of an edge between two node versions.
//! - `StructureVersion`: one version of an attribute schema.
//!
//! A typed version row, its `version` row and the succession edges that
//! place it in its Item's history are written in one scoped transaction.
//! A rejected parent therefore leaves no orphan version behind.

use crate::ids::IdGenerator;
use crate::primitives::{MAX_ATTRIBUTE_KEY_LENGTH, MAX_STRUCTURE_ATTRIBUTES};
use crate::storage::{
    Predicate, Row, StorageAdapter, StorageTransaction, Table, read_only, with_transaction,
};
use crate::update::update_in;
use crate::{GroundType, Item, ItemId, ItemKind, LineageError, VersionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// TYPES
// =============================================================================

/// A version of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVersion {
    pub id: VersionId,
    pub node_id: ItemId,
}

/// A version of an edge, pinned to one version of each endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeVersion {
    pub id: VersionId,
    pub edge_id: ItemId,
    pub from_node_version_id: VersionId,
    pub to_node_version_id: VersionId,
}

/// A version of a structure: attribute name -> declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureVersion {
    pub id: VersionId,
    pub structure_id: ItemId,
    pub attributes: BTreeMap<String, GroundType>,
}

// =============================================================================
// ITEMS & BARE VERSIONS
// =============================================================================

/// Register a new Item with an empty history.
pub fn create_item<S: StorageAdapter>(
    storage: &S,
    ids: &IdGenerator,
    kind: ItemKind,
) -> Result<Item, LineageError> {
    let item = Item::new(ids.generate_item_id()?, kind);
    with_transaction(storage, |txn| {
        txn.insert(
            Table::Item,
            Row::new().with("id", item.id).with("kind", kind.as_str()),
        )
    })?;
    tracing::info!(item = %item.id, kind = %kind, "item created");
    Ok(item)
}

/// Look up an Item inside an open transaction.
pub fn find_item<T: StorageTransaction>(txn: &T, item_id: ItemId) -> Result<Item, LineageError> {
    let rows = match txn.equality_select(Table::Item, &[Predicate::eq("id", item_id)]) {
        Ok(rows) => rows,
        Err(LineageError::EmptyResult(_)) => return Err(LineageError::ItemNotFound(item_id)),
        Err(e) => return Err(e),
    };
    let row = rows.first().ok_or(LineageError::ItemNotFound(item_id))?;
    Ok(Item::new(item_id, row.text("kind")?.parse()?))
}

/// Register an opaque Version with no payload.
pub fn register_version<S: StorageAdapter>(
    storage: &S,
    ids: &IdGenerator,
) -> Result<VersionId, LineageError> {
    let id = ids.generate_version_id()?;
    with_transaction(storage, |txn| insert_version(txn, id))?;
    tracing::info!(version = %id, "version registered");
    Ok(id)
}

fn insert_version<T: StorageTransaction>(txn: &mut T, id: VersionId) -> Result<(), LineageError> {
    txn.insert(Table::Version, Row::new().with("id", id))
}

fn find_item_of_kind<T: StorageTransaction>(
    txn: &T,
    item_id: ItemId,
    kind: ItemKind,
) -> Result<Item, LineageError> {
    let item = find_item(txn, item_id)?;
    if item.kind != kind {
        tracing::debug!(
            item = %item_id,
            expected = %kind,
            found = %item.kind,
            "item kind mismatch"
        );
        return Err(LineageError::ItemNotFound(item_id));
    }
    Ok(item)
}

fn select_one<T: StorageTransaction>(
    txn: &T,
    table: Table,
    id: VersionId,
) -> Result<Row, LineageError> {
    let rows = match txn.equality_select(table, &[Predicate::eq("id", id)]) {
        Ok(rows) => rows,
        Err(LineageError::EmptyResult(_)) => return Err(LineageError::VersionNotFound(id)),
        Err(e) => return Err(e),
    };
    rows.into_iter()
        .next()
        .ok_or(LineageError::VersionNotFound(id))
}

// =============================================================================
// NODE VERSIONS
// =============================================================================

/// Create a node version and append it to the node's history.
pub fn create_node_version<S: StorageAdapter>(
    storage: &S,
    ids: &IdGenerator,
    node_id: ItemId,
    parents: &[VersionId],
) -> Result<NodeVersion, LineageError> {
    let version = with_transaction(storage, |txn| {
        find_item_of_kind(txn, node_id, ItemKind::Node)?;
        let version = NodeVersion {
            id: ids.generate_version_id()?,
            node_id,
        };
        insert_version(txn, version.id)?;
        txn.insert(
            Table::NodeVersion,
            Row::new()
                .with("id", version.id)
                .with("node_id", node_id),
        )?;
        update_in(txn, ids, node_id, version.id, parents)?;
        Ok(version)
    })?;
    tracing::info!(version = %version.id, node = %node_id, "node version created");
    Ok(version)
}

pub fn retrieve_node_version<S: StorageAdapter>(
    storage: &S,
    id: VersionId,
) -> Result<NodeVersion, LineageError> {
    read_only(storage, |txn| node_version_in(txn, id))
}

fn node_version_in<T: StorageTransaction>(
    txn: &T,
    id: VersionId,
) -> Result<NodeVersion, LineageError> {
    let row = select_one(txn, Table::NodeVersion, id)?;
    Ok(NodeVersion {
        id,
        node_id: ItemId(row.id("node_id")?),
    })
}

// =============================================================================
// EDGE VERSIONS
// =============================================================================

/// Create an edge version between two existing node versions.
pub fn create_edge_version<S: StorageAdapter>(
    storage: &S,
    ids: &IdGenerator,
    edge_id: ItemId,
    from_node_version_id: VersionId,
    to_node_version_id: VersionId,
    parents: &[VersionId],
) -> Result<EdgeVersion, LineageError> {
    let version = with_transaction(storage, |txn| {
        find_item_of_kind(txn, edge_id, ItemKind::Edge)?;
        node_version_in(txn, from_node_version_id)?;
        node_version_in(txn, to_node_version_id)?;

        let version = EdgeVersion {
            id: ids.generate_version_id()?,
            edge_id,
            from_node_version_id,
            to_node_version_id,
        };
        insert_version(txn, version.id)?;
        txn.insert(
            Table::EdgeVersion,
            Row::new()
                .with("id", version.id)
                .with("edge_id", edge_id)
                .with("from_node_version_id", from_node_version_id)
                .with("to_node_version_id", to_node_version_id),
        )?;
        update_in(txn, ids, edge_id, version.id, parents)?;
        Ok(version)
    })?;
    tracing::info!(version = %version.id, edge = %edge_id, "edge version created");
    Ok(version)
}

pub fn retrieve_edge_version<S: StorageAdapter>(
    storage: &S,
    id: VersionId,
) -> Result<EdgeVersion, LineageError> {
    read_only(storage, |txn| {
        let row = select_one(txn, Table::EdgeVersion, id)?;
        Ok(EdgeVersion {
            id,
            edge_id: ItemId(row.id("edge_id")?),
            from_node_version_id: VersionId(row.id("from_node_version_id")?),
            to_node_version_id: VersionId(row.id("to_node_version_id")?),
        })
    })
}

// =============================================================================
// STRUCTURE VERSIONS
// =============================================================================

/// Create a structure version with its attribute schema.
///
/// An empty schema is valid.
pub fn create_structure_version<S: StorageAdapter>(
    storage: &S,
    ids: &IdGenerator,
    structure_id: ItemId,
    attributes: BTreeMap<String, GroundType>,
    parents: &[VersionId],
) -> Result<StructureVersion, LineageError> {
    check_attributes(&attributes)?;

    let version = with_transaction(storage, |txn| {
        find_item_of_kind(txn, structure_id, ItemKind::Structure)?;
        let id = ids.generate_version_id()?;
        insert_version(txn, id)?;
        txn.insert(
            Table::StructureVersion,
            Row::new()
                .with("id", id)
                .with("structure_id", structure_id),
        )?;
        for (key, ground_type) in &attributes {
            txn.insert(
                Table::StructureVersionAttribute,
                Row::new()
                    .with("structure_version_id", id)
                    .with("key", key.as_str())
                    .with("type", ground_type.as_str()),
            )?;
        }
        update_in(txn, ids, structure_id, id, parents)?;
        Ok(StructureVersion {
            id,
            structure_id,
            attributes,
        })
    })?;
    tracing::info!(
        version = %version.id,
        structure = %structure_id,
        attributes = version.attributes.len(),
        "structure version created"
    );
    Ok(version)
}

pub fn retrieve_structure_version<S: StorageAdapter>(
    storage: &S,
    id: VersionId,
) -> Result<StructureVersion, LineageError> {
    read_only(storage, |txn| {
        let row = select_one(txn, Table::StructureVersion, id)?;
        let rows = match txn.equality_select(
            Table::StructureVersionAttribute,
            &[Predicate::eq("structure_version_id", id)],
        ) {
            Ok(rows) => rows,
            Err(LineageError::EmptyResult(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut attributes = BTreeMap::new();
        for attribute in &rows {
            attributes.insert(
                attribute.text("key")?.to_string(),
                attribute.text("type")?.parse()?,
            );
        }
        Ok(StructureVersion {
            id,
            structure_id: ItemId(row.id("structure_id")?),
            attributes,
        })
    })
}

fn check_attributes(attributes: &BTreeMap<String, GroundType>) -> Result<(), LineageError> {
    if attributes.len() > MAX_STRUCTURE_ATTRIBUTES {
        return Err(LineageError::InvariantViolation(format!(
            "{} attributes exceed the limit of {}",
            attributes.len(),
            MAX_STRUCTURE_ATTRIBUTES
        )));
    }
    for key in attributes.keys() {
        if key.is_empty() || key.len() > MAX_ATTRIBUTE_KEY_LENGTH {
            return Err(LineageError::InvariantViolation(format!(
                "attribute key must be 1..={} bytes, got {}",
                MAX_ATTRIBUTE_KEY_LENGTH,
                key.len()
            )));
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::retrieve_dag;
    use crate::storage::{MemoryStore, SqliteStore};

    #[test]
    fn item_round_trip() {
        let store = MemoryStore::new();
        let ids = IdGenerator::single();
        let item = create_item(&store, &ids, ItemKind::Structure).expect("item");
        let txn = store.begin().expect("begin");
        assert_eq!(find_item(&txn, item.id).expect("find"), item);
        assert!(matches!(
            find_item(&txn, ItemId(77_777)),
            Err(LineageError::ItemNotFound(_))
        ));
    }

    #[test]
    fn node_versions_extend_history() {
        let store = SqliteStore::in_memory().expect("open");
        let ids = IdGenerator::single();
        let node = create_item(&store, &ids, ItemKind::Node).expect("node");

        let v1 = create_node_version(&store, &ids, node.id, &[]).expect("v1");
        let v2 = create_node_version(&store, &ids, node.id, &[v1.id]).expect("v2");

        assert_eq!(retrieve_node_version(&store, v2.id).expect("retrieve"), v2);
        let dag = retrieve_dag(&store, node.id).expect("dag");
        assert_eq!(dag.leaves(), &[v2.id]);
        assert_eq!(dag.parents_of(v2.id).expect("parents"), vec![v1.id]);
    }

    #[test]
    fn rejected_parent_leaves_no_orphan_version() {
        let store = MemoryStore::new();
        let ids = IdGenerator::single();
        let node = create_item(&store, &ids, ItemKind::Node).expect("node");

        let result = create_node_version(&store, &ids, node.id, &[VersionId(9_999)]);
        assert!(matches!(result, Err(LineageError::InvalidParent { .. })));

        let txn = store.begin().expect("begin");
        assert!(matches!(
            txn.equality_select(Table::NodeVersion, &[]),
            Err(LineageError::EmptyResult(_))
        ));
        assert!(matches!(
            txn.equality_select(Table::Version, &[]),
            Err(LineageError::EmptyResult(_))
        ));
    }

    #[test]
    fn kind_mismatch_is_item_not_found() {
        let store = MemoryStore::new();
        let ids = IdGenerator::single();
        let edge = create_item(&store, &ids, ItemKind::Edge).expect("edge");
        assert!(matches!(
            create_node_version(&store, &ids, edge.id, &[]),
            Err(LineageError::ItemNotFound(_))
        ));
    }

    #[test]
    fn edge_version_requires_endpoint_node_versions() {
        let store = MemoryStore::new();
        let ids = IdGenerator::single();
        let node = create_item(&store, &ids, ItemKind::Node).expect("node");
        let edge = create_item(&store, &ids, ItemKind::Edge).expect("edge");
        let a = create_node_version(&store, &ids, node.id, &[]).expect("a");

        assert!(matches!(
            create_edge_version(&store, &ids, edge.id, a.id, VersionId(5_555), &[]),
            Err(LineageError::VersionNotFound(VersionId(5_555)))
        ));

        let b = create_node_version(&store, &ids, node.id, &[a.id]).expect("b");
        let ev = create_edge_version(&store, &ids, edge.id, a.id, b.id, &[]).expect("edge version");
        assert_eq!(retrieve_edge_version(&store, ev.id).expect("retrieve"), ev);
    }

    #[test]
    fn structure_version_keeps_attributes() {
        let store = SqliteStore::in_memory().expect("open");
        let ids = IdGenerator::single();
        let structure = create_item(&store, &ids, ItemKind::Structure).expect("structure");

        let mut attributes = BTreeMap::new();
        attributes.insert("name".to_string(), GroundType::String);
        attributes.insert("age".to_string(), GroundType::Integer);
        let sv = create_structure_version(&store, &ids, structure.id, attributes, &[])
            .expect("create");
        assert_eq!(retrieve_structure_version(&store, sv.id).expect("retrieve"), sv);

        let empty = create_structure_version(&store, &ids, structure.id, BTreeMap::new(), &[sv.id])
            .expect("empty schema");
        assert!(
            retrieve_structure_version(&store, empty.id)
                .expect("retrieve")
                .attributes
                .is_empty()
        );
    }

    #[test]
    fn invalid_attribute_key_rejected() {
        let store = MemoryStore::new();
        let ids = IdGenerator::single();
        let structure = create_item(&store, &ids, ItemKind::Structure).expect("structure");
        let mut attributes = BTreeMap::new();
        attributes.insert(String::new(), GroundType::Boolean);
        assert!(matches!(
            create_structure_version(&store, &ids, structure.id, attributes, &[]),
            Err(LineageError::InvariantViolation(_))
        ));
    }

    #[test]
    fn missing_versions_are_not_found() {
        let store = MemoryStore::new();
        assert!(retrieve_node_version(&store, VersionId(1)).is_err_and(|e| e.is_not_found()));
        assert!(retrieve_edge_version(&store, VersionId(1)).is_err_and(|e| e.is_not_found()));
        assert!(retrieve_structure_version(&store, VersionId(1)).is_err_and(|e| e.is_not_found()));
    }
}
