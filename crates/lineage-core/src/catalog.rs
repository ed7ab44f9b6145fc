//! # Catalog
//!
//! The entry point of the lineage catalog: one storage backend plus the
//! process-wide ID allocator.
//!
//! ## Storage Backends
//!
//! A catalog runs on exactly one backend, chosen at startup:
//! - `Memory`: graph-native, volatile
//! - `Redb`: wide-column, disk-backed
//! - `Sqlite`: relational, disk-backed
//!
//! Every operation opens its own scoped transaction. A `Catalog` is
//! `Send + Sync` and is meant to be shared by concurrent callers.

use crate::dag::{VersionHistoryDag, VersionSuccessor};
use crate::ids::IdGenerator;
use crate::storage::{
    BackendKind, MemoryStore, RedbStore, SqliteStore, StorageAdapter, read_only,
};
use crate::versions::{EdgeVersion, NodeVersion, StructureVersion};
use crate::{
    EdgeId, GroundType, Item, ItemId, ItemKind, LineageError, VersionId, history, successor,
    update, versions,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Storage backend of a Catalog.
#[derive(Debug)]
pub enum StorageBackend {
    /// Graph-native, in-process.
    Memory(MemoryStore),
    /// Wide-column on redb.
    Redb(RedbStore),
    /// Relational on SQLite.
    Sqlite(SqliteStore),
}

impl StorageBackend {
    /// Open the backend of the given kind. `path` is ignored for `Memory`.
    pub fn open(kind: BackendKind, path: impl AsRef<Path>) -> Result<Self, LineageError> {
        Ok(match kind {
            BackendKind::Memory => Self::Memory(MemoryStore::new()),
            BackendKind::Redb => Self::Redb(RedbStore::open(path)?),
            BackendKind::Sqlite => Self::Sqlite(SqliteStore::open(path)?),
        })
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Memory(s) => s.backend(),
            Self::Redb(s) => s.backend(),
            Self::Sqlite(s) => s.backend(),
        }
    }
}

/// Run the same generic call against whichever store is active.
macro_rules! on_store {
    ($backend:expr, $store:ident => $body:expr) => {
        match $backend {
            StorageBackend::Memory($store) => $body,
            StorageBackend::Redb($store) => $body,
            StorageBackend::Sqlite($store) => $body,
        }
    };
}

/// A lineage catalog.
///
/// # Example
/// ```
/// use lineage_core::{Catalog, ItemKind};
///
/// let catalog = Catalog::in_memory();
/// let item = catalog.create_item(ItemKind::Node).expect("item");
/// let v1 = catalog.register_version().expect("version");
/// let dag = catalog.item(item.id).expect("handle").update(v1, &[]).expect("update");
/// assert_eq!(dag.leaves(), &[v1]);
/// ```
#[derive(Debug)]
pub struct Catalog {
    storage: StorageBackend,
    ids: IdGenerator,
}

impl Catalog {
    /// Open a catalog on the given backend.
    ///
    /// The allocator resumes above every ID already persisted, so reopening a
    /// durable store never reissues an ID.
    pub fn open(
        kind: BackendKind,
        path: impl AsRef<Path>,
        machine_id: u64,
        machine_count: u64,
    ) -> Result<Self, LineageError> {
        let ids = IdGenerator::new(machine_id, machine_count, true)?;
        let storage = StorageBackend::open(kind, path)?;
        let high_water_mark = on_store!(&storage, s => s.high_water_mark())?;
        ids.resume_after(high_water_mark);
        tracing::info!(backend = %kind, high_water_mark, machine_id, "catalog opened");
        Ok(Self { storage, ids })
    }

    /// A volatile catalog on the graph-native backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            storage: StorageBackend::Memory(MemoryStore::new()),
            ids: IdGenerator::single(),
        }
    }

    /// Which backend this catalog runs on.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.storage.kind()
    }

    // =========================================================================
    // ITEMS & VERSIONS
    // =========================================================================

    pub fn create_item(&self, kind: ItemKind) -> Result<Item, LineageError> {
        on_store!(&self.storage, s => versions::create_item(s, &self.ids, kind))
    }

    /// Handle on an existing Item.
    pub fn item(&self, item_id: ItemId) -> Result<ItemHandle<'_>, LineageError> {
        let item = on_store!(&self.storage, s => {
            read_only(s, |txn| versions::find_item(txn, item_id))
        })?;
        Ok(ItemHandle {
            catalog: self,
            item,
        })
    }

    /// Register an opaque version with no payload.
    pub fn register_version(&self) -> Result<VersionId, LineageError> {
        on_store!(&self.storage, s => versions::register_version(s, &self.ids))
    }

    /// Resolve a succession edge by ID.
    pub fn successor(&self, edge_id: EdgeId) -> Result<VersionSuccessor, LineageError> {
        on_store!(&self.storage, s => read_only(s, |txn| successor::retrieve(txn, edge_id)))
    }

    // =========================================================================
    // TYPED VERSIONS
    // =========================================================================

    pub fn create_node_version(
        &self,
        node_id: ItemId,
        parents: &[VersionId],
    ) -> Result<NodeVersion, LineageError> {
        on_store!(&self.storage, s => versions::create_node_version(s, &self.ids, node_id, parents))
    }

    pub fn retrieve_node_version(&self, id: VersionId) -> Result<NodeVersion, LineageError> {
        on_store!(&self.storage, s => versions::retrieve_node_version(s, id))
    }

    pub fn create_edge_version(
        &self,
        edge_id: ItemId,
        from_node_version_id: VersionId,
        to_node_version_id: VersionId,
        parents: &[VersionId],
    ) -> Result<EdgeVersion, LineageError> {
        on_store!(&self.storage, s => versions::create_edge_version(
            s,
            &self.ids,
            edge_id,
            from_node_version_id,
            to_node_version_id,
            parents,
        ))
    }

    pub fn retrieve_edge_version(&self, id: VersionId) -> Result<EdgeVersion, LineageError> {
        on_store!(&self.storage, s => versions::retrieve_edge_version(s, id))
    }

    pub fn create_structure_version(
        &self,
        structure_id: ItemId,
        attributes: BTreeMap<String, GroundType>,
        parents: &[VersionId],
    ) -> Result<StructureVersion, LineageError> {
        on_store!(&self.storage, s => versions::create_structure_version(
            s,
            &self.ids,
            structure_id,
            attributes,
            parents,
        ))
    }

    pub fn retrieve_structure_version(
        &self,
        id: VersionId,
    ) -> Result<StructureVersion, LineageError> {
        on_store!(&self.storage, s => versions::retrieve_structure_version(s, id))
    }
}

// =============================================================================
// ITEM HANDLE
// =============================================================================

/// An existing Item, bound to the catalog that stores it.
#[derive(Debug, Clone, Copy)]
pub struct ItemHandle<'a> {
    catalog: &'a Catalog,
    item: Item,
}

impl ItemHandle<'_> {
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.item.id
    }

    #[must_use]
    pub fn kind(&self) -> ItemKind {
        self.item.kind
    }

    /// Add `child` as a new head succeeding `parents` (EMPTY when none).
    pub fn update(
        &self,
        child: VersionId,
        parents: &[VersionId],
    ) -> Result<VersionHistoryDag, LineageError> {
        let catalog = self.catalog;
        on_store!(&catalog.storage, s => {
            update::update(s, &catalog.ids, self.item.id, child, parents)
        })
    }

    /// Snapshot of the full history.
    pub fn dag(&self) -> Result<VersionHistoryDag, LineageError> {
        on_store!(&self.catalog.storage, s => history::retrieve_dag(s, self.item.id))
    }
}

// =============================================================================
// TESTS
// =============================================================================
