//! # lineage-core
//!
//! The Version History engine of the lineage catalog - THE LOGIC.
//!
//! Every tracked entity (a node, edge or structure of a provenance graph)
//! is an Item, and every Item owns one `VersionHistoryDag`: the directed
//! acyclic graph of its Versions connected by succession edges. The engine
//! extends that graph transactionally and rebuilds it from any of three
//! storage backends.
//!
//! ## Layers
//!
//! - `types`, `ids`: identifiers, error taxonomy, ID allocation
//! - `dag`: the in-memory history of one Item
//! - `storage`: the adapter contract plus graph-native, wide-column and
//!   relational backends
//! - `successor`, `history`, `update`: edge persistence, DAG retrieval and
//!   the update engine
//! - `versions`, `catalog`: typed version payloads and the facade
//!
//! ## Architectural Constraints
//!
//! - Synchronous; no async, no network
//! - Every write runs in one scoped transaction: all or nothing
//! - The EMPTY sentinel root is never stored

// =============================================================================
// MODULES
// =============================================================================

pub mod catalog;
pub mod dag;
pub mod history;
pub mod ids;
pub mod primitives;
pub mod storage;
pub mod successor;
pub mod types;
pub mod update;
pub mod versions;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{EdgeId, GroundType, Item, ItemId, ItemKind, LineageError, VersionId};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use catalog::{Catalog, ItemHandle, StorageBackend};
pub use dag::{VersionHistoryDag, VersionSuccessor};
pub use ids::IdGenerator;
pub use storage::{
    BackendKind, MemoryStore, RedbStore, SqliteStore, StorageAdapter, StorageTransaction,
    with_transaction,
};
pub use update::{update, update_in};
pub use versions::{EdgeVersion, NodeVersion, StructureVersion};
