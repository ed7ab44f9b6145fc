//! # Core Type Definitions
//!
//! This module contains the core types of the lineage catalog:
//! - Identifiers (`ItemId`, `VersionId`, `EdgeId`)
//! - Item classification (`ItemKind`, `Item`)
//! - Structure attribute types (`GroundType`)
//! - Error types (`LineageError`)
//!
//! ## Ordering Guarantees
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! and iterate in a deterministic order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a tracked Item (a node, edge or structure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u64);

/// Identifier of an immutable Version.
///
/// `VersionId::EMPTY` is the sentinel root of every Item's history. It is
/// never stored and never issued by the ID allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionId(pub u64);

/// Identifier of a single version-succession edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl VersionId {
    /// The sentinel root shared by every Item's history.
    pub const EMPTY: Self = Self(0);

    /// Check whether this is the sentinel root.
    #[must_use]
    pub const fn is_empty_sentinel(self) -> bool {
        self.0 == Self::EMPTY.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty_sentinel() {
            f.write_str("EMPTY")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ITEMS
// =============================================================================

/// The kind of entity whose history an Item tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A node of the provenance graph.
    Node,
    /// An edge between two nodes of the provenance graph.
    Edge,
    /// A structure: a declared attribute schema.
    Structure,
}

impl ItemKind {
    /// Get the canonical lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Edge => "edge",
            Self::Structure => "structure",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(Self::Node),
            "edge" => Ok(Self::Edge),
            "structure" => Ok(Self::Structure),
            other => Err(LineageError::SerializationError(format!(
                "Unknown item kind: {}",
                other
            ))),
        }
    }
}

/// An Item: the owner of exactly one version history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
}

impl Item {
    /// Create a new item value.
    #[must_use]
    pub const fn new(id: ItemId, kind: ItemKind) -> Self {
        Self { id, kind }
    }
}

// =============================================================================
// STRUCTURE ATTRIBUTE TYPES
// =============================================================================

/// Declared type of a structure attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundType {
    String,
    Integer,
    Long,
    Boolean,
}

impl GroundType {
    /// Get the canonical lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for GroundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroundType {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "long" => Ok(Self::Long),
            "boolean" => Ok(Self::Boolean),
            other => Err(LineageError::SerializationError(format!(
                "Unknown attribute type: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the lineage catalog.
///
/// - No silent failures
/// - Use `Result<T, LineageError>` for fallible operations
/// - Storage failures inside a transaction always abort it before surfacing
#[derive(Debug, Error)]
pub enum LineageError {
    /// The requested item has no stored record.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// The requested version has no stored record, or is not part of a history.
    #[error("Version not found: {0}")]
    VersionNotFound(VersionId),

    /// The requested succession edge has no stored record.
    #[error("Version successor not found: {0}")]
    SuccessorNotFound(EdgeId),

    /// An update named a parent that is not part of the item's history.
    #[error("Invalid parent {parent} for item {item}")]
    InvalidParent { item: ItemId, parent: VersionId },

    /// An in-memory DAG operation would break a structural invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The storage backend failed (connectivity, constraint, timeout).
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// An equality select matched no rows in the named table.
    #[error("Empty result from table {0}")]
    EmptyResult(&'static str),

    /// The ID allocator has no identifiers left in its partition.
    #[error("ID space exhausted for machine {machine_id} of {machine_count}")]
    IdSpaceExhausted { machine_id: u64, machine_count: u64 },

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl LineageError {
    /// Check whether this error reports a missing record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ItemNotFound(_) | Self::VersionNotFound(_) | Self::SuccessorNotFound(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
