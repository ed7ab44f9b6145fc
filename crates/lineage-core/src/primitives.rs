//! # Catalog Primitives
//!
//! Hardcoded constants shared by the engine and every storage backend.
//!
//! These are compiled into the binary and are immutable at runtime.

/// Relationship label under which graph-native backends store succession edges.
pub const SUCCESSOR_LABEL: &str = "VersionSuccessor";

/// Maximum number of parents a single update may declare.
///
/// A merge of more heads than this is rejected before the transaction
/// touches storage.
pub const MAX_PARENTS_PER_UPDATE: usize = 1024;

/// Maximum number of attributes on one structure version.
pub const MAX_STRUCTURE_ATTRIBUTES: usize = 4096;

/// Maximum length of a structure attribute key.
pub const MAX_ATTRIBUTE_KEY_LENGTH: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_label_matches_relationship_name() {
        assert_eq!(SUCCESSOR_LABEL, "VersionSuccessor");
    }
}
