//! # ID Allocator
//!
//! Process-wide issuer of item, version and succession-edge identifiers.
//!
//! Every issued ID has the form `counter * machine_count + machine_id`.
//! Counters start at 1, so `0` (the EMPTY sentinel) is never issued, and two
//! generators with distinct `machine_id`s never collide.

use crate::{EdgeId, ItemId, LineageError, VersionId};
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe, partitioned ID generator.
///
/// With `globally_unique` set, items, versions and edges draw from one
/// counter and no two IDs of any kind are equal. Otherwise each kind has its
/// own counter.
#[derive(Debug)]
pub struct IdGenerator {
    machine_id: u64,
    machine_count: u64,
    globally_unique: bool,
    item_counter: AtomicU64,
    version_counter: AtomicU64,
    successor_counter: AtomicU64,
}

impl IdGenerator {
    /// Create a generator for one machine out of `machine_count`.
    pub fn new(
        machine_id: u64,
        machine_count: u64,
        globally_unique: bool,
    ) -> Result<Self, LineageError> {
        if machine_count == 0 {
            return Err(LineageError::ConfigError(
                "machine_count must be at least 1".to_string(),
            ));
        }
        if machine_id >= machine_count {
            return Err(LineageError::ConfigError(format!(
                "machine_id {} out of range for {} machines",
                machine_id, machine_count
            )));
        }
        Ok(Self {
            machine_id,
            machine_count,
            globally_unique,
            item_counter: AtomicU64::new(1),
            version_counter: AtomicU64::new(1),
            successor_counter: AtomicU64::new(1),
        })
    }

    /// Single-machine generator with one shared counter.
    #[must_use]
    pub fn single() -> Self {
        Self {
            machine_id: 0,
            machine_count: 1,
            globally_unique: true,
            item_counter: AtomicU64::new(1),
            version_counter: AtomicU64::new(1),
            successor_counter: AtomicU64::new(1),
        }
    }

    /// Restart every counter so that all future IDs exceed `high_water_mark`.
    ///
    /// Counters only move forward; resuming below the current position is a no-op.
    pub fn resume_after(&self, high_water_mark: u64) {
        let next = (high_water_mark / self.machine_count).saturating_add(1);
        for counter in [
            &self.item_counter,
            &self.version_counter,
            &self.successor_counter,
        ] {
            counter.fetch_max(next, Ordering::SeqCst);
        }
    }

    pub fn generate_item_id(&self) -> Result<ItemId, LineageError> {
        self.issue(&self.item_counter).map(ItemId)
    }

    pub fn generate_version_id(&self) -> Result<VersionId, LineageError> {
        self.issue(&self.version_counter).map(VersionId)
    }

    pub fn generate_successor_id(&self) -> Result<EdgeId, LineageError> {
        self.issue(&self.successor_counter).map(EdgeId)
    }

    /// Next ID from `own` (or the shared counter). Counters never wrap.
    fn issue(&self, own: &AtomicU64) -> Result<u64, LineageError> {
        let counter = if self.globally_unique {
            &self.version_counter
        } else {
            own
        };
        let exhausted = || LineageError::IdSpaceExhausted {
            machine_id: self.machine_id,
            machine_count: self.machine_count,
        };
        let n = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| exhausted())?;
        n.checked_mul(self.machine_count)
            .and_then(|id| id.checked_add(self.machine_id))
            .ok_or_else(exhausted)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::single()
    }
}

// =============================================================================
// TESTS
// =============================================================================
