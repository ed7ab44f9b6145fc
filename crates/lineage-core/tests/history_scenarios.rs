//! # History Scenarios
//!
//! End-to-end behaviour of the update engine and DAG retrieval, run
//! unchanged against every storage backend.
//!
//! Test tiers:
//! - T0: first versions and chains
//! - T1: merges and branching from history
//! - T2: rejected updates leave storage untouched
//! - T3: all-or-nothing under injected storage failures
//! - T4: concurrent callers updating one item

use lineage_core::history::retrieve_dag;
use lineage_core::storage::{
    BackendKind, Predicate, Row, StorageAdapter, StorageTransaction, Table,
};
use lineage_core::versions::{create_item, register_version};
use lineage_core::{
    IdGenerator, ItemId, ItemKind, LineageError, VersionHistoryDag, VersionId, update,
};
use std::sync::atomic::{AtomicBool, Ordering};

// =============================================================================
// SHARED SCENARIOS
// =============================================================================

struct Harness<S> {
    store: S,
    ids: IdGenerator,
    item: ItemId,
}

impl<S: StorageAdapter> Harness<S> {
    fn new(store: S) -> Self {
        let ids = IdGenerator::single();
        let item = create_item(&store, &ids, ItemKind::Node)
            .expect("item")
            .id;
        Self { store, ids, item }
    }

    fn version(&self) -> VersionId {
        register_version(&self.store, &self.ids).expect("version")
    }

    fn update(&self, child: VersionId, parents: &[VersionId]) -> Result<(), LineageError> {
        update(&self.store, &self.ids, self.item, child, parents).map(|_| ())
    }

    fn dag(&self) -> VersionHistoryDag {
        retrieve_dag(&self.store, self.item).expect("retrieve")
    }
}

fn first_version_from_empty<S: StorageAdapter>(store: S) {
    let h = Harness::new(store);
    let v1 = h.version();
    h.update(v1, &[]).expect("update");

    let dag = h.dag();
    assert_eq!(dag.len(), 1);
    assert_eq!(dag.edges()[0].from_id, VersionId::EMPTY);
    assert_eq!(dag.edges()[0].to_id, v1);
    assert_eq!(dag.leaves(), &[v1]);
    assert!(dag.parents_of(v1).expect("parents").is_empty());
}

fn chain_keeps_single_head<S: StorageAdapter>(store: S) {
    let h = Harness::new(store);
    let (v1, v2, v3) = (h.version(), h.version(), h.version());
    h.update(v1, &[]).expect("v1");
    h.update(v2, &[v1]).expect("v2");
    h.update(v3, &[v2]).expect("v3");

    let dag = h.dag();
    assert_eq!(dag.leaves(), &[v3]);
    assert_eq!(dag.parents_of(v3).expect("parents"), vec![v2]);
    assert_eq!(dag.ancestors(v3).expect("ancestors"), vec![v2, v1]);
}

fn merge_collapses_heads<S: StorageAdapter>(store: S) {
    let h = Harness::new(store);
    let (v1, v2, v3) = (h.version(), h.version(), h.version());

    h.update(v1, &[]).expect("v1");
    assert_eq!(h.dag().leaves(), &[v1]);

    h.update(v2, &[]).expect("v2");
    assert_eq!(h.dag().leaves(), &[v1, v2]);

    h.update(v3, &[v1, v2]).expect("merge");
    let dag = h.dag();
    assert_eq!(dag.leaves(), &[v3]);
    assert_eq!(dag.parents_of(v3).expect("parents"), vec![v1, v2]);
    assert_eq!(dag.len(), 4);
}

fn branch_from_non_leaf<S: StorageAdapter>(store: S) {
    let h = Harness::new(store);
    let (v1, v2, v3) = (h.version(), h.version(), h.version());
    h.update(v1, &[]).expect("v1");
    h.update(v2, &[v1]).expect("v2");

    // v1 is no longer a head, but remains a valid parent.
    h.update(v3, &[v1]).expect("branch");
    let dag = h.dag();
    assert_eq!(dag.leaves(), &[v2, v3]);
    assert_eq!(dag.parents_of(v3).expect("parents"), vec![v1]);
}

fn unknown_parent_changes_nothing<S: StorageAdapter>(store: S) {
    let h = Harness::new(store);
    let (v1, v2) = (h.version(), h.version());
    h.update(v1, &[]).expect("v1");
    let before = h.dag();

    let stranger = VersionId(987_654);
    let result = h.update(v2, &[v1, stranger]);
    assert!(matches!(
        result,
        Err(LineageError::InvalidParent { parent, .. }) if parent == stranger
    ));
    assert_eq!(h.dag(), before);
}

fn parent_from_other_item_rejected<S: StorageAdapter>(store: S) {
    let h = Harness::new(store);
    let other = create_item(&h.store, &h.ids, ItemKind::Node).expect("other").id;
    let (v1, v2) = (h.version(), h.version());
    update(&h.store, &h.ids, other, v1, &[]).expect("other history");

    assert!(matches!(
        h.update(v2, &[v1]),
        Err(LineageError::InvalidParent { .. })
    ));
    assert!(h.dag().is_empty());
}

fn reads_are_idempotent<S: StorageAdapter>(store: S) {
    let h = Harness::new(store);
    let (v1, v2, v3) = (h.version(), h.version(), h.version());
    h.update(v1, &[]).expect("v1");
    h.update(v2, &[]).expect("v2");
    h.update(v3, &[v2, v1]).expect("v3");

    let first = h.dag();
    let second = h.dag();
    assert_eq!(first, second);
    assert_eq!(first.edges(), second.edges());
}

/// Half the threads race to attach the same child under the same parent;
/// the other half read the current leaves and merge them under a fresh child.
fn same_item_updates_race_cleanly<S: StorageAdapter + Sync>(store: S) {
    const THREADS: usize = 8;

    let h = Harness::new(store);
    let root = h.version();
    h.update(root, &[]).expect("root");
    let shared_child = h.version();

    let results: Vec<(bool, Result<(), LineageError>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let h = &h;
                scope.spawn(move || {
                    if i % 2 == 0 {
                        (true, h.update(shared_child, &[root]))
                    } else {
                        let child = h.version();
                        let leaves = h.dag().leaves().to_vec();
                        (false, h.update(child, &leaves))
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect()
    });

    let racing: Vec<&Result<(), LineageError>> = results
        .iter()
        .filter(|(racer, _)| *racer)
        .map(|(_, result)| result)
        .collect();
    assert_eq!(racing.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        racing
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(LineageError::InvariantViolation(_))))
    );
    for (_, result) in results.iter().filter(|(racer, _)| !*racer) {
        assert!(result.is_ok(), "leaf merge failed: {:?}", result);
    }

    let dag = h.dag();
    let into_shared = dag
        .edges()
        .iter()
        .filter(|e| e.to_id == shared_child)
        .count();
    assert_eq!(into_shared, 1);
    assert_eq!(dag.parents_of(shared_child).expect("parents"), vec![root]);

    let rebuilt = VersionHistoryDag::construct(h.item, dag.edges().iter().copied())
        .expect("stored edges form a valid history");
    assert_eq!(rebuilt, dag);

    let mut leaves = dag.leaves().to_vec();
    leaves.sort_unstable();
    leaves.dedup();
    assert_eq!(leaves.len(), dag.leaves().len());
}

macro_rules! backend_scenarios {
    ($($module:ident => $store:expr;)*) => {
        $(
            mod $module {
                use super::*;

                #[test]
                fn t0_first_version_from_empty() {
                    let (_guard, store) = $store;
                    first_version_from_empty(store);
                }

                #[test]
                fn t0_chain_keeps_single_head() {
                    let (_guard, store) = $store;
                    chain_keeps_single_head(store);
                }

                #[test]
                fn t1_merge_collapses_heads() {
                    let (_guard, store) = $store;
                    merge_collapses_heads(store);
                }

                #[test]
                fn t1_branch_from_non_leaf() {
                    let (_guard, store) = $store;
                    branch_from_non_leaf(store);
                }

                #[test]
                fn t1_reads_are_idempotent() {
                    let (_guard, store) = $store;
                    reads_are_idempotent(store);
                }

                #[test]
                fn t2_unknown_parent_changes_nothing() {
                    let (_guard, store) = $store;
                    unknown_parent_changes_nothing(store);
                }

                #[test]
                fn t2_parent_from_other_item_rejected() {
                    let (_guard, store) = $store;
                    parent_from_other_item_rejected(store);
                }

                #[test]
                fn t3_failed_merge_is_all_or_nothing() {
                    let (_guard, store) = $store;
                    failed_merge_is_all_or_nothing(store);
                }

                #[test]
                fn t4_same_item_updates_race_cleanly() {
                    let (_guard, store) = $store;
                    same_item_updates_race_cleanly(store);
                }
            }
        )*
    };
}

fn memory() -> ((), lineage_core::MemoryStore) {
    ((), lineage_core::MemoryStore::new())
}

fn redb() -> (tempfile::TempDir, lineage_core::RedbStore) {
    let temp = tempfile::tempdir().expect("temp dir");
    let store = lineage_core::RedbStore::open(temp.path().join("test.redb")).expect("open redb");
    (temp, store)
}

fn sqlite() -> (tempfile::TempDir, lineage_core::SqliteStore) {
    let temp = tempfile::tempdir().expect("temp dir");
    let store =
        lineage_core::SqliteStore::open(temp.path().join("test.sqlite")).expect("open sqlite");
    (temp, store)
}

backend_scenarios! {
    memory_backend => memory();
    redb_backend => redb();
    sqlite_backend => sqlite();
}

// =============================================================================
// FAILURE INJECTION
// =============================================================================

/// Wraps a store so that, once armed, the N-th insert of every transaction fails.
struct FailingStore<S> {
    inner: S,
    fail_at: usize,
    armed: AtomicBool,
}

impl<S> FailingStore<S> {
    fn new(inner: S, fail_at: usize) -> Self {
        Self {
            inner,
            fail_at,
            armed: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

struct FailingTransaction<T> {
    inner: T,
    inserts: usize,
    fail_at: Option<usize>,
}

impl<S: StorageAdapter> StorageAdapter for FailingStore<S> {
    type Transaction<'a>
        = FailingTransaction<S::Transaction<'a>>
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Transaction<'_>, LineageError> {
        Ok(FailingTransaction {
            inner: self.inner.begin()?,
            inserts: 0,
            fail_at: self
                .armed
                .load(Ordering::SeqCst)
                .then_some(self.fail_at),
        })
    }

    fn backend(&self) -> BackendKind {
        self.inner.backend()
    }
}

impl<T: StorageTransaction> StorageTransaction for FailingTransaction<T> {
    fn insert(&mut self, table: Table, row: Row) -> Result<(), LineageError> {
        self.inserts += 1;
        if self.fail_at == Some(self.inserts) {
            return Err(LineageError::StorageFailure(format!(
                "injected failure on insert {} into {}",
                self.inserts, table
            )));
        }
        self.inner.insert(table, row)
    }

    fn equality_select(
        &self,
        table: Table,
        predicates: &[Predicate],
    ) -> Result<Vec<Row>, LineageError> {
        self.inner.equality_select(table, predicates)
    }

    fn descendant_edges_by_label(
        &self,
        item_id: ItemId,
        label: &str,
    ) -> Result<Option<Vec<Row>>, LineageError> {
        self.inner.descendant_edges_by_label(item_id, label)
    }

    fn commit(self) -> Result<(), LineageError> {
        self.inner.commit()
    }

    fn abort(self) -> Result<(), LineageError> {
        self.inner.abort()
    }
}

fn failed_merge_is_all_or_nothing<S: StorageAdapter>(store: S) {
    // A two-parent merge writes: edge 1, link 1, edge 2, link 2.
    // Failing the third insert kills the second edge after the first landed.
    let h = Harness::new(FailingStore::new(store, 3));
    let (p1, p2, child) = (h.version(), h.version(), h.version());
    h.update(p1, &[]).expect("p1");
    h.update(p2, &[]).expect("p2");
    let before = h.dag();

    h.store.arm();
    let result = h.update(child, &[p1, p2]);
    h.store.disarm();

    assert!(matches!(result, Err(LineageError::StorageFailure(_))));
    let after = h.dag();
    assert_eq!(after, before);
    assert_eq!(after.leaves(), &[p1, p2]);
    assert!(!after.contains(child));

    // The rejected write does not block a retry.
    h.update(child, &[p1, p2]).expect("retry");
    assert_eq!(h.dag().leaves(), &[child]);
}

#[test]
fn failure_on_link_row_rolls_back_edge_row() {
    let h = Harness::new(FailingStore::new(lineage_core::MemoryStore::new(), 2));
    let v1 = h.version();

    h.store.arm();
    assert!(h.update(v1, &[]).is_err());
    h.store.disarm();

    let txn = h.store.begin().expect("begin");
    assert!(matches!(
        txn.equality_select(Table::VersionSuccessor, &[]),
        Err(LineageError::EmptyResult(_))
    ));
}
