//! Migration ledger properties exercised against an in-memory store.
//!
//! The ledger talks to storage through the `MigrationStore` seam, so these
//! tests substitute a fake that can simulate a failing script and inspect the
//! recorded versions afterwards.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orderdesk::error::{MigrationError, QueryError};
use orderdesk::migrate::{Ledger, MigrationFile, MigrationStore};

#[derive(Default, Clone)]
struct MemStore {
    inner: Arc<Mutex<MemState>>,
}

#[derive(Default)]
struct MemState {
    ledger_ready: bool,
    applied: BTreeMap<i64, String>,
    apply_order: Vec<i64>,
    // Version whose script is made to fail, simulating a bad statement.
    fail_on: Option<i64>,
}

impl MemStore {
    fn with_applied(versions: &[i64]) -> Self {
        let store = MemStore::default();
        {
            let mut state = store.inner.lock().unwrap();
            for &v in versions {
                state.applied.insert(v, format!("seeded-{v}"));
            }
        }
        store
    }

    fn failing_on(version: i64) -> Self {
        let store = MemStore::default();
        store.inner.lock().unwrap().fail_on = Some(version);
        store
    }

    fn clear_failure(&self) {
        self.inner.lock().unwrap().fail_on = None;
    }

    fn recorded(&self) -> Vec<i64> {
        self.inner.lock().unwrap().applied.keys().copied().collect()
    }

    fn apply_order(&self) -> Vec<i64> {
        self.inner.lock().unwrap().apply_order.clone()
    }
}

fn forced_failure(stmt: &str) -> QueryError {
    QueryError::new(stmt, sqlx::Error::Protocol("forced failure".into()))
}

#[async_trait]
impl MigrationStore for MemStore {
    async fn ensure_ledger(&self) -> Result<(), QueryError> {
        self.inner.lock().unwrap().ledger_ready = true;
        Ok(())
    }

    async fn applied_versions(&self) -> Result<Vec<i64>, QueryError> {
        let state = self.inner.lock().unwrap();
        assert!(state.ledger_ready, "applied_versions before ensure_ledger");
        Ok(state.applied.keys().copied().collect())
    }

    async fn apply(&self, migration: &MigrationFile) -> Result<(), QueryError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_on == Some(migration.version) {
            // Script and ledger insert share a transaction: nothing recorded.
            return Err(forced_failure(&migration.sql));
        }
        state.apply_order.push(migration.version);
        state.applied.insert(migration.version, migration.name.clone());
        Ok(())
    }
}

fn files(versions: &[i64]) -> Vec<MigrationFile> {
    versions
        .iter()
        .map(|&v| MigrationFile {
            version: v,
            name: format!("migration-{v}"),
            sql: format!("CREATE TABLE t{v} (id INT)"),
        })
        .collect()
}

#[tokio::test]
async fn first_run_applies_all_second_run_applies_none() {
    let store = MemStore::default();
    let ledger = Ledger::new(store.clone());
    let available = files(&[1, 2, 3]);

    let first = ledger.migrate(&available).await.unwrap();
    assert_eq!(first, vec![1, 2, 3]);
    assert_eq!(store.recorded(), vec![1, 2, 3]);

    let second = ledger.migrate(&available).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(store.recorded(), vec![1, 2, 3]);
}

#[tokio::test]
async fn version_zero_is_applied_on_a_fresh_ledger() {
    let store = MemStore::default();
    let ledger = Ledger::new(store.clone());

    // A fresh ledger has no current version, so 0 is pending like any other.
    let applied = ledger.migrate(&files(&[0, 1])).await.unwrap();
    assert_eq!(applied, vec![0, 1]);
    assert_eq!(store.recorded(), vec![0, 1]);

    // Once recorded it is never re-applied.
    let again = ledger.migrate(&files(&[0, 1])).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn only_missing_versions_beyond_current_are_applied() {
    let store = MemStore::with_applied(&[1, 2]);
    let ledger = Ledger::new(store.clone());

    let applied = ledger.migrate(&files(&[1, 2, 3])).await.unwrap();
    assert_eq!(applied, vec![3]);
    assert_eq!(store.recorded(), vec![1, 2, 3]);
    // Only the new version actually ran.
    assert_eq!(store.apply_order(), vec![3]);
}

#[tokio::test]
async fn unsorted_input_is_applied_in_ascending_version_order() {
    let store = MemStore::default();
    let ledger = Ledger::new(store.clone());
    let mut available = files(&[1, 2, 3]);
    available.reverse();

    let applied = ledger.migrate(&available).await.unwrap();
    assert_eq!(applied, vec![1, 2, 3]);
    assert_eq!(store.apply_order(), vec![1, 2, 3]);
}

#[tokio::test]
async fn failure_leaves_ledger_equal_to_committed_prefix() {
    let store = MemStore::failing_on(2);
    let ledger = Ledger::new(store.clone());

    let err = ledger.migrate(&files(&[1, 2, 3])).await.unwrap_err();
    match &err {
        MigrationError::Apply { version, applied, .. } => {
            assert_eq!(*version, 2);
            assert_eq!(applied, &vec![1]);
        }
        other => panic!("expected Apply error, got {other:?}"),
    }
    assert_eq!(err.applied(), &[1]);
    // The failing and later migrations are never recorded.
    assert_eq!(store.recorded(), vec![1]);
}

#[tokio::test]
async fn rerun_after_failure_resumes_from_the_failing_version() {
    let store = MemStore::failing_on(2);
    let ledger = Ledger::new(store.clone());
    let available = files(&[1, 2, 3]);

    ledger.migrate(&available).await.unwrap_err();
    // Operator fixes the script; the rerun picks up from version 2.
    store.clear_failure();
    let applied = ledger.migrate(&available).await.unwrap();
    assert_eq!(applied, vec![2, 3]);
    assert_eq!(store.recorded(), vec![1, 2, 3]);
}

#[tokio::test]
async fn empty_available_set_is_a_no_op() {
    let store = MemStore::with_applied(&[1, 2]);
    let ledger = Ledger::new(store.clone());
    let applied = ledger.migrate(&[]).await.unwrap();
    assert!(applied.is_empty());
    assert_eq!(store.recorded(), vec![1, 2]);
}
