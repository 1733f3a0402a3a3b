//! Tests for the applied-step ledger.

use super::*;
use crate::error::MigrateError;
use crate::test_utils::UnreachableStore;
use chrono::TimeZone;
use serde_json::json;
use tm_db::{into_document, DuckDbStore};

fn ledger() -> (Arc<DuckDbStore>, Ledger) {
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    let ledger = Ledger::new(store.clone(), "migrations", "failures");
    (store, ledger)
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

#[tokio::test]
async fn empty_ledger_has_no_keys() {
    let (_, ledger) = ledger();
    assert!(ledger.applied().await.unwrap().is_empty());
}

#[tokio::test]
async fn mark_applied_records_entry() {
    let (store, ledger) = ledger();
    ledger
        .mark_applied(StepKey::new(1), "sample_data", at(0))
        .await
        .unwrap();

    let applied = ledger.applied().await.unwrap();
    let entry = &applied[&StepKey::new(1)];
    assert_eq!(entry.description, "sample_data");
    assert_eq!(entry.applied_at, at(0));

    // Persisted layout: one document per step, `_id` is the key
    let doc = store
        .find_one("migrations", &Filter::by_id("1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.get("key"), Some(&json!(1)));
}

#[tokio::test]
async fn mark_applied_is_idempotent() {
    let (store, ledger) = ledger();
    ledger
        .mark_applied(StepKey::new(1), "first", at(0))
        .await
        .unwrap();
    ledger
        .mark_applied(StepKey::new(1), "retry", at(60))
        .await
        .unwrap();

    let applied = ledger.applied().await.unwrap();
    assert_eq!(applied.len(), 1);
    // The first record wins
    assert_eq!(applied[&StepKey::new(1)].applied_at, at(0));
    assert_eq!(
        store.find("migrations", &Filter::all()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn applied_keys_are_sorted() {
    let (_, ledger) = ledger();
    for key in [3, 1, 2] {
        ledger
            .mark_applied(StepKey::new(key), "s", at(0))
            .await
            .unwrap();
    }
    let keys: Vec<u64> = ledger
        .applied_keys()
        .await
        .unwrap()
        .into_iter()
        .map(StepKey::get)
        .collect();
    assert_eq!(keys, vec![1, 2, 3]);
}

#[tokio::test]
async fn mark_reverted_removes_entry_and_tolerates_absence() {
    let (_, ledger) = ledger();
    ledger
        .mark_applied(StepKey::new(1), "s", at(0))
        .await
        .unwrap();
    ledger.mark_reverted(StepKey::new(1)).await.unwrap();
    assert!(ledger.applied().await.unwrap().is_empty());

    ledger.mark_reverted(StepKey::new(1)).await.unwrap();
    ledger.mark_reverted(StepKey::new(42)).await.unwrap();
}

#[tokio::test]
async fn failure_records_replace_and_clear() {
    let (_, ledger) = ledger();
    let first = FailureRecord {
        key: StepKey::new(2),
        direction: Direction::Up,
        cause: "index build timed out".to_string(),
        failed_at: at(0),
    };
    ledger.record_failure(&first).await.unwrap();

    let second = FailureRecord {
        cause: "duplicate key".to_string(),
        failed_at: at(30),
        ..first.clone()
    };
    ledger.record_failure(&second).await.unwrap();

    let failures = ledger.failures().await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[&StepKey::new(2)], second);

    ledger.clear_failure(StepKey::new(2)).await.unwrap();
    assert!(ledger.failures().await.unwrap().is_empty());
    ledger.clear_failure(StepKey::new(2)).await.unwrap();
}

#[tokio::test]
async fn unreachable_store_reports_store_unavailable() {
    let ledger = Ledger::new(Arc::new(UnreachableStore), "migrations", "failures");

    assert!(matches!(
        ledger.applied().await,
        Err(MigrateError::StoreUnavailable(_))
    ));
    assert!(matches!(
        ledger.mark_applied(StepKey::new(1), "s", at(0)).await,
        Err(MigrateError::StoreUnavailable(_))
    ));
    assert!(matches!(
        ledger.mark_reverted(StepKey::new(1)).await,
        Err(MigrateError::StoreUnavailable(_))
    ));
}

#[test]
fn busy_file_maps_to_store_busy() {
    let err = MigrateError::from(tm_db::DbError::Busy {
        path: "data.duckdb".to_string(),
        detail: "Conflicting lock".to_string(),
    });
    assert!(matches!(err, MigrateError::StoreBusy(_)));
}

#[tokio::test]
async fn corrupt_entry_is_reported() {
    let (store, ledger) = ledger();
    store
        .insert_one(
            "migrations",
            into_document(json!({"_id": "1", "key": "not-a-number"})).unwrap(),
        )
        .await
        .unwrap();

    let err = ledger.applied().await.unwrap_err();
    assert!(matches!(
        err,
        MigrateError::CorruptRecord { ref collection, .. } if collection == "migrations"
    ));
}
