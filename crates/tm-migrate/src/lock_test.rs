//! Tests for the advisory migration lock.

use super::*;
use crate::test_utils::UnreachableStore;
use chrono::TimeZone;
use tm_db::DuckDbStore;

const TEN_MINUTES: Duration = Duration::from_secs(600);

fn lock() -> MigrationLock {
    MigrationLock::new(Arc::new(DuckDbStore::in_memory().unwrap()), "lock")
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

#[tokio::test]
async fn acquire_free_lock() {
    let lock = lock();
    let record = lock.acquire_at("runner-a", TEN_MINUTES, at(0)).await.unwrap();
    assert_eq!(record.owner, "runner-a");
    assert_eq!(lock.current().await.unwrap(), Some(record));
}

#[tokio::test]
async fn second_owner_gets_contention() {
    let lock = lock();
    lock.acquire_at("runner-a", TEN_MINUTES, at(0)).await.unwrap();

    let err = lock
        .acquire_at("runner-b", TEN_MINUTES, at(30))
        .await
        .unwrap_err();
    match err {
        MigrateError::LockContention {
            holder,
            acquired_at,
        } => {
            assert_eq!(holder, "runner-a");
            assert_eq!(acquired_at, at(0));
        }
        other => panic!("expected LockContention, got {other:?}"),
    }
    assert_eq!(lock.current().await.unwrap().unwrap().owner, "runner-a");
}

#[tokio::test]
async fn same_owner_reacquires() {
    let lock = lock();
    lock.acquire_at("runner-a", TEN_MINUTES, at(0)).await.unwrap();
    let record = lock
        .acquire_at("runner-a", TEN_MINUTES, at(30))
        .await
        .unwrap();
    assert_eq!(record.acquired_at, at(30));
    assert_eq!(lock.current().await.unwrap().unwrap().acquired_at, at(30));
}

#[tokio::test]
async fn stale_lock_is_reclaimed() {
    let lock = lock();
    lock.acquire_at("crashed", TEN_MINUTES, at(0)).await.unwrap();

    // Exactly at the timeout the lock is still live
    assert!(lock
        .acquire_at("runner-b", TEN_MINUTES, at(600))
        .await
        .is_err());

    let record = lock
        .acquire_at("runner-b", TEN_MINUTES, at(601))
        .await
        .unwrap();
    assert_eq!(record.owner, "runner-b");
    assert_eq!(lock.current().await.unwrap().unwrap().owner, "runner-b");
}

#[tokio::test]
async fn release_removes_own_lock() {
    let lock = lock();
    lock.acquire("runner-a", TEN_MINUTES).await.unwrap();
    lock.release("runner-a").await.unwrap();
    assert!(lock.current().await.unwrap().is_none());

    // Releasing an absent lock is a no-op
    lock.release("runner-a").await.unwrap();

    // And the lock can be taken again
    lock.acquire("runner-b", TEN_MINUTES).await.unwrap();
}

#[tokio::test]
async fn release_by_non_owner_fails() {
    let lock = lock();
    lock.acquire("runner-a", TEN_MINUTES).await.unwrap();

    let err = lock.release("runner-b").await.unwrap_err();
    assert!(matches!(
        err,
        MigrateError::LockNotHeld { ref holder, .. } if holder == "runner-a"
    ));
    assert!(lock.current().await.unwrap().is_some());
}

#[tokio::test]
async fn force_release_clears_any_holder() {
    let lock = lock();
    assert!(lock.force_release().await.unwrap().is_none());

    lock.acquire("crashed", TEN_MINUTES).await.unwrap();
    let removed = lock.force_release().await.unwrap().unwrap();
    assert_eq!(removed.owner, "crashed");
    assert!(lock.current().await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_acquire_admits_exactly_one() {
    let store: Arc<dyn DocumentStore> = Arc::new(DuckDbStore::in_memory().unwrap());
    let first = MigrationLock::new(Arc::clone(&store), "lock");
    let second = MigrationLock::new(Arc::clone(&store), "lock");

    let (a, b) = tokio::join!(
        first.acquire("runner-a", TEN_MINUTES),
        second.acquire("runner-b", TEN_MINUTES)
    );

    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(MigrateError::LockContention { .. })));
}

#[tokio::test]
async fn concurrent_stale_reclaim_admits_exactly_one() {
    let store: Arc<dyn DocumentStore> = Arc::new(DuckDbStore::in_memory().unwrap());
    let lock = MigrationLock::new(Arc::clone(&store), "lock");
    lock.acquire_at("crashed", TEN_MINUTES, at(0)).await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.acquire_at(&format!("runner-{i}"), TEN_MINUTES, at(3600))
                    .await
                    .is_ok()
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn unreachable_store_reports_store_unavailable() {
    let lock = MigrationLock::new(Arc::new(UnreachableStore), "lock");
    assert!(matches!(
        lock.acquire("runner-a", TEN_MINUTES).await,
        Err(MigrateError::StoreUnavailable(_))
    ));
}

#[test]
fn lock_record_staleness() {
    let record = LockRecord {
        owner: "a".to_string(),
        acquired_at: at(0),
    };
    assert!(!record.is_stale(at(10), Duration::from_secs(10)));
    assert!(record.is_stale(at(11), Duration::from_secs(10)));
    assert!(!record.is_stale(at(11), Duration::MAX));
}
