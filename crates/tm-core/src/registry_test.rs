use super::*;
use crate::step::{ActionResult, Step};
use futures::future::BoxFuture;
use std::thread;
use tm_db::DocumentStore;

fn noop(_db: &dyn DocumentStore) -> BoxFuture<'_, ActionResult> {
    Box::pin(async { Ok(()) })
}

fn step(key: u64) -> Step {
    Step::reversible(StepKey::new(key), format!("step_{key}"), noop, noop)
}

fn keys(steps: &[Arc<Step>]) -> Vec<u64> {
    steps.iter().map(|s| s.key().get()).collect()
}

#[test]
fn test_all_steps_sorted_regardless_of_registration_order() {
    let registry = Registry::new();
    for key in [5, 1, 3, 2, 4] {
        registry.register(step(key)).unwrap();
    }
    assert_eq!(keys(&registry.all_steps()), vec![1, 2, 3, 4, 5]);

    // Stable across calls
    assert_eq!(keys(&registry.all_steps()), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_duplicate_key_rejected_and_set_unchanged() {
    let registry = Registry::new();
    registry.register(step(1)).unwrap();
    registry.register(step(2)).unwrap();

    let err = registry
        .register(Step::new(StepKey::new(2), "other", noop))
        .unwrap_err();
    match err {
        CoreError::DuplicateKey {
            key,
            description,
            existing,
        } => {
            assert_eq!(key, StepKey::new(2));
            assert_eq!(description, "other");
            assert_eq!(existing, "step_2");
        }
        other => panic!("expected DuplicateKey, got {other:?}"),
    }

    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry.get(StepKey::new(2)).unwrap().description(),
        "step_2"
    );
}

#[test]
fn test_reserved_key_rejected() {
    let registry = Registry::new();
    let err = registry
        .register(Step::new(StepKey::ORIGIN, "origin", noop))
        .unwrap_err();
    assert!(matches!(err, CoreError::ReservedKey { .. }));
    assert!(registry.is_empty());
}

#[test]
fn test_freeze_returns_ordered_snapshot() {
    let registry = Registry::new();
    registry.register(step(20)).unwrap();
    registry.register(step(10)).unwrap();
    assert!(!registry.is_frozen());

    let set = registry.freeze();
    assert!(registry.is_frozen());
    assert_eq!(set.keys().map(StepKey::get).collect::<Vec<_>>(), vec![10, 20]);
    assert_eq!(set.get(StepKey::new(20)).unwrap().description(), "step_20");
    assert!(set.get(StepKey::new(15)).is_none());
    assert_eq!(set.iter().rev().next().unwrap().key(), StepKey::new(20));
}

#[test]
fn test_late_registration_is_included_in_next_snapshot() {
    let registry = Registry::new();
    registry.register(step(2)).unwrap();
    let first = registry.freeze();

    registry.register(step(1)).unwrap();
    let second = registry.freeze();

    assert_eq!(first.len(), 1);
    assert_eq!(second.keys().map(StepKey::get).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn test_concurrent_registration() {
    let registry = Arc::new(Registry::new());
    let handles: Vec<_> = (1..=8u64)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..25u64 {
                    registry.register(step(t * 1000 + i)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let steps = registry.all_steps();
    assert_eq!(steps.len(), 200);
    assert!(steps.windows(2).all(|w| w[0].key() < w[1].key()));
}

#[test]
fn test_concurrent_duplicate_registration_admits_one() {
    let registry = Arc::new(Registry::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.register(step(7)).is_ok())
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_key_from_source_path() {
    let (key, description) =
        key_from_source_path("crates/tm-cli/src/migrations/m001_sample_data.rs").unwrap();
    assert_eq!(key, StepKey::new(1));
    assert_eq!(description, "sample_data");

    let (key, description) = key_from_source_path("2_sample_index.rs").unwrap();
    assert_eq!(key, StepKey::new(2));
    assert_eq!(description, "sample_index");

    let (key, description) = key_from_source_path("v20260203.rs").unwrap();
    assert_eq!(key, StepKey::new(20260203));
    assert_eq!(description, "v20260203");
}

#[test]
fn test_key_from_source_path_rejects_unnumbered_files() {
    let err = key_from_source_path("src/migrations/seed_data.rs").unwrap_err();
    assert!(matches!(err, CoreError::InvalidStepName { .. }));

    let err = key_from_source_path("m99999999999999999999999_huge.rs").unwrap_err();
    assert!(matches!(err, CoreError::InvalidStepName { .. }));
}

#[test]
fn test_register_step_macro_needs_numbered_file() {
    // This file has no numeric prefix, so the macro cannot derive a key.
    let registry = Registry::new();
    let result = crate::register_step!(registry, noop, noop);
    assert!(matches!(result, Err(CoreError::InvalidStepName { .. })));
    assert!(registry.is_empty());
}
