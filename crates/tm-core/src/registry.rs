//! Process-wide step registry.
//!
//! Migration units register their steps during startup, in whatever order
//! the units happen to be initialized. Call order carries no meaning: the
//! registry always hands steps out sorted by [`StepKey`], and rejects a
//! second step with an already-used key.

use crate::error::{CoreError, CoreResult};
use crate::step::{Step, StepKey};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Thread-safe, append-only collection of steps
#[derive(Debug, Default)]
pub struct Registry {
    steps: Mutex<Vec<Arc<Step>>>,
    frozen: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    ///
    /// Fails with [`CoreError::DuplicateKey`] if the key is taken, and with
    /// [`CoreError::ReservedKey`] for key 0. A failed call leaves the registry
    /// unchanged.
    pub fn register(&self, step: Step) -> CoreResult<()> {
        if step.key().is_origin() {
            return Err(CoreError::ReservedKey {
                description: step.description().to_string(),
            });
        }

        let mut steps = self.lock();
        if let Some(existing) = steps.iter().find(|s| s.key() == step.key()) {
            return Err(CoreError::DuplicateKey {
                key: step.key(),
                description: step.description().to_string(),
                existing: existing.description().to_string(),
            });
        }

        if self.frozen.load(Ordering::Acquire) {
            log::warn!(
                "Step {} ('{}') registered after the registry was frozen",
                step.key(),
                step.description()
            );
        } else {
            log::debug!("Registered step {} ('{}')", step.key(), step.description());
        }
        steps.push(Arc::new(step));
        Ok(())
    }

    /// All registered steps, ascending by key
    pub fn all_steps(&self) -> Vec<Arc<Step>> {
        let mut steps = self.lock().clone();
        steps.sort_by_key(|s| s.key());
        steps
    }

    /// Mark registration as finished and return the ordered snapshot.
    ///
    /// Later registrations are still accepted and show up in the next
    /// snapshot, but are logged as a warning.
    pub fn freeze(&self) -> StepSet {
        self.frozen.store(true, Ordering::Release);
        StepSet::new(self.all_steps())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Look up a step by key
    pub fn get(&self, key: StepKey) -> Option<Arc<Step>> {
        self.lock().iter().find(|s| s.key() == key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the Vec half-pushed.
    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Step>>> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frozen, key-ordered snapshot of the registry
#[derive(Debug, Clone, Default)]
pub struct StepSet {
    steps: Vec<Arc<Step>>,
}

impl StepSet {
    fn new(steps: Vec<Arc<Step>>) -> Self {
        debug_assert!(steps.windows(2).all(|w| w[0].key() < w[1].key()));
        Self { steps }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<Step>> {
        self.steps.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = StepKey> + '_ {
        self.steps.iter().map(|s| s.key())
    }

    pub fn get(&self, key: StepKey) -> Option<&Arc<Step>> {
        self.steps
            .binary_search_by_key(&key, |s| s.key())
            .ok()
            .map(|i| &self.steps[i])
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Derive a step key and description from a migration source file name.
///
/// The file stem must start with an optional run of ASCII letters followed by
/// the numeric key; whatever follows (minus a leading `_`) becomes the
/// description. `m001_seed_data.rs` yields `(1, "seed_data")`.
pub fn key_from_source_path(path: &str) -> CoreResult<(StepKey, String)> {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let invalid = |reason: &str| CoreError::InvalidStepName {
        name: path.to_string(),
        reason: reason.to_string(),
    };

    let rest = stem.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let digits_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits_len == 0 {
        return Err(invalid("file name has no numeric prefix"));
    }

    let (digits, tail) = rest.split_at(digits_len);
    let key: u64 = digits
        .parse()
        .map_err(|_| invalid("numeric prefix does not fit in a step key"))?;
    let description = tail.trim_start_matches('_');
    let description = if description.is_empty() {
        stem
    } else {
        description
    };

    Ok((StepKey::new(key), description.to_string()))
}

/// Register a step whose key comes from the calling file's name.
///
/// ```ignore
/// // in migrations/m002_sample_index.rs
/// pub fn register(registry: &Registry) -> CoreResult<()> {
///     register_step!(registry, up, down)
/// }
/// ```
///
/// Omit `down` for a forward-only step.
#[macro_export]
macro_rules! register_step {
    ($registry:expr, $up:expr, $down:expr $(,)?) => {
        $crate::registry::key_from_source_path(file!()).and_then(|(key, description)| {
            $registry.register($crate::step::Step::reversible(key, description, $up, $down))
        })
    };
    ($registry:expr, $up:expr $(,)?) => {
        $crate::registry::key_from_source_path(file!()).and_then(|(key, description)| {
            $registry.register($crate::step::Step::new(key, description, $up))
        })
    };
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
