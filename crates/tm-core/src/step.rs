//! Migration steps and the actions they run.
//!
//! A [`Step`] pairs an ordering [`StepKey`] with a forward [`Action`] and an
//! optional reverse action. Steps are immutable once built; the registry
//! hands them out behind `Arc`.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tm_db::DocumentStore;

/// Totally ordered step identifier.
///
/// Keys are plain integers, usually taken from the numeric prefix of the file
/// that defines the step. [`StepKey::ORIGIN`] (0) sorts before every step and
/// is the target used to roll everything back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepKey(u64);

impl StepKey {
    /// The position before any step has been applied
    pub const ORIGIN: StepKey = StepKey(0);

    /// Wrap a raw key value
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw key value
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is [`StepKey::ORIGIN`]
    pub fn is_origin(self) -> bool {
        self == Self::ORIGIN
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for StepKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(StepKey)
    }
}

impl From<u64> for StepKey {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Error raised by a step action. Any error type can be returned with `?`.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// Result of running a step action
pub type ActionResult = Result<(), ActionError>;

/// One direction of a migration step, run against the target store.
///
/// Plain functions of the shape
/// `fn(&dyn DocumentStore) -> BoxFuture<'_, ActionResult>` implement this
/// trait, so most steps never name it.
#[async_trait]
pub trait Action: Send + Sync {
    /// Apply the change
    async fn run(&self, db: &dyn DocumentStore) -> ActionResult;
}

#[async_trait]
impl<F> Action for F
where
    F: for<'a> Fn(&'a dyn DocumentStore) -> BoxFuture<'a, ActionResult> + Send + Sync,
{
    async fn run(&self, db: &dyn DocumentStore) -> ActionResult {
        self(db).await
    }
}

/// A single registered migration
#[derive(Clone)]
pub struct Step {
    key: StepKey,
    description: String,
    up: Arc<dyn Action>,
    down: Option<Arc<dyn Action>>,
}

impl Step {
    /// Forward-only step; rolling it back is an error
    pub fn new(key: StepKey, description: impl Into<String>, up: impl Action + 'static) -> Self {
        Self {
            key,
            description: description.into(),
            up: Arc::new(up),
            down: None,
        }
    }

    /// Step with both directions
    pub fn reversible(
        key: StepKey,
        description: impl Into<String>,
        up: impl Action + 'static,
        down: impl Action + 'static,
    ) -> Self {
        Self {
            key,
            description: description.into(),
            up: Arc::new(up),
            down: Some(Arc::new(down)),
        }
    }

    pub fn key(&self) -> StepKey {
        self.key
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The forward action
    pub fn up(&self) -> &dyn Action {
        self.up.as_ref()
    }

    /// The reverse action, if the step has one
    pub fn down(&self) -> Option<&dyn Action> {
        self.down.as_deref()
    }

    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("key", &self.key)
            .field("description", &self.description)
            .field("reversible", &self.is_reversible())
            .finish()
    }
}
