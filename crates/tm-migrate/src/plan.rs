//! Planning: the diff between registered steps and the ledger.
//!
//! Planning is pure. It never touches the store, so a rejected plan cannot
//! have changed anything.

use crate::error::{MigrateError, MigrateResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use tm_core::{Step, StepKey, StepSet};

/// Which action of each planned step runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// How far a rollback goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Revert every applied step with a key greater than this one
    To(StepKey),
    /// Revert the given number of highest applied steps
    Steps(usize),
}

/// Ordered list of steps to execute in one direction
#[derive(Debug, Clone)]
pub struct Plan {
    direction: Direction,
    steps: Vec<Arc<Step>>,
}

impl Plan {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[Arc<Step>] {
        &self.steps
    }

    pub fn keys(&self) -> Vec<StepKey> {
        self.steps.iter().map(|s| s.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Registered steps that are not applied, ascending by key.
///
/// Applied keys with no registered step are ignored here; `status` reports
/// them.
pub fn plan_up(steps: &StepSet, applied: &BTreeSet<StepKey>) -> Plan {
    Plan {
        direction: Direction::Up,
        steps: steps
            .iter()
            .filter(|s| !applied.contains(&s.key()))
            .cloned()
            .collect(),
    }
}

/// Applied steps above the rollback target, descending by key.
///
/// The whole plan is rejected if any step in it has no down action or is not
/// registered at all.
pub fn plan_down(
    steps: &StepSet,
    applied: &BTreeSet<StepKey>,
    target: RollbackTarget,
) -> MigrateResult<Plan> {
    let target = resolve_target(applied, target);

    let mut planned = Vec::new();
    for key in applied
        .range((Bound::Excluded(target), Bound::Unbounded))
        .rev()
    {
        let step = steps
            .get(*key)
            .ok_or(MigrateError::UnknownAppliedStep { key: *key })?;
        if !step.is_reversible() {
            return Err(MigrateError::IrreversibleStep {
                key: *key,
                description: step.description().to_string(),
            });
        }
        planned.push(Arc::clone(step));
    }

    Ok(Plan {
        direction: Direction::Down,
        steps: planned,
    })
}

/// Turn a rollback request into the key that stays applied at the top.
pub fn resolve_target(applied: &BTreeSet<StepKey>, target: RollbackTarget) -> StepKey {
    match target {
        RollbackTarget::To(key) => key,
        RollbackTarget::Steps(count) => applied
            .iter()
            .rev()
            .nth(count)
            .copied()
            .unwrap_or(StepKey::ORIGIN),
    }
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
