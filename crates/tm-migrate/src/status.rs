//! Migration status: what is applied, what is pending, and why.

use crate::ledger::{FailureRecord, LedgerEntry};
use crate::lock::LockRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tm_core::{StepKey, StepSet};

/// A registered step recorded in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedStep {
    pub key: StepKey,
    pub description: String,
    pub applied_at: DateTime<Utc>,
    pub reversible: bool,
    /// Set when a rollback of this step failed
    pub last_failure: Option<FailureRecord>,
}

/// A registered step not recorded in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingStep {
    pub key: StepKey,
    pub description: String,
    pub reversible: bool,
    /// Set when the last attempt to apply this step failed
    pub last_failure: Option<FailureRecord>,
}

/// Snapshot of the target's migration state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Applied steps, ascending by key
    pub applied: Vec<AppliedStep>,
    /// Pending steps, in the order `run_up` would apply them
    pub pending: Vec<PendingStep>,
    /// Ledger entries that no registered step knows about
    pub unknown: Vec<LedgerEntry>,
    /// Current lock holder, if a run is in progress
    pub lock: Option<LockRecord>,
}

impl Status {
    pub(crate) fn build(
        steps: &StepSet,
        mut applied: BTreeMap<StepKey, LedgerEntry>,
        mut failures: BTreeMap<StepKey, FailureRecord>,
        lock: Option<LockRecord>,
    ) -> Self {
        let mut applied_steps = Vec::new();
        let mut pending = Vec::new();

        for step in steps.iter() {
            let key = step.key();
            let last_failure = failures.remove(&key);
            match applied.remove(&key) {
                Some(entry) => applied_steps.push(AppliedStep {
                    key,
                    description: entry.description,
                    applied_at: entry.applied_at,
                    reversible: step.is_reversible(),
                    last_failure,
                }),
                None => pending.push(PendingStep {
                    key,
                    description: step.description().to_string(),
                    reversible: step.is_reversible(),
                    last_failure,
                }),
            }
        }

        Self {
            applied: applied_steps,
            pending,
            unknown: applied.into_values().collect(),
            lock,
        }
    }

    /// Whether `run_up` would have nothing to do
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn applied_keys(&self) -> Vec<StepKey> {
        self.applied.iter().map(|s| s.key).collect()
    }

    pub fn pending_keys(&self) -> Vec<StepKey> {
        self.pending.iter().map(|s| s.key).collect()
    }

    /// The pending step with this key, if any
    pub fn pending_step(&self, key: StepKey) -> Option<&PendingStep> {
        self.pending.iter().find(|s| s.key == key)
    }
}
