//! Persistent record of applied steps.
//!
//! The ledger lives in the target database itself: one document per applied
//! step, keyed by the step key. It is the only source of truth for what has
//! run. A second collection keeps the last failure of each step that failed,
//! so `status` can explain why a step is still pending.
//!
//! Every method is a single-document operation. None of them is atomic with
//! the step action it records.

use crate::error::MigrateResult;
use crate::plan::Direction;
use crate::record::{from_document, to_document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tm_core::StepKey;
use tm_db::{DbError, DocumentStore, Filter};

/// One applied step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: StepKey,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}

/// The most recent failure of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub key: StepKey,
    pub direction: Direction,
    pub cause: String,
    pub failed_at: DateTime<Utc>,
}

/// Applied-step ledger backed by a document store
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn DocumentStore>,
    collection: String,
    failure_collection: String,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        failure_collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            failure_collection: failure_collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn failure_collection(&self) -> &str {
        &self.failure_collection
    }

    /// Every applied step, keyed by step key
    pub async fn applied(&self) -> MigrateResult<BTreeMap<StepKey, LedgerEntry>> {
        let docs = self.store.find(&self.collection, &Filter::all()).await?;
        let mut entries = BTreeMap::new();
        for doc in docs {
            let entry: LedgerEntry = from_document(&self.collection, doc)?;
            entries.insert(entry.key, entry);
        }
        Ok(entries)
    }

    /// Keys of every applied step
    pub async fn applied_keys(&self) -> MigrateResult<BTreeSet<StepKey>> {
        Ok(self.applied().await?.into_keys().collect())
    }

    /// Record `key` as applied. Recording an already-applied key is a no-op.
    pub async fn mark_applied(
        &self,
        key: StepKey,
        description: &str,
        applied_at: DateTime<Utc>,
    ) -> MigrateResult<()> {
        let entry = LedgerEntry {
            key,
            description: description.to_string(),
            applied_at,
        };
        let doc = to_document(&entry_id(key), &entry)?;
        match self.store.insert_one(&self.collection, doc).await {
            Ok(_) => Ok(()),
            Err(DbError::DuplicateId { .. }) => {
                log::debug!("Step {key} already recorded as applied");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the applied record for `key`. Absent keys are a no-op.
    pub async fn mark_reverted(&self, key: StepKey) -> MigrateResult<()> {
        self.store
            .delete_many(&self.collection, &Filter::by_id(entry_id(key)))
            .await?;
        Ok(())
    }

    /// Store the latest failure of a step, replacing any earlier one
    pub async fn record_failure(&self, record: &FailureRecord) -> MigrateResult<()> {
        let id = entry_id(record.key);
        let doc = to_document(&id, record)?;
        let filter = Filter::by_id(id.as_str());

        if self
            .store
            .replace_one(&self.failure_collection, &filter, doc.clone())
            .await?
        {
            return Ok(());
        }
        match self.store.insert_one(&self.failure_collection, doc.clone()).await {
            Ok(_) => Ok(()),
            // Another writer inserted it between our two calls
            Err(DbError::DuplicateId { .. }) => {
                self.store
                    .replace_one(&self.failure_collection, &filter, doc)
                    .await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Latest failure per step
    pub async fn failures(&self) -> MigrateResult<BTreeMap<StepKey, FailureRecord>> {
        let docs = self
            .store
            .find(&self.failure_collection, &Filter::all())
            .await?;
        let mut failures = BTreeMap::new();
        for doc in docs {
            let record: FailureRecord = from_document(&self.failure_collection, doc)?;
            failures.insert(record.key, record);
        }
        Ok(failures)
    }

    /// Forget the failure of a step that has since succeeded
    pub async fn clear_failure(&self, key: StepKey) -> MigrateResult<()> {
        self.store
            .delete_many(&self.failure_collection, &Filter::by_id(entry_id(key)))
            .await?;
        Ok(())
    }
}

fn entry_id(key: StepKey) -> String {
    key.to_string()
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
