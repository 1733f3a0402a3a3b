//! Advisory migration lock.
//!
//! A single document in the lock collection names the runner that currently
//! owns the target database. Acquisition is an insert that fails if the
//! document exists; reclaiming a stale lock is a conditional replace on the
//! exact record that was read, so two runners racing for a stale lock cannot
//! both win.

use crate::error::{MigrateError, MigrateResult};
use crate::record::{from_document, to_document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tm_db::{DbError, Document, DocumentStore, Filter};

/// `_id` of the singleton lock document
pub const LOCK_ID: &str = "migration_lock";

/// Current lock holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockRecord {
    /// Whether the record is older than `stale_after` at `now`
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        match chrono::Duration::from_std(stale_after) {
            Ok(limit) => now.signed_duration_since(self.acquired_at) > limit,
            Err(_) => false,
        }
    }
}

/// Lock over one target database
#[derive(Clone)]
pub struct MigrationLock {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl MigrationLock {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Take the lock for `owner`.
    ///
    /// Succeeds if the lock is free, already held by `owner`, or held by a
    /// record older than `stale_after`. Otherwise fails with
    /// [`MigrateError::LockContention`]; the engine never retries.
    pub async fn acquire(&self, owner: &str, stale_after: Duration) -> MigrateResult<LockRecord> {
        self.acquire_at(owner, stale_after, Utc::now()).await
    }

    pub(crate) async fn acquire_at(
        &self,
        owner: &str,
        stale_after: Duration,
        now: DateTime<Utc>,
    ) -> MigrateResult<LockRecord> {
        let record = LockRecord {
            owner: owner.to_string(),
            acquired_at: now,
        };
        let doc = to_document(LOCK_ID, &record)?;

        match self.store.insert_one(&self.collection, doc.clone()).await {
            Ok(_) => {
                log::debug!("Migration lock acquired by '{owner}'");
                return Ok(record);
            }
            Err(DbError::DuplicateId { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let Some(current_doc) = self
            .store
            .find_one(&self.collection, &Filter::by_id(LOCK_ID))
            .await?
        else {
            // Released between our insert and read. Report it as contention
            // rather than looping; callers decide whether to retry.
            return Err(MigrateError::LockContention {
                holder: "<released during acquisition>".to_string(),
                acquired_at: now,
            });
        };
        let current: LockRecord = from_document(&self.collection, current_doc.clone())?;

        let reentrant = current.owner == owner;
        if !reentrant && !current.is_stale(now, stale_after) {
            return Err(MigrateError::LockContention {
                holder: current.owner,
                acquired_at: current.acquired_at,
            });
        }

        if self
            .store
            .replace_one(&self.collection, &exact_match(&current_doc), doc)
            .await?
        {
            if !reentrant {
                log::warn!(
                    "Reclaimed stale migration lock from '{}' (held since {})",
                    current.owner,
                    current.acquired_at
                );
            }
            return Ok(record);
        }

        Err(MigrateError::LockContention {
            holder: current.owner,
            acquired_at: current.acquired_at,
        })
    }

    /// Give up the lock held by `owner`. Absent lock is a no-op.
    ///
    /// Fails with [`MigrateError::LockNotHeld`] if someone else holds it.
    pub async fn release(&self, owner: &str) -> MigrateResult<()> {
        let Some(current) = self.current().await? else {
            return Ok(());
        };
        if current.owner != owner {
            return Err(MigrateError::LockNotHeld {
                owner: owner.to_string(),
                holder: current.owner,
            });
        }

        self.store
            .delete_many(
                &self.collection,
                &Filter::by_id(LOCK_ID).and("owner", owner),
            )
            .await?;
        log::debug!("Migration lock released by '{owner}'");
        Ok(())
    }

    /// Remove the lock whoever holds it, returning the removed record.
    ///
    /// Only for clearing a lock left behind by a process that died.
    pub async fn force_release(&self) -> MigrateResult<Option<LockRecord>> {
        let current = self.current().await?;
        self.store
            .delete_many(&self.collection, &Filter::by_id(LOCK_ID))
            .await?;
        if let Some(record) = &current {
            log::warn!("Force-released migration lock held by '{}'", record.owner);
        }
        Ok(current)
    }

    /// The current holder, if any
    pub async fn current(&self) -> MigrateResult<Option<LockRecord>> {
        match self
            .store
            .find_one(&self.collection, &Filter::by_id(LOCK_ID))
            .await?
        {
            Some(doc) => Ok(Some(from_document(&self.collection, doc)?)),
            None => Ok(None),
        }
    }
}

/// Filter that only matches a document identical to `doc`.
fn exact_match(doc: &Document) -> Filter {
    Filter::from(doc.clone())
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod tests;
