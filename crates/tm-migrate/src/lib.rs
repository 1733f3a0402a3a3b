//! Migration engine for Tidemark.
//!
//! Applies registered steps to a document database in key order, recording
//! each applied step in a ledger stored in that same database. A single
//! advisory lock document keeps concurrent runners from interleaving.

pub mod cancel;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod plan;
pub(crate) mod record;
pub mod runner;
pub mod status;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cancel::CancelToken;
pub use error::{MigrateError, MigrateResult};
pub use ledger::{FailureRecord, Ledger, LedgerEntry};
pub use lock::{LockRecord, MigrationLock, LOCK_ID};
pub use plan::{plan_down, plan_up, Direction, Plan, RollbackTarget};
pub use runner::{owner_id, RunReport, RunState, Runner, RunnerOptions, DEFAULT_OWNER_PREFIX};
pub use status::{AppliedStep, PendingStep, Status};
