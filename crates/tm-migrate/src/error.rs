//! Error types for the migration engine.

use crate::plan::Direction;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tm_core::{ActionError, CoreError, StepKey};
use tm_db::DbError;

/// Migration engine errors.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Another runner holds the migration lock (M001).
    #[error("[M001] Migration lock is held by '{holder}' since {acquired_at}")]
    LockContention {
        holder: String,
        acquired_at: DateTime<Utc>,
    },

    /// Release attempted by a runner that does not own the lock (M002).
    #[error("[M002] Migration lock is held by '{holder}', not '{owner}'")]
    LockNotHeld { owner: String, holder: String },

    /// A planned rollback includes a step without a down action (M003).
    #[error("[M003] Step {key} ('{description}') cannot be rolled back: it has no down action")]
    IrreversibleStep { key: StepKey, description: String },

    /// A planned rollback includes an applied key no registered step knows (M004).
    #[error("[M004] Applied step {key} is not registered in this binary; cannot roll it back")]
    UnknownAppliedStep { key: StepKey },

    /// The backing store could not be reached (M005).
    #[error("[M005] Migration store unavailable")]
    StoreUnavailable(#[source] DbError),

    /// Any other store failure (M006).
    #[error("[M006] Migration store operation failed")]
    Store(#[source] DbError),

    /// A stored ledger, failure, or lock document could not be read (M007).
    #[error("[M007] Corrupt record in collection '{collection}': {reason}")]
    CorruptRecord { collection: String, reason: String },

    /// A step's action failed; execution stopped at this step (M008).
    #[error("[M008] Step {key} failed during {direction}: {cause}")]
    StepFailed {
        key: StepKey,
        direction: Direction,
        #[source]
        cause: ActionError,
    },

    /// Cancellation was requested between steps (M009).
    #[error("[M009] Migration cancelled after {completed} of {planned} steps")]
    Cancelled { completed: usize, planned: usize },

    /// Registration problem surfaced through the engine (M010).
    #[error("[M010] Step registration failed")]
    Registry(#[from] CoreError),

    /// Another process kept the database file locked past the busy timeout (M011).
    #[error("[M011] Migration store is busy")]
    StoreBusy(#[source] DbError),
}

/// Result type alias for [`MigrateError`].
pub type MigrateResult<T> = Result<T, MigrateError>;

impl From<DbError> for MigrateError {
    fn from(err: DbError) -> Self {
        if err.is_busy() {
            MigrateError::StoreBusy(err)
        } else if err.is_unavailable() {
            MigrateError::StoreUnavailable(err)
        } else {
            MigrateError::Store(err)
        }
    }
}
