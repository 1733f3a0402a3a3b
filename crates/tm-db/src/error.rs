//! Error types for tm-db

use thiserror::Error;

/// Document store errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Statement execution error (D002)
    #[error("[D002] Database operation failed: {0}")]
    ExecutionError(String),

    /// A document with the same `_id` already exists (D003)
    #[error("[D003] Document '{id}' already exists in collection '{collection}'")]
    DuplicateId { collection: String, id: String },

    /// A unique index rejected the write (D004)
    #[error("[D004] Unique index '{index}' on collection '{collection}' rejected a duplicate value")]
    UniqueViolation { collection: String, index: String },

    /// Index not found (D005)
    #[error("[D005] Index '{name}' not found on collection '{collection}'")]
    IndexNotFound { collection: String, name: String },

    /// An index with the same name but a different definition exists (D006)
    #[error("[D006] Index '{name}' on collection '{collection}' already exists with a different definition")]
    IndexConflict { collection: String, name: String },

    /// Document is not a JSON object or has an unusable `_id` (D007)
    #[error("[D007] Invalid document: {0}")]
    InvalidDocument(String),

    /// Document body could not be (de)serialized (D008)
    #[error("[D008] Document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Mutex poisoned (D009)
    #[error("[D009] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Internal error (D010)
    #[error("[D010] Internal database error: {0}")]
    Internal(String),

    /// Another process kept the database file locked past the busy timeout (D011)
    #[error("[D011] Database '{path}' is locked by another process: {detail}")]
    Busy { path: String, detail: String },
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Whether the error means the backing store could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DbError::ConnectionError(_) | DbError::MutexPoisoned(_))
    }

    /// Whether the store is reachable but another process is using it
    pub fn is_busy(&self) -> bool {
        matches!(self, DbError::Busy { .. })
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        DbError::ExecutionError(err.to_string())
    }
}
