//! Error types for tm-core

use crate::step::StepKey;
use thiserror::Error;

/// Core error type for Tidemark
#[derive(Error, Debug)]
pub enum CoreError {
    /// C001: Two steps registered with the same key
    #[error("[C001] Duplicate step key {key}: '{description}' collides with already registered '{existing}'")]
    DuplicateKey {
        key: StepKey,
        description: String,
        existing: String,
    },

    /// C002: Key 0 is the rollback origin and cannot name a step
    #[error("[C002] Step key 0 is reserved ('{description}')")]
    ReservedKey { description: String },

    /// C003: A step key could not be derived from a source file name
    #[error("[C003] Cannot derive a step key from '{name}': {reason}")]
    InvalidStepName { name: String, reason: String },

    /// C004: Configuration file not found
    #[error("[C004] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C005: Failed to parse configuration file
    #[error("[C005] Failed to parse config: {0}")]
    ConfigParseError(#[from] serde_yaml::Error),

    /// C006: Invalid configuration value
    #[error("[C006] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// C007: IO error with file path context
    #[error("[C007] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
