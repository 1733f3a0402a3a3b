//! tm-db - Document store abstraction layer for Tidemark
//!
//! This crate provides the `DocumentStore` trait that migration steps, the
//! ledger and the lock are written against, plus a DuckDB-backed
//! implementation.

pub mod document;
pub mod duckdb;
pub mod error;
pub mod traits;

pub use document::{document_id, into_document, Document, Filter, IndexSpec, ID_FIELD};
pub use duckdb::{DuckDbStore, DEFAULT_BUSY_TIMEOUT};
pub use error::{DbError, DbResult};
pub use traits::DocumentStore;
