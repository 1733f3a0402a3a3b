//! Document store trait definition

use crate::document::{Document, Filter, IndexSpec};
use crate::error::DbResult;
use async_trait::async_trait;

/// Document store abstraction for Tidemark
///
/// Every method is a single atomic operation against the store. Nothing here
/// spans multiple calls, so callers that need stronger guarantees must build
/// them from conditional single-document writes such as
/// [`replace_one`](DocumentStore::replace_one).
///
/// Implementations must be Send + Sync for async operation.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document, returning its `_id`.
    ///
    /// A fresh id is generated when the document has none. Fails with
    /// `DuplicateId` if the id is already taken.
    async fn insert_one(&self, collection: &str, doc: Document) -> DbResult<String>;

    /// Return every document matching `filter`, in insertion order
    async fn find(&self, collection: &str, filter: &Filter) -> DbResult<Vec<Document>>;

    /// Return the first document matching `filter`
    async fn find_one(&self, collection: &str, filter: &Filter) -> DbResult<Option<Document>> {
        Ok(self.find(collection, filter).await?.into_iter().next())
    }

    /// Set the given fields on every matching document, returns affected count
    async fn update_many(&self, collection: &str, filter: &Filter, set: &Document)
        -> DbResult<usize>;

    /// Replace the first matching document, keeping its `_id`.
    ///
    /// Returns `false` when nothing matched. The match and the write happen
    /// atomically, which makes this usable as a compare-and-swap.
    async fn replace_one(&self, collection: &str, filter: &Filter, doc: Document)
        -> DbResult<bool>;

    /// Delete every matching document, returns deleted count
    async fn delete_many(&self, collection: &str, filter: &Filter) -> DbResult<usize>;

    /// Create an index, or do nothing if an identical one already exists
    async fn ensure_index(&self, collection: &str, index: &IndexSpec) -> DbResult<()>;

    /// Drop an index by name
    async fn drop_index(&self, collection: &str, name: &str) -> DbResult<()>;

    /// List index definitions on a collection, ordered by name
    async fn list_indexes(&self, collection: &str) -> DbResult<Vec<IndexSpec>>;

    /// Check that the store is reachable
    async fn ping(&self) -> DbResult<()>;

    /// Store type identifier for logging
    fn db_type(&self) -> &'static str;
}
