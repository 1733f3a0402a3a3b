//! Shared fixtures for engine unit tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tm_core::{Action, ActionResult};
use tm_db::{DbError, DbResult, Document, DocumentStore, Filter, IndexSpec};

/// Ordered log of executed actions
#[derive(Clone, Default)]
pub(crate) struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    /// Action that appends `label` to the trace
    pub(crate) fn action(&self, label: &str) -> TraceAction {
        TraceAction {
            trace: self.clone(),
            label: label.to_string(),
            failure: None,
        }
    }

    /// Action that appends `label` and then fails with `message`
    pub(crate) fn failing(&self, label: &str, message: &str) -> TraceAction {
        TraceAction {
            trace: self.clone(),
            label: label.to_string(),
            failure: Some(message.to_string()),
        }
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub(crate) struct TraceAction {
    trace: Trace,
    label: String,
    failure: Option<String>,
}

#[async_trait]
impl Action for TraceAction {
    async fn run(&self, _db: &dyn DocumentStore) -> ActionResult {
        // Let other tasks interleave, as a real store round trip would
        tokio::task::yield_now().await;
        self.trace.0.lock().unwrap().push(self.label.clone());
        match &self.failure {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }
}

/// Store whose every call fails as if the server were down
pub(crate) struct UnreachableStore;

fn refused<T>() -> DbResult<T> {
    Err(DbError::ConnectionError("connection refused".to_string()))
}

#[async_trait]
impl DocumentStore for UnreachableStore {
    async fn insert_one(&self, _collection: &str, _doc: Document) -> DbResult<String> {
        refused()
    }

    async fn find(&self, _collection: &str, _filter: &Filter) -> DbResult<Vec<Document>> {
        refused()
    }

    async fn update_many(
        &self,
        _collection: &str,
        _filter: &Filter,
        _set: &Document,
    ) -> DbResult<usize> {
        refused()
    }

    async fn replace_one(
        &self,
        _collection: &str,
        _filter: &Filter,
        _doc: Document,
    ) -> DbResult<bool> {
        refused()
    }

    async fn delete_many(&self, _collection: &str, _filter: &Filter) -> DbResult<usize> {
        refused()
    }

    async fn ensure_index(&self, _collection: &str, _index: &IndexSpec) -> DbResult<()> {
        refused()
    }

    async fn drop_index(&self, _collection: &str, _name: &str) -> DbResult<()> {
        refused()
    }

    async fn list_indexes(&self, _collection: &str) -> DbResult<Vec<IndexSpec>> {
        refused()
    }

    async fn ping(&self) -> DbResult<()> {
        refused()
    }

    fn db_type(&self) -> &'static str {
        "unreachable"
    }
}
