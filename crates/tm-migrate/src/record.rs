//! Shared helpers for converting engine records to and from store documents.

use crate::error::{MigrateError, MigrateResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tm_db::{into_document, Document, ID_FIELD};

/// Serialize `value` into a document stored under `id`.
pub(crate) fn to_document<T: Serialize>(id: &str, value: &T) -> MigrateResult<Document> {
    let value = serde_json::to_value(value).map_err(tm_db::DbError::from)?;
    let mut doc = into_document(value)?;
    doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Ok(doc)
}

/// Deserialize a stored document, ignoring its `_id`.
pub(crate) fn from_document<T: DeserializeOwned>(collection: &str, doc: Document) -> MigrateResult<T> {
    let id = doc
        .get(ID_FIELD)
        .map(|v| v.to_string())
        .unwrap_or_else(|| "<no id>".to_string());
    serde_json::from_value(Value::Object(doc)).map_err(|e| MigrateError::CorruptRecord {
        collection: collection.to_string(),
        reason: format!("document {id}: {e}"),
    })
}
