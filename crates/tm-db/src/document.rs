//! Documents, filters and index definitions

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored document: a JSON object keyed by field name
pub type Document = serde_json::Map<String, Value>;

/// Name of the primary identifier field present on every stored document
pub const ID_FIELD: &str = "_id";

/// Convert a JSON value into a [`Document`], rejecting non-objects.
pub fn into_document(value: Value) -> DbResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DbError::InvalidDocument(format!(
            "expected a JSON object, found {other}"
        ))),
    }
}

/// Read the `_id` of a document as a string.
///
/// String and integer ids are accepted; any other type is rejected.
pub fn document_id(doc: &Document) -> DbResult<Option<String>> {
    match doc.get(ID_FIELD) {
        None => Ok(None),
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => Ok(Some(n.to_string())),
        Some(other) => Err(DbError::InvalidDocument(format!(
            "unsupported {ID_FIELD} value: {other}"
        ))),
    }
}

/// Top-level field equality filter.
///
/// An empty filter matches every document. A field that is absent from a
/// document only matches a `null` condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Document,
}

impl Filter {
    /// Filter matching every document
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter matching documents where `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    /// Filter matching the document with the given `_id`
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::eq(ID_FIELD, id.into())
    }

    /// Add another equality condition
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    /// Whether the filter has no conditions
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether `doc` satisfies every condition
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| doc.get(field).unwrap_or(&Value::Null) == expected)
    }
}

impl From<Document> for Filter {
    fn from(conditions: Document) -> Self {
        Self { conditions }
    }
}

/// Named index definition on one or more top-level fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, unique within its collection
    pub name: String,
    /// Indexed fields, in order
    pub keys: Vec<String>,
    /// Reject documents that share the same key values
    #[serde(default)]
    pub unique: bool,
}

impl IndexSpec {
    /// Non-unique index over `keys`
    pub fn new<I, S>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Mark the index as unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Values of the indexed fields in `doc`; missing fields read as `null`.
    pub fn key_of(&self, doc: &Document) -> Vec<Value> {
        self.keys
            .iter()
            .map(|k| doc.get(k).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub(crate) fn validate(&self) -> DbResult<()> {
        if self.name.trim().is_empty() {
            return Err(DbError::InvalidDocument(
                "index name cannot be empty".to_string(),
            ));
        }
        if self.keys.is_empty() || self.keys.iter().any(|k| k.is_empty()) {
            return Err(DbError::InvalidDocument(format!(
                "index '{}' must name at least one non-empty field",
                self.name
            )));
        }
        Ok(())
    }
}
