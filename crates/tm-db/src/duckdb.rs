//! DuckDB document store implementation
//!
//! Documents are stored as JSON bodies in a single `tm_documents` table keyed
//! by `(collection, id)`. Index definitions live in `tm_indexes`; unique
//! indexes are enforced on every write.

use crate::document::{document_id, Document, Filter, IndexSpec, ID_FIELD};
use crate::error::{DbError, DbResult};
use crate::traits::DocumentStore;
use async_trait::async_trait;
use duckdb::Connection;
use serde_json::Value;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

const BOOTSTRAP_SQL: &str = "
CREATE SEQUENCE IF NOT EXISTS tm_document_seq START 1;
CREATE TABLE IF NOT EXISTS tm_documents (
    collection VARCHAR NOT NULL,
    id         VARCHAR NOT NULL,
    body       VARCHAR NOT NULL,
    seq        BIGINT  NOT NULL DEFAULT nextval('tm_document_seq'),
    PRIMARY KEY (collection, id)
);
CREATE TABLE IF NOT EXISTS tm_indexes (
    collection VARCHAR NOT NULL,
    name       VARCHAR NOT NULL,
    keys       VARCHAR NOT NULL,
    is_unique  BOOLEAN NOT NULL,
    PRIMARY KEY (collection, name)
);";

/// Busy timeout used when the caller does not pick one
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const BUSY_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// DuckDB-backed document store
///
/// All operations serialize on the store's mutex, so each trait call is
/// atomic with respect to every other call on the same store.
///
/// A file-backed store opens a fresh connection for each call and closes it
/// before returning. DuckDB locks the whole file while a connection is open,
/// so holding one for the life of the store would shut every other process
/// out, including read-only `status` calls. When another process has the file
/// open, the call retries until the busy timeout and then fails with
/// [`DbError::Busy`].
pub struct DuckDbStore {
    target: Target,
}

enum Target {
    Memory(Mutex<Connection>),
    File {
        path: PathBuf,
        busy_timeout: Duration,
        gate: Mutex<()>,
    },
}

/// Connection borrowed for a single store call
enum ConnGuard<'a> {
    Shared(MutexGuard<'a, Connection>),
    // Field order matters: the connection closes before the gate opens
    Fresh(Connection, MutexGuard<'a, ()>),
}

impl Deref for ConnGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            ConnGuard::Shared(conn) => &**conn,
            ConnGuard::Fresh(conn, _) => conn,
        }
    }
}

impl DuckDbStore {
    /// Create a new in-memory store
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        bootstrap(&conn)?;
        Ok(Self {
            target: Target::Memory(Mutex::new(conn)),
        })
    }

    /// Open (or create) a store backed by the DuckDB file at `path`
    pub fn from_path(path: &Path) -> DbResult<Self> {
        Self::from_path_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Like [`DuckDbStore::from_path`], waiting at most `busy_timeout` for
    /// another process to release the file on each call
    pub fn from_path_with_timeout(path: &Path, busy_timeout: Duration) -> DbResult<Self> {
        let conn = open_file(path, busy_timeout)?;
        bootstrap(&conn)?;
        drop(conn);
        log::debug!("Opened DuckDB document store at {}", path.display());
        Ok(Self {
            target: Target::File {
                path: path.to_path_buf(),
                busy_timeout,
                gate: Mutex::new(()),
            },
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        Self::open(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Create from path string with an explicit busy timeout
    pub fn open(path: &str, busy_timeout: Duration) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path_with_timeout(Path::new(path), busy_timeout)
        }
    }

    fn conn(&self) -> DbResult<ConnGuard<'_>> {
        match &self.target {
            Target::Memory(conn) => conn
                .lock()
                .map(ConnGuard::Shared)
                .map_err(|e| DbError::MutexPoisoned(e.to_string())),
            Target::File {
                path,
                busy_timeout,
                gate,
            } => {
                let gate = gate
                    .lock()
                    .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
                let conn = open_file(path, *busy_timeout)?;
                Ok(ConnGuard::Fresh(conn, gate))
            }
        }
    }

    fn insert_one_sync(&self, collection: &str, mut doc: Document) -> DbResult<String> {
        let conn = self.conn()?;
        let id = match document_id(&doc)? {
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        if document_exists(&conn, collection, &id)? {
            return Err(DbError::DuplicateId {
                collection: collection.to_string(),
                id,
            });
        }
        check_unique(&conn, collection, &doc, &id)?;

        let body = serde_json::to_string(&doc)?;
        conn.execute(
            "INSERT INTO tm_documents (collection, id, body) VALUES (?, ?, ?)",
            duckdb::params![collection, id, body],
        )?;
        Ok(id)
    }

    fn find_sync(&self, collection: &str, filter: &Filter) -> DbResult<Vec<Document>> {
        let conn = self.conn()?;
        Ok(load_collection(&conn, collection)?
            .into_iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(_, doc)| doc)
            .collect())
    }

    fn update_many_sync(&self, collection: &str, filter: &Filter, set: &Document) -> DbResult<usize> {
        if set.contains_key(ID_FIELD) {
            return Err(DbError::InvalidDocument(format!(
                "{ID_FIELD} cannot be modified by an update"
            )));
        }
        let conn = self.conn()?;
        let matching: Vec<(String, Document)> = load_collection(&conn, collection)?
            .into_iter()
            .filter(|(_, doc)| filter.matches(doc))
            .collect();

        with_transaction(&conn, |conn| {
            for (id, doc) in &matching {
                let mut updated = doc.clone();
                for (field, value) in set {
                    updated.insert(field.clone(), value.clone());
                }
                check_unique(conn, collection, &updated, id)?;
                write_body(conn, collection, id, &updated)?;
            }
            Ok(matching.len())
        })
    }

    fn replace_one_sync(&self, collection: &str, filter: &Filter, mut doc: Document) -> DbResult<bool> {
        let conn = self.conn()?;
        let Some((id, _)) = load_collection(&conn, collection)?
            .into_iter()
            .find(|(_, existing)| filter.matches(existing))
        else {
            return Ok(false);
        };

        if let Some(new_id) = document_id(&doc)? {
            if new_id != id {
                return Err(DbError::InvalidDocument(format!(
                    "replacement changes {ID_FIELD} from '{id}' to '{new_id}'"
                )));
            }
        }
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        check_unique(&conn, collection, &doc, &id)?;
        write_body(&conn, collection, &id, &doc)?;
        Ok(true)
    }

    fn delete_many_sync(&self, collection: &str, filter: &Filter) -> DbResult<usize> {
        let conn = self.conn()?;
        if filter.is_empty() {
            let deleted = conn.execute(
                "DELETE FROM tm_documents WHERE collection = ?",
                duckdb::params![collection],
            )?;
            return Ok(deleted);
        }

        let ids: Vec<String> = load_collection(&conn, collection)?
            .into_iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id)
            .collect();

        with_transaction(&conn, |conn| {
            for id in &ids {
                conn.execute(
                    "DELETE FROM tm_documents WHERE collection = ? AND id = ?",
                    duckdb::params![collection, id],
                )?;
            }
            Ok(ids.len())
        })
    }

    fn ensure_index_sync(&self, collection: &str, index: &IndexSpec) -> DbResult<()> {
        index.validate()?;
        let conn = self.conn()?;

        if let Some(existing) = load_indexes(&conn, collection)?
            .into_iter()
            .find(|i| i.name == index.name)
        {
            if &existing == index {
                return Ok(());
            }
            return Err(DbError::IndexConflict {
                collection: collection.to_string(),
                name: index.name.clone(),
            });
        }

        if index.unique {
            let docs = load_collection(&conn, collection)?;
            let mut seen = std::collections::HashSet::new();
            for (_, doc) in &docs {
                let key = serde_json::to_string(&index.key_of(doc))?;
                if !seen.insert(key) {
                    return Err(DbError::UniqueViolation {
                        collection: collection.to_string(),
                        index: index.name.clone(),
                    });
                }
            }
        }

        let keys = serde_json::to_string(&index.keys)?;
        conn.execute(
            "INSERT INTO tm_indexes (collection, name, keys, is_unique) VALUES (?, ?, ?, ?)",
            duckdb::params![collection, index.name, keys, index.unique],
        )?;
        Ok(())
    }

    fn drop_index_sync(&self, collection: &str, name: &str) -> DbResult<()> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM tm_indexes WHERE collection = ? AND name = ?",
            duckdb::params![collection, name],
        )?;
        if removed == 0 {
            return Err(DbError::IndexNotFound {
                collection: collection.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn ping_sync(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for DuckDbStore {
    async fn insert_one(&self, collection: &str, doc: Document) -> DbResult<String> {
        self.insert_one_sync(collection, doc)
    }

    async fn find(&self, collection: &str, filter: &Filter) -> DbResult<Vec<Document>> {
        self.find_sync(collection, filter)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Document,
    ) -> DbResult<usize> {
        self.update_many_sync(collection, filter, set)
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
    ) -> DbResult<bool> {
        self.replace_one_sync(collection, filter, doc)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> DbResult<usize> {
        self.delete_many_sync(collection, filter)
    }

    async fn ensure_index(&self, collection: &str, index: &IndexSpec) -> DbResult<()> {
        self.ensure_index_sync(collection, index)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> DbResult<()> {
        self.drop_index_sync(collection, name)
    }

    async fn list_indexes(&self, collection: &str) -> DbResult<Vec<IndexSpec>> {
        let conn = self.conn()?;
        load_indexes(&conn, collection)
    }

    async fn ping(&self) -> DbResult<()> {
        self.ping_sync()
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

fn bootstrap(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(BOOTSTRAP_SQL)
        .map_err(|e| DbError::ConnectionError(format!("failed to prepare storage: {e}")))
}

/// Open `path`, retrying while another process holds DuckDB's file lock.
fn open_file(path: &Path, busy_timeout: Duration) -> DbResult<Connection> {
    let deadline = Instant::now() + busy_timeout;
    loop {
        match Connection::open(path) {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                let detail = e.to_string();
                if !is_lock_conflict(&detail) {
                    return Err(DbError::ConnectionError(format!(
                        "{detail}: {}",
                        path.display()
                    )));
                }
                if Instant::now() >= deadline {
                    return Err(DbError::Busy {
                        path: path.display().to_string(),
                        detail,
                    });
                }
                log::trace!("{} is locked, retrying", path.display());
                thread::sleep(BUSY_RETRY_INTERVAL);
            }
        }
    }
}

/// Whether an open error means another process has the file open
fn is_lock_conflict(message: &str) -> bool {
    message.contains("Could not set lock") || message.contains("Conflicting lock")
}

/// Execute `body` within a `BEGIN` / `COMMIT` transaction, rolling back on
/// error.
fn with_transaction<F, T>(conn: &Connection, body: F) -> DbResult<T>
where
    F: FnOnce(&Connection) -> DbResult<T>,
{
    conn.execute_batch("BEGIN TRANSACTION")?;

    let result = body(conn);

    match &result {
        Ok(_) => {
            if let Err(commit_err) = conn.execute_batch("COMMIT") {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(DbError::ExecutionError(format!(
                    "COMMIT failed: {commit_err}"
                )));
            }
        }
        Err(_) => {
            let _ = conn.execute_batch("ROLLBACK");
        }
    }
    result
}

fn document_exists(conn: &Connection, collection: &str, id: &str) -> DbResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tm_documents WHERE collection = ? AND id = ?",
        duckdb::params![collection, id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn write_body(conn: &Connection, collection: &str, id: &str, doc: &Document) -> DbResult<()> {
    let body = serde_json::to_string(doc)?;
    conn.execute(
        "UPDATE tm_documents SET body = ? WHERE collection = ? AND id = ?",
        duckdb::params![body, collection, id],
    )?;
    Ok(())
}

/// Load `(id, document)` pairs for a collection in insertion order.
fn load_collection(conn: &Connection, collection: &str) -> DbResult<Vec<(String, Document)>> {
    let mut stmt =
        conn.prepare("SELECT id, body FROM tm_documents WHERE collection = ? ORDER BY seq")?;
    let rows = stmt
        .query_map(duckdb::params![collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, body)| match serde_json::from_str::<Value>(&body)? {
            Value::Object(doc) => Ok((id, doc)),
            _ => Err(DbError::InvalidDocument(format!(
                "stored body for '{id}' in '{collection}' is not an object"
            ))),
        })
        .collect()
}

fn load_indexes(conn: &Connection, collection: &str) -> DbResult<Vec<IndexSpec>> {
    let mut stmt = conn.prepare(
        "SELECT name, keys, is_unique FROM tm_indexes WHERE collection = ? ORDER BY name",
    )?;
    let rows = stmt
        .query_map(duckdb::params![collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(name, keys, unique)| {
            Ok(IndexSpec {
                name,
                keys: serde_json::from_str(&keys)?,
                unique,
            })
        })
        .collect()
}

/// Reject `doc` if any unique index already holds its key values under a
/// different `_id`.
fn check_unique(conn: &Connection, collection: &str, doc: &Document, id: &str) -> DbResult<()> {
    let unique: Vec<IndexSpec> = load_indexes(conn, collection)?
        .into_iter()
        .filter(|i| i.unique)
        .collect();
    if unique.is_empty() {
        return Ok(());
    }

    let existing = load_collection(conn, collection)?;
    for index in &unique {
        let key = index.key_of(doc);
        let clash = existing
            .iter()
            .any(|(other_id, other)| other_id != id && index.key_of(other) == key);
        if clash {
            return Err(DbError::UniqueViolation {
                collection: collection.to_string(),
                index: index.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
