//! Document stores: where the raw records live.

use crate::data::document::Document;
use crate::data::frame::DataFrame;
use crate::error::StageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// A collection-oriented record store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document of `collection`, in insertion order.
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Document>, StageError>;

    /// Append documents to `collection`; returns how many were written.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>)
    -> Result<usize, StageError>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// SqliteDocumentStore
// ---------------------------------------------------------------------------

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    database TEXT NOT NULL,
    collection TEXT NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS documents_namespace ON documents (database, collection);";

/// Documents stored as JSON text rows of a single `documents` table.
///
/// One file holds any number of logical databases; every collection lives
/// inside the database the store was opened for.
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<rusqlite::Connection>>,
    location: String,
    database: String,
}

/// Where a connection string points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    Memory,
    File(PathBuf),
}

impl SqliteTarget {
    /// Accepts `sqlite://<path>`, a plain path, or `memory` / `:memory:`.
    pub fn parse(url: &str) -> Result<Self, StageError> {
        let rest = url.strip_prefix("sqlite://").unwrap_or(url).trim();
        if rest.is_empty() {
            return Err(StageError::config("empty document store connection string"));
        }
        if rest.contains("://") {
            return Err(StageError::config(format!(
                "unsupported document store scheme in '{url}'"
            )));
        }
        Ok(match rest {
            "memory" | ":memory:" => Self::Memory,
            path => Self::File(PathBuf::from(path)),
        })
    }
}

impl SqliteDocumentStore {
    /// Open an existing database file.
    pub fn connect(url: &str, database: &str) -> Result<Self, StageError> {
        match SqliteTarget::parse(url)? {
            SqliteTarget::Memory => Self::open_in_memory(database),
            SqliteTarget::File(path) => {
                if !path.exists() {
                    return Err(StageError::source_unavailable(format!(
                        "database {} does not exist",
                        path.display()
                    )));
                }
                Self::open_file(&path, database)
            }
        }
    }

    /// Open a database file, creating it (and its directory) if needed.
    pub fn create(url: &str, database: &str) -> Result<Self, StageError> {
        match SqliteTarget::parse(url)? {
            SqliteTarget::Memory => Self::open_in_memory(database),
            SqliteTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Self::open_file(&path, database)
            }
        }
    }

    pub fn open_in_memory(database: &str) -> Result<Self, StageError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Self::init(conn, "sqlite::memory".to_string(), database)
    }

    fn open_file(path: &Path, database: &str) -> Result<Self, StageError> {
        let conn = rusqlite::Connection::open(path).map_err(|e| {
            StageError::source_unavailable(format!("cannot open {}: {e}", path.display()))
        })?;
        Self::init(conn, format!("sqlite://{}", path.display()), database)
    }

    fn init(
        conn: rusqlite::Connection,
        location: String,
        database: &str,
    ) -> Result<Self, StageError> {
        if database.trim().is_empty() {
            return Err(StageError::config("document store database name is empty"));
        }
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
            database: database.to_string(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, StageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StageError::source_unavailable("SQLite connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StageError::source_unavailable(format!("SQLite task join error: {e}")))?
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Document>, StageError> {
        let collection = collection.to_string();
        let database = self.database.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM documents WHERE database = ?1 AND collection = ?2 ORDER BY id",
            )?;
            let bodies = stmt
                .query_map([&database, &collection], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            bodies
                .iter()
                .enumerate()
                .map(|(i, body)| -> Result<Document, StageError> {
                    match serde_json::from_str::<serde_json::Value>(body)? {
                        serde_json::Value::Object(map) => Ok(Document::from_json_object(&map)),
                        _ => Err(StageError::ingestion(format!(
                            "document {i} of '{collection}' is not a JSON object"
                        ))),
                    }
                })
                .collect()
        })
        .await
    }

    async fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<usize, StageError> {
        let collection = collection.to_string();
        let database = self.database.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO documents (database, collection, body) VALUES (?1, ?2, ?3)",
                )?;
                for doc in &docs {
                    stmt.execute([
                        database.as_str(),
                        collection.as_str(),
                        doc.to_json().to_string().as_str(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(docs.len())
        })
        .await
    }

    fn describe(&self) -> String {
        format!("{}#{}", self.location, self.database)
    }
}

// ---------------------------------------------------------------------------
// MemoryDocumentStore
// ---------------------------------------------------------------------------

/// Process-local store, mostly for tests.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(collection: &str, docs: Vec<Document>) -> Self {
        Self {
            collections: RwLock::new(HashMap::from([(collection.to_string(), docs)])),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Document>, StageError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<usize, StageError> {
        let n = docs.len();
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
        Ok(n)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Read a CSV file as documents (one per row), for seeding a collection.
/// Cells of `text_columns` are stored as text exactly as written.
pub fn documents_from_csv(
    path: &Path,
    text_columns: &[String],
) -> Result<Vec<Document>, StageError> {
    Ok(DataFrame::read_csv_with_text(path, text_columns)?.to_documents())
}
