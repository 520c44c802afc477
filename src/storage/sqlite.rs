//! SQLite-backed registry persistence and response cache.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::codes::CodeRecord;
use crate::error::PersistenceError;

use super::traits::{PersistenceStore, RegistrySnapshot, ResponseCache};

/// Schema for the registry and cache tables.
const SCHEMA: &str = r#"
-- Site registry, stored as one JSON document
CREATE TABLE IF NOT EXISTS registry (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    data TEXT NOT NULL,
    saved_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Last response per site key (serialized JSON)
CREATE TABLE IF NOT EXISTS code_cache (
    site_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    issued_at TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite storage shared between the registry and the scheduler.
///
/// Calls run on the blocking pool so the event loop never waits on disk.
#[derive(Clone)]
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
  /// Open (or create) the database at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self, PersistenceError> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        PersistenceError::Unavailable(format!("failed to create data directory: {}", e))
      })?;
    }

    let conn = Connection::open(&path).map_err(|e| {
      PersistenceError::Unavailable(format!(
        "failed to open database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self, PersistenceError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| PersistenceError::Unavailable(format!("failed to open database: {}", e)))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| PersistenceError::Unavailable(format!("failed to run migrations: {}", e)))?;

    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, PersistenceError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| {
        PersistenceError::Unavailable("could not determine data directory".to_string())
      })?;

    Ok(data_dir.join("codeboard").join("codeboard.db"))
  }

  /// Run `f` against the connection on the blocking pool.
  async fn with_conn<T, F>(&self, f: F) -> Result<T, PersistenceError>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, PersistenceError> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let conn = conn
        .lock()
        .map_err(|e| PersistenceError::Unavailable(format!("lock poisoned: {}", e)))?;
      f(&conn)
    })
    .await
    .map_err(|e| PersistenceError::Unavailable(format!("storage task failed: {}", e)))?
  }

  #[cfg(test)]
  pub(crate) async fn write_raw_registry(&self, data: &str) {
    let data = data.to_string();
    self
      .with_conn(move |conn| {
        conn
          .execute(
            "INSERT OR REPLACE INTO registry (id, data) VALUES (1, ?)",
            params![data],
          )
          .map_err(sql_err)?;
        Ok(())
      })
      .await
      .unwrap();
  }
}

fn sql_err(e: rusqlite::Error) -> PersistenceError {
  PersistenceError::Unavailable(e.to_string())
}

#[async_trait]
impl PersistenceStore for SqliteStore {
  async fn load(&self) -> Result<RegistrySnapshot, PersistenceError> {
    self
      .with_conn(|conn| {
        let data: Option<String> = conn
          .query_row("SELECT data FROM registry WHERE id = 1", [], |row| {
            row.get(0)
          })
          .optional()
          .map_err(sql_err)?;

        match data {
          Some(data) => serde_json::from_str(&data)
            .map_err(|e| PersistenceError::Corrupt(format!("registry: {}", e))),
          None => Ok(RegistrySnapshot::default()),
        }
      })
      .await
  }

  async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), PersistenceError> {
    let data = serde_json::to_string(snapshot)
      .map_err(|e| PersistenceError::Unavailable(format!("failed to serialize registry: {}", e)))?;

    self
      .with_conn(move |conn| {
        conn
          .execute(
            "INSERT OR REPLACE INTO registry (id, data, saved_at) VALUES (1, ?, datetime('now'))",
            params![data],
          )
          .map_err(sql_err)?;
        Ok(())
      })
      .await
  }
}

#[async_trait]
impl ResponseCache for SqliteStore {
  async fn get(&self, key: &str) -> Result<Option<CodeRecord>, PersistenceError> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        let data: Option<Vec<u8>> = conn
          .query_row(
            "SELECT data FROM code_cache WHERE site_key = ?",
            params![key],
            |row| row.get(0),
          )
          .optional()
          .map_err(sql_err)?;

        data
          .map(|d| {
            serde_json::from_slice(&d)
              .map_err(|e| PersistenceError::Corrupt(format!("cached code for {}: {}", key, e)))
          })
          .transpose()
      })
      .await
  }

  async fn put(&self, record: &CodeRecord) -> Result<(), PersistenceError> {
    let data = serde_json::to_vec(record)
      .map_err(|e| PersistenceError::Unavailable(format!("failed to serialize record: {}", e)))?;
    let key = record.key.clone();
    let issued_at = record.issued_at.to_rfc3339();
    let cached_at = Utc::now().to_rfc3339();

    self
      .with_conn(move |conn| {
        conn
          .execute(
            "INSERT OR REPLACE INTO code_cache (site_key, data, issued_at, cached_at)
             VALUES (?, ?, ?, ?)",
            params![key, data, issued_at, cached_at],
          )
          .map_err(sql_err)?;
        Ok(())
      })
      .await
  }

  async fn evict(&self, key: &str) -> Result<(), PersistenceError> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        conn
          .execute("DELETE FROM code_cache WHERE site_key = ?", params![key])
          .map_err(sql_err)?;
        Ok(())
      })
      .await
  }
}
