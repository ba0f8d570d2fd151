//! Storage backends: SQLite for durability, an in-memory map for tests.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use super::traits::{CacheStorage, EntryMeta, StoreError};
use crate::types::StoredResponse;

/// Schema for the response cache. One row per (store, key); the URL column
/// exists so stores can be enumerated and refreshed without reversing the
/// key hash.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    store TEXT NOT NULL,
    key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    byte_size INTEGER NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (store, key)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_age
    ON response_cache(store, stored_at);
"#;

/// SQLite-backed store collection.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache database at the default location.
  pub fn open() -> Result<Self, StoreError> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open the cache database at an explicit path, creating parent
  /// directories as needed.
  pub fn open_at(path: &std::path::Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| StoreError::Backend(format!("failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StoreError::Backend(format!("failed to open cache database at {}: {}", path.display(), e))
    })?;

    Self::with_connection(conn)
  }

  /// Open an in-process database, used by tests.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| StoreError::Backend(format!("failed to open in-memory database: {}", e)))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Default database path under the platform data directory.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Backend("could not determine data directory".to_string()))?;

    Ok(data_dir.join("glowcache").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| StoreError::Backend(format!("failed to run cache migrations: {}", e)))?;
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))
  }
}

/// Maps SQLITE_FULL onto the quota variant so the mediator can skip the
/// write instead of failing the request.
fn map_sqlite_error(e: rusqlite::Error) -> StoreError {
  if let rusqlite::Error::SqliteFailure(err, _) = &e {
    if err.code == rusqlite::ErrorCode::DiskFull {
      return StoreError::QuotaExceeded;
    }
  }
  StoreError::Backend(e.to_string())
}

fn parse_stored_at(key: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|_| StoreError::MalformedEntry(key.to_string()))
}

impl CacheStorage for SqliteStorage {
  fn get(&self, store: &str, key: &str) -> Result<Option<StoredResponse>, StoreError> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, stored_at FROM response_cache
         WHERE store = ? AND key = ?",
      )
      .map_err(map_sqlite_error)?;

    let row: (u16, String, Vec<u8>, String) = match stmt
      .query_row(params![store, key], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      }) {
      Ok(row) => row,
      Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
      Err(rusqlite::Error::InvalidColumnType(..))
      | Err(rusqlite::Error::FromSqlConversionFailure(..)) => {
        return Err(StoreError::MalformedEntry(key.to_string()))
      }
      Err(e) => return Err(map_sqlite_error(e)),
    };

    let (status, headers_json, body, stored_at_raw) = row;
    let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)
      .map_err(|_| StoreError::MalformedEntry(key.to_string()))?;
    let stored_at = parse_stored_at(key, &stored_at_raw)?;
    Ok(Some(StoredResponse {
      status,
      headers,
      body,
      stored_at,
    }))
  }

  fn put(
    &self,
    store: &str,
    key: &str,
    url: &str,
    response: &StoredResponse,
  ) -> Result<(), StoreError> {
    let conn = self.lock()?;

    let headers_json = serde_json::to_string(&response.headers)
      .map_err(|e| StoreError::Backend(format!("failed to serialize headers: {}", e)))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache
           (store, key, url, status, headers, body, byte_size, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          store,
          key,
          url,
          response.status,
          headers_json,
          response.body,
          response.byte_size(),
          response.stored_at.to_rfc3339(),
        ],
      )
      .map_err(map_sqlite_error)?;

    Ok(())
  }

  fn delete(&self, store: &str, key: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn
      .execute(
        "DELETE FROM response_cache WHERE store = ? AND key = ?",
        params![store, key],
      )
      .map_err(map_sqlite_error)?;
    Ok(())
  }

  fn keys(&self, store: &str) -> Result<Vec<EntryMeta>, StoreError> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT key, url, byte_size, stored_at FROM response_cache WHERE store = ?")
      .map_err(map_sqlite_error)?;

    let rows = stmt
      .query_map(params![store], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, i64>(2)?,
          row.get::<_, String>(3)?,
        ))
      })
      .map_err(map_sqlite_error)?;

    let mut metas = Vec::new();
    for row in rows {
      let (key, url, byte_size, stored_at_raw) = row.map_err(map_sqlite_error)?;
      // A row with an unreadable timestamp still counts for enumeration;
      // it sorts oldest so eviction reclaims it first.
      let stored_at = parse_stored_at(&key, &stored_at_raw)
        .unwrap_or_else(|_| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_else(Utc::now));
      metas.push(EntryMeta {
        key,
        url,
        byte_size: byte_size.max(0) as u64,
        stored_at,
      });
    }

    Ok(metas)
  }

  fn total_bytes(&self, store: &str) -> Result<u64, StoreError> {
    let conn = self.lock()?;
    let total: i64 = conn
      .query_row(
        "SELECT COALESCE(SUM(byte_size), 0) FROM response_cache WHERE store = ?",
        params![store],
        |row| row.get(0),
      )
      .map_err(map_sqlite_error)?;
    Ok(total.max(0) as u64)
  }

  fn entry_count(&self, store: &str) -> Result<u64, StoreError> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM response_cache WHERE store = ?",
        params![store],
        |row| row.get(0),
      )
      .map_err(map_sqlite_error)?;
    Ok(count.max(0) as u64)
  }

  fn list_stores(&self) -> Result<Vec<String>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT DISTINCT store FROM response_cache ORDER BY store")
      .map_err(map_sqlite_error)?;

    let rows = stmt
      .query_map([], |row| row.get::<_, String>(0))
      .map_err(map_sqlite_error)?;

    rows
      .collect::<Result<Vec<_>, _>>()
      .map_err(map_sqlite_error)
  }

  fn delete_store(&self, store: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM response_cache WHERE store = ?", params![store])
      .map_err(map_sqlite_error)?;
    Ok(())
  }
}

/// In-memory store collection for tests and ephemeral workers. Fills the
/// alternate-backend slot the SQLite implementation leaves open.
#[derive(Default)]
pub struct MemoryStorage {
  stores: Mutex<HashMap<String, HashMap<String, (String, StoredResponse)>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(
    &self,
  ) -> Result<std::sync::MutexGuard<'_, HashMap<String, HashMap<String, (String, StoredResponse)>>>, StoreError>
  {
    self
      .stores
      .lock()
      .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, store: &str, key: &str) -> Result<Option<StoredResponse>, StoreError> {
    let stores = self.lock()?;
    Ok(
      stores
        .get(store)
        .and_then(|s| s.get(key))
        .map(|(_, resp)| resp.clone()),
    )
  }

  fn put(
    &self,
    store: &str,
    key: &str,
    url: &str,
    response: &StoredResponse,
  ) -> Result<(), StoreError> {
    let mut stores = self.lock()?;
    stores
      .entry(store.to_string())
      .or_default()
      .insert(key.to_string(), (url.to_string(), response.clone()));
    Ok(())
  }

  fn delete(&self, store: &str, key: &str) -> Result<(), StoreError> {
    let mut stores = self.lock()?;
    if let Some(s) = stores.get_mut(store) {
      s.remove(key);
    }
    Ok(())
  }

  fn keys(&self, store: &str) -> Result<Vec<EntryMeta>, StoreError> {
    let stores = self.lock()?;
    Ok(
      stores
        .get(store)
        .map(|s| {
          s.iter()
            .map(|(key, (url, resp))| EntryMeta {
              key: key.clone(),
              url: url.clone(),
              byte_size: resp.byte_size(),
              stored_at: resp.stored_at,
            })
            .collect()
        })
        .unwrap_or_default(),
    )
  }

  fn total_bytes(&self, store: &str) -> Result<u64, StoreError> {
    let stores = self.lock()?;
    Ok(
      stores
        .get(store)
        .map(|s| s.values().map(|(_, resp)| resp.byte_size()).sum())
        .unwrap_or(0),
    )
  }

  fn entry_count(&self, store: &str) -> Result<u64, StoreError> {
    let stores = self.lock()?;
    Ok(stores.get(store).map(|s| s.len() as u64).unwrap_or(0))
  }

  fn list_stores(&self) -> Result<Vec<String>, StoreError> {
    let stores = self.lock()?;
    let mut names: Vec<String> = stores
      .iter()
      .filter(|(_, s)| !s.is_empty())
      .map(|(name, _)| name.clone())
      .collect();
    names.sort();
    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<(), StoreError> {
    let mut stores = self.lock()?;
    stores.remove(store);
    Ok(())
  }
}
