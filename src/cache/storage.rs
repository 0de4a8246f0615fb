//! Durable storage trait and its SQLite and in-memory implementations.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Errors raised by a durable store.
#[derive(Debug, Error)]
pub enum StorageError {
  /// The backing store has no room left for the write.
  #[error("storage is full")]
  Full,
  #[error("storage backend error: {0}")]
  Backend(String),
}

impl From<rusqlite::Error> for StorageError {
  fn from(e: rusqlite::Error) -> Self {
    match e {
      rusqlite::Error::SqliteFailure(ref ffi, _) if ffi.code == ErrorCode::DiskFull => {
        StorageError::Full
      }
      other => StorageError::Backend(other.to_string()),
    }
  }
}

impl<T> From<std::sync::PoisonError<T>> for StorageError {
  fn from(e: std::sync::PoisonError<T>) -> Self {
    StorageError::Backend(format!("Lock poisoned: {}", e))
  }
}

/// Trait for the persistent tier of the cache.
///
/// Values are opaque strings. `list_keys` must return keys in a stable
/// enumeration order; the cache evicts from the front of that order.
pub trait DurableStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

  fn list_keys(&self) -> Result<Vec<String>, StorageError>;

  fn remove_many(&self, keys: &[String]) -> Result<(), StorageError>;

  fn clear(&self) -> Result<(), StorageError>;
}

/// In-process store that keeps keys in write order.
///
/// Used when persistence is disabled. With a capacity set, writes of new keys
/// past that many items fail with [`StorageError::Full`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
  entries: Mutex<Vec<(String, String)>>,
  capacity: Option<usize>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  #[cfg(test)]
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      entries: Mutex::new(Vec::new()),
      capacity: Some(capacity),
    }
  }
}

impl DurableStore for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let entries = self.entries.lock()?;
    Ok(
      entries
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone()),
    )
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    let mut entries = self.entries.lock()?;
    entries.retain(|(k, _)| k != key);
    if let Some(capacity) = self.capacity {
      if entries.len() >= capacity {
        return Err(StorageError::Full);
      }
    }
    entries.push((key.to_string(), value.to_string()));
    Ok(())
  }

  fn list_keys(&self) -> Result<Vec<String>, StorageError> {
    let entries = self.entries.lock()?;
    Ok(entries.iter().map(|(k, _)| k.clone()).collect())
  }

  fn remove_many(&self, keys: &[String]) -> Result<(), StorageError> {
    let mut entries = self.entries.lock()?;
    entries.retain(|(k, _)| !keys.contains(k));
    Ok(())
  }

  fn clear(&self) -> Result<(), StorageError> {
    self.entries.lock()?.clear();
    Ok(())
  }
}

/// SQLite-based durable storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache database at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the cache database at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("pokedex").join("cache.db"))
  }
}

/// Schema for the key-value table. `seq` gives the enumeration order:
/// `INSERT OR REPLACE` deletes the old row, so a rewrite moves a key to the back.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_cache (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    value TEXT NOT NULL
);
"#;

impl DurableStore for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let conn = self.conn.lock()?;
    let mut stmt = conn.prepare("SELECT value FROM kv_cache WHERE key = ?")?;

    match stmt.query_row(params![key], |row| row.get::<_, String>(0)) {
      Ok(value) => Ok(Some(value)),
      Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    let conn = self.conn.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO kv_cache (key, value) VALUES (?, ?)",
      params![key, value],
    )?;
    Ok(())
  }

  fn list_keys(&self) -> Result<Vec<String>, StorageError> {
    let conn = self.conn.lock()?;
    let mut stmt = conn.prepare("SELECT key FROM kv_cache ORDER BY seq")?;
    let keys = stmt
      .query_map([], |row| row.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(keys)
  }

  fn remove_many(&self, keys: &[String]) -> Result<(), StorageError> {
    let mut conn = self.conn.lock()?;
    let tx = conn.transaction()?;
    {
      let mut stmt = tx.prepare("DELETE FROM kv_cache WHERE key = ?")?;
      for key in keys {
        stmt.execute(params![key])?;
      }
    }
    tx.commit()?;
    Ok(())
  }

  fn clear(&self) -> Result<(), StorageError> {
    let conn = self.conn.lock()?;
    conn.execute("DELETE FROM kv_cache", [])?;
    Ok(())
  }
}
