//! Local storage traits and their SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheKey, CachedResponse};
use crate::db::Database;
use crate::error::{OfflineError, Result};
use crate::net::Response;

/// Trait for response cache backends.
pub trait CacheStorage: Send + Sync {
  /// Get the cached response for a key in a namespace.
  fn get_response(&self, namespace: &str, key: &CacheKey) -> Result<Option<CachedResponse>>;

  /// Store (or overwrite) the response for a key in a namespace.
  fn store_response(&self, namespace: &str, key: &CacheKey, response: &Response) -> Result<()>;

  /// All namespaces that currently hold entries.
  fn namespaces(&self) -> Result<Vec<String>>;

  /// Drop every entry of a namespace, returning how many were removed.
  fn delete_namespace(&self, namespace: &str) -> Result<usize>;
}

/// Trait for the blob store behind the pending queue.
///
/// Each value is read and written whole.
pub trait QueueStore: Send + Sync {
  fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>>;

  fn write_blob(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Storage implementation used when no local database could be opened.
/// Caches always miss and the queue reports storage as unavailable.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get_response(&self, _namespace: &str, _key: &CacheKey) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn store_response(&self, _namespace: &str, _key: &CacheKey, _response: &Response) -> Result<()> {
    Ok(()) // Discard
  }

  fn namespaces(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn delete_namespace(&self, _namespace: &str) -> Result<usize> {
    Ok(0)
  }
}

impl QueueStore for NoopStorage {
  fn read_blob(&self, _key: &str) -> Result<Option<Vec<u8>>> {
    Err(OfflineError::storage("no local database"))
  }

  fn write_blob(&self, _key: &str, _value: &[u8]) -> Result<()> {
    Err(OfflineError::storage("no local database"))
  }
}

/// SQLite-based storage for both caches and the queue blob.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the storage file at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    let db = Database::open(path)?;
    Ok(Self {
      conn: Mutex::new(db.into_connection()),
    })
  }

  pub fn open_in_memory() -> Result<Self> {
    let db = Database::open_in_memory()?;
    Ok(Self {
      conn: Mutex::new(db.into_connection()),
    })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| OfflineError::storage(format!("Lock poisoned: {}", e)))
  }
}

impl CacheStorage for SqliteStorage {
  fn get_response(&self, namespace: &str, key: &CacheKey) -> Result<Option<CachedResponse>> {
    let conn = self.conn()?;

    let row: Option<(u16, Option<String>, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, content_type, body, cached_at FROM response_cache
         WHERE namespace = ? AND cache_key = ?",
        params![namespace, key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| OfflineError::storage(format!("Failed to read cached response: {}", e)))?;

    match row {
      Some((status, content_type, body, cached_at_str)) => Ok(Some(CachedResponse {
        response: Response::new(status, content_type, body),
        cached_at: parse_datetime(&cached_at_str)?,
      })),
      None => Ok(None),
    }
  }

  fn store_response(&self, namespace: &str, key: &CacheKey, response: &Response) -> Result<()> {
    let conn = self.conn()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache
           (namespace, cache_key, method, target, status, content_type, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          namespace,
          key.cache_hash(),
          key.method.as_str(),
          key.target,
          response.status,
          response.content_type,
          response.body,
        ],
      )
      .map_err(|e| OfflineError::storage(format!("Failed to store response: {}", e)))?;

    Ok(())
  }

  fn namespaces(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT namespace FROM response_cache ORDER BY namespace")
      .map_err(|e| OfflineError::storage(format!("Failed to prepare query: {}", e)))?;

    let namespaces = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| OfflineError::storage(format!("Failed to list namespaces: {}", e)))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| OfflineError::storage(format!("Failed to read namespace: {}", e)))?;

    Ok(namespaces)
  }

  fn delete_namespace(&self, namespace: &str) -> Result<usize> {
    let conn = self.conn()?;

    conn
      .execute(
        "DELETE FROM response_cache WHERE namespace = ?",
        params![namespace],
      )
      .map_err(|e| OfflineError::storage(format!("Failed to delete namespace: {}", e)))
  }
}

impl QueueStore for SqliteStorage {
  fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let conn = self.conn()?;

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| OfflineError::storage(format!("Failed to read {}: {}", key, e)))
  }

  fn write_blob(&self, key: &str, value: &[u8]) -> Result<()> {
    let conn = self.conn()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| OfflineError::storage(format!("Failed to write {}: {}", key, e)))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| OfflineError::storage(format!("Failed to parse datetime '{}': {}", s, e)))
}
