pub mod schema;

use rusqlite::Connection;
use std::path::Path;

use crate::error::{OfflineError, Result};

/// Database connection wrapper for the local store
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create the database at the given location
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| OfflineError::storage(format!("Failed to create database directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      OfflineError::storage(format!(
        "Failed to open database at {}: {}",
        path.display(),
        e
      ))
    })?;

    let db = Self { conn };
    db.run_migrations()?;

    Ok(db)
  }

  /// Open a private in-memory database
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| OfflineError::storage(format!("Failed to open in-memory database: {}", e)))?;

    let db = Self { conn };
    db.run_migrations()?;

    Ok(db)
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    self
      .conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| OfflineError::storage(format!("Failed to run migrations: {}", e)))?;
    Ok(())
  }

  pub fn into_connection(self) -> Connection {
    self.conn
  }
}
