//! Local SQLite persistence for the active credential.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::CredentialError;
use crate::jira::Credential;

/// A saved credential and whether a remote copy was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
  pub credential: Credential,
  pub remembered: bool,
}

/// Single-row credential table in `$XDG_DATA_HOME/jtk/jtk.db`.
pub struct LocalStore {
  conn: Mutex<Connection>,
}

impl LocalStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self, CredentialError> {
    Self::open_at(&Self::default_path()?)
  }

  pub fn open_at(path: &Path) -> Result<Self, CredentialError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        CredentialError::Storage(format!("Failed to create data directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      CredentialError::Storage(format!(
        "Failed to open credential database at {}: {}",
        path.display(),
        e
      ))
    })?;
    Self::with_connection(conn)
  }

  #[cfg(test)]
  pub fn in_memory() -> Result<Self, CredentialError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, CredentialError> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn default_path() -> Result<PathBuf, CredentialError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| CredentialError::Storage("Could not determine data directory".into()))?;

    Ok(data_dir.join("jtk").join("jtk.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CredentialError> {
    self
      .conn
      .lock()
      .map_err(|e| CredentialError::Storage(format!("Lock poisoned: {}", e)))
  }

  fn run_migrations(&self) -> Result<(), CredentialError> {
    self.lock()?.execute_batch(SCHEMA)?;
    Ok(())
  }

  pub fn load(&self) -> Result<Option<StoredCredential>, CredentialError> {
    let conn = self.lock()?;
    let row = conn
      .query_row(
        "SELECT host, email, token, display_name, remembered FROM credentials WHERE id = 1",
        [],
        |row| {
          let mut credential = Credential::new(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
          );
          credential.display_name = row.get(3)?;
          Ok(StoredCredential {
            credential,
            remembered: row.get(4)?,
          })
        },
      )
      .optional()?;
    Ok(row)
  }

  pub fn save(&self, credential: &Credential, remembered: bool) -> Result<(), CredentialError> {
    self.lock()?.execute(
      "INSERT OR REPLACE INTO credentials (id, host, email, token, display_name, remembered, saved_at)
       VALUES (1, ?1, ?2, ?3, ?4, ?5, datetime('now'))",
      params![
        credential.host,
        credential.email,
        credential.token,
        credential.display_name,
        remembered
      ],
    )?;
    Ok(())
  }

  pub fn clear(&self) -> Result<(), CredentialError> {
    self.lock()?.execute("DELETE FROM credentials", [])?;
    Ok(())
  }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    host TEXT NOT NULL,
    email TEXT NOT NULL,
    token TEXT NOT NULL,
    display_name TEXT,
    remembered INTEGER NOT NULL DEFAULT 0,
    saved_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
