//! Storage trait and SQLite implementation for the repository snapshot.

use chrono::NaiveDateTime;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

use crate::github::CachedRepository;

/// Timestamp layout used in the database.
const STORED_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Trait for snapshot storage backends.
///
/// The only mutation is a full replace; a backend must apply it
/// all-or-nothing.
pub trait RepositoryStorage: Send + Sync {
  /// Load the persisted snapshot in stored order.
  fn load_all(&self) -> Result<Vec<CachedRepository>>;

  /// Replace the persisted snapshot with `repos`.
  fn replace_all(&self, repos: &[CachedRepository]) -> Result<()>;
}

/// Storage implementation that doesn't persist anything.
/// Used when persistence is disabled - the snapshot lives in memory only.
pub struct NoopStorage;

impl RepositoryStorage for NoopStorage {
  fn load_all(&self) -> Result<Vec<CachedRepository>> {
    Ok(Vec::new())
  }

  fn replace_all(&self, _repos: &[CachedRepository]) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based snapshot storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open or create the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Database that lives only as long as this value.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
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
}

/// Schema for the snapshot table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    full_name TEXT NOT NULL,
    description TEXT,
    html_url TEXT NOT NULL,
    stargazers_count INTEGER NOT NULL,
    forks_count INTEGER NOT NULL,
    language TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_private INTEGER NOT NULL,
    is_fork INTEGER NOT NULL,
    -- order returned by the remote (most recently updated first)
    position INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_repositories_language ON repositories(language);
"#;

impl RepositoryStorage for SqliteStorage {
  fn load_all(&self) -> Result<Vec<CachedRepository>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT id, name, full_name, description, html_url, stargazers_count, forks_count,
                language, created_at, updated_at, is_private, is_fork
         FROM repositories
         ORDER BY position",
      )
      .map_err(|e| eyre!("Failed to prepare snapshot query: {}", e))?;

    let rows = stmt
      .query_map([], read_row)
      .map_err(|e| eyre!("Failed to query snapshot: {}", e))?;

    let mut repos = Vec::new();
    for row in rows {
      let row = row.map_err(|e| eyre!("Failed to read cached repository: {}", e))?;
      repos.push(row.into_repository()?);
    }

    Ok(repos)
  }

  fn replace_all(&self, repos: &[CachedRepository]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Rolled back on drop unless committed.
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM repositories", [])
      .map_err(|e| eyre!("Failed to clear snapshot: {}", e))?;

    {
      let mut insert = tx
        .prepare(
          "INSERT INTO repositories (id, name, full_name, description, html_url, stargazers_count,
                                     forks_count, language, created_at, updated_at, is_private,
                                     is_fork, position)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .map_err(|e| eyre!("Failed to prepare insert: {}", e))?;

      for (position, repo) in repos.iter().enumerate() {
        insert
          .execute(params![
            repo.id as i64,
            repo.name,
            repo.full_name,
            repo.description,
            repo.html_url,
            repo.stargazers_count as i64,
            repo.forks_count as i64,
            repo.language,
            format_timestamp(&repo.created_at),
            format_timestamp(&repo.updated_at),
            repo.is_private,
            repo.is_fork,
            position as i64,
          ])
          .map_err(|e| eyre!("Failed to store repository {}: {}", repo.full_name, e))?;
      }
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }
}

/// Raw column values; timestamps are parsed outside the rusqlite closure.
struct StoredRow {
  id: i64,
  name: String,
  full_name: String,
  description: Option<String>,
  html_url: String,
  stargazers_count: i64,
  forks_count: i64,
  language: String,
  created_at: String,
  updated_at: String,
  is_private: bool,
  is_fork: bool,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
  Ok(StoredRow {
    id: row.get(0)?,
    name: row.get(1)?,
    full_name: row.get(2)?,
    description: row.get(3)?,
    html_url: row.get(4)?,
    stargazers_count: row.get(5)?,
    forks_count: row.get(6)?,
    language: row.get(7)?,
    created_at: row.get(8)?,
    updated_at: row.get(9)?,
    is_private: row.get(10)?,
    is_fork: row.get(11)?,
  })
}

impl StoredRow {
  fn into_repository(self) -> Result<CachedRepository> {
    Ok(CachedRepository {
      id: self.id as u64,
      name: self.name,
      full_name: self.full_name,
      description: self.description,
      html_url: self.html_url,
      stargazers_count: self.stargazers_count.max(0) as u64,
      forks_count: self.forks_count.max(0) as u64,
      language: self.language,
      created_at: parse_timestamp(&self.created_at)?,
      updated_at: parse_timestamp(&self.updated_at)?,
      is_private: self.is_private,
      is_fork: self.is_fork,
    })
  }
}

fn format_timestamp(t: &NaiveDateTime) -> String {
  t.format(STORED_TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, STORED_TIMESTAMP_FORMAT)
    .map_err(|e| eyre!("Failed to parse stored timestamp '{}': {}", s, e))
}
