//! SQLite-backed local cache.
//!
//! Tables and their owners:
//! - `tickets_cache` ([`tickets`]) - written only by the ticket sync
//! - `staff_logs_cache` ([`staff_logs`]) - written only by the staff log sync
//! - `ticket_sync_log` ([`sync_runs`]) - append-only audit of sync runs
//! - `ticketing_system_config` ([`settings`]) - active credential

pub mod schema;
pub mod settings;
pub mod staff_logs;
pub mod sync_runs;
pub mod tickets;

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

/// Database connection wrapper for the local cache
pub struct Database {
  conn: Mutex<Connection>,
}

/// SQL name of the Unicode lowercase function used by text search
pub const FOLD_CASE_FN: &str = "fold_case";

/// SQLite's `lower()` and `LIKE` only fold ASCII letters.
fn register_functions(conn: &Connection) -> Result<()> {
  conn
    .create_scalar_function(
      FOLD_CASE_FN,
      1,
      FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
      |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )
    .map_err(|e| eyre!("Failed to register {}: {}", FOLD_CASE_FN, e))
}

impl Database {
  /// Open or create the database at `path`
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    register_functions(&conn)?;
    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;
    Ok(db)
  }

  /// Get the default database path
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("ticket-sync").join("cache.db"))
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  /// Lock the connection for a group of statements.
  ///
  /// Never hold the guard across an `.await`.
  pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Timestamps are stored as RFC 3339 UTC with millisecond precision so that
/// text ordering matches time ordering.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn format_optional_timestamp(ts: Option<&DateTime<Utc>>) -> Option<String> {
  ts.map(format_timestamp)
}

pub(crate) fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
  let raw: String = row.get(idx)?;
  parse_stored_timestamp(idx, &raw)
}

pub(crate) fn optional_timestamp_column(
  row: &rusqlite::Row<'_>,
  idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
  let raw: Option<String> = row.get(idx)?;
  raw.map(|raw| parse_stored_timestamp(idx, &raw)).transpose()
}

fn parse_stored_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a text column into one of the string-backed enums.
pub(crate) fn enum_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
  T: FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  let raw: String = row.get(idx)?;
  raw
    .parse()
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a JSON text column.
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
  row: &rusqlite::Row<'_>,
  idx: usize,
) -> rusqlite::Result<T> {
  let raw: String = row.get(idx)?;
  serde_json::from_str(&raw)
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
