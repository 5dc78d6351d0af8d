//! `ticketing_system_config`: the persisted credential and sync watermark.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};

use super::{format_timestamp, optional_timestamp_column, Database};

/// The active remote system configuration
#[derive(Clone, PartialEq, Eq)]
pub struct SystemConfig {
  pub id: i64,
  pub name: String,
  pub api_key: String,
  pub last_successful_sync: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for SystemConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SystemConfig")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("api_key", &"[REDACTED]")
      .field("last_successful_sync", &self.last_successful_sync)
      .finish()
  }
}

impl Database {
  /// The single active configuration row, if one exists.
  pub fn active_system_config(&self) -> Result<Option<SystemConfig>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT id, name, api_key, last_successful_sync FROM ticketing_system_config
         WHERE is_active = 1 ORDER BY updated_at DESC LIMIT 1",
        [],
        |row| {
          Ok(SystemConfig {
            id: row.get(0)?,
            name: row.get(1)?,
            api_key: row.get(2)?,
            last_successful_sync: optional_timestamp_column(row, 3)?,
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to read ticketing system config: {}", e))
  }

  /// Store a credential under `name` and make it the only active one.
  pub fn save_credential(&self, name: &str, api_key: &str) -> Result<i64> {
    let now = format_timestamp(&Utc::now());
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("UPDATE ticketing_system_config SET is_active = 0", [])
      .map_err(|e| eyre!("Failed to deactivate configs: {}", e))?;
    let id: i64 = tx
      .query_row(
        "INSERT INTO ticketing_system_config (name, api_key, is_active, created_at, updated_at)
         VALUES (?1, ?2, 1, ?3, ?3)
         ON CONFLICT(name) DO UPDATE SET
             api_key = excluded.api_key,
             is_active = 1,
             updated_at = excluded.updated_at
         RETURNING id",
        params![name, api_key, now],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to save credential: {}", e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(id)
  }

  /// Stamp the active configuration. Returns `false` when none is active.
  pub fn mark_successful_sync(&self, at: DateTime<Utc>) -> Result<bool> {
    let conn = self.lock()?;
    let updated = conn
      .execute(
        "UPDATE ticketing_system_config SET last_successful_sync = ?1, updated_at = ?1
         WHERE is_active = 1",
        params![format_timestamp(&at)],
      )
      .map_err(|e| eyre!("Failed to record successful sync: {}", e))?;
    Ok(updated > 0)
  }
}
