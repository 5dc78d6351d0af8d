//! `ticket_sync_log`: append-only audit of sync runs.
//!
//! A run is inserted as `in_progress` and finalized exactly once. The
//! finalizing update only matches rows still `in_progress`, so a terminal
//! row is never rewritten.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::{enum_column, format_timestamp, optional_timestamp_column, timestamp_column, Database};
use crate::error::ConversionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
  Tickets,
  StaffLogs,
}

impl SyncType {
  pub fn as_str(&self) -> &'static str {
    match self {
      SyncType::Tickets => "tickets",
      SyncType::StaffLogs => "staff_logs",
    }
  }
}

impl FromStr for SyncType {
  type Err = ConversionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "tickets" => Ok(SyncType::Tickets),
      "staff_logs" => Ok(SyncType::StaffLogs),
      other => Err(ConversionError::UnknownValue {
        kind: "sync type",
        value: other.to_string(),
      }),
    }
  }
}

impl fmt::Display for SyncType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

/// `in_progress` moves to exactly one of the terminal states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
  InProgress,
  Success,
  Failed,
}

impl SyncStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      SyncStatus::InProgress => "in_progress",
      SyncStatus::Success => "success",
      SyncStatus::Failed => "failed",
    }
  }

  pub fn is_terminal(&self) -> bool {
    !matches!(self, SyncStatus::InProgress)
  }
}

impl FromStr for SyncStatus {
  type Err = ConversionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "in_progress" => Ok(SyncStatus::InProgress),
      "success" => Ok(SyncStatus::Success),
      "failed" => Ok(SyncStatus::Failed),
      other => Err(ConversionError::UnknownValue {
        kind: "sync status",
        value: other.to_string(),
      }),
    }
  }
}

impl fmt::Display for SyncStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

/// One row of `ticket_sync_log`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRun {
  pub id: i64,
  pub sync_type: SyncType,
  /// Remote ticket id for a single-ticket staff log sync
  pub scope: Option<String>,
  pub status: SyncStatus,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub records_processed: u64,
  pub records_failed: u64,
  pub error_message: Option<String>,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
  Success { processed: u64, failed: u64 },
  Failed { error: String },
}

const SYNC_RUN_COLUMNS: &str = "id, sync_type, scope, status, started_at, completed_at, \
  records_processed, records_failed, error_message";

impl Database {
  /// Record the start of a sync run.
  pub fn begin_sync_run(
    &self,
    sync_type: SyncType,
    scope: Option<&str>,
    started_at: DateTime<Utc>,
  ) -> Result<i64> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT INTO ticket_sync_log (sync_type, scope, status, started_at)
         VALUES (?, ?, 'in_progress', ?)",
        params![sync_type.as_str(), scope, format_timestamp(&started_at)],
      )
      .map_err(|e| eyre!("Failed to record {} sync start: {}", sync_type, e))?;
    Ok(conn.last_insert_rowid())
  }

  /// Finalize a run. Returns `false` if it was already terminal (or missing).
  pub fn complete_sync_run(
    &self,
    run_id: i64,
    outcome: &RunOutcome,
    completed_at: DateTime<Utc>,
  ) -> Result<bool> {
    let (status, processed, failed, error) = match outcome {
      RunOutcome::Success { processed, failed } => {
        (SyncStatus::Success, *processed, *failed, None)
      }
      RunOutcome::Failed { error } => (SyncStatus::Failed, 0, 0, Some(error.as_str())),
    };

    let conn = self.lock()?;
    let updated = conn
      .execute(
        "UPDATE ticket_sync_log
         SET status = ?, completed_at = ?, records_processed = ?, records_failed = ?, error_message = ?
         WHERE id = ? AND status = 'in_progress'",
        params![
          status.as_str(),
          format_timestamp(&completed_at),
          processed as i64,
          failed as i64,
          error,
          run_id
        ],
      )
      .map_err(|e| eyre!("Failed to finalize sync run {}: {}", run_id, e))?;
    Ok(updated == 1)
  }

  pub fn get_sync_run(&self, run_id: i64) -> Result<Option<SyncRun>> {
    let conn = self.lock()?;
    let sql = format!("SELECT {} FROM ticket_sync_log WHERE id = ?", SYNC_RUN_COLUMNS);
    conn
      .query_row(&sql, params![run_id], sync_run_from_row)
      .optional()
      .map_err(|e| eyre!("Failed to read sync run {}: {}", run_id, e))
  }

  /// Most recent runs first.
  pub fn recent_sync_runs(&self, limit: usize) -> Result<Vec<SyncRun>> {
    let conn = self.lock()?;
    let sql = format!(
      "SELECT {} FROM ticket_sync_log ORDER BY started_at DESC, id DESC LIMIT ?",
      SYNC_RUN_COLUMNS
    );
    let mut stmt = conn
      .prepare(&sql)
      .map_err(|e| eyre!("Failed to prepare sync run query: {}", e))?;
    let runs = stmt
      .query_map(params![limit as i64], sync_run_from_row)
      .map_err(|e| eyre!("Failed to query sync runs: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read sync runs: {}", e))?;
    Ok(runs)
  }

  /// Runs still `in_progress` that started before `started_before`.
  ///
  /// These only exist if the process died mid-sync.
  pub fn stuck_sync_runs(&self, started_before: DateTime<Utc>) -> Result<Vec<SyncRun>> {
    let conn = self.lock()?;
    let sql = format!(
      "SELECT {} FROM ticket_sync_log
       WHERE status = 'in_progress' AND started_at < ?
       ORDER BY started_at",
      SYNC_RUN_COLUMNS
    );
    let mut stmt = conn
      .prepare(&sql)
      .map_err(|e| eyre!("Failed to prepare stuck run query: {}", e))?;
    let runs = stmt
      .query_map(params![format_timestamp(&started_before)], sync_run_from_row)
      .map_err(|e| eyre!("Failed to query stuck runs: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read stuck runs: {}", e))?;
    Ok(runs)
  }
}

fn sync_run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncRun> {
  Ok(SyncRun {
    id: row.get(0)?,
    sync_type: enum_column(row, 1)?,
    scope: row.get(2)?,
    status: enum_column(row, 3)?,
    started_at: timestamp_column(row, 4)?,
    completed_at: optional_timestamp_column(row, 5)?,
    records_processed: row.get::<_, i64>(6)? as u64,
    records_failed: row.get::<_, i64>(7)? as u64,
    error_message: row.get(8)?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn test_run_is_finalized_once() {
    let db = Database::open_in_memory().unwrap();
    let started = Utc::now();
    let id = db.begin_sync_run(SyncType::Tickets, None, started).unwrap();

    let run = db.get_sync_run(id).unwrap().unwrap();
    assert_eq!(run.status, SyncStatus::InProgress);
    assert_eq!(run.completed_at, None);

    let success = RunOutcome::Success {
      processed: 9,
      failed: 1,
    };
    assert!(db.complete_sync_run(id, &success, Utc::now()).unwrap());

    let failure = RunOutcome::Failed {
      error: "late".to_string(),
    };
    assert!(!db.complete_sync_run(id, &failure, Utc::now()).unwrap());

    let run = db.get_sync_run(id).unwrap().unwrap();
    assert_eq!(run.status, SyncStatus::Success);
    assert_eq!(run.records_processed, 9);
    assert_eq!(run.records_failed, 1);
    assert_eq!(run.error_message, None);
    assert!(run.status.is_terminal());
  }

  #[test]
  fn test_stuck_runs_only_lists_old_in_progress() {
    let db = Database::open_in_memory().unwrap();
    let now = Utc::now();

    let stuck = db
      .begin_sync_run(SyncType::StaffLogs, Some("T-1"), now - Duration::hours(2))
      .unwrap();
    let finished = db
      .begin_sync_run(SyncType::Tickets, None, now - Duration::hours(2))
      .unwrap();
    db.complete_sync_run(
      finished,
      &RunOutcome::Failed {
        error: "HTTP 500".to_string(),
      },
      now,
    )
    .unwrap();
    db.begin_sync_run(SyncType::Tickets, None, now).unwrap();

    let runs = db.stuck_sync_runs(now - Duration::minutes(30)).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, stuck);
    assert_eq!(runs[0].scope.as_deref(), Some("T-1"));

    let recent = db.recent_sync_runs(10).unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0].started_at.timestamp(), now.timestamp());
  }
}
