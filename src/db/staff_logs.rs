//! `staff_logs_cache` writes and row mapping.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;

use super::{enum_column, format_timestamp, timestamp_column, Database};
use crate::ticketing::types::{CachedStaffLog, StaffLog};

/// Column list matching [`staff_log_from_row`]
pub(crate) const STAFF_LOG_COLUMNS: &str = "id, ticket_id, remote_id, remote_ticket_id, staff_id, \
  staff_name, staff_email, action_type, previous_value, new_value, comment, time_spent_minutes, \
  created_at, last_synced_at";

const UPSERT_STAFF_LOG: &str = r#"
INSERT INTO staff_logs_cache (
    remote_id, ticket_id, remote_ticket_id, staff_id, staff_name, staff_email, action_type,
    previous_value, new_value, comment, time_spent_minutes, created_at, last_synced_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
ON CONFLICT(remote_id) DO UPDATE SET
    ticket_id = excluded.ticket_id,
    remote_ticket_id = excluded.remote_ticket_id,
    staff_id = excluded.staff_id,
    staff_name = excluded.staff_name,
    staff_email = excluded.staff_email,
    action_type = excluded.action_type,
    previous_value = excluded.previous_value,
    new_value = excluded.new_value,
    comment = excluded.comment,
    time_spent_minutes = excluded.time_spent_minutes,
    created_at = excluded.created_at,
    last_synced_at = excluded.last_synced_at
RETURNING id
"#;

impl Database {
  /// Insert or update a staff log by its remote id.
  ///
  /// `ticket_id` is the local ticket reference resolved by the caller; `None`
  /// stores the log unlinked.
  pub fn upsert_staff_log(
    &self,
    log: &StaffLog,
    ticket_id: Option<i64>,
    synced_at: DateTime<Utc>,
  ) -> Result<i64> {
    let conn = self.lock()?;
    conn
      .query_row(
        UPSERT_STAFF_LOG,
        params![
          log.remote_id,
          ticket_id,
          log.remote_ticket_id,
          log.staff_id,
          log.staff_name,
          log.staff_email,
          log.action_type.as_str(),
          log.previous_value,
          log.new_value,
          log.comment,
          log.time_spent_minutes,
          format_timestamp(&log.created_at),
          format_timestamp(&synced_at),
        ],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to upsert staff log {}: {}", log.remote_id, e))
  }

  /// Number of cached staff logs.
  pub fn staff_log_count(&self) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM staff_logs_cache", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count staff logs: {}", e))?;
    Ok(count as usize)
  }
}

/// Map a row selected with [`STAFF_LOG_COLUMNS`]
pub(crate) fn staff_log_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedStaffLog> {
  Ok(CachedStaffLog {
    id: row.get(0)?,
    ticket_id: row.get(1)?,
    log: StaffLog {
      remote_id: row.get(2)?,
      remote_ticket_id: row.get(3)?,
      staff_id: row.get(4)?,
      staff_name: row.get(5)?,
      staff_email: row.get(6)?,
      action_type: enum_column(row, 7)?,
      previous_value: row.get(8)?,
      new_value: row.get(9)?,
      comment: row.get(10)?,
      time_spent_minutes: row.get(11)?,
      created_at: timestamp_column(row, 12)?,
    },
    last_synced_at: timestamp_column(row, 13)?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::{sample_staff_log, sample_ticket};

  #[test]
  fn test_upsert_staff_log_relinks_on_resync() {
    let db = Database::open_in_memory().unwrap();
    let log = sample_staff_log("L-1", "T-1");

    let first = db.upsert_staff_log(&log, None, Utc::now()).unwrap();
    let ticket_id = db.upsert_ticket(&sample_ticket("T-1"), Utc::now()).unwrap();
    let second = db.upsert_staff_log(&log, Some(ticket_id), Utc::now()).unwrap();

    assert_eq!(first, second);
    assert_eq!(db.staff_log_count().unwrap(), 1);

    let conn = db.lock().unwrap();
    let linked: Option<i64> = conn
      .query_row(
        "SELECT ticket_id FROM staff_logs_cache WHERE remote_id = 'L-1'",
        [],
        |row| row.get(0),
      )
      .unwrap();
    assert_eq!(linked, Some(ticket_id));
  }

  #[test]
  fn test_dangling_ticket_reference_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let log = sample_staff_log("L-2", "T-2");
    assert!(db.upsert_staff_log(&log, Some(999), Utc::now()).is_err());
  }
}
