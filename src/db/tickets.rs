//! `tickets_cache` writes and row mapping.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};

use super::{
  enum_column, format_optional_timestamp, format_timestamp, json_column,
  optional_timestamp_column, timestamp_column, Database,
};
use crate::ticketing::types::{CachedTicket, Ticket};

/// Column list matching [`ticket_from_row`]
pub(crate) const TICKET_COLUMNS: &str = "id, remote_id, ticket_number, title, description, status, \
  priority, category, department, requester_id, requester_name, requester_email, assignee_id, \
  assignee_name, created_at, updated_at, resolved_at, due_date, tags, custom_fields, last_synced_at";

/// Full-row upsert; the remote id is the conflict target so the local id is stable.
const UPSERT_TICKET: &str = r#"
INSERT INTO tickets_cache (
    remote_id, ticket_number, title, description, status, priority, category, department,
    requester_id, requester_name, requester_email, assignee_id, assignee_name,
    created_at, updated_at, resolved_at, due_date, tags, custom_fields, last_synced_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
ON CONFLICT(remote_id) DO UPDATE SET
    ticket_number = excluded.ticket_number,
    title = excluded.title,
    description = excluded.description,
    status = excluded.status,
    priority = excluded.priority,
    category = excluded.category,
    department = excluded.department,
    requester_id = excluded.requester_id,
    requester_name = excluded.requester_name,
    requester_email = excluded.requester_email,
    assignee_id = excluded.assignee_id,
    assignee_name = excluded.assignee_name,
    created_at = excluded.created_at,
    updated_at = excluded.updated_at,
    resolved_at = excluded.resolved_at,
    due_date = excluded.due_date,
    tags = excluded.tags,
    custom_fields = excluded.custom_fields,
    last_synced_at = excluded.last_synced_at
RETURNING id
"#;

impl Database {
  /// Insert or update a ticket by remote id, returning its local id.
  pub fn upsert_ticket(&self, ticket: &Ticket, synced_at: DateTime<Utc>) -> Result<i64> {
    let tags = serde_json::to_string(&ticket.tags)
      .map_err(|e| eyre!("Failed to serialize tags for {}: {}", ticket.remote_id, e))?;
    let custom_fields = serde_json::to_string(&ticket.custom_fields)
      .map_err(|e| eyre!("Failed to serialize custom fields for {}: {}", ticket.remote_id, e))?;

    let conn = self.lock()?;
    conn
      .query_row(
        UPSERT_TICKET,
        params![
          ticket.remote_id,
          ticket.ticket_number,
          ticket.title,
          ticket.description,
          ticket.status.as_str(),
          ticket.priority.as_str(),
          ticket.category,
          ticket.department,
          ticket.requester_id,
          ticket.requester_name,
          ticket.requester_email,
          ticket.assignee_id,
          ticket.assignee_name,
          format_timestamp(&ticket.created_at),
          format_timestamp(&ticket.updated_at),
          format_optional_timestamp(ticket.resolved_at.as_ref()),
          format_optional_timestamp(ticket.due_date.as_ref()),
          tags,
          custom_fields,
          format_timestamp(&synced_at),
        ],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to upsert ticket {}: {}", ticket.remote_id, e))
  }

  /// Local id of the cached ticket with this remote id, if any.
  pub fn find_ticket_id(&self, remote_id: &str) -> Result<Option<i64>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT id FROM tickets_cache WHERE remote_id = ?",
        params![remote_id],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up ticket {}: {}", remote_id, e))
  }

  /// Cached ticket by remote id.
  pub fn get_cached_ticket(&self, remote_id: &str) -> Result<Option<CachedTicket>> {
    let conn = self.lock()?;
    let sql = format!("SELECT {} FROM tickets_cache WHERE remote_id = ?", TICKET_COLUMNS);
    conn
      .query_row(&sql, params![remote_id], ticket_from_row)
      .optional()
      .map_err(|e| eyre!("Failed to read ticket {}: {}", remote_id, e))
  }

  /// Number of cached tickets.
  pub fn ticket_count(&self) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM tickets_cache", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count tickets: {}", e))?;
    Ok(count as usize)
  }
}

/// Map a row selected with [`TICKET_COLUMNS`]
pub(crate) fn ticket_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedTicket> {
  Ok(CachedTicket {
    id: row.get(0)?,
    ticket: Ticket {
      remote_id: row.get(1)?,
      ticket_number: row.get(2)?,
      title: row.get(3)?,
      description: row.get(4)?,
      status: enum_column(row, 5)?,
      priority: enum_column(row, 6)?,
      category: row.get(7)?,
      department: row.get(8)?,
      requester_id: row.get(9)?,
      requester_name: row.get(10)?,
      requester_email: row.get(11)?,
      assignee_id: row.get(12)?,
      assignee_name: row.get(13)?,
      created_at: timestamp_column(row, 14)?,
      updated_at: timestamp_column(row, 15)?,
      resolved_at: optional_timestamp_column(row, 16)?,
      due_date: optional_timestamp_column(row, 17)?,
      tags: json_column(row, 18)?,
      custom_fields: json_column(row, 19)?,
    },
    last_synced_at: timestamp_column(row, 20)?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::sample_ticket;
  use chrono::Duration;

  #[test]
  fn test_upsert_keeps_local_id_and_updates_fields() {
    let db = Database::open_in_memory().unwrap();
    let mut ticket = sample_ticket("T-1");
    let synced = Utc::now();

    let first = db.upsert_ticket(&ticket, synced).unwrap();
    ticket.title = "Renamed".to_string();
    ticket.tags = vec!["vip".to_string()];
    let second = db.upsert_ticket(&ticket, synced + Duration::minutes(5)).unwrap();

    assert_eq!(first, second);
    assert_eq!(db.ticket_count().unwrap(), 1);

    let cached = db.get_cached_ticket("T-1").unwrap().unwrap();
    assert_eq!(cached.id, first);
    assert_eq!(cached.ticket, ticket);
    assert!(cached.last_synced_at > synced);
  }

  #[test]
  fn test_find_ticket_id_missing() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(db.find_ticket_id("nope").unwrap(), None);

    let id = db.upsert_ticket(&sample_ticket("T-9"), Utc::now()).unwrap();
    assert_eq!(db.find_ticket_id("T-9").unwrap(), Some(id));
  }
}
