//! Read-only queries over the local cache.
//!
//! These never touch the network. A failed read is logged and reported as an
//! empty result so callers can render "nothing cached" without special cases.
//!
//! Filters combine with AND; list-valued filters match any of their values.
//! An empty list means "no constraint".

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::ToSql;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::error;

use crate::db::staff_logs::{staff_log_from_row, STAFF_LOG_COLUMNS};
use crate::db::tickets::{ticket_from_row, TICKET_COLUMNS};
use crate::db::{format_timestamp, timestamp_column, Database, FOLD_CASE_FN};
use crate::error::ConversionError;
use crate::ticketing::types::{
  CachedStaffLog, CachedTicket, StaffActionType, TicketPriority, TicketStatus,
};

#[derive(Debug, Clone, Default)]
pub struct TicketFilters {
  pub statuses: Vec<TicketStatus>,
  pub priorities: Vec<TicketPriority>,
  pub categories: Vec<String>,
  pub departments: Vec<String>,
  pub assignee_id: Option<String>,
  /// Case-insensitive substring of title, description or ticket number
  pub search: Option<String>,
  pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TicketSortField {
  #[default]
  CreatedAt,
  UpdatedAt,
  DueDate,
  ResolvedAt,
  /// By severity, not alphabetically
  Priority,
  /// By lifecycle order
  Status,
  TicketNumber,
  Title,
}

impl TicketSortField {
  pub const ALL: [TicketSortField; 8] = [
    TicketSortField::CreatedAt,
    TicketSortField::UpdatedAt,
    TicketSortField::DueDate,
    TicketSortField::ResolvedAt,
    TicketSortField::Priority,
    TicketSortField::Status,
    TicketSortField::TicketNumber,
    TicketSortField::Title,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      TicketSortField::CreatedAt => "created_at",
      TicketSortField::UpdatedAt => "updated_at",
      TicketSortField::DueDate => "due_date",
      TicketSortField::ResolvedAt => "resolved_at",
      TicketSortField::Priority => "priority",
      TicketSortField::Status => "status",
      TicketSortField::TicketNumber => "ticket_number",
      TicketSortField::Title => "title",
    }
  }

  fn order_expr(&self) -> String {
    match self {
      TicketSortField::Priority => rank_expr(
        "priority",
        TicketPriority::ALL.iter().map(TicketPriority::as_str),
      ),
      TicketSortField::Status => {
        rank_expr("status", TicketStatus::ALL.iter().map(TicketStatus::as_str))
      }
      TicketSortField::Title => "title COLLATE NOCASE".to_string(),
      other => other.as_str().to_string(),
    }
  }
}

impl FromStr for TicketSortField {
  type Err = ConversionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase().replace('-', "_");
    TicketSortField::ALL
      .into_iter()
      .find(|field| field.as_str() == normalized)
      .ok_or_else(|| ConversionError::UnknownValue {
        kind: "sort field",
        value: s.to_string(),
      })
  }
}

impl fmt::Display for TicketSortField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
  Asc,
  #[default]
  Desc,
}

impl SortDirection {
  fn as_sql(&self) -> &'static str {
    match self {
      SortDirection::Asc => "ASC",
      SortDirection::Desc => "DESC",
    }
  }
}

/// Single-field sort; defaults to newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TicketSort {
  pub field: TicketSortField,
  pub direction: SortDirection,
}

impl TicketSort {
  pub fn new(field: TicketSortField, direction: SortDirection) -> Self {
    Self { field, direction }
  }
}

#[derive(Debug, Clone, Default)]
pub struct StaffLogFilters {
  /// Remote id of the ticket
  pub ticket_id: Option<String>,
  pub staff_id: Option<String>,
  pub action_types: Vec<StaffActionType>,
  pub created_after: Option<DateTime<Utc>>,
  pub created_before: Option<DateTime<Utc>>,
  pub limit: Option<usize>,
}

/// Cached tickets matching `filters`, in `sort` order.
pub fn local_tickets(db: &Database, filters: &TicketFilters, sort: TicketSort) -> Vec<CachedTicket> {
  query_tickets(db, filters, sort).unwrap_or_else(|e| {
    error!(error = %e, "failed to query cached tickets");
    Vec::new()
  })
}

/// Cached staff logs matching `filters`, newest first.
pub fn local_staff_logs(db: &Database, filters: &StaffLogFilters) -> Vec<CachedStaffLog> {
  query_staff_logs(db, filters).unwrap_or_else(|e| {
    error!(error = %e, "failed to query cached staff logs");
    Vec::new()
  })
}

/// Creation time of every cached ticket, by remote id.
pub fn ticket_created_index(db: &Database) -> HashMap<String, DateTime<Utc>> {
  created_index(db).unwrap_or_else(|e| {
    error!(error = %e, "failed to index cached tickets");
    HashMap::new()
  })
}

fn query_tickets(db: &Database, filters: &TicketFilters, sort: TicketSort) -> Result<Vec<CachedTicket>> {
  let mut sql = format!("SELECT {} FROM tickets_cache WHERE 1=1", TICKET_COLUMNS);
  let mut params: Vec<Box<dyn ToSql>> = Vec::new();

  push_in(&mut sql, &mut params, "status", filters.statuses.iter().map(|s| s.as_str().to_string()));
  push_in(&mut sql, &mut params, "priority", filters.priorities.iter().map(|p| p.as_str().to_string()));
  push_in(&mut sql, &mut params, "category", filters.categories.iter().cloned());
  push_in(&mut sql, &mut params, "department", filters.departments.iter().cloned());

  if let Some(assignee) = &filters.assignee_id {
    sql.push_str(" AND assignee_id = ?");
    params.push(Box::new(assignee.clone()));
  }

  if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
    sql.push_str(&format!(
      " AND ({f}(title) LIKE ? ESCAPE '\\' OR {f}(COALESCE(description, '')) LIKE ? ESCAPE '\\' \
       OR {f}(ticket_number) LIKE ? ESCAPE '\\')",
      f = FOLD_CASE_FN
    ));
    let pattern = like_pattern(&search.to_lowercase());
    params.push(Box::new(pattern.clone()));
    params.push(Box::new(pattern.clone()));
    params.push(Box::new(pattern));
  }

  // Missing values sort last in either direction
  let expr = sort.field.order_expr();
  sql.push_str(&format!(
    " ORDER BY ({expr}) IS NULL, {expr} {dir}, id {dir}",
    expr = expr,
    dir = sort.direction.as_sql()
  ));

  if let Some(limit) = filters.limit {
    sql.push_str(&format!(" LIMIT {}", limit));
  }

  let conn = db.lock()?;
  let mut stmt = conn
    .prepare(&sql)
    .map_err(|e| eyre!("Failed to prepare ticket query: {}", e))?;
  let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
  let tickets = stmt
    .query_map(param_refs.as_slice(), ticket_from_row)
    .map_err(|e| eyre!("Failed to query tickets: {}", e))?
    .collect::<rusqlite::Result<Vec<_>>>()
    .map_err(|e| eyre!("Failed to read tickets: {}", e))?;
  Ok(tickets)
}

fn query_staff_logs(db: &Database, filters: &StaffLogFilters) -> Result<Vec<CachedStaffLog>> {
  let mut sql = format!("SELECT {} FROM staff_logs_cache WHERE 1=1", STAFF_LOG_COLUMNS);
  let mut params: Vec<Box<dyn ToSql>> = Vec::new();

  if let Some(ticket_id) = &filters.ticket_id {
    sql.push_str(" AND remote_ticket_id = ?");
    params.push(Box::new(ticket_id.clone()));
  }

  if let Some(staff_id) = &filters.staff_id {
    sql.push_str(" AND staff_id = ?");
    params.push(Box::new(staff_id.clone()));
  }

  push_in(
    &mut sql,
    &mut params,
    "action_type",
    filters.action_types.iter().map(|a| a.as_str().to_string()),
  );

  if let Some(after) = &filters.created_after {
    sql.push_str(" AND created_at >= ?");
    params.push(Box::new(format_timestamp(after)));
  }

  if let Some(before) = &filters.created_before {
    sql.push_str(" AND created_at <= ?");
    params.push(Box::new(format_timestamp(before)));
  }

  sql.push_str(" ORDER BY created_at DESC, id DESC");

  if let Some(limit) = filters.limit {
    sql.push_str(&format!(" LIMIT {}", limit));
  }

  let conn = db.lock()?;
  let mut stmt = conn
    .prepare(&sql)
    .map_err(|e| eyre!("Failed to prepare staff log query: {}", e))?;
  let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
  let logs = stmt
    .query_map(param_refs.as_slice(), staff_log_from_row)
    .map_err(|e| eyre!("Failed to query staff logs: {}", e))?
    .collect::<rusqlite::Result<Vec<_>>>()
    .map_err(|e| eyre!("Failed to read staff logs: {}", e))?;
  Ok(logs)
}

fn created_index(db: &Database) -> Result<HashMap<String, DateTime<Utc>>> {
  let conn = db.lock()?;
  let mut stmt = conn
    .prepare("SELECT remote_id, created_at FROM tickets_cache")
    .map_err(|e| eyre!("Failed to prepare ticket index query: {}", e))?;
  let index = stmt
    .query_map([], |row| Ok((row.get::<_, String>(0)?, timestamp_column(row, 1)?)))
    .map_err(|e| eyre!("Failed to query ticket index: {}", e))?
    .collect::<rusqlite::Result<HashMap<_, _>>>()
    .map_err(|e| eyre!("Failed to read ticket index: {}", e))?;
  Ok(index)
}

/// Append `AND column IN (?, ...)` for a non-empty value set.
fn push_in(
  sql: &mut String,
  params: &mut Vec<Box<dyn ToSql>>,
  column: &str,
  values: impl Iterator<Item = String>,
) {
  let values: Vec<String> = values.collect();
  if values.is_empty() {
    return;
  }
  let placeholders = vec!["?"; values.len()].join(", ");
  sql.push_str(&format!(" AND {} IN ({})", column, placeholders));
  for value in values {
    params.push(Box::new(value));
  }
}

/// `CASE` expression ranking a text column by the order of `values`.
fn rank_expr<'a>(column: &str, values: impl Iterator<Item = &'a str>) -> String {
  let arms: String = values
    .enumerate()
    .map(|(rank, value)| format!(" WHEN '{}' THEN {}", value, rank))
    .collect();
  format!("CASE {}{} END", column, arms)
}

/// SQLite `LIKE` is case-insensitive for ASCII; only wildcards need escaping.
fn like_pattern(search: &str) -> String {
  let escaped = search
    .replace('\\', "\\\\")
    .replace('%', "\\%")
    .replace('_', "\\_");
  format!("%{}%", escaped)
}
