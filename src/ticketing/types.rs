use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConversionError;

/// Ticket lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
  Open,
  InProgress,
  Pending,
  OnHold,
  Resolved,
  Closed,
  Cancelled,
}

impl TicketStatus {
  pub const ALL: [TicketStatus; 7] = [
    TicketStatus::Open,
    TicketStatus::InProgress,
    TicketStatus::Pending,
    TicketStatus::OnHold,
    TicketStatus::Resolved,
    TicketStatus::Closed,
    TicketStatus::Cancelled,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      TicketStatus::Open => "open",
      TicketStatus::InProgress => "in_progress",
      TicketStatus::Pending => "pending",
      TicketStatus::OnHold => "on_hold",
      TicketStatus::Resolved => "resolved",
      TicketStatus::Closed => "closed",
      TicketStatus::Cancelled => "cancelled",
    }
  }
}

impl FromStr for TicketStatus {
  type Err = ConversionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
    TicketStatus::ALL
      .into_iter()
      .find(|status| status.as_str() == normalized)
      .ok_or_else(|| ConversionError::UnknownValue {
        kind: "ticket status",
        value: s.to_string(),
      })
  }
}

impl fmt::Display for TicketStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

/// Ticket priority, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
  Low,
  Medium,
  High,
  Urgent,
  Critical,
}

impl TicketPriority {
  pub const ALL: [TicketPriority; 5] = [
    TicketPriority::Low,
    TicketPriority::Medium,
    TicketPriority::High,
    TicketPriority::Urgent,
    TicketPriority::Critical,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      TicketPriority::Low => "low",
      TicketPriority::Medium => "medium",
      TicketPriority::High => "high",
      TicketPriority::Urgent => "urgent",
      TicketPriority::Critical => "critical",
    }
  }
}

impl FromStr for TicketPriority {
  type Err = ConversionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase();
    TicketPriority::ALL
      .into_iter()
      .find(|priority| priority.as_str() == normalized)
      .ok_or_else(|| ConversionError::UnknownValue {
        kind: "ticket priority",
        value: s.to_string(),
      })
  }
}

impl fmt::Display for TicketPriority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

/// Kind of action recorded in a staff log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffActionType {
  Created,
  Assigned,
  StatusChanged,
  PriorityChanged,
  Commented,
  Resolved,
  Closed,
  Reopened,
  Transferred,
}

impl StaffActionType {
  pub const ALL: [StaffActionType; 9] = [
    StaffActionType::Created,
    StaffActionType::Assigned,
    StaffActionType::StatusChanged,
    StaffActionType::PriorityChanged,
    StaffActionType::Commented,
    StaffActionType::Resolved,
    StaffActionType::Closed,
    StaffActionType::Reopened,
    StaffActionType::Transferred,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      StaffActionType::Created => "created",
      StaffActionType::Assigned => "assigned",
      StaffActionType::StatusChanged => "status_changed",
      StaffActionType::PriorityChanged => "priority_changed",
      StaffActionType::Commented => "commented",
      StaffActionType::Resolved => "resolved",
      StaffActionType::Closed => "closed",
      StaffActionType::Reopened => "reopened",
      StaffActionType::Transferred => "transferred",
    }
  }
}

impl FromStr for StaffActionType {
  type Err = ConversionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase();
    StaffActionType::ALL
      .into_iter()
      .find(|action| action.as_str() == normalized)
      .ok_or_else(|| ConversionError::UnknownValue {
        kind: "staff action type",
        value: s.to_string(),
      })
  }
}

impl fmt::Display for StaffActionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

/// Full projection of a remote ticket, as written to the local cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
  pub remote_id: String,
  pub ticket_number: String,
  pub title: String,
  pub description: Option<String>,
  pub status: TicketStatus,
  pub priority: TicketPriority,
  pub category: Option<String>,
  pub department: Option<String>,
  pub requester_id: Option<String>,
  pub requester_name: Option<String>,
  pub requester_email: Option<String>,
  pub assignee_id: Option<String>,
  pub assignee_name: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub resolved_at: Option<DateTime<Utc>>,
  pub due_date: Option<DateTime<Utc>>,
  pub tags: Vec<String>,
  pub custom_fields: BTreeMap<String, serde_json::Value>,
}

/// A ticket row read back from `tickets_cache`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedTicket {
  /// Local row id, referenced by staff logs
  pub id: i64,
  pub last_synced_at: DateTime<Utc>,
  #[serde(flatten)]
  pub ticket: Ticket,
}

/// A staff action on a ticket, as reported by the remote system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffLog {
  pub remote_id: String,
  /// Remote id of the ticket this action belongs to
  pub remote_ticket_id: String,
  pub staff_id: Option<String>,
  pub staff_name: Option<String>,
  pub staff_email: Option<String>,
  pub action_type: StaffActionType,
  pub previous_value: Option<String>,
  pub new_value: Option<String>,
  pub comment: Option<String>,
  pub time_spent_minutes: Option<i64>,
  pub created_at: DateTime<Utc>,
}

/// A staff log row read back from `staff_logs_cache`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedStaffLog {
  pub id: i64,
  /// Local ticket id, set only if the ticket was cached when the log synced
  pub ticket_id: Option<i64>,
  pub last_synced_at: DateTime<Utc>,
  #[serde(flatten)]
  pub log: StaffLog,
}

/// Query parameters for `GET /tickets`
#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub status: Option<TicketStatus>,
  pub priority: Option<TicketPriority>,
  pub category: Option<String>,
  pub department: Option<String>,
  pub assignee_id: Option<String>,
  pub search: Option<String>,
  pub sort_by: Option<String>,
  pub sort_direction: Option<String>,
}

impl TicketQuery {
  /// Most recently updated tickets first, as used by the ticket sync
  pub fn recently_updated(limit: u32) -> Self {
    Self {
      limit: Some(limit),
      sort_by: Some("updated_at".to_string()),
      sort_direction: Some("desc".to_string()),
      ..Self::default()
    }
  }
}

/// Query parameters for `GET /tickets/staff-logs`
#[derive(Debug, Clone, Default)]
pub struct StaffLogQuery {
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub ticket_id: Option<String>,
  pub staff_id: Option<String>,
  pub action_type: Option<StaffActionType>,
  pub created_after: Option<DateTime<Utc>>,
  pub created_before: Option<DateTime<Utc>>,
}

/// Body for `POST /tickets`
#[derive(Debug, Clone, Serialize)]
pub struct NewTicket {
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub priority: TicketPriority,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub department: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub requester_email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
}

/// Body for `PATCH /tickets/{id}`; only set fields are sent
#[derive(Debug, Clone, Default, Serialize)]
pub struct TicketUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<TicketStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<TicketPriority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assignee_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<DateTime<Utc>>,
}
