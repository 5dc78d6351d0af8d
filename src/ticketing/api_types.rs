//! Serde-deserializable types matching the ticketing API responses.
//!
//! These types are separate from domain types so that a payload with a
//! surprising shape fails conversion for that one record instead of the
//! whole response.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::{StaffLog, Ticket};
use crate::error::ConversionError;

// ============================================================================
// Envelopes
// ============================================================================

/// List endpoints answer either with a bare array or a `{"data": [...]}` wrapper.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiList<T> {
  Wrapped {
    #[serde(alias = "tickets", alias = "logs", alias = "items")]
    data: Vec<T>,
  },
  Bare(Vec<T>),
}

impl<T> ApiList<T> {
  pub fn into_items(self) -> Vec<T> {
    match self {
      ApiList::Wrapped { data } => data,
      ApiList::Bare(items) => items,
    }
  }
}

/// Single-object endpoints answer either bare or wrapped in `{"data": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiItem<T> {
  Wrapped { data: T },
  Bare(T),
}

impl<T> ApiItem<T> {
  pub fn into_inner(self) -> T {
    match self {
      ApiItem::Wrapped { data } => data,
      ApiItem::Bare(item) => item,
    }
  }
}

// ============================================================================
// Tickets
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiTicket {
  #[serde(deserialize_with = "string_or_number")]
  pub id: String,
  #[serde(default, deserialize_with = "opt_string_or_number")]
  pub ticket_number: Option<String>,
  #[serde(alias = "subject")]
  pub title: String,
  pub description: Option<String>,
  pub status: String,
  pub priority: String,
  pub category: Option<String>,
  pub department: Option<String>,
  #[serde(default, deserialize_with = "opt_string_or_number")]
  pub requester_id: Option<String>,
  pub requester_name: Option<String>,
  pub requester_email: Option<String>,
  #[serde(default, deserialize_with = "opt_string_or_number")]
  pub assignee_id: Option<String>,
  pub assignee_name: Option<String>,
  pub created_at: String,
  pub updated_at: Option<String>,
  pub resolved_at: Option<String>,
  pub due_date: Option<String>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub tags: Vec<String>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub custom_fields: BTreeMap<String, Value>,
}

impl ApiTicket {
  /// Decode and convert one list element.
  pub fn parse(value: Value) -> Result<Ticket, ConversionError> {
    let api: ApiTicket = serde_json::from_value(value).map_err(|e| ConversionError::Malformed {
      entity: "ticket",
      message: e.to_string(),
    })?;
    api.try_into()
  }
}

impl TryFrom<ApiTicket> for Ticket {
  type Error = ConversionError;

  fn try_from(api: ApiTicket) -> Result<Self, Self::Error> {
    let created_at = parse_timestamp("created_at", &api.created_at)?;
    let updated_at = match api.updated_at.as_deref() {
      Some(raw) => parse_timestamp("updated_at", raw)?,
      None => created_at,
    };

    Ok(Ticket {
      ticket_number: api.ticket_number.unwrap_or_else(|| api.id.clone()),
      remote_id: api.id,
      title: api.title,
      description: non_empty(api.description),
      status: api.status.parse()?,
      priority: api.priority.parse()?,
      category: non_empty(api.category),
      department: non_empty(api.department),
      requester_id: api.requester_id,
      requester_name: api.requester_name,
      requester_email: api.requester_email,
      assignee_id: api.assignee_id,
      assignee_name: api.assignee_name,
      created_at,
      updated_at,
      resolved_at: parse_optional_timestamp("resolved_at", api.resolved_at.as_deref())?,
      due_date: parse_optional_timestamp("due_date", api.due_date.as_deref())?,
      tags: api.tags,
      custom_fields: api.custom_fields,
    })
  }
}

// ============================================================================
// Staff logs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiStaffLog {
  #[serde(deserialize_with = "string_or_number")]
  pub id: String,
  #[serde(deserialize_with = "string_or_number")]
  pub ticket_id: String,
  #[serde(default, deserialize_with = "opt_string_or_number")]
  pub staff_id: Option<String>,
  pub staff_name: Option<String>,
  pub staff_email: Option<String>,
  #[serde(alias = "action")]
  pub action_type: String,
  pub previous_value: Option<String>,
  pub new_value: Option<String>,
  pub comment: Option<String>,
  pub time_spent_minutes: Option<i64>,
  pub created_at: String,
}

impl ApiStaffLog {
  /// Decode and convert one list element.
  pub fn parse(value: Value) -> Result<StaffLog, ConversionError> {
    let api: ApiStaffLog = serde_json::from_value(value).map_err(|e| ConversionError::Malformed {
      entity: "staff log",
      message: e.to_string(),
    })?;
    api.try_into()
  }
}

impl TryFrom<ApiStaffLog> for StaffLog {
  type Error = ConversionError;

  fn try_from(api: ApiStaffLog) -> Result<Self, Self::Error> {
    Ok(StaffLog {
      remote_id: api.id,
      remote_ticket_id: api.ticket_id,
      staff_id: api.staff_id,
      staff_name: api.staff_name,
      staff_email: api.staff_email,
      action_type: api.action_type.parse()?,
      previous_value: api.previous_value,
      new_value: api.new_value,
      comment: non_empty(api.comment),
      time_spent_minutes: api.time_spent_minutes,
      created_at: parse_timestamp("created_at", &api.created_at)?,
    })
  }
}

// ============================================================================
// Helpers
// ============================================================================

/// Best-effort remote id of an undecoded record, for log messages.
pub fn remote_id_hint(value: &Value) -> String {
  match value.get("id") {
    Some(Value::String(s)) => s.clone(),
    Some(Value::Number(n)) => n.to_string(),
    _ => "<unknown>".to_string(),
  }
}

/// Parse a timestamp in any of the formats the API has been seen to use:
/// RFC 3339, SQL-style `YYYY-MM-DD HH:MM:SS` (assumed UTC), or a bare date
/// (midnight UTC).
pub fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, ConversionError> {
  let raw = raw.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Ok(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
    return Ok(dt.and_utc());
  }
  if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
    return Ok(dt.and_utc());
  }
  if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .ok()
    .and_then(|date| date.and_hms_opt(0, 0, 0))
  {
    return Ok(midnight.and_utc());
  }
  Err(ConversionError::InvalidTimestamp {
    field,
    value: raw.to_string(),
  })
}

fn parse_optional_timestamp(
  field: &'static str,
  raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, ConversionError> {
  match raw.map(str::trim) {
    None | Some("") => Ok(None),
    Some(raw) => parse_timestamp(field, raw).map(Some),
  }
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.filter(|s| !s.trim().is_empty())
}

/// Ids arrive as strings from some deployments and as integers from others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!(
      "expected string or number, found {}",
      other
    ))),
  }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<Value>::deserialize(deserializer)? {
    None | Some(Value::Null) => Ok(None),
    Some(Value::String(s)) => Ok(Some(s)),
    Some(Value::Number(n)) => Ok(Some(n.to_string())),
    Some(other) => Err(serde::de::Error::custom(format!(
      "expected string or number, found {}",
      other
    ))),
  }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
