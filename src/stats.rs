//! Derived aggregates over tickets and staff logs.
//!
//! Everything here is a pure function of its input; nothing is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::ticketing::types::{StaffActionType, StaffLog, Ticket, TicketStatus};

const NO_CATEGORY: &str = "uncategorized";
const NO_DEPARTMENT: &str = "unassigned";
const UNKNOWN_STAFF: &str = "unknown";

/// Ticket breakdown, computed locally or returned by `GET /tickets/stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketStats {
  pub total: u64,
  pub open: u64,
  pub in_progress: u64,
  pub resolved: u64,
  pub by_status: BTreeMap<String, u64>,
  pub by_priority: BTreeMap<String, u64>,
  pub by_category: BTreeMap<String, u64>,
  pub by_department: BTreeMap<String, u64>,
  /// Mean of `resolved_at - created_at` in hours; 0 when nothing is resolved
  #[serde(alias = "average_resolution_time")]
  pub avg_resolution_hours: f64,
  /// Percent of due-dated resolved tickets resolved by their due date
  pub sla_compliance: f64,
}

pub fn ticket_stats(tickets: &[Ticket]) -> TicketStats {
  let mut stats = TicketStats {
    total: tickets.len() as u64,
    avg_resolution_hours: average_resolution_hours(tickets),
    sla_compliance: sla_compliance(tickets),
    ..TicketStats::default()
  };

  for ticket in tickets {
    match ticket.status {
      TicketStatus::Open => stats.open += 1,
      TicketStatus::InProgress => stats.in_progress += 1,
      TicketStatus::Resolved => stats.resolved += 1,
      _ => {}
    }
    bump(&mut stats.by_status, ticket.status.as_str());
    bump(&mut stats.by_priority, ticket.priority.as_str());
    bump(&mut stats.by_category, ticket.category.as_deref().unwrap_or(NO_CATEGORY));
    bump(&mut stats.by_department, ticket.department.as_deref().unwrap_or(NO_DEPARTMENT));
  }

  stats
}

/// Mean resolution time in hours over tickets with a resolution timestamp.
pub fn average_resolution_hours(tickets: &[Ticket]) -> f64 {
  let durations: Vec<f64> = tickets
    .iter()
    .filter_map(|t| t.resolved_at.map(|resolved| hours_between(t.created_at, resolved)))
    .collect();
  mean(&durations).unwrap_or(0.0)
}

/// SLA compliance percentage. Tickets without a due date are ignored
/// entirely; with nothing left to judge, compliance is 100.
pub fn sla_compliance(tickets: &[Ticket]) -> f64 {
  let (met, judged) = tickets
    .iter()
    .filter_map(|t| Some((t.resolved_at?, t.due_date?)))
    .fold((0u64, 0u64), |(met, judged), (resolved, due)| {
      (met + u64::from(resolved <= due), judged + 1)
    });

  if judged == 0 {
    100.0
  } else {
    met as f64 / judged as f64 * 100.0
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StaffLogStats {
  pub total_actions: u64,
  pub by_action_type: BTreeMap<String, u64>,
  /// Keyed by staff name, falling back to staff id
  pub by_staff: BTreeMap<String, u64>,
  pub total_time_spent_minutes: i64,
  /// Mean hours from ticket creation to the first staff action other than
  /// `created`, over tickets whose creation time is known
  pub avg_response_time_hours: Option<f64>,
}

/// Aggregate staff logs. `ticket_created` maps remote ticket ids to their
/// creation time and feeds the response time metric.
pub fn staff_log_stats(
  logs: &[StaffLog],
  ticket_created: &HashMap<String, DateTime<Utc>>,
) -> StaffLogStats {
  let mut stats = StaffLogStats {
    total_actions: logs.len() as u64,
    avg_response_time_hours: average_response_hours(logs, ticket_created),
    ..StaffLogStats::default()
  };

  for log in logs {
    bump(&mut stats.by_action_type, log.action_type.as_str());
    let staff = log
      .staff_id
      .as_deref()
      .or(log.staff_name.as_deref())
      .unwrap_or(UNKNOWN_STAFF);
    bump(&mut stats.by_staff, staff);
    stats.total_time_spent_minutes += log.time_spent_minutes.unwrap_or(0);
  }

  stats
}

fn average_response_hours(
  logs: &[StaffLog],
  ticket_created: &HashMap<String, DateTime<Utc>>,
) -> Option<f64> {
  let mut first_response: HashMap<&str, DateTime<Utc>> = HashMap::new();
  for log in logs.iter().filter(|l| l.action_type != StaffActionType::Created) {
    first_response
      .entry(log.remote_ticket_id.as_str())
      .and_modify(|at| *at = (*at).min(log.created_at))
      .or_insert(log.created_at);
  }

  let delays: Vec<f64> = first_response
    .into_iter()
    .filter_map(|(ticket, responded)| {
      let created = *ticket_created.get(ticket)?;
      (responded >= created).then(|| hours_between(created, responded))
    })
    .collect();
  mean(&delays)
}

fn bump(counts: &mut BTreeMap<String, u64>, key: &str) {
  *counts.entry(key.to_string()).or_insert(0) += 1;
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
  (to - from).num_milliseconds() as f64 / 3_600_000.0
}

fn mean(values: &[f64]) -> Option<f64> {
  if values.is_empty() {
    None
  } else {
    Some(values.iter().sum::<f64>() / values.len() as f64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::{sample_staff_log, sample_ticket};
  use chrono::{Duration, TimeZone};

  fn due_t() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
  }

  fn resolved(id: &str, resolved_at: DateTime<Utc>, due: Option<DateTime<Utc>>) -> Ticket {
    let mut ticket = sample_ticket(id);
    ticket.status = TicketStatus::Resolved;
    ticket.resolved_at = Some(resolved_at);
    ticket.due_date = due;
    ticket
  }

  #[test]
  fn test_sla_compliance_ignores_undated_tickets() {
    let tickets = vec![
      resolved("T-1", due_t() - Duration::hours(1), Some(due_t())),
      resolved("T-2", due_t() + Duration::hours(1), Some(due_t())),
      resolved("T-3", Utc::now(), None),
    ];
    assert_eq!(sla_compliance(&tickets), 50.0);
  }

  #[test]
  fn test_sla_compliance_defaults_to_full() {
    let tickets = vec![resolved("T-1", Utc::now(), None), sample_ticket("T-2")];
    assert_eq!(sla_compliance(&tickets), 100.0);
    assert_eq!(sla_compliance(&[]), 100.0);
  }

  #[test]
  fn test_average_resolution_hours() {
    let created = sample_ticket("T-1").created_at;
    let tickets = vec![
      resolved("T-1", created + Duration::hours(2), None),
      resolved("T-2", created + Duration::hours(4), None),
      sample_ticket("T-3"),
    ];
    assert_eq!(average_resolution_hours(&tickets), 3.0);
    assert_eq!(average_resolution_hours(&[sample_ticket("T-4")]), 0.0);
  }

  #[test]
  fn test_ticket_breakdowns() {
    let mut uncategorized = sample_ticket("T-2");
    uncategorized.category = None;
    uncategorized.department = None;
    uncategorized.status = TicketStatus::InProgress;
    let mut closed = sample_ticket("T-3");
    closed.status = TicketStatus::Closed;

    let stats = ticket_stats(&[sample_ticket("T-1"), uncategorized, closed]);

    assert_eq!(stats.total, 3);
    assert_eq!(stats.open, 1);
    assert_eq!(stats.in_progress, 1);
    assert_eq!(stats.resolved, 0);
    assert_eq!(stats.by_status["closed"], 1);
    assert_eq!(stats.by_priority["medium"], 3);
    assert_eq!(stats.by_category["hardware"], 2);
    assert_eq!(stats.by_category["uncategorized"], 1);
    assert_eq!(stats.by_department["unassigned"], 1);
    assert_eq!(stats.sla_compliance, 100.0);
  }

  #[test]
  fn test_remote_stats_tolerate_missing_fields() {
    let stats: TicketStats =
      serde_json::from_str(r#"{"total": 4, "average_resolution_time": 1.5}"#).unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.avg_resolution_hours, 1.5);
    assert!(stats.by_status.is_empty());
  }

  #[test]
  fn test_staff_log_stats() {
    let created = sample_ticket("T-1").created_at;
    let mut opened = sample_staff_log("L-1", "T-1");
    opened.action_type = StaffActionType::Created;
    opened.created_at = created;
    let mut assigned = sample_staff_log("L-2", "T-1");
    assigned.action_type = StaffActionType::Assigned;
    assigned.created_at = created + Duration::hours(3);
    let mut comment = sample_staff_log("L-3", "T-1");
    comment.created_at = created + Duration::hours(1);
    comment.staff_name = None;
    comment.staff_id = Some("S-9".to_string());
    let mut other = sample_staff_log("L-4", "T-2");
    other.created_at = created + Duration::hours(2);
    other.time_spent_minutes = None;

    let index = HashMap::from([
      ("T-1".to_string(), created),
      ("T-2".to_string(), created - Duration::hours(1)),
    ]);
    let stats = staff_log_stats(&[opened, assigned, comment, other], &index);

    assert_eq!(stats.total_actions, 4);
    assert_eq!(stats.by_action_type["commented"], 2);
    assert_eq!(stats.by_action_type["created"], 1);
    assert_eq!(stats.by_staff["S-1"], 3);
    assert_eq!(stats.by_staff["S-9"], 1);
    assert_eq!(stats.total_time_spent_minutes, 45);
    // T-1 first response after 1h, T-2 after 3h
    assert_eq!(stats.avg_response_time_hours, Some(2.0));
  }

  #[test]
  fn test_staff_counted_by_id_not_name() {
    let first = sample_staff_log("L-1", "T-1");
    let mut namesake = sample_staff_log("L-2", "T-1");
    namesake.staff_id = Some("S-2".to_string());
    let mut unidentified = sample_staff_log("L-3", "T-1");
    unidentified.staff_id = None;
    let mut anonymous = sample_staff_log("L-4", "T-1");
    anonymous.staff_id = None;
    anonymous.staff_name = None;

    let stats = staff_log_stats(&[first, namesake, unidentified, anonymous], &HashMap::new());

    assert_eq!(stats.by_staff["S-1"], 1);
    assert_eq!(stats.by_staff["S-2"], 1);
    assert_eq!(stats.by_staff["Alex Kim"], 1);
    assert_eq!(stats.by_staff[UNKNOWN_STAFF], 1);
    assert_eq!(stats.by_staff.len(), 4);
  }

  #[test]
  fn test_response_time_needs_known_tickets() {
    let stats = staff_log_stats(&[sample_staff_log("L-1", "T-1")], &HashMap::new());
    assert_eq!(stats.avg_response_time_hours, None);
  }
}
