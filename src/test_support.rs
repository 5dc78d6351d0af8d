//! Fixtures shared by unit tests.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::ConfigResolver;
use crate::db::Database;
use crate::error::TransportError;
use crate::ticketing::transport::{ApiRequest, ApiResponse, Transport};
use crate::ticketing::types::{StaffActionType, StaffLog, Ticket, TicketPriority, TicketStatus};
use crate::ticketing::{RetryPolicy, TicketingClient};

type Scripted = Result<ApiResponse, TransportError>;

#[derive(Default)]
struct StubState {
  responses: Mutex<VecDeque<Scripted>>,
  fallback: Mutex<Option<Scripted>>,
  requests: Mutex<Vec<(ApiRequest, String)>>,
  latency: Mutex<Option<Duration>>,
}

/// Transport that replays scripted responses and records what was sent.
///
/// Clones share state, so a test can keep one handle while the client owns
/// another.
#[derive(Clone, Default)]
pub struct StubTransport {
  state: Arc<StubState>,
}

impl StubTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every request answers with this status and body.
  pub fn failing(status: u16, body: &str) -> Self {
    let stub = Self::new();
    *stub.state.fallback.lock().unwrap() = Some(Ok(ApiResponse {
      status,
      body: body.to_string(),
    }));
    stub
  }

  pub fn with_latency(self, latency: Duration) -> Self {
    *self.state.latency.lock().unwrap() = Some(latency);
    self
  }

  pub fn push_json(&self, status: u16, body: Value) {
    self.push_status(status, &body.to_string());
  }

  pub fn push_status(&self, status: u16, body: &str) {
    self.state.responses.lock().unwrap().push_back(Ok(ApiResponse {
      status,
      body: body.to_string(),
    }));
  }

  pub fn push_error(&self, error: TransportError) {
    self.state.responses.lock().unwrap().push_back(Err(error));
  }

  /// Requests sent so far, with the bearer each carried.
  pub fn requests(&self) -> Vec<(ApiRequest, String)> {
    self.state.requests.lock().unwrap().clone()
  }

  pub fn attempts(&self) -> usize {
    self.state.requests.lock().unwrap().len()
  }
}

impl Transport for StubTransport {
  fn send<'a>(
    &'a self,
    request: &'a ApiRequest,
    bearer: &'a str,
  ) -> futures::future::BoxFuture<'a, Result<ApiResponse, TransportError>> {
    Box::pin(async move {
      self
        .state
        .requests
        .lock()
        .unwrap()
        .push((request.clone(), bearer.to_string()));

      let latency = *self.state.latency.lock().unwrap();
      if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
      }

      let scripted = self.state.responses.lock().unwrap().pop_front();
      match scripted {
        Some(response) => response,
        None => self.state.fallback.lock().unwrap().clone().unwrap_or_else(|| {
          Ok(ApiResponse {
            status: 404,
            body: r#"{"message": "no scripted response"}"#.to_string(),
          })
        }),
      }
    })
  }
}

/// Retry policy without backoff delays
pub fn fast_retry() -> RetryPolicy {
  RetryPolicy {
    initial_delay: Duration::ZERO,
    ..RetryPolicy::default()
  }
}

/// In-memory database with an active credential
pub fn test_db() -> Arc<Database> {
  let db = Arc::new(Database::open_in_memory().unwrap());
  db.save_credential("default", "test-key").unwrap();
  db
}

pub fn stub_client(
  transport: &StubTransport,
  db: Arc<Database>,
  retry: RetryPolicy,
) -> TicketingClient<StubTransport> {
  TicketingClient::new(transport.clone(), ConfigResolver::new(db), retry)
}

pub fn sample_ticket(remote_id: &str) -> Ticket {
  Ticket {
    remote_id: remote_id.to_string(),
    ticket_number: format!("TCK-{}", remote_id),
    title: format!("Ticket {}", remote_id),
    description: Some("Printer is jammed".to_string()),
    status: TicketStatus::Open,
    priority: TicketPriority::Medium,
    category: Some("hardware".to_string()),
    department: Some("it".to_string()),
    requester_id: Some("U-1".to_string()),
    requester_name: Some("Sam Doe".to_string()),
    requester_email: Some("sam@example.com".to_string()),
    assignee_id: None,
    assignee_name: None,
    created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    updated_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
    resolved_at: None,
    due_date: None,
    tags: Vec::new(),
    custom_fields: BTreeMap::new(),
  }
}

pub fn sample_staff_log(remote_id: &str, remote_ticket_id: &str) -> StaffLog {
  StaffLog {
    remote_id: remote_id.to_string(),
    remote_ticket_id: remote_ticket_id.to_string(),
    staff_id: Some("S-1".to_string()),
    staff_name: Some("Alex Kim".to_string()),
    staff_email: Some("alex@example.com".to_string()),
    action_type: StaffActionType::Commented,
    previous_value: None,
    new_value: None,
    comment: Some("Looking into it".to_string()),
    time_spent_minutes: Some(15),
    created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
  }
}

/// A ticket as the remote API returns it
pub fn ticket_json(remote_id: &str) -> Value {
  json!({
    "id": remote_id,
    "ticket_number": format!("TCK-{}", remote_id),
    "title": format!("Ticket {}", remote_id),
    "status": "open",
    "priority": "medium",
    "category": "hardware",
    "department": "it",
    "created_at": "2024-03-01T09:00:00Z",
    "updated_at": "2024-03-01T10:00:00Z",
    "tags": []
  })
}

/// A staff log as the remote API returns it
pub fn staff_log_json(remote_id: &str, remote_ticket_id: &str) -> Value {
  json!({
    "id": remote_id,
    "ticket_id": remote_ticket_id,
    "staff_id": "S-1",
    "staff_name": "Alex Kim",
    "action_type": "commented",
    "comment": "Looking into it",
    "time_spent_minutes": 15,
    "created_at": "2024-03-01T10:00:00Z"
  })
}
