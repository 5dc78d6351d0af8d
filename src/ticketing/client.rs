use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use super::api_types::{ApiItem, ApiList, ApiTicket};
use super::transport::{ApiRequest, HttpTransport, Transport};
use super::types::{NewTicket, StaffLogQuery, Ticket, TicketQuery, TicketUpdate};
use crate::config::{Config, ConfigResolver};
use crate::error::{FetchError, TransportError};
use crate::stats::TicketStats;

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first
  pub max_attempts: u32,
  /// Delay after the first failure; doubles after each further failure
  pub initial_delay: Duration,
  /// Optional bound on a single attempt
  pub request_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      initial_delay: Duration::from_secs(1),
      request_timeout: None,
    }
  }
}

impl RetryPolicy {
  /// Delay to wait after failed attempt number `attempt` (1-based).
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    self.initial_delay.saturating_mul(1 << exponent)
  }
}

/// Ticketing API client with bearer auth and retry.
///
/// Every call resolves to data or a [`FetchError`] value; nothing is raised
/// to the caller. The credential is looked up lazily and kept in memory once
/// found.
pub struct TicketingClient<T: Transport = HttpTransport> {
  transport: T,
  resolver: ConfigResolver,
  credential: Mutex<Option<String>>,
  retry: RetryPolicy,
}

impl TicketingClient<HttpTransport> {
  pub fn from_config(config: &Config, resolver: ConfigResolver) -> color_eyre::Result<Self> {
    let transport = HttpTransport::new(config.base_url()?)
      .map_err(|e| color_eyre::eyre::eyre!("Failed to create HTTP client: {}", e))?;
    Ok(Self::new(transport, resolver, config.retry_policy()))
  }
}

impl<T: Transport> TicketingClient<T> {
  pub fn new(transport: T, resolver: ConfigResolver, retry: RetryPolicy) -> Self {
    Self {
      transport,
      resolver,
      credential: Mutex::new(None),
      retry,
    }
  }

  /// Forget the in-memory credential so the next call reloads it.
  pub fn clear_credential(&self) {
    *self
      .credential
      .lock()
      .unwrap_or_else(PoisonError::into_inner) = None;
  }

  fn credential(&self) -> String {
    let mut cached = self
      .credential
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    if let Some(key) = cached.as_ref() {
      return key.clone();
    }
    match self.resolver.resolve_credential() {
      Some(key) => {
        *cached = Some(key.clone());
        key
      }
      None => String::new(),
    }
  }

  /// Issue a request, retrying failed attempts with exponential backoff.
  pub async fn fetch<R: DeserializeOwned>(&self, request: &ApiRequest) -> Result<R, FetchError> {
    let bearer = self.credential();
    let max_attempts = self.retry.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
      match self.attempt(request, &bearer).await {
        Ok(data) => {
          debug!(path = %request.path, attempt, "request succeeded");
          return Ok(data);
        }
        Err(e) => {
          warn!(path = %request.path, attempt, max_attempts, error = %e, "request failed");
          last_error = e.to_string();
        }
      }

      if attempt < max_attempts {
        tokio::time::sleep(self.retry.delay_after(attempt)).await;
      }
    }

    Err(FetchError::Exhausted {
      attempts: max_attempts,
      message: last_error,
    })
  }

  async fn attempt<R: DeserializeOwned>(
    &self,
    request: &ApiRequest,
    bearer: &str,
  ) -> Result<R, TransportError> {
    let response = match self.retry.request_timeout {
      Some(limit) => tokio::time::timeout(limit, self.transport.send(request, bearer))
        .await
        .map_err(|_| TransportError::Timeout(limit))??,
      None => self.transport.send(request, bearer).await?,
    };

    if !response.is_success() {
      return Err(TransportError::Status {
        status: response.status,
        message: parse_api_error(&response.body),
      });
    }

    // Empty bodies (e.g. 204) decode as JSON null
    let body = if response.body.trim().is_empty() {
      "null"
    } else {
      response.body.as_str()
    };
    serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))
  }

  // ==========================================================================
  // Endpoints
  // ==========================================================================

  /// `GET /tickets`, undecoded so callers can handle bad records one by one
  pub async fn list_tickets(&self, query: &TicketQuery) -> Result<Vec<Value>, FetchError> {
    let request = ApiRequest::get("/tickets")
      .param("page", query.page)
      .param("limit", query.limit)
      .param("status", query.status)
      .param("priority", query.priority)
      .param("category", query.category.as_deref())
      .param("department", query.department.as_deref())
      .param("assignee_id", query.assignee_id.as_deref())
      .param("search", query.search.as_deref())
      .param("sort_by", query.sort_by.as_deref())
      .param("sort_direction", query.sort_direction.as_deref());

    let list: ApiList<Value> = self.fetch(&request).await?;
    Ok(list.into_items())
  }

  /// `GET /tickets/{id}`
  pub async fn get_ticket(&self, id: &str) -> Result<Ticket, FetchError> {
    let request = ApiRequest::get(format!("/tickets/{}", id));
    let item: ApiItem<Value> = self.fetch(&request).await?;
    Ok(ApiTicket::parse(item.into_inner())?)
  }

  /// `POST /tickets`
  pub async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket, FetchError> {
    let request = ApiRequest::post("/tickets", to_body(ticket));
    let item: ApiItem<Value> = self.fetch(&request).await?;
    Ok(ApiTicket::parse(item.into_inner())?)
  }

  /// `PATCH /tickets/{id}`
  pub async fn update_ticket(&self, id: &str, update: &TicketUpdate) -> Result<Ticket, FetchError> {
    let request = ApiRequest::patch(format!("/tickets/{}", id), to_body(update));
    let item: ApiItem<Value> = self.fetch(&request).await?;
    Ok(ApiTicket::parse(item.into_inner())?)
  }

  /// `GET /tickets/stats`
  pub async fn ticket_stats(&self) -> Result<TicketStats, FetchError> {
    let item: ApiItem<TicketStats> = self.fetch(&ApiRequest::get("/tickets/stats")).await?;
    Ok(item.into_inner())
  }

  /// `GET /tickets/staff-logs`, undecoded like [`Self::list_tickets`]
  pub async fn list_staff_logs(&self, query: &StaffLogQuery) -> Result<Vec<Value>, FetchError> {
    let request = ApiRequest::get("/tickets/staff-logs")
      .param("page", query.page)
      .param("limit", query.limit)
      .param("ticket_id", query.ticket_id.as_deref())
      .param("staff_id", query.staff_id.as_deref())
      .param("action_type", query.action_type)
      .param("created_after", query.created_after.map(|t| t.to_rfc3339()))
      .param("created_before", query.created_before.map(|t| t.to_rfc3339()));

    let list: ApiList<Value> = self.fetch(&request).await?;
    Ok(list.into_items())
  }
}

fn to_body(value: &impl serde::Serialize) -> Value {
  // Our request bodies are plain structs of strings, enums and timestamps
  serde_json::to_value(value).unwrap_or(Value::Null)
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
  error: Option<String>,
  message: Option<String>,
}

/// Pull a human-readable message out of an error response body.
fn parse_api_error(body: &str) -> String {
  if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
    if let Some(message) = payload.message.or(payload.error) {
      return message.trim().to_string();
    }
  }

  let trimmed = body.trim();
  if trimmed.is_empty() {
    "empty response".to_string()
  } else {
    trimmed.chars().take(200).collect()
  }
}
