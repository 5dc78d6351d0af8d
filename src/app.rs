//! The operations exposed to dashboards and the CLI.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::cache::{CacheResult, TtlCache};
use crate::config::{Config, ConfigResolver};
use crate::db::sync_runs::SyncRun;
use crate::db::Database;
use crate::error::{ConversionError, FetchError, SyncError};
use crate::query::{self, StaffLogFilters, TicketFilters, TicketSort};
use crate::stats::{self, StaffLogStats, TicketStats};
use crate::sync::{self, SyncReport, SyncSettings};
use crate::ticketing::api_types::{remote_id_hint, ApiStaffLog, ApiTicket};
use crate::ticketing::types::{
  CachedStaffLog, CachedTicket, NewTicket, StaffLog, StaffLogQuery, Ticket, TicketQuery,
  TicketUpdate,
};
use crate::ticketing::{HttpTransport, TicketingClient, Transport};

const REMOTE_STATS_KEY: &str = "ticket_stats";

/// Entry point for everything ticket related.
///
/// Build one at startup and share it by reference. It owns the API client
/// (with its in-memory credential) and the remote stats memo.
pub struct TicketDesk<T: Transport = HttpTransport> {
  db: Arc<Database>,
  client: TicketingClient<T>,
  settings: SyncSettings,
  remote_stats: TtlCache<TicketStats>,
}

impl TicketDesk<HttpTransport> {
  /// Open the cache database and API client described by `config`.
  pub fn open(config: &Config) -> Result<Self> {
    let db = Arc::new(Database::open(&config.database_path()?)?);
    let client = TicketingClient::from_config(config, ConfigResolver::new(db.clone()))?;
    Ok(Self::new(db, client, config.sync_settings(), config.stats_ttl()))
  }
}

impl<T: Transport> TicketDesk<T> {
  pub fn new(
    db: Arc<Database>,
    client: TicketingClient<T>,
    settings: SyncSettings,
    stats_ttl: Duration,
  ) -> Self {
    Self {
      db,
      client,
      settings,
      remote_stats: TtlCache::new().with_stale_time(stats_ttl),
    }
  }

  pub fn database(&self) -> &Database {
    &self.db
  }

  /// Store a new API credential and make the client pick it up.
  pub fn set_credential(&self, name: &str, api_key: &str) -> Result<()> {
    self.db.save_credential(name, api_key)?;
    self.client.clear_credential();
    Ok(())
  }

  // ==========================================================================
  // Remote
  // ==========================================================================

  /// Tickets straight from the API. Records that fail conversion are logged
  /// and left out.
  pub async fn get_tickets(&self, query: &TicketQuery) -> Result<Vec<Ticket>, FetchError> {
    let records = self.client.list_tickets(query).await?;
    Ok(convert_all(records, ApiTicket::parse))
  }

  pub async fn get_ticket_by_id(&self, id: &str) -> Result<Ticket, FetchError> {
    self.client.get_ticket(id).await
  }

  pub async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket, FetchError> {
    self.client.create_ticket(ticket).await
  }

  pub async fn update_ticket(&self, id: &str, update: &TicketUpdate) -> Result<Ticket, FetchError> {
    self.client.update_ticket(id, update).await
  }

  /// Server-computed stats, reused for the configured stats TTL.
  ///
  /// Writes do not invalidate the memo, so a ticket created right after a
  /// fetch shows up here only once the memo expires.
  pub async fn get_ticket_stats(&self) -> Result<CacheResult<TicketStats>, FetchError> {
    self
      .remote_stats
      .fetch(REMOTE_STATS_KEY, || self.client.ticket_stats())
      .await
  }

  pub async fn get_staff_logs(&self, query: &StaffLogQuery) -> Result<Vec<StaffLog>, FetchError> {
    let records = self.client.list_staff_logs(query).await?;
    Ok(convert_all(records, ApiStaffLog::parse))
  }

  // ==========================================================================
  // Reconciliation
  // ==========================================================================

  pub async fn sync_tickets(&self) -> Result<SyncReport, SyncError> {
    sync::sync_tickets(&self.db, &self.client, self.settings.ticket_limit).await
  }

  /// Sync all recent staff logs, or only those of one remote ticket.
  pub async fn sync_staff_logs(&self, ticket_id: Option<&str>) -> Result<SyncReport, SyncError> {
    sync::sync_staff_logs(&self.db, &self.client, self.settings.staff_log_limit, ticket_id).await
  }

  // ==========================================================================
  // Local cache
  // ==========================================================================

  pub fn get_local_tickets(&self, filters: &TicketFilters, sort: TicketSort) -> Vec<CachedTicket> {
    query::local_tickets(&self.db, filters, sort)
  }

  /// Stats over every cached ticket, recomputed on each call.
  pub fn get_local_ticket_stats(&self) -> TicketStats {
    let tickets: Vec<Ticket> = self
      .get_local_tickets(&TicketFilters::default(), TicketSort::default())
      .into_iter()
      .map(|cached| cached.ticket)
      .collect();
    stats::ticket_stats(&tickets)
  }

  pub fn get_local_staff_logs(&self, filters: &StaffLogFilters) -> Vec<CachedStaffLog> {
    query::local_staff_logs(&self.db, filters)
  }

  pub fn get_local_staff_log_stats(&self, ticket_id: Option<&str>) -> StaffLogStats {
    let filters = StaffLogFilters {
      ticket_id: ticket_id.map(str::to_string),
      ..StaffLogFilters::default()
    };
    let logs: Vec<StaffLog> = self
      .get_local_staff_logs(&filters)
      .into_iter()
      .map(|cached| cached.log)
      .collect();
    stats::staff_log_stats(&logs, &query::ticket_created_index(&self.db))
  }

  // ==========================================================================
  // Audit
  // ==========================================================================

  pub fn recent_sync_runs(&self, limit: usize) -> Result<Vec<SyncRun>> {
    self.db.recent_sync_runs(limit)
  }

  /// Runs that have been `in_progress` for longer than `older_than`.
  pub fn stuck_sync_runs(&self, older_than: chrono::Duration) -> Result<Vec<SyncRun>> {
    let cutoff = Utc::now()
      .checked_sub_signed(older_than)
      .ok_or_else(|| eyre!("Stuck run age out of range: {}", older_than))?;
    self.db.stuck_sync_runs(cutoff)
  }
}

fn convert_all<E>(records: Vec<Value>, parse: fn(Value) -> Result<E, ConversionError>) -> Vec<E> {
  records
    .into_iter()
    .filter_map(|record| {
      let remote_id = remote_id_hint(&record);
      parse(record)
        .map_err(|e| warn!(remote_id = %remote_id, error = %e, "skipping unreadable record"))
        .ok()
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::db::sync_runs::{SyncStatus, SyncType};
  use crate::test_support::{
    fast_retry, staff_log_json, stub_client, test_db, ticket_json, StubTransport,
  };
  use pretty_assertions::assert_eq;
  use serde_json::json;

  fn desk(transport: &StubTransport, db: Arc<Database>) -> TicketDesk<StubTransport> {
    let client = stub_client(transport, db.clone(), fast_retry());
    TicketDesk::new(db, client, SyncSettings::default(), Duration::from_secs(300))
  }

  #[tokio::test(start_paused = true)]
  async fn test_remote_stats_are_memoized() {
    let transport = StubTransport::new();
    transport.push_json(200, json!({ "data": { "total": 12, "open": 5 } }));
    transport.push_json(200, json!({ "total": 13 }));
    let desk = desk(&transport, test_db());

    let first = desk.get_ticket_stats().await.unwrap();
    let second = desk.get_ticket_stats().await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data.total, 12);
    assert_eq!(transport.attempts(), 1);

    tokio::time::advance(Duration::from_secs(301)).await;
    let third = desk.get_ticket_stats().await.unwrap();
    assert_eq!(third.data.total, 13);
    assert_eq!(transport.attempts(), 2);
  }

  #[tokio::test]
  async fn test_remote_stats_error_is_a_value() {
    let transport = StubTransport::failing(503, "unavailable");
    let desk = desk(&transport, test_db());

    let err = desk.get_ticket_stats().await.unwrap_err();
    assert_eq!(err.attempts(), 3);
  }

  #[tokio::test]
  async fn test_get_tickets_skips_unreadable_records() {
    let transport = StubTransport::new();
    transport.push_json(200, json!([ticket_json("T-1"), { "id": "T-2" }]));
    let desk = desk(&transport, test_db());

    let tickets = desk.get_tickets(&TicketQuery::default()).await.unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].remote_id, "T-1");
  }

  #[tokio::test]
  async fn test_sync_then_local_reads() {
    let transport = StubTransport::new();
    let mut resolved = ticket_json("T-2");
    resolved["status"] = json!("resolved");
    resolved["resolved_at"] = json!("2024-03-01T12:00:00Z");
    resolved["due_date"] = json!("2024-03-02T00:00:00Z");
    transport.push_json(200, json!([ticket_json("T-1"), resolved]));
    transport.push_json(
      200,
      json!([staff_log_json("L-1", "T-1"), staff_log_json("L-2", "T-2")]),
    );
    let desk = desk(&transport, test_db());

    let tickets = desk.sync_tickets().await.unwrap();
    let logs = desk.sync_staff_logs(None).await.unwrap();
    assert_eq!(tickets.records_processed, 2);
    assert_eq!(logs.sync_type, SyncType::StaffLogs);
    assert_eq!(logs.records_processed, 2);

    let stats = desk.get_local_ticket_stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.open, 1);
    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.avg_resolution_hours, 3.0);
    assert_eq!(stats.sla_compliance, 100.0);

    let log_stats = desk.get_local_staff_log_stats(Some("T-1"));
    assert_eq!(log_stats.total_actions, 1);
    assert_eq!(log_stats.avg_response_time_hours, Some(1.0));

    let runs = desk.recent_sync_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == SyncStatus::Success));
  }

  #[tokio::test]
  async fn test_set_credential_reaches_next_request() {
    let transport = StubTransport::new();
    transport.push_json(200, json!({ "data": ticket_json("T-1") }));
    transport.push_json(200, json!({ "data": ticket_json("T-1") }));
    let desk = desk(&transport, test_db());

    desk.get_ticket_by_id("T-1").await.unwrap();
    desk.set_credential("default", "rotated").unwrap();
    desk.get_ticket_by_id("T-1").await.unwrap();

    let bearers: Vec<String> = transport.requests().into_iter().map(|(_, b)| b).collect();
    assert_eq!(bearers, vec!["test-key", "rotated"]);
  }

  #[tokio::test]
  async fn test_stuck_runs() {
    let db = test_db();
    db.begin_sync_run(SyncType::Tickets, None, Utc::now() - chrono::Duration::hours(3))
      .unwrap();
    db.begin_sync_run(SyncType::Tickets, None, Utc::now()).unwrap();
    let desk = desk(&StubTransport::new(), db);

    let stuck = desk.stuck_sync_runs(chrono::Duration::minutes(30)).unwrap();
    assert_eq!(stuck.len(), 1);
  }

  #[tokio::test]
  async fn test_stuck_runs_rejects_out_of_range_age() {
    let desk = desk(&StubTransport::new(), test_db());
    let age = chrono::Duration::try_minutes(1_000_000_000_000).unwrap();

    let err = desk.stuck_sync_runs(age).unwrap_err();
    assert!(err.to_string().contains("out of range"));
  }
}
