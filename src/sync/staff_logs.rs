use chrono::Utc;

use super::{begin_run, fail_run, finish_run, SyncReport, Tally};
use crate::db::sync_runs::SyncType;
use crate::db::Database;
use crate::error::SyncError;
use crate::ticketing::api_types::{remote_id_hint, ApiStaffLog};
use crate::ticketing::types::StaffLogQuery;
use crate::ticketing::{TicketingClient, Transport};

/// Pull staff logs into `staff_logs_cache`, optionally for one ticket.
///
/// Logs are linked to the cached ticket with the same remote id when there is
/// one. Logs whose ticket is not cached yet are stored unlinked and get their
/// link on a later sync.
pub async fn sync_staff_logs<T: Transport>(
  db: &Database,
  client: &TicketingClient<T>,
  limit: u32,
  ticket_id: Option<&str>,
) -> Result<SyncReport, SyncError> {
  let run_id = begin_run(db, SyncType::StaffLogs, ticket_id)?;

  let query = StaffLogQuery {
    limit: Some(limit),
    ticket_id: ticket_id.map(str::to_string),
    ..StaffLogQuery::default()
  };
  let records = match client.list_staff_logs(&query).await {
    Ok(records) => records,
    Err(e) => return Err(fail_run(db, run_id, SyncType::StaffLogs, e)),
  };

  let synced_at = Utc::now();
  let mut tally = Tally::default();
  for record in records {
    let remote_id = remote_id_hint(&record);
    let result = ApiStaffLog::parse(record)
      .map_err(|e| e.to_string())
      .and_then(|log| {
        let local_ticket = db
          .find_ticket_id(&log.remote_ticket_id)
          .map_err(|e| e.to_string())?;
        db.upsert_staff_log(&log, local_ticket, synced_at)
          .map(|_| ())
          .map_err(|e| e.to_string())
      });
    tally.record(run_id, &remote_id, result);
  }

  finish_run(db, run_id, SyncType::StaffLogs, tally)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::sync_runs::SyncStatus;
  use crate::test_support::{
    fast_retry, sample_ticket, staff_log_json, stub_client, test_db, StubTransport,
  };
  use serde_json::json;

  fn linked_ticket(db: &Database, remote_id: &str) -> Option<i64> {
    db.lock()
      .unwrap()
      .query_row(
        "SELECT ticket_id FROM staff_logs_cache WHERE remote_id = ?",
        [remote_id],
        |row| row.get(0),
      )
      .unwrap()
  }

  #[tokio::test]
  async fn test_links_logs_to_cached_tickets() {
    let db = test_db();
    let local_id = db.upsert_ticket(&sample_ticket("T-1"), Utc::now()).unwrap();

    let transport = StubTransport::new();
    transport.push_json(
      200,
      json!({ "data": [staff_log_json("L-1", "T-1"), staff_log_json("L-2", "T-404")] }),
    );
    let client = stub_client(&transport, db.clone(), fast_retry());

    let report = sync_staff_logs(&db, &client, 1000, None).await.unwrap();

    assert_eq!(report.records_processed, 2);
    assert_eq!(report.records_failed, 0);
    assert_eq!(db.staff_log_count().unwrap(), 2);
    assert_eq!(linked_ticket(&db, "L-1"), Some(local_id));
    assert_eq!(linked_ticket(&db, "L-2"), None);
  }

  #[tokio::test]
  async fn test_resync_links_late_ticket() {
    let db = test_db();
    let transport = StubTransport::new();
    transport.push_json(200, json!([staff_log_json("L-1", "T-9")]));
    transport.push_json(200, json!([staff_log_json("L-1", "T-9")]));
    let client = stub_client(&transport, db.clone(), fast_retry());

    sync_staff_logs(&db, &client, 1000, None).await.unwrap();
    assert_eq!(linked_ticket(&db, "L-1"), None);

    let local_id = db.upsert_ticket(&sample_ticket("T-9"), Utc::now()).unwrap();
    sync_staff_logs(&db, &client, 1000, None).await.unwrap();

    assert_eq!(db.staff_log_count().unwrap(), 1);
    assert_eq!(linked_ticket(&db, "L-1"), Some(local_id));
  }

  #[tokio::test]
  async fn test_single_ticket_scope() {
    let db = test_db();
    let transport = StubTransport::new();
    transport.push_json(200, json!([staff_log_json("L-1", "T-1")]));
    let client = stub_client(&transport, db.clone(), fast_retry());

    let report = sync_staff_logs(&db, &client, 50, Some("T-1")).await.unwrap();

    let (request, _) = &transport.requests()[0];
    assert_eq!(request.path, "/tickets/staff-logs");
    assert_eq!(request.query_value("ticket_id"), Some("T-1"));
    assert_eq!(request.query_value("limit"), Some("50"));

    let run = db.get_sync_run(report.run_id).unwrap().unwrap();
    assert_eq!(run.sync_type, SyncType::StaffLogs);
    assert_eq!(run.scope.as_deref(), Some("T-1"));
  }

  #[tokio::test]
  async fn test_bad_action_type_is_a_row_failure() {
    let db = test_db();
    let mut bad = staff_log_json("L-2", "T-1");
    bad["action_type"] = json!("teleported");
    let transport = StubTransport::new();
    transport.push_json(200, json!([staff_log_json("L-1", "T-1"), bad]));
    let client = stub_client(&transport, db.clone(), fast_retry());

    let report = sync_staff_logs(&db, &client, 1000, None).await.unwrap();

    assert_eq!(report.status, SyncStatus::Success);
    assert_eq!(report.records_processed, 1);
    assert_eq!(report.records_failed, 1);
  }

  #[tokio::test]
  async fn test_fetch_failure_is_recorded() {
    let db = test_db();
    let transport = StubTransport::failing(401, r#"{"message": "bad token"}"#);
    let client = stub_client(&transport, db.clone(), fast_retry());

    let err = sync_staff_logs(&db, &client, 1000, Some("T-1"))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("bad token"));

    let runs = db.recent_sync_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, SyncStatus::Failed);
    assert_eq!(runs[0].scope.as_deref(), Some("T-1"));
  }
}
