use chrono::Utc;

use super::{begin_run, fail_run, finish_run, SyncReport, Tally};
use crate::db::sync_runs::SyncType;
use crate::db::Database;
use crate::error::SyncError;
use crate::ticketing::api_types::{remote_id_hint, ApiTicket};
use crate::ticketing::types::TicketQuery;
use crate::ticketing::{TicketingClient, Transport};

/// Pull the `limit` most recently updated tickets into `tickets_cache`.
///
/// Every ticket is written in full, keyed by remote id, so running this
/// twice against an unchanged remote leaves the same rows behind.
pub async fn sync_tickets<T: Transport>(
  db: &Database,
  client: &TicketingClient<T>,
  limit: u32,
) -> Result<SyncReport, SyncError> {
  let run_id = begin_run(db, SyncType::Tickets, None)?;

  let records = match client.list_tickets(&TicketQuery::recently_updated(limit)).await {
    Ok(records) => records,
    Err(e) => return Err(fail_run(db, run_id, SyncType::Tickets, e)),
  };

  let synced_at = Utc::now();
  let mut tally = Tally::default();
  for record in records {
    let remote_id = remote_id_hint(&record);
    let result = ApiTicket::parse(record)
      .map_err(|e| e.to_string())
      .and_then(|ticket| {
        db.upsert_ticket(&ticket, synced_at)
          .map(|_| ())
          .map_err(|e| e.to_string())
      });
    tally.record(run_id, &remote_id, result);
  }

  finish_run(db, run_id, SyncType::Tickets, tally)
}
