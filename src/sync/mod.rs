//! Reconciliation of the remote ticketing system into the local cache.
//!
//! Each run is audited in `ticket_sync_log`: it starts `in_progress` and is
//! finalized exactly once. A failed list fetch fails the run; a bad record
//! only bumps `records_failed`.

pub mod staff_logs;
pub mod tickets;

pub use staff_logs::sync_staff_logs;
pub use tickets::sync_tickets;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::db::sync_runs::{RunOutcome, SyncStatus, SyncType};
use crate::db::Database;
use crate::error::{FetchError, SyncError};

/// Batch sizes for the list fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
  pub ticket_limit: u32,
  pub staff_log_limit: u32,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      ticket_limit: 1000,
      staff_log_limit: 1000,
    }
  }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  pub run_id: i64,
  pub sync_type: SyncType,
  pub status: SyncStatus,
  pub records_processed: u64,
  pub records_failed: u64,
}

/// Per-record tally for one run
#[derive(Debug, Default)]
struct Tally {
  processed: u64,
  failed: u64,
}

impl Tally {
  fn record(&mut self, run_id: i64, remote_id: &str, result: Result<(), String>) {
    match result {
      Ok(()) => self.processed += 1,
      Err(e) => {
        warn!(run_id, remote_id, error = %e, "failed to cache record");
        self.failed += 1;
      }
    }
  }
}

fn begin_run(
  db: &Database,
  sync_type: SyncType,
  scope: Option<&str>,
) -> Result<i64, SyncError> {
  let run_id = db
    .begin_sync_run(sync_type, scope, Utc::now())
    .map_err(|e| SyncError::Store(e.to_string()))?;
  info!(run_id, %sync_type, scope, "sync started");
  Ok(run_id)
}

/// Record a failed fetch and hand the error back for the caller to return.
fn fail_run(db: &Database, run_id: i64, sync_type: SyncType, err: FetchError) -> SyncError {
  error!(run_id, %sync_type, error = %err, "sync failed");
  let outcome = RunOutcome::Failed {
    error: err.to_string(),
  };
  if let Err(e) = db.complete_sync_run(run_id, &outcome, Utc::now()) {
    error!(run_id, error = %e, "failed to record sync failure");
  }
  SyncError::Fetch(err)
}

fn finish_run(
  db: &Database,
  run_id: i64,
  sync_type: SyncType,
  tally: Tally,
) -> Result<SyncReport, SyncError> {
  let completed_at = Utc::now();
  let outcome = RunOutcome::Success {
    processed: tally.processed,
    failed: tally.failed,
  };
  db.complete_sync_run(run_id, &outcome, completed_at)
    .map_err(|e| SyncError::Store(e.to_string()))?;
  mark_successful_sync(db, completed_at);

  info!(
    run_id,
    %sync_type,
    processed = tally.processed,
    failed = tally.failed,
    "sync completed"
  );
  Ok(SyncReport {
    run_id,
    sync_type,
    status: SyncStatus::Success,
    records_processed: tally.processed,
    records_failed: tally.failed,
  })
}

fn mark_successful_sync(db: &Database, at: DateTime<Utc>) {
  match db.mark_successful_sync(at) {
    Ok(true) => {}
    Ok(false) => debug!("no active ticketing system to stamp"),
    Err(e) => warn!(error = %e, "failed to record last successful sync"),
  }
}
