/// Schema for the local cache. Applied on every open; all statements are idempotent.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Mirror of remote tickets, keyed by the remote identifier
CREATE TABLE IF NOT EXISTS tickets_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT NOT NULL UNIQUE,
    ticket_number TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL,
    priority TEXT NOT NULL,
    category TEXT,
    department TEXT,
    requester_id TEXT,
    requester_name TEXT,
    requester_email TEXT,
    assignee_id TEXT,
    assignee_name TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    resolved_at TEXT,
    due_date TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    custom_fields TEXT NOT NULL DEFAULT '{}',
    last_synced_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tickets_cache_status ON tickets_cache(status);
CREATE INDEX IF NOT EXISTS idx_tickets_cache_priority ON tickets_cache(priority);
CREATE INDEX IF NOT EXISTS idx_tickets_cache_created ON tickets_cache(created_at);
CREATE INDEX IF NOT EXISTS idx_tickets_cache_assignee ON tickets_cache(assignee_id);

-- Staff actions; ticket_id is resolved against tickets_cache at sync time
CREATE TABLE IF NOT EXISTS staff_logs_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT NOT NULL UNIQUE,
    ticket_id INTEGER REFERENCES tickets_cache(id) ON DELETE SET NULL,
    remote_ticket_id TEXT NOT NULL,
    staff_id TEXT,
    staff_name TEXT,
    staff_email TEXT,
    action_type TEXT NOT NULL,
    previous_value TEXT,
    new_value TEXT,
    comment TEXT,
    time_spent_minutes INTEGER,
    created_at TEXT NOT NULL,
    last_synced_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_staff_logs_cache_ticket ON staff_logs_cache(ticket_id);
CREATE INDEX IF NOT EXISTS idx_staff_logs_cache_remote_ticket ON staff_logs_cache(remote_ticket_id);
CREATE INDEX IF NOT EXISTS idx_staff_logs_cache_staff ON staff_logs_cache(staff_id);

-- Append-only audit of sync runs
CREATE TABLE IF NOT EXISTS ticket_sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sync_type TEXT NOT NULL,
    scope TEXT,
    status TEXT NOT NULL DEFAULT 'in_progress'
        CHECK (status IN ('in_progress', 'success', 'failed')),
    started_at TEXT NOT NULL,
    completed_at TEXT,
    records_processed INTEGER NOT NULL DEFAULT 0,
    records_failed INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_ticket_sync_log_started ON ticket_sync_log(started_at);

-- Remote system credentials; at most one row is active
CREATE TABLE IF NOT EXISTS ticketing_system_config (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    api_key TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 0,
    last_successful_sync TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
