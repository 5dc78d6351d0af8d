use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use ticket_sync::query::{SortDirection, StaffLogFilters, TicketFilters, TicketSort, TicketSortField};
use ticket_sync::ticketing::types::{
  CachedTicket, NewTicket, StaffActionType, Ticket, TicketPriority, TicketStatus, TicketUpdate,
};
use ticket_sync::{Config, TicketDesk};

#[derive(Parser, Debug)]
#[command(name = "ticket-sync")]
#[command(about = "Sync a remote ticketing system into a local cache and query it")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ticket-sync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Log to stderr instead of the log file
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Manage the stored API credential
  Credential {
    #[command(subcommand)]
    action: CredentialAction,
  },
  /// Pull remote data into the local cache
  Sync {
    #[command(subcommand)]
    target: SyncTarget,
  },
  /// List cached tickets
  Tickets(TicketListArgs),
  /// Fetch one ticket from the remote system
  Show { id: String },
  /// Create a ticket on the remote system
  Create {
    title: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, default_value = "medium")]
    priority: TicketPriority,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    department: Option<String>,
    #[arg(long)]
    requester_email: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
  },
  /// Update a ticket on the remote system
  Update {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    status: Option<TicketStatus>,
    #[arg(long)]
    priority: Option<TicketPriority>,
    #[arg(long)]
    assignee: Option<String>,
  },
  /// Ticket statistics (local cache unless --remote)
  Stats {
    #[arg(long)]
    remote: bool,
  },
  /// List cached staff logs
  Logs(LogListArgs),
  /// Staff log statistics from the local cache
  LogStats {
    /// Remote ticket id
    #[arg(long)]
    ticket: Option<String>,
  },
  /// Show recent sync runs
  Runs {
    #[arg(long, default_value_t = 20)]
    limit: usize,
    /// Only list runs stuck in progress for at least this many minutes
    #[arg(long)]
    stuck_minutes: Option<i64>,
  },
}

#[derive(Subcommand, Debug)]
enum CredentialAction {
  /// Store an API key (default: from TICKET_SYNC_API_TOKEN) and make it active
  Set {
    key: Option<String>,
    #[arg(long, default_value = "default")]
    name: String,
  },
}

#[derive(Subcommand, Debug)]
enum SyncTarget {
  Tickets,
  Logs {
    /// Only sync logs of this remote ticket
    #[arg(long)]
    ticket: Option<String>,
  },
}

#[derive(ClapArgs, Debug)]
struct TicketListArgs {
  #[arg(long)]
  status: Vec<TicketStatus>,
  #[arg(long)]
  priority: Vec<TicketPriority>,
  #[arg(long)]
  category: Vec<String>,
  #[arg(long)]
  department: Vec<String>,
  #[arg(long)]
  assignee: Option<String>,
  #[arg(short, long)]
  search: Option<String>,
  #[arg(long)]
  limit: Option<usize>,
  #[arg(long, default_value = "created_at")]
  sort: TicketSortField,
  #[arg(long)]
  asc: bool,
  #[arg(long)]
  json: bool,
}

#[derive(ClapArgs, Debug)]
struct LogListArgs {
  #[arg(long)]
  ticket: Option<String>,
  #[arg(long)]
  staff: Option<String>,
  #[arg(long)]
  action: Vec<StaffActionType>,
  /// RFC 3339 lower bound on creation time
  #[arg(long)]
  after: Option<DateTime<Utc>>,
  /// RFC 3339 upper bound on creation time
  #[arg(long)]
  before: Option<DateTime<Utc>>,
  #[arg(long)]
  limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = setup_logging(args.verbose);

  let config = Config::load(args.config.as_deref())?;
  let desk = TicketDesk::open(&config)?;

  run(&desk, args.command).await
}

async fn run(desk: &TicketDesk, command: Command) -> Result<()> {
  match command {
    Command::Credential {
      action: CredentialAction::Set { key, name },
    } => {
      let key = match key {
        Some(key) => key,
        None => Config::api_token_from_env()?,
      };
      desk.set_credential(&name, &key)?;
      println!("Credential '{}' is now active", name);
    }

    Command::Sync { target } => {
      let report = match target {
        SyncTarget::Tickets => desk.sync_tickets().await?,
        SyncTarget::Logs { ticket } => desk.sync_staff_logs(ticket.as_deref()).await?,
      };
      info!(run_id = report.run_id, "sync finished from cli");
      println!(
        "{} sync #{}: {} processed, {} failed",
        report.sync_type, report.run_id, report.records_processed, report.records_failed
      );
    }

    Command::Tickets(list) => {
      let filters = TicketFilters {
        statuses: list.status,
        priorities: list.priority,
        categories: list.category,
        departments: list.department,
        assignee_id: list.assignee,
        search: list.search,
        limit: list.limit,
      };
      let direction = if list.asc {
        SortDirection::Asc
      } else {
        SortDirection::Desc
      };
      let tickets = desk.get_local_tickets(&filters, TicketSort::new(list.sort, direction));
      if list.json {
        print_json(&tickets)?;
      } else {
        print_tickets(&tickets);
      }
    }

    Command::Show { id } => {
      let ticket = desk.get_ticket_by_id(&id).await?;
      print_json(&ticket)?;
    }

    Command::Create {
      title,
      description,
      priority,
      category,
      department,
      requester_email,
      tags,
    } => {
      let ticket = desk
        .create_ticket(&NewTicket {
          title,
          description,
          priority,
          category,
          department,
          requester_email,
          due_date: None,
          tags,
        })
        .await?;
      print_created(&ticket);
    }

    Command::Update {
      id,
      title,
      description,
      status,
      priority,
      assignee,
    } => {
      let update = TicketUpdate {
        title,
        description,
        status,
        priority,
        assignee_id: assignee,
        due_date: None,
      };
      let ticket = desk.update_ticket(&id, &update).await?;
      print_json(&ticket)?;
    }

    Command::Stats { remote } => {
      if remote {
        let stats = desk.get_ticket_stats().await?;
        print_json(&stats)?;
      } else {
        print_json(&desk.get_local_ticket_stats())?;
      }
    }

    Command::Logs(list) => {
      let filters = StaffLogFilters {
        ticket_id: list.ticket,
        staff_id: list.staff,
        action_types: list.action,
        created_after: list.after,
        created_before: list.before,
        limit: list.limit,
      };
      print_json(&desk.get_local_staff_logs(&filters))?;
    }

    Command::LogStats { ticket } => {
      print_json(&desk.get_local_staff_log_stats(ticket.as_deref()))?;
    }

    Command::Runs {
      limit,
      stuck_minutes,
    } => {
      let runs = match stuck_minutes {
        Some(minutes) => {
          let age = chrono::Duration::try_minutes(minutes)
            .ok_or_else(|| eyre!("--stuck-minutes {} is out of range", minutes))?;
          desk.stuck_sync_runs(age)?
        }
        None => desk.recent_sync_runs(limit)?,
      };
      for run in runs {
        println!(
          "#{:<5} {:<10} {:<11} {} processed={} failed={}{}",
          run.id,
          run.sync_type,
          run.status,
          run.started_at.format("%Y-%m-%d %H:%M:%S"),
          run.records_processed,
          run.records_failed,
          run
            .error_message
            .map(|e| format!(" error={}", e))
            .unwrap_or_default()
        );
      }
    }
  }

  Ok(())
}

/// File logging under the data directory, or stderr when `verbose`.
///
/// The returned guard flushes the file writer on drop.
fn setup_logging(verbose: bool) -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ticket_sync=info"));

  let log_dir = dirs::data_dir()
    .map(|d| d.join("ticket-sync"))
    .filter(|d| std::fs::create_dir_all(d).is_ok());

  match log_dir {
    Some(dir) if !verbose => {
      let appender = tracing_appender::rolling::daily(dir, "ticket-sync.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Some(guard)
    }
    _ => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      None
    }
  }
}

fn print_json(value: &impl Serialize) -> Result<()> {
  let out = serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to render JSON: {}", e))?;
  println!("{}", out);
  Ok(())
}

fn print_tickets(tickets: &[CachedTicket]) {
  if tickets.is_empty() {
    println!("No cached tickets match. Run `ticket-sync sync tickets` first?");
    return;
  }
  println!(
    "{:<12} {:<12} {:<9} {:<44} ASSIGNEE",
    "NUMBER", "STATUS", "PRIORITY", "TITLE"
  );
  for cached in tickets {
    let t = &cached.ticket;
    println!(
      "{:<12} {:<12} {:<9} {:<44} {}",
      t.ticket_number,
      t.status,
      t.priority,
      truncate(&t.title, 44),
      t.assignee_name.as_deref().or(t.assignee_id.as_deref()).unwrap_or("-")
    );
  }
}

fn print_created(ticket: &Ticket) {
  println!("Created {} ({}): {}", ticket.ticket_number, ticket.remote_id, ticket.title);
}

fn truncate(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", head)
  }
}
