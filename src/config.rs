use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::db::Database;
use crate::sync::SyncSettings;
use crate::ticketing::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  /// How long remote-computed stats are reused before refetching
  #[serde(default = "default_stats_ttl_secs")]
  pub stats_ttl_secs: u64,
  /// Cache database location (default: $XDG_DATA_HOME/ticket-sync/cache.db)
  pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the ticketing API, e.g. https://desk.example.com/api
  pub base_url: String,
  /// Per-attempt timeout; unset means attempts may wait indefinitely
  pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_initial_delay_ms")]
  pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      initial_delay_ms: default_initial_delay_ms(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  #[serde(default = "default_sync_limit")]
  pub ticket_limit: u32,
  #[serde(default = "default_sync_limit")]
  pub staff_log_limit: u32,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      ticket_limit: default_sync_limit(),
      staff_log_limit: default_sync_limit(),
    }
  }
}

fn default_stats_ttl_secs() -> u64 {
  300
}

fn default_max_attempts() -> u32 {
  3
}

fn default_initial_delay_ms() -> u64 {
  1000
}

fn default_sync_limit() -> u32 {
  1000
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ticket-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ticket-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/ticket-sync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("ticket-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ticket-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.base_url()?;
    if config.retry.max_attempts == 0 {
      return Err(eyre!("retry.max_attempts must be at least 1"));
    }
    Ok(config)
  }

  /// Parsed API base URL
  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.api.base_url)
      .map_err(|e| eyre!("Invalid api.base_url '{}': {}", self.api.base_url, e))
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.retry.max_attempts,
      initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
      request_timeout: self.api.request_timeout_secs.map(Duration::from_secs),
    }
  }

  pub fn sync_settings(&self) -> SyncSettings {
    SyncSettings {
      ticket_limit: self.sync.ticket_limit,
      staff_log_limit: self.sync.staff_log_limit,
    }
  }

  pub fn stats_ttl(&self) -> Duration {
    Duration::from_secs(self.stats_ttl_secs)
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => Database::default_path(),
    }
  }

  /// Get the ticketing API token from environment variables.
  ///
  /// Checks TICKET_SYNC_API_TOKEN first, then TICKETING_API_TOKEN as fallback.
  /// Only used to seed the persisted credential.
  pub fn api_token_from_env() -> Result<String> {
    std::env::var("TICKET_SYNC_API_TOKEN")
      .or_else(|_| std::env::var("TICKETING_API_TOKEN"))
      .map_err(|_| {
        eyre!(
          "API token not found. Pass it as an argument or set TICKET_SYNC_API_TOKEN."
        )
      })
  }
}

/// Loads the active API credential from the persisted configuration.
#[derive(Clone)]
pub struct ConfigResolver {
  db: Arc<Database>,
}

impl ConfigResolver {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Credential of the active configuration row.
  ///
  /// A missing row or a failed read is logged and reported as `None`; the
  /// request then goes out with an empty bearer and fails at the server.
  pub fn resolve_credential(&self) -> Option<String> {
    match self.db.active_system_config() {
      Ok(Some(config)) if !config.api_key.is_empty() => Some(config.api_key),
      Ok(_) => {
        warn!("no active ticketing system credential configured");
        None
      }
      Err(e) => {
        warn!(error = %e, "failed to load ticketing system credential");
        None
      }
    }
  }
}
