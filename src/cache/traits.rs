//! Result metadata for memoized lookups.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Memoized data plus where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the data was fetched from the network
  pub cached_at: DateTime<Utc>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at,
    }
  }

  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at,
    }
  }

  pub fn is_cached(&self) -> bool {
    self.source == CacheSource::CacheFresh
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
  /// Fetched by this call
  Network,
  /// Served from memory, still within the stale time
  CacheFresh,
}
