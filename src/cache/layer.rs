//! Time-based memo in front of a network fetch.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::traits::CacheResult;

struct Entry<T> {
  data: T,
  fetched: Instant,
  cached_at: DateTime<Utc>,
}

/// Keyed in-memory memo with a fixed stale time.
///
/// Entries are never invalidated by writes; they simply expire. A failed
/// fetch is returned to the caller and leaves any existing entry untouched.
pub struct TtlCache<T> {
  entries: Mutex<HashMap<String, Entry<T>>>,
  /// How long before memoized data is considered stale
  stale_time: Duration,
}

impl<T: Clone> TtlCache<T> {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      stale_time: Duration::from_secs(300),
    }
  }

  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Fresh memoized value for `key`, if any.
  fn fresh(&self, key: &str) -> Option<CacheResult<T>> {
    let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
    entries
      .get(key)
      .filter(|entry| entry.fetched.elapsed() < self.stale_time)
      .map(|entry| CacheResult::from_cache(entry.data.clone(), entry.cached_at))
  }

  /// Return the memoized value if fresh, otherwise run `fetcher` and memoize
  /// its success.
  pub async fn fetch<F, Fut, E>(&self, key: &str, fetcher: F) -> Result<CacheResult<T>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if let Some(hit) = self.fresh(key) {
      debug!(key, "serving memoized value");
      return Ok(hit);
    }

    let data = fetcher().await?;
    let cached_at = Utc::now();
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(
        key.to_string(),
        Entry {
          data: data.clone(),
          fetched: Instant::now(),
          cached_at,
        },
      );
    Ok(CacheResult::from_network(data, cached_at))
  }
}

impl<T: Clone> Default for TtlCache<T> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use std::sync::atomic::{AtomicU32, Ordering};

  async fn counting_fetch(calls: &AtomicU32) -> Result<u32, String> {
    Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
  }

  #[tokio::test(start_paused = true)]
  async fn test_memoizes_until_stale() {
    let cache = TtlCache::new().with_stale_time(Duration::from_secs(300));
    let calls = AtomicU32::new(0);

    let first = cache.fetch("stats", || counting_fetch(&calls)).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data, 1);

    tokio::time::advance(Duration::from_secs(299)).await;
    let second = cache.fetch("stats", || counting_fetch(&calls)).await.unwrap();
    assert!(second.is_cached());
    assert_eq!(second.data, 1);
    assert_eq!(second.cached_at, first.cached_at);

    tokio::time::advance(Duration::from_secs(2)).await;
    let third = cache.fetch("stats", || counting_fetch(&calls)).await.unwrap();
    assert_eq!(third.source, CacheSource::Network);
    assert_eq!(third.data, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_is_not_memoized() {
    let cache: TtlCache<u32> = TtlCache::new();

    let err = cache
      .fetch("stats", || async { Err::<u32, _>("offline".to_string()) })
      .await
      .unwrap_err();
    assert_eq!(err, "offline");

    let ok = cache
      .fetch("stats", || async { Ok::<_, String>(7) })
      .await
      .unwrap();
    assert_eq!(ok.source, CacheSource::Network);
    assert_eq!(ok.data, 7);
  }

  #[tokio::test]
  async fn test_keys_are_independent() {
    let cache = TtlCache::new();
    cache.fetch("a", || async { Ok::<_, ()>(1) }).await.unwrap();
    let b = cache.fetch("b", || async { Ok::<_, ()>(2) }).await.unwrap();
    assert_eq!(b.data, 2);
    assert_eq!(b.source, CacheSource::Network);
  }
}
