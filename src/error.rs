//! Error types shared across the sync subsystem.
//!
//! Storage and configuration plumbing report through `color_eyre::Result`;
//! the types here are the ones callers are expected to match on.

use std::time::Duration;

use thiserror::Error;

/// A single failed attempt against the remote ticketing API.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
  /// The request never produced a response.
  #[error("connection failed: {0}")]
  Connection(String),

  /// The request did not finish within the configured per-attempt timeout.
  #[error("request timed out after {0:?}")]
  Timeout(Duration),

  /// The server answered with a non-success status.
  #[error("HTTP {status}: {message}")]
  Status { status: u16, message: String },

  /// The response body could not be decoded.
  #[error("invalid response body: {0}")]
  Decode(String),
}

/// Outcome of a remote call that did not yield data.
///
/// This is returned as a value, never raised; collaborators show the message
/// as a banner.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
  /// Every attempt failed.
  #[error("request failed after {attempts} attempts: {message}")]
  Exhausted { attempts: u32, message: String },

  /// The call succeeded but the payload does not describe a valid entity.
  #[error("unexpected payload: {0}")]
  Payload(#[from] ConversionError),
}

impl FetchError {
  /// Number of attempts made before giving up (zero for payload errors).
  pub fn attempts(&self) -> u32 {
    match self {
      FetchError::Exhausted { attempts, .. } => *attempts,
      FetchError::Payload(_) => 0,
    }
  }
}

/// A remote payload could not be converted into a cached entity.
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
  #[error("malformed {entity}: {message}")]
  Malformed {
    entity: &'static str,
    message: String,
  },

  #[error("unknown {kind} '{value}'")]
  UnknownValue { kind: &'static str, value: String },

  #[error("invalid timestamp '{value}' in field '{field}'")]
  InvalidTimestamp { field: &'static str, value: String },
}

/// Run-level failure of a sync invocation.
#[derive(Debug, Error)]
pub enum SyncError {
  /// The remote list could not be fetched; the run was recorded as failed.
  #[error(transparent)]
  Fetch(#[from] FetchError),

  /// The audit record itself could not be written.
  #[error("sync audit failed: {0}")]
  Store(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exhausted_message_carries_attempts() {
    let err = FetchError::Exhausted {
      attempts: 3,
      message: "HTTP 503: unavailable".to_string(),
    };
    assert_eq!(err.attempts(), 3);
    assert_eq!(
      err.to_string(),
      "request failed after 3 attempts: HTTP 503: unavailable"
    );
  }

  #[test]
  fn test_sync_error_is_transparent_for_fetch() {
    let err: SyncError = FetchError::Exhausted {
      attempts: 3,
      message: "connection failed: refused".to_string(),
    }
    .into();
    assert_eq!(
      err.to_string(),
      "request failed after 3 attempts: connection failed: refused"
    );
  }
}
