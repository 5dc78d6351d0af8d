//! Pull-based sync of a remote ticketing system into a local SQLite cache.
//!
//! [`app::TicketDesk`] is the entry point: remote proxies with retry,
//! sync runs that reconcile tickets and staff logs into the cache, and local
//! reads and stats over the cached data.

pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod stats;
pub mod sync;
pub mod ticketing;

#[cfg(test)]
mod test_support;

pub use app::TicketDesk;
pub use config::Config;
pub use error::{FetchError, SyncError};
