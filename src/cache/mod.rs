//! In-memory memoization for remote-computed data.
//!
//! Only remote aggregates go through here; locally cached tickets and staff
//! logs live in SQLite (see [`crate::db`]).

mod layer;
mod traits;

pub use layer::TtlCache;
pub use traits::{CacheResult, CacheSource};
